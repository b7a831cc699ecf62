// File reading and writing
// Reads follow the cluster chain and truncate to the declared size.
// Writes replace the whole file: the old chain is released, a fresh chain
// is allocated and filled, and the directory entry is published last.

use super::dir_entry::{attributes, ShortEntry};
use super::path::Resolved;
use super::timestamps::now_fat_datetime;
use super::volume::FatVolume;
use fatkit_core::{BlockDevice, FatError, FatResult};
use log::{debug, info};

impl<D: BlockDevice> FatVolume<D> {
    /// Read a whole file.
    pub(crate) fn read_file_impl(&mut self, path: &str) -> FatResult<Vec<u8>> {
        let record = match self.resolve(path)? {
            Resolved::Root => {
                return Err(FatError::InvalidPath(format!("{:?} is a directory", path)))
            }
            Resolved::Entry { record, .. } => record,
        };

        if record.entry.is_directory() {
            return Err(FatError::InvalidPath(format!("{:?} is a directory", path)));
        }

        let size = record.entry.size as usize;
        if size == 0 || record.entry.first_cluster < 2 {
            return Ok(Vec::new());
        }

        let chain = self.cluster_chain(record.entry.first_cluster)?;
        let cluster_size = self.geometry.bytes_per_cluster as usize;

        let mut data = Vec::with_capacity(size);
        for cluster in chain {
            if data.len() >= size {
                break;
            }
            let cluster_data = self.read_cluster(cluster)?;
            let remaining = size - data.len();
            data.extend_from_slice(&cluster_data[..remaining.min(cluster_size)]);
        }

        if data.len() < size {
            return Err(FatError::ReadError(format!(
                "{:?}: chain holds {} bytes but the entry declares {}",
                path,
                data.len(),
                size
            )));
        }

        debug!("Read {} bytes from {:?}", data.len(), path);
        Ok(data)
    }

    /// Read the window `[offset, offset + len)` of a file, clamped to the
    /// file size. Clusters before the window are skipped, not read.
    pub(crate) fn read_range_impl(
        &mut self,
        path: &str,
        offset: u64,
        len: u64,
    ) -> FatResult<Vec<u8>> {
        let record = match self.resolve(path)? {
            Resolved::Root => {
                return Err(FatError::InvalidPath(format!("{:?} is a directory", path)))
            }
            Resolved::Entry { record, .. } => record,
        };

        if record.entry.is_directory() {
            return Err(FatError::InvalidPath(format!("{:?} is a directory", path)));
        }

        let size = record.entry.size as u64;
        if size == 0 || offset >= size || len == 0 || record.entry.first_cluster < 2 {
            return Ok(Vec::new());
        }

        let end = (offset + len).min(size);
        let cluster_size = self.geometry.bytes_per_cluster as u64;
        let first_index = (offset / cluster_size) as usize;
        let last_index = ((end - 1) / cluster_size) as usize;

        let chain = self.cluster_chain(record.entry.first_cluster)?;
        if last_index >= chain.len() {
            return Err(FatError::ReadError(format!(
                "{:?}: chain too short for range {}..{}",
                path, offset, end
            )));
        }

        let mut data = Vec::with_capacity((end - offset) as usize);
        for (index, &cluster) in chain[first_index..=last_index].iter().enumerate() {
            let cluster_start = (first_index + index) as u64 * cluster_size;
            let cluster_data = self.read_cluster(cluster)?;

            let from = offset.saturating_sub(cluster_start).min(cluster_size) as usize;
            let to = (end - cluster_start).min(cluster_size) as usize;
            data.extend_from_slice(&cluster_data[from..to]);
        }

        Ok(data)
    }

    /// Write `data` to `path`, creating the file or replacing its
    /// contents. The parent directory must already exist.
    pub(crate) fn write_file_impl(&mut self, path: &str, data: &[u8]) -> FatResult<()> {
        let (parent, leaf) = self.resolve_parent(path)?;

        let existing = self.find_in_dir(parent, &leaf)?;
        if let Some(record) = &existing {
            if record.entry.is_directory() {
                return Err(FatError::InvalidPath(format!(
                    "{:?} is a directory",
                    path
                )));
            }
        }

        let cluster_size = self.geometry.bytes_per_cluster as usize;
        let clusters_needed = data.len().div_ceil(cluster_size) as u32;

        // The old chain is released before allocating the new one so the
        // rewrite can reuse its clusters. If a later step fails the entry
        // keeps its metadata but the old contents are already gone; the
        // volume itself stays consistent.
        if let Some(record) = &existing {
            if record.entry.first_cluster >= 2 {
                self.free_chain(record.entry.first_cluster)?;
            }
        }

        let chain = self.allocate_chain(clusters_needed)?;
        let first_cluster = chain.first().copied().unwrap_or(0);

        for (index, &cluster) in chain.iter().enumerate() {
            let start = index * cluster_size;
            let end = (start + cluster_size).min(data.len());
            if let Err(e) = self.write_cluster(cluster, &data[start..end]) {
                let _ = self.free_chain(first_cluster);
                return Err(e);
            }
        }

        let (now_date, now_time) = now_fat_datetime();
        let result = match existing {
            Some(record) => {
                let mut entry = record.entry;
                entry.first_cluster = first_cluster;
                entry.size = data.len() as u32;
                entry.write_date = now_date;
                entry.write_time = now_time;
                entry.attributes = attributes::ARCHIVE;
                self.rewrite_entry(&record, &entry)
            }
            None => {
                let entry = ShortEntry {
                    name: [0x20; 11],
                    attributes: attributes::ARCHIVE,
                    creation_time: now_time,
                    creation_date: now_date,
                    access_date: now_date,
                    write_time: now_time,
                    write_date: now_date,
                    first_cluster,
                    size: data.len() as u32,
                };
                self.insert_entry(parent, &leaf, entry).map(|_| ())
            }
        };

        if let Err(e) = result {
            let _ = self.free_chain(first_cluster);
            return Err(e);
        }

        info!("Wrote {} bytes to {:?}", data.len(), path);
        Ok(())
    }
}
