// Namespace operations
// Directory creation with dot entries, deletion (flat and recursive),
// rename within a directory, and moves across directories.

use super::dir_entry::{attributes, ShortEntry, ENTRY_SIZE};
use super::directory::DirLocation;
use super::path::{split_path, Resolved};
use super::timestamps::now_fat_datetime;
use super::volume::FatVolume;
use fatkit_core::{BlockDevice, FatError, FatResult};
use log::{debug, info};

impl<D: BlockDevice> FatVolume<D> {
    /// Create a directory. The parent must exist; the path itself must
    /// not. The new directory starts with `.` and `..` entries in one
    /// zeroed cluster.
    pub(crate) fn create_dir_impl(&mut self, path: &str) -> FatResult<()> {
        if self.resolve(path).is_ok() {
            // Occupied paths report InvalidPath, whatever occupies them
            return Err(FatError::InvalidPath(format!(
                "{:?} already exists",
                path
            )));
        }

        let (parent, leaf) = self.resolve_parent(path)?;

        let chain = self.allocate_chain(1)?;
        let dir_cluster = chain[0];

        let (now_date, now_time) = now_fat_datetime();
        let dot_template = ShortEntry {
            name: [0x20; 11],
            attributes: attributes::DIRECTORY,
            creation_time: now_time,
            creation_date: now_date,
            access_date: now_date,
            write_time: now_time,
            write_date: now_date,
            first_cluster: 0,
            size: 0,
        };

        let mut dot = dot_template;
        dot.name[0] = b'.';
        dot.first_cluster = dir_cluster;

        let mut dotdot = dot_template;
        dotdot.name[0] = b'.';
        dotdot.name[1] = b'.';
        dotdot.first_cluster = self.cluster_value_for(parent);

        let mut contents = vec![0u8; self.geometry.bytes_per_cluster as usize];
        contents[..ENTRY_SIZE].copy_from_slice(&dot.encode(self.geometry.variant));
        contents[ENTRY_SIZE..2 * ENTRY_SIZE]
            .copy_from_slice(&dotdot.encode(self.geometry.variant));

        if let Err(e) = self.write_cluster(dir_cluster, &contents) {
            let _ = self.free_chain(dir_cluster);
            return Err(e);
        }

        let mut entry = dot_template;
        entry.first_cluster = dir_cluster;
        if let Err(e) = self.insert_entry(parent, &leaf, entry) {
            let _ = self.free_chain(dir_cluster);
            return Err(e);
        }

        info!("Created directory {:?} at cluster {}", path, dir_cluster);
        Ok(())
    }

    /// Delete a file, or a directory that holds nothing but `.` and `..`.
    /// Frees the cluster chain and marks the entry and its LFN chain
    /// deleted.
    pub(crate) fn delete_file_impl(&mut self, path: &str) -> FatResult<()> {
        let record = match self.resolve(path)? {
            Resolved::Root => {
                return Err(FatError::InvalidPath(
                    "cannot delete the root directory".to_string(),
                ))
            }
            Resolved::Entry { record, .. } => record,
        };

        if record.entry.is_directory() {
            let contents =
                self.read_dir_entries(self.location_for_cluster(record.entry.first_cluster))?;
            if !contents.is_empty() {
                return Err(FatError::InvalidPath(format!(
                    "directory {:?} is not empty",
                    path
                )));
            }
        }

        if record.entry.first_cluster >= 2 {
            self.free_chain(record.entry.first_cluster)?;
        }
        self.mark_entry_deleted(&record)?;

        info!("Deleted {:?}", path);
        Ok(())
    }

    /// Delete a directory. Without `recursive` the directory must be
    /// empty; with it, the subtree is removed depth-first.
    pub(crate) fn delete_dir_impl(&mut self, path: &str, recursive: bool) -> FatResult<()> {
        let record = match self.resolve(path)? {
            Resolved::Root => {
                return Err(FatError::InvalidPath(
                    "cannot delete the root directory".to_string(),
                ))
            }
            Resolved::Entry { record, .. } => record,
        };

        if !record.entry.is_directory() {
            return Err(FatError::InvalidPath(format!(
                "{:?} is not a directory",
                path
            )));
        }

        if recursive {
            let children =
                self.read_dir_entries(self.location_for_cluster(record.entry.first_cluster))?;
            for child in children {
                let child_path = format!("{}/{}", path.trim_end_matches('/'), child.display_name());
                if child.entry.is_directory() {
                    self.delete_dir_impl(&child_path, true)?;
                } else {
                    self.delete_file_impl(&child_path)?;
                }
            }
        }

        // An empty directory deletes through the file path
        self.delete_file_impl(path)
    }

    /// Rename an entry. When source and destination parents differ this
    /// is a move; within one directory the entry is re-inserted under the
    /// new name, keeping its cluster, size, and creation stamps.
    pub(crate) fn rename_impl(&mut self, old_path: &str, new_path: &str) -> FatResult<()> {
        let old_components = split_path(old_path)?;
        let new_components = split_path(new_path)?;

        if old_components.is_empty() || new_components.is_empty() {
            return Err(FatError::InvalidPath(
                "cannot rename the root directory".to_string(),
            ));
        }

        if old_components[..old_components.len() - 1] != new_components[..new_components.len() - 1]
        {
            return self.move_impl(old_path, new_path);
        }

        let record = match self.resolve(old_path)? {
            Resolved::Root => {
                return Err(FatError::InvalidPath(
                    "cannot rename the root directory".to_string(),
                ))
            }
            Resolved::Entry { record, .. } => record,
        };

        if self.resolve(new_path).is_ok() {
            return Err(FatError::InvalidPath(format!(
                "{:?} already exists",
                new_path
            )));
        }

        let (parent, new_leaf) = self.resolve_parent(new_path)?;

        debug!("Renaming {:?} to {:?} in place", old_path, new_path);
        self.mark_entry_deleted(&record)?;
        if let Err(e) = self.insert_entry(parent, &new_leaf, record.entry) {
            // Best-effort restore under the old name
            let old_leaf = &old_components[old_components.len() - 1];
            let _ = self.insert_entry(parent, old_leaf, record.entry);
            return Err(e);
        }

        Ok(())
    }

    /// Move an entry to a new parent. Files travel through the write
    /// path; directories keep their first cluster and have their `..`
    /// entry re-pointed at the new parent.
    pub(crate) fn move_impl(&mut self, source_path: &str, dest_path: &str) -> FatResult<()> {
        let (record, source_parent) = match self.resolve(source_path)? {
            Resolved::Root => {
                return Err(FatError::InvalidPath(
                    "cannot move the root directory".to_string(),
                ))
            }
            Resolved::Entry { record, parent } => (record, parent),
        };

        if self.resolve(dest_path).is_ok() {
            return Err(FatError::InvalidPath(format!(
                "{:?} already exists",
                dest_path
            )));
        }

        let (dest_parent, dest_leaf) = self.resolve_parent(dest_path)?;

        if record.entry.is_directory() {
            info!(
                "Moving directory {:?} to {:?} (cluster {} travels)",
                source_path, dest_path, record.entry.first_cluster
            );

            self.insert_entry(dest_parent, &dest_leaf, record.entry)?;
            if let Err(e) = self.mark_entry_deleted(&record) {
                // Take the destination entry back out; the chain must
                // never have two live owners
                if let Ok(Some(inserted)) = self.find_in_dir(dest_parent, &dest_leaf) {
                    let _ = self.mark_entry_deleted(&inserted);
                }
                return Err(e);
            }

            if dest_parent != source_parent {
                self.repoint_dotdot(record.entry.first_cluster, dest_parent)?;
            }
        } else {
            info!("Moving file {:?} to {:?}", source_path, dest_path);

            let data = self.read_file_impl(source_path)?;
            self.write_file_impl(dest_path, &data)?;
            self.delete_file_impl(source_path)?;
        }

        Ok(())
    }

    /// Rewrite the `..` entry in the first cluster of a moved directory
    /// so it points at the new parent.
    fn repoint_dotdot(&mut self, dir_cluster: u32, new_parent: DirLocation) -> FatResult<()> {
        if dir_cluster < 2 {
            return Err(FatError::InvalidCluster(format!(
                "directory cluster {} has no dot entries",
                dir_cluster
            )));
        }

        let base = self.geometry.cluster_offset(dir_cluster)?;
        let slot_offset = base + ENTRY_SIZE as u64;
        let raw = self.device.read_at(slot_offset, ENTRY_SIZE)?;

        if raw[0..2] != *b".." {
            return Err(FatError::InvalidCluster(format!(
                "cluster {} does not start with dot entries",
                dir_cluster
            )));
        }

        let mut slot = [0u8; ENTRY_SIZE];
        slot.copy_from_slice(&raw);
        let mut entry = ShortEntry::decode(&slot, self.geometry.variant);
        entry.first_cluster = self.cluster_value_for(new_parent);
        self.device
            .write_at(slot_offset, &entry.encode(self.geometry.variant))
    }
}
