// Volume handle
// Mounts a pre-formatted image over a block device and exposes the public
// operation surface. Every operation records its error on the handle.

use super::directory::DirEntryRecord;
use super::geometry::{FatGeometry, BOOT_SECTOR_SIZE};
use super::path::Resolved;
use super::timestamps::decode_fat_datetime;
use super::FatVariant;
use chrono::NaiveDateTime;
use fatkit_core::{BlockDevice, FatError, FatResult, FileDevice};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Information about one file or directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Case-preserved long name when one exists, otherwise the 8.3 name.
    pub name: String,
    /// The 8.3 short name rendered with a dot, e.g. `THISIS~1.TXT`.
    pub short_name: String,
    pub is_directory: bool,
    pub size: u64,
    pub first_cluster: u32,
    pub attributes: u8,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
}

impl FileInfo {
    fn from_record(record: &DirEntryRecord) -> Self {
        let short_name = record.entry.display_name();
        Self {
            name: record
                .long_name
                .clone()
                .unwrap_or_else(|| short_name.clone()),
            short_name,
            is_directory: record.entry.is_directory(),
            size: record.entry.size as u64,
            first_cluster: record.entry.first_cluster,
            attributes: record.entry.attributes,
            created: decode_fat_datetime(record.entry.creation_date, record.entry.creation_time),
            modified: decode_fat_datetime(record.entry.write_date, record.entry.write_time),
        }
    }

    fn root() -> Self {
        Self {
            name: "/".to_string(),
            short_name: "/".to_string(),
            is_directory: true,
            size: 0,
            first_cluster: 0,
            attributes: super::dir_entry::attributes::DIRECTORY,
            created: None,
            modified: None,
        }
    }
}

/// Summary of a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub variant: FatVariant,
    pub bytes_per_cluster: u32,
    pub total_clusters: u32,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// A mounted FAT volume over a block device.
///
/// All operations are synchronous and atomic with respect to one another;
/// callers sharing a handle across threads must serialize access.
#[derive(Debug)]
pub struct FatVolume<D: BlockDevice> {
    pub(crate) device: D,
    pub(crate) geometry: FatGeometry,
    pub(crate) free_hint: u32,
    pub(crate) free_cluster_cache: Option<u32>,
    last_error: Option<FatError>,
}

impl FatVolume<FileDevice> {
    /// Mount a FAT image file, detecting the variant from the BPB.
    pub fn open_image<P: AsRef<Path>>(path: P) -> FatResult<Self> {
        Self::mount(FileDevice::open(path)?)
    }
}

impl<D: BlockDevice> FatVolume<D> {
    /// Mount a device, detecting the FAT variant from the cluster count.
    pub fn mount(device: D) -> FatResult<Self> {
        Self::mount_inner(device, None)
    }

    /// Mount a device, trusting `variant` instead of detecting it.
    pub fn mount_with_variant(device: D, variant: FatVariant) -> FatResult<Self> {
        Self::mount_inner(device, Some(variant))
    }

    fn mount_inner(mut device: D, variant: Option<FatVariant>) -> FatResult<Self> {
        let boot = device.read_at(0, BOOT_SECTOR_SIZE)?;
        let geometry = FatGeometry::parse(&boot, variant)?;

        info!(
            "Mounted {} volume: {} clusters of {} bytes",
            geometry.variant.label(),
            geometry.total_data_clusters,
            geometry.bytes_per_cluster
        );

        Ok(Self {
            device,
            geometry,
            free_hint: 2,
            free_cluster_cache: None,
            last_error: None,
        })
    }

    /// Give back the underlying device.
    pub fn into_device(self) -> D {
        self.device
    }

    pub fn variant(&self) -> FatVariant {
        self.geometry.variant
    }

    pub fn geometry(&self) -> &FatGeometry {
        &self.geometry
    }

    /// The error recorded by the most recent failed operation.
    pub fn last_error(&self) -> Option<&FatError> {
        self.last_error.as_ref()
    }

    /// Stable integer code of the recorded error; `0` when none.
    pub fn last_error_code(&self) -> u32 {
        self.last_error.as_ref().map_or(0, FatError::code)
    }

    fn finish<T>(&mut self, result: FatResult<T>) -> FatResult<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.clone());
        }
        result
    }

    /// List the root directory.
    pub fn list_root(&mut self) -> FatResult<Vec<FileInfo>> {
        let root = self.root_location();
        let result = self
            .read_dir_entries(root)
            .map(|records| records.iter().map(FileInfo::from_record).collect());
        self.finish(result)
    }

    /// List a directory by path.
    pub fn list(&mut self, path: &str) -> FatResult<Vec<FileInfo>> {
        let result = self.list_impl(path);
        self.finish(result)
    }

    fn list_impl(&mut self, path: &str) -> FatResult<Vec<FileInfo>> {
        let location = match self.resolve(path)? {
            Resolved::Root => self.root_location(),
            Resolved::Entry { record, .. } => {
                if !record.entry.is_directory() {
                    return Err(FatError::InvalidPath(format!(
                        "{:?} is not a directory",
                        path
                    )));
                }
                self.location_for_cluster(record.entry.first_cluster)
            }
        };

        let records = self.read_dir_entries(location)?;
        Ok(records.iter().map(FileInfo::from_record).collect())
    }

    /// Whether a path names an existing file or directory.
    pub fn exists(&mut self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Information about a file or directory.
    pub fn info(&mut self, path: &str) -> FatResult<FileInfo> {
        let result = match self.resolve(path) {
            Ok(Resolved::Root) => Ok(FileInfo::root()),
            Ok(Resolved::Entry { record, .. }) => Ok(FileInfo::from_record(&record)),
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    /// Read a whole file.
    pub fn read(&mut self, path: &str) -> FatResult<Vec<u8>> {
        let result = self.read_file_impl(path);
        self.finish(result)
    }

    /// Read `len` bytes of a file starting at `offset`, clamped to the
    /// file size.
    pub fn read_range(&mut self, path: &str, offset: u64, len: u64) -> FatResult<Vec<u8>> {
        let result = self.read_range_impl(path, offset, len);
        self.finish(result)
    }

    /// Write a file, creating it or replacing its contents.
    pub fn write(&mut self, path: &str, data: &[u8]) -> FatResult<()> {
        let result = self.write_file_impl(path, data);
        self.finish(result)
    }

    /// Delete a file or an empty directory.
    pub fn delete_file(&mut self, path: &str) -> FatResult<()> {
        let result = self.delete_file_impl(path);
        self.finish(result)
    }

    /// Create a directory.
    pub fn create_dir(&mut self, path: &str) -> FatResult<()> {
        let result = self.create_dir_impl(path);
        self.finish(result)
    }

    /// Delete a directory, recursively when asked.
    pub fn delete_dir(&mut self, path: &str, recursive: bool) -> FatResult<()> {
        let result = self.delete_dir_impl(path, recursive);
        self.finish(result)
    }

    /// Rename an entry, moving it when the parents differ.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> FatResult<()> {
        let result = self.rename_impl(old_path, new_path);
        self.finish(result)
    }

    /// Move an entry to a new parent directory.
    pub fn move_entry(&mut self, source_path: &str, dest_path: &str) -> FatResult<()> {
        let result = self.move_impl(source_path, dest_path);
        self.finish(result)
    }

    /// Capacity in bytes: two cluster indices below the data-region count,
    /// matching the free-space accounting range.
    pub fn total_space(&mut self) -> FatResult<u64> {
        Ok((self.geometry.total_data_clusters as u64).saturating_sub(2)
            * self.geometry.bytes_per_cluster as u64)
    }

    /// Free space in bytes, counted from zeroed FAT entries.
    pub fn free_space(&mut self) -> FatResult<u64> {
        let result = self
            .count_free_clusters()
            .map(|free| free as u64 * self.geometry.bytes_per_cluster as u64);
        self.finish(result)
    }

    /// Summary information for the volume.
    pub fn volume_info(&mut self) -> FatResult<VolumeInfo> {
        let free_bytes = self.free_space()?;
        let total_bytes = self.total_space()?;
        Ok(VolumeInfo {
            variant: self.geometry.variant,
            bytes_per_cluster: self.geometry.bytes_per_cluster,
            total_clusters: self.geometry.total_data_clusters,
            total_bytes,
            free_bytes,
        })
    }
}
