// Volume geometry
// Parses the BIOS Parameter Block from sector 0 and derives the byte
// offsets of the FAT region, the fixed root directory, and the data region.

use super::FatVariant;
use fatkit_core::{FatError, FatResult};
use log::debug;

// Boot sector offsets
pub const BPB_BYTES_PER_SEC: usize = 0x0B;
pub const BPB_SEC_PER_CLUS: usize = 0x0D;
pub const BPB_RSVD_SEC_CNT: usize = 0x0E;
pub const BPB_NUM_FATS: usize = 0x10;
pub const BPB_ROOT_ENT_CNT: usize = 0x11;
pub const BPB_TOT_SEC16: usize = 0x13;
pub const BPB_FAT_SZ16: usize = 0x16;
pub const BPB_TOT_SEC32: usize = 0x20;
pub const BPB_FAT_SZ32: usize = 0x24;
pub const BPB_ROOT_CLUS: usize = 0x2C;

pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;
pub const BOOT_SECTOR_SIZE: usize = 512;

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Immutable geometry of a mounted volume, derived from the BPB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatGeometry {
    pub variant: FatVariant,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
    pub root_entry_count: u32,
    pub sectors_per_fat: u32,
    pub total_sectors: u32,
    /// First cluster of the root directory. Zero on FAT12/16, where the
    /// root is a fixed region rather than a chain.
    pub root_cluster: u32,
    pub fat_start_byte: u64,
    pub fat_size_bytes: u64,
    pub root_dir_start_byte: u64,
    pub root_dir_sectors: u32,
    pub data_start_byte: u64,
    /// Number of clusters in the data region. Valid cluster indices run
    /// from 2 to `total_data_clusters + 1` inclusive.
    pub total_data_clusters: u32,
}

impl FatGeometry {
    /// Parse and validate the boot sector, detecting the variant from the
    /// cluster count unless `forced` supplies one.
    pub fn parse(boot: &[u8], forced: Option<FatVariant>) -> FatResult<Self> {
        if boot.len() < BOOT_SECTOR_SIZE {
            return Err(FatError::InvalidCluster(format!(
                "boot sector too small: {} bytes",
                boot.len()
            )));
        }

        if boot[BOOT_SIGNATURE_OFFSET] != 0x55 || boot[BOOT_SIGNATURE_OFFSET + 1] != 0xAA {
            return Err(FatError::InvalidCluster(
                "missing 0x55AA boot signature".to_string(),
            ));
        }

        let bytes_per_sector = read_u16(boot, BPB_BYTES_PER_SEC) as u32;
        if ![512, 1024, 2048, 4096].contains(&bytes_per_sector) {
            return Err(FatError::InvalidCluster(format!(
                "unsupported bytes per sector: {}",
                bytes_per_sector
            )));
        }

        let sectors_per_cluster = boot[BPB_SEC_PER_CLUS] as u32;
        if sectors_per_cluster == 0
            || sectors_per_cluster > 128
            || !sectors_per_cluster.is_power_of_two()
        {
            return Err(FatError::InvalidCluster(format!(
                "invalid sectors per cluster: {}",
                sectors_per_cluster
            )));
        }

        let reserved_sectors = read_u16(boot, BPB_RSVD_SEC_CNT) as u32;
        if reserved_sectors == 0 {
            return Err(FatError::InvalidCluster(
                "reserved sector count is zero".to_string(),
            ));
        }

        let num_fats = boot[BPB_NUM_FATS] as u32;
        if num_fats == 0 {
            return Err(FatError::InvalidCluster("no FAT copies".to_string()));
        }

        let root_entry_count = read_u16(boot, BPB_ROOT_ENT_CNT) as u32;

        let total_sectors = {
            let total16 = read_u16(boot, BPB_TOT_SEC16) as u32;
            if total16 != 0 {
                total16
            } else {
                read_u32(boot, BPB_TOT_SEC32)
            }
        };

        let sectors_per_fat = {
            let sz16 = read_u16(boot, BPB_FAT_SZ16) as u32;
            if sz16 != 0 {
                sz16
            } else {
                read_u32(boot, BPB_FAT_SZ32)
            }
        };
        if sectors_per_fat == 0 {
            return Err(FatError::InvalidCluster(
                "sectors per FAT is zero".to_string(),
            ));
        }

        let root_dir_sectors =
            (root_entry_count * 32 + bytes_per_sector - 1) / bytes_per_sector;
        let data_start_sector =
            reserved_sectors + num_fats * sectors_per_fat + root_dir_sectors;
        if total_sectors <= data_start_sector {
            return Err(FatError::InvalidCluster(format!(
                "no data region: {} total sectors, data starts at sector {}",
                total_sectors, data_start_sector
            )));
        }

        let total_data_clusters = (total_sectors - data_start_sector) / sectors_per_cluster;
        let variant =
            forced.unwrap_or_else(|| FatVariant::from_cluster_count(total_data_clusters));

        let root_cluster = match variant {
            FatVariant::Fat32 => {
                if root_entry_count != 0 {
                    return Err(FatError::InvalidCluster(format!(
                        "FAT32 volume with nonzero root entry count {}",
                        root_entry_count
                    )));
                }
                let root_cluster = read_u32(boot, BPB_ROOT_CLUS);
                if root_cluster < 2 || root_cluster >= total_data_clusters + 2 {
                    return Err(FatError::InvalidCluster(format!(
                        "FAT32 root cluster {} outside data region",
                        root_cluster
                    )));
                }
                root_cluster
            }
            FatVariant::Fat12 | FatVariant::Fat16 => {
                if root_entry_count == 0 {
                    return Err(FatError::InvalidCluster(
                        "FAT12/16 volume with zero root entries".to_string(),
                    ));
                }
                if (root_entry_count * 32) % bytes_per_sector != 0 {
                    return Err(FatError::InvalidCluster(format!(
                        "root entry count {} does not fill whole sectors",
                        root_entry_count
                    )));
                }
                0
            }
        };

        let fat_start_byte = reserved_sectors as u64 * bytes_per_sector as u64;
        let fat_size_bytes = sectors_per_fat as u64 * bytes_per_sector as u64;
        let root_dir_start_byte = fat_start_byte + num_fats as u64 * fat_size_bytes;
        let data_start_byte =
            root_dir_start_byte + root_dir_sectors as u64 * bytes_per_sector as u64;

        let geometry = Self {
            variant,
            bytes_per_sector,
            sectors_per_cluster,
            bytes_per_cluster: bytes_per_sector * sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_entry_count,
            sectors_per_fat,
            total_sectors,
            root_cluster,
            fat_start_byte,
            fat_size_bytes,
            root_dir_start_byte,
            root_dir_sectors,
            data_start_byte,
            total_data_clusters,
        };

        debug!(
            "Parsed {} geometry: {} clusters of {} bytes, {} FAT copies",
            variant.label(),
            geometry.total_data_clusters,
            geometry.bytes_per_cluster,
            geometry.num_fats
        );

        Ok(geometry)
    }

    /// Whether `cluster` is a valid data-region cluster index.
    pub fn is_data_cluster(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster < self.total_data_clusters + 2
    }

    /// Highest valid cluster index.
    pub fn max_cluster(&self) -> u32 {
        self.total_data_clusters + 1
    }

    /// Absolute byte offset of a data cluster.
    pub fn cluster_offset(&self, cluster: u32) -> FatResult<u64> {
        if !self.is_data_cluster(cluster) {
            return Err(FatError::InvalidCluster(format!(
                "cluster {} outside data region (2..={})",
                cluster,
                self.max_cluster()
            )));
        }
        Ok(self.data_start_byte + (cluster - 2) as u64 * self.bytes_per_cluster as u64)
    }

    /// Absolute byte offset of the FAT entry for `cluster` inside the FAT
    /// copy `copy`. For FAT12 this is the first byte of the straddling
    /// 16-bit word.
    pub fn fat_entry_offset(&self, copy: u32, cluster: u32) -> u64 {
        let base = self.fat_start_byte + copy as u64 * self.fat_size_bytes;
        let entry = match self.variant {
            FatVariant::Fat12 => cluster as u64 + cluster as u64 / 2,
            FatVariant::Fat16 => cluster as u64 * 2,
            FatVariant::Fat32 => cluster as u64 * 4,
        };
        base + entry
    }
}
