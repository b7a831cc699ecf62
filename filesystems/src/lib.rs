// fatkit-filesystems: a user-space implementation of the FAT filesystem
// family (FAT12, FAT16, FAT32) over arbitrary seekable block devices.
//
// The engine assumes a pre-formatted volume and preserves the on-disk
// invariants other FAT readers depend on: mirrored FAT copies, contiguous
// LFN chains with valid checksums, and terminated cluster chains.

pub mod fat;

pub use fat::{FatVariant, FatVolume, FileInfo, VolumeInfo};
pub use fatkit_core::{BlockDevice, FatError, FatResult, FileDevice, MemoryDevice};
