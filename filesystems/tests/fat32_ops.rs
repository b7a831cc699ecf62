// FAT32 behavior: cluster-chained root, 28-bit entries with preserved
// top bits, and mirrored FAT copies.

mod common;

use common::fat32_4mib;
use fatkit_filesystems::{FatVariant, FatVolume, MemoryDevice};

const FAT_START: usize = 32 * 512;
const FAT_BYTES: usize = 64 * 512;

fn fat32_entry(image: &[u8], cluster: usize) -> u32 {
    let idx = FAT_START + cluster * 4;
    u32::from_le_bytes([image[idx], image[idx + 1], image[idx + 2], image[idx + 3]])
}

#[test]
fn test_mount_with_explicit_variant() {
    let mut vol = FatVolume::mount_with_variant(fat32_4mib(), FatVariant::Fat32).unwrap();
    assert_eq!(vol.variant(), FatVariant::Fat32);
    assert_eq!(vol.geometry().root_cluster, 2);
    assert!(vol.list_root().unwrap().is_empty());
}

#[test]
fn test_files_in_cluster_chained_root() {
    let mut vol = FatVolume::mount_with_variant(fat32_4mib(), FatVariant::Fat32).unwrap();

    vol.write("/first.txt", b"fat32 file").unwrap();
    vol.write("/Second Long Name.txt", b"with lfn").unwrap();

    assert_eq!(vol.read("/first.txt").unwrap(), b"fat32 file");
    assert_eq!(vol.read("/Second Long Name.txt").unwrap(), b"with lfn");

    let mut names: Vec<String> = vol
        .list_root()
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Second Long Name.txt", "first.txt"]);
}

#[test]
fn test_root_directory_extends_its_chain() {
    let mut vol = FatVolume::mount_with_variant(fat32_4mib(), FatVariant::Fat32).unwrap();

    // 512-byte clusters hold 16 slots; these entries take 3 slots each
    for i in 0..30 {
        vol.write(&format!("/long named root file {:02}.txt", i), &[i as u8])
            .unwrap();
    }

    let listing = vol.list_root().unwrap();
    assert_eq!(listing.len(), 30);
    for i in 0..30 {
        let path = format!("/long named root file {:02}.txt", i);
        assert_eq!(vol.read(&path).unwrap(), &[i as u8]);
    }
}

#[test]
fn test_reserved_top_bits_survive_allocation() {
    // Paint the reserved nibble of the entry for cluster 3 in both copies
    let mut image = fat32_4mib().into_inner();
    for copy in 0..2 {
        let idx = FAT_START + copy * FAT_BYTES + 3 * 4;
        image[idx + 3] = 0xA0;
    }
    let device = MemoryDevice::from_vec(image);

    let mut vol = FatVolume::mount_with_variant(device, FatVariant::Fat32).unwrap();

    // The masked value still reads as free, so cluster 3 is allocated
    vol.write("/claims3.bin", &[0x55; 600]).unwrap();
    let info = vol.info("/claims3.bin").unwrap();
    assert_eq!(info.first_cluster, 3);

    let device = vol.into_device();
    let image = device.clone().into_inner();
    assert_eq!(fat32_entry(&image, 3) & 0xF000_0000, 0xA000_0000);
    assert_eq!(fat32_entry(&image, 3) & 0x0FFF_FFFF, 4);

    // Freeing keeps the reserved bits too
    let mut vol = FatVolume::mount_with_variant(device, FatVariant::Fat32).unwrap();
    vol.delete_file("/claims3.bin").unwrap();
    let image = vol.into_device().into_inner();
    assert_eq!(fat32_entry(&image, 3), 0xA000_0000);
}

#[test]
fn test_fat_copies_mirror_after_mutations() {
    let mut vol = FatVolume::mount_with_variant(fat32_4mib(), FatVariant::Fat32).unwrap();

    vol.create_dir("/nest").unwrap();
    vol.write("/nest/a.bin", &[1u8; 2000]).unwrap();
    vol.write("/top.bin", &[2u8; 700]).unwrap();
    vol.delete_file("/nest/a.bin").unwrap();
    vol.rename("/top.bin", "/renamed.bin").unwrap();

    let image = vol.into_device().into_inner();
    let first = &image[FAT_START..FAT_START + FAT_BYTES];
    let second = &image[FAT_START + FAT_BYTES..FAT_START + 2 * FAT_BYTES];
    assert_eq!(first, second);
}

#[test]
fn test_subdirectory_dotdot_names_fat32_root_cluster() {
    let mut vol = FatVolume::mount_with_variant(fat32_4mib(), FatVariant::Fat32).unwrap();

    vol.create_dir("/kid").unwrap();
    let kid_cluster = vol.info("/kid").unwrap().first_cluster;

    let offset = vol.geometry().cluster_offset(kid_cluster).unwrap() as usize;
    let image = vol.into_device().into_inner();

    let dotdot = &image[offset + 32..offset + 64];
    assert_eq!(&dotdot[0..2], b"..");
    // The root of a FAT32 volume is an ordinary cluster chain
    let low = u16::from_le_bytes([dotdot[26], dotdot[27]]) as u32;
    let high = u16::from_le_bytes([dotdot[20], dotdot[21]]) as u32;
    assert_eq!((high << 16) | low, 2);
}

#[test]
fn test_space_accounting() {
    let mut vol = FatVolume::mount_with_variant(fat32_4mib(), FatVariant::Fat32).unwrap();

    // 8032 data clusters; accounting spans indices [2, 8032), and the
    // root directory occupies one cluster
    assert_eq!(vol.total_space().unwrap(), 8030 * 512);
    let baseline = vol.free_space().unwrap();
    assert_eq!(baseline, (8030 - 1) * 512);

    vol.write("/four.bin", &[9u8; 1600]).unwrap();
    assert_eq!(vol.free_space().unwrap(), baseline - 4 * 512);
}
