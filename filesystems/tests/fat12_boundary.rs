// FAT12 entry packing: 12-bit entries straddle bytes, so neighboring
// entries share storage. Exercised on a 1.44 MiB floppy fixture.

mod common;

use common::fat12_1440k;
use fatkit_filesystems::{FatVariant, FatVolume};

const FAT_START: usize = 512; // one reserved sector

fn fat12_entry(image: &[u8], cluster: usize) -> u16 {
    let idx = FAT_START + cluster + cluster / 2;
    let word = u16::from_le_bytes([image[idx], image[idx + 1]]);
    if cluster & 1 == 1 {
        word >> 4
    } else {
        word & 0x0FFF
    }
}

#[test]
fn test_mounts_as_fat12() {
    let mut vol = FatVolume::mount(fat12_1440k()).unwrap();
    assert_eq!(vol.variant(), FatVariant::Fat12);
    assert_eq!(vol.geometry().total_data_clusters, 2847);
    assert_eq!(vol.total_space().unwrap(), 2845 * 512);
}

#[test]
fn test_write_read_round_trip() {
    let mut vol = FatVolume::mount(fat12_1440k()).unwrap();

    let data: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
    vol.write("/floppy.bin", &data).unwrap();
    assert_eq!(vol.read("/floppy.bin").unwrap(), data);
}

#[test]
fn test_three_cluster_chain_at_odd_boundary() {
    let mut vol = FatVolume::mount(fat12_1440k()).unwrap();

    // Occupy cluster 2 so the next file starts at the odd cluster 3
    vol.write("/pad.bin", &[0u8; 100]).unwrap();

    let data: Vec<u8> = (0..1300u32).map(|i| (i % 256) as u8).collect();
    vol.write("/three.bin", &data).unwrap();

    let info = vol.info("/three.bin").unwrap();
    assert_eq!(info.first_cluster, 3);
    assert_eq!(vol.read("/three.bin").unwrap(), data);

    // Links decode correctly across the straddled bytes: 3 -> 4 -> 5 -> EOC
    let free_before = vol.free_space().unwrap();
    let device = vol.into_device();
    let image = device.clone().into_inner();
    assert_eq!(fat12_entry(&image, 3), 4);
    assert_eq!(fat12_entry(&image, 4), 5);
    assert!(fat12_entry(&image, 5) >= 0x0FF8);
    // The even neighbor sharing byte storage with entry 3 is intact
    assert!(fat12_entry(&image, 2) >= 0x0FF8);
    let mut vol = FatVolume::mount(device).unwrap();

    // Freeing the chain zeroes exactly entries 3, 4, 5
    vol.delete_file("/three.bin").unwrap();
    assert_eq!(vol.free_space().unwrap(), free_before + 3 * 512);

    let image = vol.into_device().into_inner();
    assert_eq!(fat12_entry(&image, 3), 0);
    assert_eq!(fat12_entry(&image, 4), 0);
    assert_eq!(fat12_entry(&image, 5), 0);
    // The shared byte between entries 2 and 3 still carries entry 2's EOC
    assert!(fat12_entry(&image, 2) >= 0x0FF8);
}

#[test]
fn test_fat_copies_stay_identical() {
    let mut vol = FatVolume::mount(fat12_1440k()).unwrap();

    vol.write("/a.bin", &[1u8; 700]).unwrap();
    vol.write("/b.bin", &[2u8; 1500]).unwrap();
    vol.delete_file("/a.bin").unwrap();

    let image = vol.into_device().into_inner();
    let fat_bytes = 9 * 512;
    let first = &image[FAT_START..FAT_START + fat_bytes];
    let second = &image[FAT_START + fat_bytes..FAT_START + 2 * fat_bytes];
    assert_eq!(first, second);
}

#[test]
fn test_directories_on_fat12() {
    let mut vol = FatVolume::mount(fat12_1440k()).unwrap();
    let baseline = vol.free_space().unwrap();

    vol.create_dir("/sys").unwrap();
    vol.write("/sys/config.ini", b"[core]\n").unwrap();
    assert_eq!(vol.read("/sys/config.ini").unwrap(), b"[core]\n");

    vol.delete_dir("/sys", true).unwrap();
    assert_eq!(vol.free_space().unwrap(), baseline);
}
