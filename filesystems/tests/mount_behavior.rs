// Mounting: variant detection, validation of malformed images, remount
// stability, and image files on the host filesystem.

mod common;

use common::{fat12_1440k, fat16_16mib, fat32_4mib};
use fatkit_filesystems::{FatError, FatVariant, FatVolume, FileDevice, MemoryDevice};
use std::io::Write;

#[test]
fn test_variant_detection_from_cluster_count() {
    assert_eq!(
        FatVolume::mount(fat12_1440k()).unwrap().variant(),
        FatVariant::Fat12
    );
    assert_eq!(
        FatVolume::mount(fat16_16mib()).unwrap().variant(),
        FatVariant::Fat16
    );
}

#[test]
fn test_fat32_shape_needs_explicit_tag_when_small() {
    // Too few clusters for the detection rule; the FAT16 shape check
    // rejects the zero root entry count
    assert!(FatVolume::mount(fat32_4mib()).is_err());
    assert!(FatVolume::mount_with_variant(fat32_4mib(), FatVariant::Fat32).is_ok());
}

#[test]
fn test_rejects_garbage() {
    let err = FatVolume::mount(MemoryDevice::new(4096)).unwrap_err();
    assert!(matches!(err, FatError::InvalidCluster(_)));

    // Too small to even hold a boot sector
    let err = FatVolume::mount(MemoryDevice::new(100)).unwrap_err();
    assert!(matches!(err, FatError::ReadError(_)));
}

#[test]
fn test_rejects_broken_signature() {
    let mut image = fat16_16mib().into_inner();
    image[0x1FE] = 0x00;
    assert!(FatVolume::mount(MemoryDevice::from_vec(image)).is_err());
}

#[test]
fn test_remount_sees_identical_enumeration() {
    let mut vol = FatVolume::mount(fat16_16mib()).unwrap();

    vol.write("/alpha.txt", b"alpha contents").unwrap();
    vol.create_dir("/beta").unwrap();
    vol.write("/beta/gamma.bin", &[0xEE; 4000]).unwrap();
    vol.write("/A Long Gallery Name.jpg", b"jpg").unwrap();

    let collect = |vol: &mut FatVolume<MemoryDevice>| {
        let mut entries: Vec<(String, String, bool, u64)> = vol
            .list_root()
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.short_name, e.is_directory, e.size))
            .collect();
        entries.sort();
        entries
    };

    let before = collect(&mut vol);
    let free_before = vol.free_space().unwrap();

    let mut vol = FatVolume::mount(vol.into_device()).unwrap();
    assert_eq!(collect(&mut vol), before);
    assert_eq!(vol.free_space().unwrap(), free_before);
    assert_eq!(vol.read("/beta/gamma.bin").unwrap(), vec![0xEE; 4000]);
}

#[test]
fn test_image_file_on_disk() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&fat16_16mib().into_inner()).unwrap();
    tmp.flush().unwrap();

    {
        let mut vol = FatVolume::open_image(tmp.path()).unwrap();
        vol.write("/persisted.txt", b"across handles").unwrap();
        vol.into_device().flush().unwrap();
    }

    let mut vol = FatVolume::open_image(tmp.path()).unwrap();
    assert_eq!(vol.read("/persisted.txt").unwrap(), b"across handles");
}

#[test]
fn test_open_image_missing_file() {
    let err = FatVolume::open_image("/no/such/image.img").unwrap_err();
    assert!(matches!(err, FatError::DeviceNotOpen(_)));
}

#[test]
fn test_last_error_tracks_most_recent_failure() {
    let mut vol = FatVolume::mount(fat16_16mib()).unwrap();
    assert_eq!(vol.last_error_code(), 0);

    let _ = vol.read("/absent.txt");
    assert_eq!(vol.last_error_code(), 3);

    let _ = vol.create_dir("/x/y");
    assert_eq!(vol.last_error_code(), 4);
    assert!(matches!(
        vol.last_error(),
        Some(FatError::DirectoryNotFound(_))
    ));
}

#[test]
fn test_total_space_matches_fixture_math() {
    let mut vol = FatVolume::mount(fat16_16mib()).unwrap();
    // (32768 - 1 - 64 - 32) / 4 = 8167 data clusters of 2048 bytes;
    // accounting spans cluster indices [2, 8167)
    assert_eq!(vol.total_space().unwrap(), 8165 * 2048);
    assert_eq!(vol.free_space().unwrap(), 8165 * 2048);

    let info = vol.volume_info().unwrap();
    assert_eq!(info.variant, FatVariant::Fat16);
    assert_eq!(info.bytes_per_cluster, 2048);
    assert_eq!(info.total_clusters, 8167);
    assert_eq!(info.total_bytes, info.free_bytes);
}
