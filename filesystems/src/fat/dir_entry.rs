// Short directory entry codec
// 32-byte 8.3 records: classification, decode/encode, and short-name
// generation with numeric-tail collision handling.

use super::FatVariant;
use fatkit_core::{FatError, FatResult};

pub const ENTRY_SIZE: usize = 32;
pub const ENTRY_END_OF_DIRECTORY: u8 = 0x00;
pub const ENTRY_DELETED: u8 = 0xE5;

// Field offsets within a 32-byte entry
const NAME_OFFSET: usize = 0x00;
const ATTR_OFFSET: usize = 0x0B;
const CREATE_TIME_OFFSET: usize = 0x0E;
const CREATE_DATE_OFFSET: usize = 0x10;
const ACCESS_DATE_OFFSET: usize = 0x12;
const CLUSTER_HIGH_OFFSET: usize = 0x14;
const WRITE_TIME_OFFSET: usize = 0x16;
const WRITE_DATE_OFFSET: usize = 0x18;
const CLUSTER_LOW_OFFSET: usize = 0x1A;
const SIZE_OFFSET: usize = 0x1C;

/// Directory entry attribute bits.
pub mod attributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_LABEL: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    pub const LONG_NAME: u8 = 0x0F;
    pub const LONG_NAME_MASK: u8 = 0x3F;
}

/// Classification of a raw 32-byte directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// 0x00 sentinel: this slot and everything after it is unused.
    EndOfDirectory,
    /// 0xE5 sentinel: the slot is free for reuse.
    Deleted,
    /// Part of a long file name chain.
    Lfn,
    /// Volume label record, skipped during enumeration.
    VolumeLabel,
    /// A `.` or `..` entry.
    Dot,
    /// A live short directory entry.
    Short,
}

/// Classify a raw slot without fully decoding it.
pub fn classify(raw: &[u8; ENTRY_SIZE]) -> EntryKind {
    match raw[NAME_OFFSET] {
        ENTRY_END_OF_DIRECTORY => EntryKind::EndOfDirectory,
        ENTRY_DELETED => EntryKind::Deleted,
        first => {
            let attr = raw[ATTR_OFFSET];
            if attr & attributes::LONG_NAME_MASK == attributes::LONG_NAME {
                EntryKind::Lfn
            } else if attr & attributes::VOLUME_LABEL != 0 {
                EntryKind::VolumeLabel
            } else if first == b'.' {
                EntryKind::Dot
            } else {
                EntryKind::Short
            }
        }
    }
}

/// A decoded short directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortEntry {
    pub name: [u8; 11],
    pub attributes: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub access_date: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster: u32,
    pub size: u32,
}

impl ShortEntry {
    /// Decode a raw slot. The first-cluster halves are combined only on
    /// FAT32; FAT12/16 volumes keep the high half at zero on disk.
    pub fn decode(raw: &[u8; ENTRY_SIZE], variant: FatVariant) -> Self {
        let read_u16 =
            |offset: usize| u16::from_le_bytes([raw[offset], raw[offset + 1]]);

        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[NAME_OFFSET..NAME_OFFSET + 11]);

        let cluster_low = read_u16(CLUSTER_LOW_OFFSET) as u32;
        let first_cluster = match variant {
            FatVariant::Fat32 => ((read_u16(CLUSTER_HIGH_OFFSET) as u32) << 16) | cluster_low,
            _ => cluster_low,
        };

        Self {
            name,
            attributes: raw[ATTR_OFFSET],
            creation_time: read_u16(CREATE_TIME_OFFSET),
            creation_date: read_u16(CREATE_DATE_OFFSET),
            access_date: read_u16(ACCESS_DATE_OFFSET),
            write_time: read_u16(WRITE_TIME_OFFSET),
            write_date: read_u16(WRITE_DATE_OFFSET),
            first_cluster,
            size: u32::from_le_bytes([
                raw[SIZE_OFFSET],
                raw[SIZE_OFFSET + 1],
                raw[SIZE_OFFSET + 2],
                raw[SIZE_OFFSET + 3],
            ]),
        }
    }

    /// Encode into a raw 32-byte slot.
    pub fn encode(&self, variant: FatVariant) -> [u8; ENTRY_SIZE] {
        let mut raw = [0u8; ENTRY_SIZE];
        raw[NAME_OFFSET..NAME_OFFSET + 11].copy_from_slice(&self.name);
        raw[ATTR_OFFSET] = self.attributes;
        raw[CREATE_TIME_OFFSET..CREATE_TIME_OFFSET + 2]
            .copy_from_slice(&self.creation_time.to_le_bytes());
        raw[CREATE_DATE_OFFSET..CREATE_DATE_OFFSET + 2]
            .copy_from_slice(&self.creation_date.to_le_bytes());
        raw[ACCESS_DATE_OFFSET..ACCESS_DATE_OFFSET + 2]
            .copy_from_slice(&self.access_date.to_le_bytes());
        raw[WRITE_TIME_OFFSET..WRITE_TIME_OFFSET + 2]
            .copy_from_slice(&self.write_time.to_le_bytes());
        raw[WRITE_DATE_OFFSET..WRITE_DATE_OFFSET + 2]
            .copy_from_slice(&self.write_date.to_le_bytes());

        let high = match variant {
            FatVariant::Fat32 => (self.first_cluster >> 16) as u16,
            _ => 0,
        };
        raw[CLUSTER_HIGH_OFFSET..CLUSTER_HIGH_OFFSET + 2].copy_from_slice(&high.to_le_bytes());
        raw[CLUSTER_LOW_OFFSET..CLUSTER_LOW_OFFSET + 2]
            .copy_from_slice(&(self.first_cluster as u16).to_le_bytes());
        raw[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&self.size.to_le_bytes());
        raw
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & attributes::DIRECTORY != 0
    }

    /// The display form of the 8.3 name, e.g. `README.TXT`.
    pub fn display_name(&self) -> String {
        parse_83_name(&self.name)
    }
}

/// Parse an 11-byte 8.3 name into display form.
pub fn parse_83_name(name: &[u8; 11]) -> String {
    let mut result = String::new();

    for (i, &byte) in name[0..8].iter().enumerate() {
        if byte == 0x20 || byte == 0x00 {
            break;
        }
        // 0x05 escapes a real 0xE5 first byte
        if i == 0 && byte == 0x05 {
            result.push(0xE5 as char);
        } else {
            result.push(byte as char);
        }
    }

    let ext_start = result.len();
    for &byte in &name[8..11] {
        if byte != 0x20 && byte != 0x00 {
            if result.len() == ext_start {
                result.push('.');
            }
            result.push(byte as char);
        }
    }

    result
}

/// Whether a byte is allowed in an 8.3 name.
fn is_valid_83_char(c: u8) -> bool {
    matches!(c,
        b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'#' | b'$' | b'%' | b'&'
        | b'\'' | b'(' | b')' | b'-' | b'@' | b'^' | b'_' | b'`'
        | b'{' | b'}' | b'~')
}

/// Generate a unique 8.3 name for `long_name` within a directory whose
/// live entries carry the 11-byte names in `existing`.
///
/// Returns the space-padded 11-byte form and whether the caller must also
/// write a long-name chain (true whenever the generated name is not
/// exactly the input).
pub fn generate_short_name(
    long_name: &str,
    existing: &[[u8; 11]],
) -> FatResult<([u8; 11], bool)> {
    if long_name.is_empty() {
        return Err(FatError::InvalidFileName("empty name".to_string()));
    }

    let upper = long_name.to_uppercase();

    // Split at the last dot; a leading dot belongs to the base
    let (base_part, ext_part) = match upper.rfind('.') {
        Some(pos) if pos > 0 => (&upper[..pos], &upper[pos + 1..]),
        _ => (upper.as_str(), ""),
    };

    let strip = |s: &str| -> (Vec<u8>, bool) {
        let mut kept = Vec::new();
        let mut lossy = false;
        for &b in s.as_bytes() {
            if is_valid_83_char(b) {
                kept.push(b);
            } else {
                lossy = true;
            }
        }
        (kept, lossy)
    };

    let base_input_len = base_part.chars().count();
    let (mut base, base_lossy) = strip(base_part);
    let (mut ext, _) = strip(ext_part);

    if base.is_empty() && ext.is_empty() {
        return Err(FatError::InvalidFileName(format!(
            "no representable characters in {:?}",
            long_name
        )));
    }
    if base.is_empty() {
        base.push(b'_');
    }

    // A base that was too long or lost characters is cut to six bytes and
    // always carries a ~N tail, so similar long names stay distinguishable
    let force_tail = base_input_len > 8 || base_lossy;
    if force_tail {
        base.truncate(6);
    } else {
        base.truncate(8);
    }
    ext.truncate(3);

    let pack = |base: &[u8], ext: &[u8]| -> [u8; 11] {
        let mut name = [0x20u8; 11];
        name[..base.len().min(8)].copy_from_slice(&base[..base.len().min(8)]);
        name[8..8 + ext.len().min(3)].copy_from_slice(&ext[..ext.len().min(3)]);
        name
    };

    let collides = |candidate: &[u8; 11]| existing.iter().any(|n| n == candidate);

    let plain = pack(&base, &ext);
    let chosen = if !force_tail && !collides(&plain) {
        plain
    } else {
        let mut found = None;
        for tail_num in 1..=999u32 {
            let tail = format!("~{}", tail_num);
            let keep = base.len().min(8 - tail.len());
            let mut tailed = base[..keep].to_vec();
            tailed.extend_from_slice(tail.as_bytes());
            let candidate = pack(&tailed, &ext);
            if !collides(&candidate) {
                found = Some(candidate);
                break;
            }
        }
        found.ok_or_else(|| {
            FatError::InvalidFileName(format!(
                "no unique short name available for {:?}",
                long_name
            ))
        })?
    };

    let needs_lfn = parse_83_name(&chosen) != long_name;
    Ok((chosen, needs_lfn))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_83_name() {
        assert_eq!(parse_83_name(b"README  TXT"), "README.TXT");
        assert_eq!(parse_83_name(b"FOLDER     "), "FOLDER");
        assert_eq!(parse_83_name(b"TEST    C  "), "TEST.C");
    }

    #[test]
    fn test_classify_sentinels() {
        let mut raw = [0u8; ENTRY_SIZE];
        assert_eq!(classify(&raw), EntryKind::EndOfDirectory);

        raw[0] = 0xE5;
        assert_eq!(classify(&raw), EntryKind::Deleted);

        raw[0] = b'A';
        raw[11] = attributes::LONG_NAME;
        assert_eq!(classify(&raw), EntryKind::Lfn);

        raw[11] = attributes::VOLUME_LABEL;
        assert_eq!(classify(&raw), EntryKind::VolumeLabel);

        raw[0] = b'.';
        raw[11] = attributes::DIRECTORY;
        assert_eq!(classify(&raw), EntryKind::Dot);

        raw[0] = b'A';
        raw[11] = attributes::ARCHIVE;
        assert_eq!(classify(&raw), EntryKind::Short);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let entry = ShortEntry {
            name: *b"HELLO   TXT",
            attributes: attributes::ARCHIVE,
            creation_time: 0x4A21,
            creation_date: 0x5A21,
            access_date: 0x5A21,
            write_time: 0x4B33,
            write_date: 0x5A22,
            first_cluster: 0x0012_0034,
            size: 1234,
        };

        let raw = entry.encode(FatVariant::Fat32);
        let decoded = ShortEntry::decode(&raw, FatVariant::Fat32);
        assert_eq!(decoded, entry);

        // FAT16 drops the high half on encode
        let raw16 = entry.encode(FatVariant::Fat16);
        let decoded16 = ShortEntry::decode(&raw16, FatVariant::Fat16);
        assert_eq!(decoded16.first_cluster, 0x0034);
    }

    #[test]
    fn test_short_name_simple() {
        let (name, needs_lfn) = generate_short_name("README.TXT", &[]).unwrap();
        assert_eq!(&name, b"README  TXT");
        assert!(!needs_lfn);
    }

    #[test]
    fn test_short_name_lowercase_needs_lfn() {
        let (name, needs_lfn) = generate_short_name("readme.txt", &[]).unwrap();
        assert_eq!(&name, b"README  TXT");
        assert!(needs_lfn);
    }

    #[test]
    fn test_short_name_truncated_base_gets_tail() {
        let (name, needs_lfn) =
            generate_short_name("This Is A Long Filename.TXT", &[]).unwrap();
        assert_eq!(&name, b"THISIS~1TXT");
        assert!(needs_lfn);
    }

    #[test]
    fn test_short_name_tail_sequence() {
        let existing = [*b"THISIS~1TXT", *b"THISIS~2TXT"];
        let (name, _) =
            generate_short_name("This Is Another Long Name.TXT", &existing).unwrap();
        assert_eq!(&name, b"THISIS~3TXT");
    }

    #[test]
    fn test_short_name_collision_on_plain_name() {
        let existing = [*b"README  TXT"];
        let (name, _) = generate_short_name("README.TXT", &existing).unwrap();
        assert_eq!(&name, b"README~1TXT");
    }

    #[test]
    fn test_short_name_strips_invalid_chars() {
        let (name, needs_lfn) = generate_short_name("a+b=c.txt", &[]).unwrap();
        // Stripped characters force the six-byte base and a tail
        assert_eq!(&name, b"ABC~1   TXT");
        assert!(needs_lfn);
    }

    #[test]
    fn test_short_name_rejects_unrepresentable() {
        assert!(generate_short_name("...", &[]).is_err());
        assert!(generate_short_name("", &[]).is_err());
    }
}
