// Directory traversal
// Iterates 32-byte slots across the fixed root region or a cluster chain,
// accumulating LFN chains, finding entries by name, locating free slot
// runs, and marking entries deleted.

use super::dir_entry::{
    classify, generate_short_name, EntryKind, ShortEntry, ENTRY_DELETED, ENTRY_SIZE,
};
use super::lfn::{encode_lfn_chain, lfn_checksum, LfnAccumulator, MAX_LFN_LENGTH};
use super::volume::FatVolume;
use fatkit_core::{BlockDevice, FatError, FatResult};
use log::trace;

/// Where a directory's slots live: the fixed FAT12/16 root region, or a
/// cluster chain (every FAT32 directory and every subdirectory).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    Root,
    Cluster(u32),
}

/// One contiguous range of directory slots on disk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DirExtent {
    pub offset: u64,
    pub len: usize,
    /// The backing cluster, absent for the fixed root region.
    pub cluster: Option<u32>,
}

/// A live short entry together with the disk slots that carry it.
#[derive(Debug, Clone)]
pub struct DirEntryRecord {
    pub entry: ShortEntry,
    /// Long name recovered from a valid LFN chain, if one precedes the
    /// entry.
    pub long_name: Option<String>,
    pub(crate) sde_offset: u64,
    pub(crate) lfn_offsets: Vec<u64>,
}

impl DirEntryRecord {
    /// The name this entry is known by: the long name when present,
    /// otherwise the 8.3 display form.
    pub fn display_name(&self) -> String {
        self.long_name
            .clone()
            .unwrap_or_else(|| self.entry.display_name())
    }

    /// Case-insensitive match against the long or the short name.
    pub fn matches(&self, name: &str) -> bool {
        if let Some(long) = &self.long_name {
            if long.eq_ignore_ascii_case(name) || long.to_lowercase() == name.to_lowercase() {
                return true;
            }
        }
        self.entry.display_name().eq_ignore_ascii_case(name)
    }
}

fn slot_at(buf: &[u8], index: usize) -> [u8; ENTRY_SIZE] {
    let mut raw = [0u8; ENTRY_SIZE];
    raw.copy_from_slice(&buf[index * ENTRY_SIZE..(index + 1) * ENTRY_SIZE]);
    raw
}

impl<D: BlockDevice> FatVolume<D> {
    /// The location of the volume's root directory.
    pub(crate) fn root_location(&self) -> DirLocation {
        if self.geometry.root_cluster >= 2 {
            DirLocation::Cluster(self.geometry.root_cluster)
        } else {
            DirLocation::Root
        }
    }

    /// The directory location reached through a directory entry. A stored
    /// first cluster below 2 refers to the root, which is how `..` points
    /// at a FAT12/16 root parent.
    pub(crate) fn location_for_cluster(&self, cluster: u32) -> DirLocation {
        if cluster < 2 {
            self.root_location()
        } else {
            DirLocation::Cluster(cluster)
        }
    }

    /// The cluster value stored in directory entries that refer to `dir`,
    /// such as a child's `..` entry.
    pub(crate) fn cluster_value_for(&self, dir: DirLocation) -> u32 {
        match dir {
            DirLocation::Root => 0,
            DirLocation::Cluster(c) => c,
        }
    }

    /// Materialize the slot extents of a directory in directory order.
    pub(crate) fn dir_extents(&mut self, dir: DirLocation) -> FatResult<Vec<DirExtent>> {
        match dir {
            DirLocation::Root => Ok(vec![DirExtent {
                offset: self.geometry.root_dir_start_byte,
                len: self.geometry.root_entry_count as usize * ENTRY_SIZE,
                cluster: None,
            }]),
            DirLocation::Cluster(start) => {
                let chain = self.cluster_chain(start)?;
                let mut extents = Vec::with_capacity(chain.len());
                for cluster in chain {
                    extents.push(DirExtent {
                        offset: self.geometry.cluster_offset(cluster)?,
                        len: self.geometry.bytes_per_cluster as usize,
                        cluster: Some(cluster),
                    });
                }
                Ok(extents)
            }
        }
    }

    /// Decode the live entries of a directory, pairing each short entry
    /// with the long name recovered from any valid preceding LFN chain.
    /// `.` and `..` entries and volume labels are not reported.
    pub(crate) fn read_dir_entries(
        &mut self,
        dir: DirLocation,
    ) -> FatResult<Vec<DirEntryRecord>> {
        let extents = self.dir_extents(dir)?;
        let variant = self.geometry.variant;

        let mut records = Vec::new();
        let mut lfn = LfnAccumulator::new();
        let mut lfn_offsets: Vec<u64> = Vec::new();

        'outer: for extent in &extents {
            let buf = self.device.read_at(extent.offset, extent.len)?;
            for index in 0..extent.len / ENTRY_SIZE {
                let raw = slot_at(&buf, index);
                let offset = extent.offset + (index * ENTRY_SIZE) as u64;

                match classify(&raw) {
                    EntryKind::EndOfDirectory => break 'outer,
                    EntryKind::Deleted | EntryKind::VolumeLabel | EntryKind::Dot => {
                        lfn.reset();
                        lfn_offsets.clear();
                    }
                    EntryKind::Lfn => {
                        if lfn.push(&raw) {
                            lfn_offsets.clear();
                        }
                        lfn_offsets.push(offset);
                    }
                    EntryKind::Short => {
                        let entry = ShortEntry::decode(&raw, variant);
                        let long_name = lfn.take(&entry.name);
                        // Slots of an invalid chain stay untouched; they
                        // do not belong to this entry
                        let offsets = if long_name.is_some() {
                            std::mem::take(&mut lfn_offsets)
                        } else {
                            lfn_offsets.clear();
                            Vec::new()
                        };
                        records.push(DirEntryRecord {
                            entry,
                            long_name,
                            sde_offset: offset,
                            lfn_offsets: offsets,
                        });
                    }
                }
            }
        }

        trace!("Read {} live entries", records.len());
        Ok(records)
    }

    /// Find a live entry by name, matching long and short names
    /// case-insensitively.
    pub(crate) fn find_in_dir(
        &mut self,
        dir: DirLocation,
        name: &str,
    ) -> FatResult<Option<DirEntryRecord>> {
        let records = self.read_dir_entries(dir)?;
        Ok(records.into_iter().find(|r| r.matches(name)))
    }

    /// Find `needed` consecutive free slots, returning their byte offsets
    /// in directory order. Free means deleted or past the 0x00 sentinel.
    /// Cluster-chained directories grow by linking zeroed clusters when no
    /// run exists; the fixed root cannot grow.
    pub(crate) fn find_slot_run(
        &mut self,
        dir: DirLocation,
        needed: usize,
    ) -> FatResult<Vec<u64>> {
        let extents = self.dir_extents(dir)?;

        let mut run: Vec<u64> = Vec::new();
        let mut past_terminator = false;
        for extent in &extents {
            let buf = self.device.read_at(extent.offset, extent.len)?;
            for index in 0..extent.len / ENTRY_SIZE {
                let first = buf[index * ENTRY_SIZE];
                if past_terminator || first == 0x00 || first == ENTRY_DELETED {
                    if first == 0x00 {
                        past_terminator = true;
                    }
                    run.push(extent.offset + (index * ENTRY_SIZE) as u64);
                    if run.len() == needed {
                        return Ok(run);
                    }
                } else {
                    run.clear();
                }
            }
        }

        match dir {
            DirLocation::Root => Err(FatError::InsufficientSpace(format!(
                "root directory has no run of {} free slots",
                needed
            ))),
            DirLocation::Cluster(_) => self.extend_directory(&extents, run, needed),
        }
    }

    /// Grow a cluster-chained directory until the pending `run` reaches
    /// `needed` slots. New clusters are zeroed before they are linked, so
    /// a failure part-way leaves the directory consistent; on error the
    /// chain is restored to its original length.
    fn extend_directory(
        &mut self,
        extents: &[DirExtent],
        mut run: Vec<u64>,
        needed: usize,
    ) -> FatResult<Vec<u64>> {
        let original_last = extents
            .last()
            .and_then(|e| e.cluster)
            .ok_or_else(|| FatError::InvalidCluster("directory chain is empty".to_string()))?;

        let slots_per_cluster = self.geometry.bytes_per_cluster as usize / ENTRY_SIZE;
        let eoc = self.geometry.variant.eoc();
        let mut appended: Vec<u32> = Vec::new();
        let mut last = original_last;

        let unwind = |vol: &mut Self, appended: &[u32]| {
            let _ = vol.write_fat_entry(original_last, eoc);
            for &cluster in appended {
                let _ = vol.write_fat_entry(cluster, 0);
            }
        };

        while run.len() < needed {
            let new_cluster = match self.allocate_chain(1) {
                Ok(chain) => chain[0],
                Err(e) => {
                    unwind(self, &appended);
                    return Err(e);
                }
            };

            let zeroed = vec![0u8; self.geometry.bytes_per_cluster as usize];
            if let Err(e) = self.write_cluster(new_cluster, &zeroed) {
                let _ = self.write_fat_entry(new_cluster, 0);
                unwind(self, &appended);
                return Err(e);
            }

            if let Err(e) = self.write_fat_entry(last, new_cluster) {
                let _ = self.write_fat_entry(new_cluster, 0);
                unwind(self, &appended);
                return Err(e);
            }

            appended.push(new_cluster);
            let base = self.geometry.cluster_offset(new_cluster)?;
            for index in 0..slots_per_cluster {
                if run.len() == needed {
                    break;
                }
                run.push(base + (index * ENTRY_SIZE) as u64);
            }
            last = new_cluster;
        }

        Ok(run)
    }

    /// Mark an entry and its LFN chain deleted by writing 0xE5 sentinels.
    pub(crate) fn mark_entry_deleted(&mut self, record: &DirEntryRecord) -> FatResult<()> {
        for &offset in &record.lfn_offsets {
            self.device.write_at(offset, &[ENTRY_DELETED])?;
        }
        self.device.write_at(record.sde_offset, &[ENTRY_DELETED])?;
        Ok(())
    }

    /// Insert a new entry into a directory under `long_name`.
    ///
    /// Generates a unique short name in the directory, writes the LFN
    /// chain whenever the long name is not exactly the short name, and
    /// places both into the first sufficient slot run. Returns the entry
    /// as written, with its generated 11-byte name.
    pub(crate) fn insert_entry(
        &mut self,
        dir: DirLocation,
        long_name: &str,
        mut entry: ShortEntry,
    ) -> FatResult<ShortEntry> {
        if long_name.encode_utf16().count() > MAX_LFN_LENGTH {
            return Err(FatError::InvalidFileName(format!(
                "name longer than {} characters",
                MAX_LFN_LENGTH
            )));
        }

        let existing = self.read_dir_entries(dir)?;
        let existing_names: Vec<[u8; 11]> = existing.iter().map(|r| r.entry.name).collect();
        let (short_name, needs_lfn) = generate_short_name(long_name, &existing_names)?;
        entry.name = short_name;

        let lfn_entries = if needs_lfn {
            encode_lfn_chain(long_name, lfn_checksum(&short_name))
        } else {
            Vec::new()
        };

        let slots = self.find_slot_run(dir, lfn_entries.len() + 1)?;

        for (index, raw) in lfn_entries.iter().enumerate() {
            if let Err(e) = self.device.write_at(slots[index], raw) {
                // Unwind the partial chain so no orphaned LFN survives
                for &written in &slots[..index] {
                    let _ = self.device.write_at(written, &[ENTRY_DELETED]);
                }
                return Err(e);
            }
        }

        let sde_slot = slots[lfn_entries.len()];
        let raw = entry.encode(self.geometry.variant);
        if let Err(e) = self.device.write_at(sde_slot, &raw) {
            for &written in &slots[..lfn_entries.len()] {
                let _ = self.device.write_at(written, &[ENTRY_DELETED]);
            }
            return Err(e);
        }

        trace!(
            "Inserted entry {:?} as {}",
            long_name,
            entry.display_name()
        );
        Ok(entry)
    }

    /// Rewrite an existing entry's short record in place.
    pub(crate) fn rewrite_entry(
        &mut self,
        record: &DirEntryRecord,
        entry: &ShortEntry,
    ) -> FatResult<()> {
        let raw = entry.encode(self.geometry.variant);
        self.device.write_at(record.sde_offset, &raw)
    }
}
