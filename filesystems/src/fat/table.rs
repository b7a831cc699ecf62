// FAT table access
// Entry read/write for all three entry widths, mirrored across every FAT
// copy, plus chain traversal, allocation, and release.

use super::volume::FatVolume;
use super::FatVariant;
use fatkit_core::{BlockDevice, FatError, FatResult};
use log::{debug, trace};

impl<D: BlockDevice> FatVolume<D> {
    /// Read the raw FAT entry for `cluster`, masked to the variant width.
    pub(crate) fn read_fat_entry(&mut self, cluster: u32) -> FatResult<u32> {
        if cluster > self.geometry.max_cluster() {
            return Err(FatError::InvalidCluster(format!(
                "FAT entry index {} out of range",
                cluster
            )));
        }

        let offset = self.geometry.fat_entry_offset(0, cluster);
        match self.geometry.variant {
            FatVariant::Fat12 => {
                // 12-bit entries straddle bytes; the entry for an odd
                // cluster occupies the high 12 bits of the spanning word
                let raw = self.device.read_at(offset, 2)?;
                let word = u16::from_le_bytes([raw[0], raw[1]]);
                if cluster & 1 == 1 {
                    Ok((word >> 4) as u32)
                } else {
                    Ok((word & 0x0FFF) as u32)
                }
            }
            FatVariant::Fat16 => {
                let raw = self.device.read_at(offset, 2)?;
                Ok(u16::from_le_bytes([raw[0], raw[1]]) as u32)
            }
            FatVariant::Fat32 => {
                let raw = self.device.read_at(offset, 4)?;
                Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) & 0x0FFF_FFFF)
            }
        }
    }

    /// Write the FAT entry for `cluster` into every FAT copy.
    ///
    /// FAT12 writes read-modify-write the straddling 16-bit word; FAT32
    /// writes preserve the reserved top 4 bits of the 32-bit slot.
    pub(crate) fn write_fat_entry(&mut self, cluster: u32, value: u32) -> FatResult<()> {
        if cluster < 2 || cluster > self.geometry.max_cluster() {
            return Err(FatError::InvalidCluster(format!(
                "refusing to write FAT entry {}",
                cluster
            )));
        }

        self.free_cluster_cache = None;

        for copy in 0..self.geometry.num_fats {
            let offset = self.geometry.fat_entry_offset(copy, cluster);
            match self.geometry.variant {
                FatVariant::Fat12 => {
                    let raw = self.device.read_at(offset, 2)?;
                    let mut word = u16::from_le_bytes([raw[0], raw[1]]);
                    if cluster & 1 == 1 {
                        word = (word & 0x000F) | (((value as u16) & 0x0FFF) << 4);
                    } else {
                        word = (word & 0xF000) | ((value as u16) & 0x0FFF);
                    }
                    self.device.write_at(offset, &word.to_le_bytes())?;
                }
                FatVariant::Fat16 => {
                    self.device.write_at(offset, &(value as u16).to_le_bytes())?;
                }
                FatVariant::Fat32 => {
                    let raw = self.device.read_at(offset, 4)?;
                    let old = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                    let new = (old & 0xF000_0000) | (value & 0x0FFF_FFFF);
                    self.device.write_at(offset, &new.to_le_bytes())?;
                }
            }
        }

        Ok(())
    }

    /// The cluster following `cluster` in its chain, or `None` at end of
    /// chain. Free, reserved, and out-of-range links are corruption.
    pub(crate) fn next_in_chain(&mut self, cluster: u32) -> FatResult<Option<u32>> {
        let link = self.read_fat_entry(cluster)?;

        if self.geometry.variant.is_end_of_chain(link) {
            return Ok(None);
        }
        if !self.geometry.is_data_cluster(link) {
            return Err(FatError::InvalidCluster(format!(
                "cluster {} links to invalid cluster {}",
                cluster, link
            )));
        }
        Ok(Some(link))
    }

    /// Follow a chain from `start`, returning the clusters in order.
    ///
    /// Traversal is bounded by the data-region cluster count plus one, so
    /// a cycle is reported instead of looping.
    pub(crate) fn cluster_chain(&mut self, start: u32) -> FatResult<Vec<u32>> {
        if !self.geometry.is_data_cluster(start) {
            return Err(FatError::InvalidCluster(format!(
                "chain starts at invalid cluster {}",
                start
            )));
        }

        let mut chain = Vec::new();
        let mut current = start;
        loop {
            chain.push(current);
            if chain.len() as u32 > self.geometry.total_data_clusters {
                return Err(FatError::InvalidCluster(format!(
                    "cluster chain from {} exceeds volume size, assuming a cycle",
                    start
                )));
            }
            match self.next_in_chain(current)? {
                Some(next) => current = next,
                None => break,
            }
        }

        Ok(chain)
    }

    /// Find a free cluster, starting at the search hint and wrapping once.
    pub(crate) fn find_free_cluster(&mut self) -> FatResult<u32> {
        let max = self.geometry.max_cluster();
        let hint = self.free_hint.clamp(2, max);

        for cluster in (hint..=max).chain(2..hint) {
            if self.read_fat_entry(cluster)? == 0 {
                self.free_hint = if cluster == max { 2 } else { cluster + 1 };
                return Ok(cluster);
            }
        }

        Err(FatError::InsufficientSpace(
            "no free clusters available".to_string(),
        ))
    }

    /// Allocate `count` clusters linked head to tail and terminated with
    /// an end-of-chain marker. On any failure every link already written
    /// is released, leaving the free set untouched.
    pub(crate) fn allocate_chain(&mut self, count: u32) -> FatResult<Vec<u32>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let eoc = self.geometry.variant.eoc();
        let mut chain: Vec<u32> = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let cluster = match self.find_free_cluster() {
                Ok(c) => c,
                Err(e) => {
                    self.release_clusters(&chain);
                    return Err(e);
                }
            };

            // Claim the cluster before linking it so the free scan cannot
            // hand it out twice
            if let Err(e) = self.write_fat_entry(cluster, eoc) {
                self.release_clusters(&chain);
                return Err(e);
            }

            if let Some(&prev) = chain.last() {
                if let Err(e) = self.write_fat_entry(prev, cluster) {
                    let _ = self.write_fat_entry(cluster, 0);
                    self.release_clusters(&chain);
                    return Err(e);
                }
            }

            chain.push(cluster);
        }

        trace!("Allocated {} cluster chain starting at {}", count, chain[0]);
        Ok(chain)
    }

    /// Best-effort release used by allocation rollback.
    fn release_clusters(&mut self, clusters: &[u32]) {
        for &cluster in clusters {
            let _ = self.write_fat_entry(cluster, 0);
        }
    }

    /// Walk the chain at `head` and zero every link. A zero head is a
    /// no-op; traversal stops at any already-free or out-of-range link.
    pub(crate) fn free_chain(&mut self, head: u32) -> FatResult<()> {
        if head == 0 {
            return Ok(());
        }
        if !self.geometry.is_data_cluster(head) {
            return Err(FatError::InvalidCluster(format!(
                "cannot free chain at cluster {}",
                head
            )));
        }

        let mut current = head;
        let mut freed = 0u32;
        loop {
            if freed > self.geometry.total_data_clusters {
                return Err(FatError::InvalidCluster(format!(
                    "chain from {} exceeds volume size, assuming a cycle",
                    head
                )));
            }

            let link = self.read_fat_entry(current)?;
            self.write_fat_entry(current, 0)?;
            freed += 1;

            if link == 0
                || self.geometry.variant.is_end_of_chain(link)
                || !self.geometry.is_data_cluster(link)
            {
                break;
            }
            current = link;
        }

        debug!("Freed {} clusters from chain at {}", freed, head);
        Ok(())
    }

    /// Count free clusters by scanning one FAT copy in memory, over the
    /// accounting range `[2, total_data_clusters)`. The count is cached
    /// until the next FAT mutation.
    pub(crate) fn count_free_clusters(&mut self) -> FatResult<u32> {
        if let Some(count) = self.free_cluster_cache {
            return Ok(count);
        }

        let fat = self
            .device
            .read_at(self.geometry.fat_start_byte, self.geometry.fat_size_bytes as usize)?;

        let mut free = 0u32;
        for cluster in 2..self.geometry.total_data_clusters {
            let value = match self.geometry.variant {
                FatVariant::Fat12 => {
                    let idx = cluster as usize + cluster as usize / 2;
                    if idx + 1 >= fat.len() {
                        break;
                    }
                    let word = u16::from_le_bytes([fat[idx], fat[idx + 1]]);
                    if cluster & 1 == 1 {
                        (word >> 4) as u32
                    } else {
                        (word & 0x0FFF) as u32
                    }
                }
                FatVariant::Fat16 => {
                    let idx = cluster as usize * 2;
                    if idx + 1 >= fat.len() {
                        break;
                    }
                    u16::from_le_bytes([fat[idx], fat[idx + 1]]) as u32
                }
                FatVariant::Fat32 => {
                    let idx = cluster as usize * 4;
                    if idx + 3 >= fat.len() {
                        break;
                    }
                    u32::from_le_bytes([fat[idx], fat[idx + 1], fat[idx + 2], fat[idx + 3]])
                        & 0x0FFF_FFFF
                }
            };
            if value == 0 {
                free += 1;
            }
        }

        self.free_cluster_cache = Some(free);
        Ok(free)
    }

    /// Read one data cluster.
    pub(crate) fn read_cluster(&mut self, cluster: u32) -> FatResult<Vec<u8>> {
        let offset = self.geometry.cluster_offset(cluster)?;
        self.device
            .read_at(offset, self.geometry.bytes_per_cluster as usize)
    }

    /// Write `data` into a cluster, zero-padding to the cluster boundary.
    pub(crate) fn write_cluster(&mut self, cluster: u32, data: &[u8]) -> FatResult<()> {
        let cluster_size = self.geometry.bytes_per_cluster as usize;
        if data.len() > cluster_size {
            return Err(FatError::WriteError(format!(
                "{} bytes exceed cluster size {}",
                data.len(),
                cluster_size
            )));
        }

        let offset = self.geometry.cluster_offset(cluster)?;
        self.device.write_at(offset, data)?;

        if data.len() < cluster_size {
            let padding = vec![0u8; cluster_size - data.len()];
            self.device.write_at(offset + data.len() as u64, &padding)?;
        }

        Ok(())
    }
}
