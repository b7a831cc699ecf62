// Path resolution
// Normalizes slash-separated paths and walks them from the root, matching
// long and short names case-insensitively.

use super::directory::{DirEntryRecord, DirLocation};
use super::volume::FatVolume;
use fatkit_core::{BlockDevice, FatError, FatResult};
use log::debug;

/// A resolved path: either the root itself or an entry within a parent
/// directory.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    Root,
    Entry {
        record: DirEntryRecord,
        parent: DirLocation,
    },
}

impl Resolved {
    pub(crate) fn is_directory(&self) -> bool {
        match self {
            Resolved::Root => true,
            Resolved::Entry { record, .. } => record.entry.is_directory(),
        }
    }
}

/// Split a path into components. Backslashes are accepted as separators,
/// repeated separators collapse, and leading or trailing separators are
/// ignored. `.` and `..` components are rejected.
pub(crate) fn split_path(path: &str) -> FatResult<Vec<String>> {
    let normalized = path.replace('\\', "/");
    let mut components = Vec::new();

    for part in normalized.split('/') {
        if part.is_empty() {
            continue;
        }
        if part == "." || part == ".." {
            return Err(FatError::InvalidPath(format!(
                "relative component {:?} in {:?}",
                part, path
            )));
        }
        components.push(part.to_string());
    }

    Ok(components)
}

impl<D: BlockDevice> FatVolume<D> {
    /// Resolve a path to its directory entry, or to the root.
    ///
    /// A missing terminal component is `FileNotFound`; a missing or
    /// non-directory intermediate component is `DirectoryNotFound`.
    pub(crate) fn resolve(&mut self, path: &str) -> FatResult<Resolved> {
        let components = split_path(path)?;
        debug!("Resolving path {:?} ({} components)", path, components.len());

        if components.is_empty() {
            return Ok(Resolved::Root);
        }

        let leaf = &components[components.len() - 1];
        let intermediate = &components[..components.len() - 1];

        let mut current = self.root_location();
        for component in intermediate {
            let record = self.find_in_dir(current, component)?.ok_or_else(|| {
                FatError::DirectoryNotFound(format!("{:?} while resolving {:?}", component, path))
            })?;
            if !record.entry.is_directory() {
                return Err(FatError::DirectoryNotFound(format!(
                    "{:?} is not a directory in {:?}",
                    component, path
                )));
            }
            current = self.location_for_cluster(record.entry.first_cluster);
        }

        match self.find_in_dir(current, leaf)? {
            Some(record) => Ok(Resolved::Entry {
                record,
                parent: current,
            }),
            None => Err(FatError::FileNotFound(path.to_string())),
        }
    }

    /// Resolve the parent directory of a path, returning its location and
    /// the leaf name. The parent must exist and be a directory.
    pub(crate) fn resolve_parent(&mut self, path: &str) -> FatResult<(DirLocation, String)> {
        let mut components = split_path(path)?;
        let leaf = components
            .pop()
            .ok_or_else(|| FatError::InvalidPath("path names the root".to_string()))?;

        let mut current = self.root_location();
        for component in &components {
            let record = self.find_in_dir(current, component)?.ok_or_else(|| {
                FatError::DirectoryNotFound(format!("{:?} while resolving {:?}", component, path))
            })?;
            if !record.entry.is_directory() {
                return Err(FatError::DirectoryNotFound(format!(
                    "{:?} is not a directory in {:?}",
                    component, path
                )));
            }
            current = self.location_for_cluster(record.entry.first_cluster);
        }

        Ok((current, leaf))
    }
}
