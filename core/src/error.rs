use thiserror::Error;

/// Errors produced by FAT volume operations.
///
/// Every variant carries a human-readable context string and maps to a
/// stable integer identifier via [`FatError::code`]. Code `0` is reserved
/// for "no error" and is reported by volume handles whose last operation
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatError {
    #[error("Device not open: {0}")]
    DeviceNotOpen(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Invalid cluster: {0}")]
    InvalidCluster(String),

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Insufficient space: {0}")]
    InsufficientSpace(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}

impl FatError {
    /// Stable integer identifier for this error. `0` means "no error".
    pub fn code(&self) -> u32 {
        match self {
            FatError::DeviceNotOpen(_) => 1,
            FatError::InvalidPath(_) => 2,
            FatError::FileNotFound(_) => 3,
            FatError::DirectoryNotFound(_) => 4,
            FatError::InvalidCluster(_) => 5,
            FatError::ReadError(_) => 6,
            FatError::WriteError(_) => 7,
            FatError::NotImplemented(_) => 8,
            FatError::InsufficientSpace(_) => 9,
            FatError::InvalidFileName(_) => 10,
        }
    }

    /// Wrap an I/O error from a device read.
    pub fn read(e: std::io::Error) -> Self {
        FatError::ReadError(e.to_string())
    }

    /// Wrap an I/O error from a device write.
    pub fn write(e: std::io::Error) -> Self {
        FatError::WriteError(e.to_string())
    }
}

pub type FatResult<T> = Result<T, FatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(FatError::DeviceNotOpen(String::new()).code(), 1);
        assert_eq!(FatError::InvalidPath(String::new()).code(), 2);
        assert_eq!(FatError::FileNotFound(String::new()).code(), 3);
        assert_eq!(FatError::DirectoryNotFound(String::new()).code(), 4);
        assert_eq!(FatError::InvalidCluster(String::new()).code(), 5);
        assert_eq!(FatError::ReadError(String::new()).code(), 6);
        assert_eq!(FatError::WriteError(String::new()).code(), 7);
        assert_eq!(FatError::NotImplemented(String::new()).code(), 8);
        assert_eq!(FatError::InsufficientSpace(String::new()).code(), 9);
        assert_eq!(FatError::InvalidFileName(String::new()).code(), 10);
    }

    #[test]
    fn test_error_display_includes_context() {
        let err = FatError::FileNotFound("/missing.txt".to_string());
        assert_eq!(err.to_string(), "File not found: /missing.txt");
    }
}
