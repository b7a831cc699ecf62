pub mod device;
pub mod error;

pub use device::{BlockDevice, FileDevice, MemoryDevice};
pub use error::{FatError, FatResult};
