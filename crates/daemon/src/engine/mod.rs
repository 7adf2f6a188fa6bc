// Working copy engine: overlay state, delta application, divergence checks.

pub mod codec;
pub mod divergence;
pub mod error;
pub mod manager;
pub mod overlay;
pub mod working_copy;

pub use error::{ErrorKind, WorkingCopyError};
pub use manager::{ManagerOptions, PersistReport, WorkingCopyManager};
