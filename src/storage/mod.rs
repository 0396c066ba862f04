//! On-disk ownership of the index directory

pub mod lockfile;

pub use lockfile::{LockError, ProcessLock};
