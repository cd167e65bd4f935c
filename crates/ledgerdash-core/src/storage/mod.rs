//! Key-value storage adapters.
//!
//! - `MemoryStore`: process-local map, used by tests and ephemeral sessions
//! - `FileStore`: a single JSON file in the user's cache directory

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;
