//! Persistent key-value storage port.

use anyhow::Result;

/// Port for the local key-value medium holding the session.
///
/// The session authority is the only writer. Implementations only need to
/// serialize access within one process.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write several entries as one unit.
    ///
    /// No reader may observe a state in which only some of `entries` have
    /// been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be written. Nothing is written
    /// in that case.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<()>;

    /// Remove every key, including ones this crate never wrote.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be written.
    fn clear(&self) -> Result<()>;
}
