//! Ports the session layer depends on.
//!
//! The core never touches the filesystem, the wall clock or the screen
//! directly. It goes through these traits so the same code runs against
//! real adapters in the CLI and against fakes in tests.

pub mod clock;
pub mod navigation;
pub mod notice;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use navigation::{Navigator, Route};
pub use notice::{Notice, Notifier};
pub use storage::KeyValueStore;
