//! Cache Module
//!
//! Engine wrapper, namespaced stores and the pieces they share.

mod clock;
mod engine;
mod lookup;
mod name;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Cache, SizePolicy};
pub use lookup::Lookup;
pub use name::{normalize, normalize_filename, SEPARATOR};
pub use stats::CacheStats;
pub use store::Store;

// == Public Constants ==
/// Serialized payload ceiling in bytes
pub const MAX_VALUE_SIZE: usize = 4 * 1024 * 1024; // 4 MB

// == TTL Shorthands (seconds) ==
pub const HOUR: u64 = 3_600;
pub const HALFDAY: u64 = 43_200;
pub const DAY: u64 = 86_400;
/// Eight days, so a weekly entry survives until the next weekly release.
pub const WEEK: u64 = 691_200;
