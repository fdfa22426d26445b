//! TTL cache subsystem.
//!
//! # Data Flow
//! ```text
//! lookup(key) → store.rs LRU index → Fresh | Stale | Miss
//! set(key)    → disk.rs (temp file + rename) → index swap under lock
//!             → capacity check (expired first, then LRU)
//! open()      → disk.rs load_all (drop expired/corrupt) → index, oldest first
//! sweeper.rs  → periodic sweep until shutdown
//! ```
//!
//! # Design Decisions
//! - Entries are immutable and shared as `Arc<CacheEntry>`; replacement swaps the Arc
//! - Disk failures degrade to misses and warnings, never errors
//! - Expiry time comes from an injected `Clock`

pub mod clock;
pub mod disk;
pub mod entry;
pub mod key;
pub mod store;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use key::cache_key;
pub use store::{CacheStats, CacheStore, Lookup};
pub use sweeper::CacheSweeper;
