//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Coordinator → Sweeper
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C or command done → broadcast → sweeper exits → pools closed
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
