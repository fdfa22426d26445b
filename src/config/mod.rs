//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AccessConfig (validated, immutable)
//!     → handed to each subsystem constructor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AccessConfig, CacheConfig, ObservabilityConfig, PoolConfig, RateLimitConfig, RetryConfig,
    StatsConfig, TimeoutConfig, TtlPolicyConfig,
};
