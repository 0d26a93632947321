//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → owned by BridgeSystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the bridge starts
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{BridgeConfig, ChannelConfig, HttpConfig, ObservabilityConfig, TimeoutConfig};
pub use validation::{validate_config, ValidationError};
