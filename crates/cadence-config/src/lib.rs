//! cadence-config
//!
//! Where the registry, scripts, and lock files live, which activation backend
//! runs jobs, and the knobs of payroll reconciliation and horizon search.

pub mod error;
pub mod manager;
pub mod model;

pub use error::ConfigError;
pub use manager::ConfigManager;
pub use model::{BackendKind, Config};
