#![doc(test(attr(deny(warnings))))]

//! Cadence projects recurring financial obligations into dated, running-balance
//! ledgers and keeps the background jobs that post them scheduled.

pub mod app;
pub mod errors;
pub mod utils;

pub use cadence_config as config;
pub use cadence_domain as domain;
pub use cadence_scheduler as scheduler;
pub use cadence_storage_json as storage;

/// Recurrence, projection, and horizon services.
pub mod services {
    pub use cadence_core::*;
}

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Cadence tracing initialized.");
    });
}
