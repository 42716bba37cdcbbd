//! cadence-core
//!
//! Recurrence expansion, balance projection, and affordability search.
//! Depends on cadence-domain. No storage, no scheduling, no process I/O.

pub mod calendar;
pub mod error;
pub mod forecast_service;
pub mod horizon_service;
pub mod projection_service;
pub mod recurrence_service;
pub mod sources;
pub mod time;

pub use error::CoreError;
pub use forecast_service::*;
pub use horizon_service::*;
pub use projection_service::*;
pub use recurrence_service::*;
pub use sources::*;
pub use time::{Clock, SystemClock};
