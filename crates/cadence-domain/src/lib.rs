//! cadence-domain
//!
//! Pure domain models (Obligation, Occurrence, LedgerEntry, JobDefinition).
//! No I/O, no scheduling, no storage. Only data types and core enums.

pub mod common;
pub mod job;
pub mod ledger;
pub mod obligation;

pub use common::*;
pub use job::*;
pub use ledger::*;
pub use obligation::*;
