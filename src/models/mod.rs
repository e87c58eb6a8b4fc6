//! Core data models for waypoint.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete types with compile-time guarantees
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error kinds with retry semantics

mod config;
mod error;
mod error_log;
mod suggestion;

pub use config::*;
pub use error::*;
pub use error_log::*;
pub use suggestion::*;
