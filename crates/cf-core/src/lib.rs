//! cf-core: shared types, IDs, errors, configuration, and the host protocol.
//!
//! This crate is the foundational dependency for the cloudframe pipeline,
//! providing the [`FileRecord`] model, a unified error type, application
//! configuration, the command/notification protocol spoken with the host,
//! and a broadcast bus for outbound notifications.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod model;
pub mod protocol;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use model::*;
