//! Shared domain types for the Penmark project.

pub mod config;
pub mod events;
pub mod upload;

mod errors;

pub use errors::{PenmarkError, Result};
