//! Shared helpers

pub mod error;
pub mod fs;
