//! Subcommand implementations.

pub mod up;
pub mod version;
