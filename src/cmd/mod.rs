//! CLI command implementations for aicd.

pub mod serve;
pub mod settings;
