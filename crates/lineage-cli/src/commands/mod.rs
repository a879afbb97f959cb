//! CLI command implementations

pub mod config;
pub mod person;
pub mod union;
