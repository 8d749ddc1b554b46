//! Subcommand implementations.

pub mod clear;
pub mod configure;
pub mod index;
pub mod search;
pub mod status;
