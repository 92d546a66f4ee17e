//! Subcommand implementations

pub mod config;
pub mod edges;
pub mod health;
pub mod pages;
pub mod status;
