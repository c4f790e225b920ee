//! Command-line front end for the `refresh-engine` crate: configuration
//! loading, refresh-token persistence and command dispatch.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod state;
