//! Voting engine CLI library.
//!
//! This crate provides the `pvote` command-line interface on top of
//! `pv-core`.

pub mod audit;
mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
