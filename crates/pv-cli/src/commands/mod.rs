//! CLI subcommand implementations.

pub mod audit;
pub mod run;
pub mod simulate;
pub mod util;
