//! looptune command-line frontend.

pub mod cli;
pub mod pipeline;

pub use cli::{run_cli, Cli};
pub use pipeline::{run_tune, TuneConfig};
