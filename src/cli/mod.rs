//! Command line interface for the sigfetch binary

pub mod args;
pub mod output;

pub use args::{Args, Command, DecipherArgs, DownloadArgs, VerbosityLevel};
pub use output::OutputFormatter;
