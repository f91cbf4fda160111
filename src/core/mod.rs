//! Core types shared by the downloader and the CLI

pub mod progress;

pub use progress::*;
