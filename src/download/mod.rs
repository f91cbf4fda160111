//! Concurrent byte-range downloading

pub mod abort;
pub mod downloader;
pub mod fetcher;
pub mod plan;

pub use abort::*;
pub use downloader::*;
pub use fetcher::*;
pub use plan::*;
