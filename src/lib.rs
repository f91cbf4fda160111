//! # sigfetch - signature cipher resolver and range downloader
//!
//! Resolves obfuscated stream signatures by cutting the cipher routine out
//! of a player script and running it in an embedded JavaScript engine, and
//! downloads media of known length as concurrent byte ranges.
//!
//! ## Features
//!
//! - Dispatcher and helper extraction with a pluggable locator
//! - Assembled programs cached in memory or on disk for an hour
//! - Batch evaluation with a hard timeout
//! - Bounded worker pool with fixed-backoff retries and clean abort
//!
//! ## Example
//!
//! ```rust,no_run
//! use sigfetch::cipher::{CipherCache, CipherResolver, CipherTask};
//! use sigfetch::download::RangeDownloader;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = reqwest::Client::new();
//!     let resolver = CipherResolver::new(CipherCache::in_memory());
//!     let script_url = "https://www.youtube.com/s/player/abc/base.js";
//!
//!     let (task, rx) = CipherTask::channel("https://cdn.example/videoplayback?id=1", "AOq0QJ8w");
//!     resolver
//!         .resolve("/s/player/abc/base.js", || sigfetch::cipher::fetch_script(&client, script_url), vec![task])
//!         .await;
//!     let url = rx.await?;
//!
//!     let downloader = RangeDownloader::new()?;
//!     downloader.download(&url, Path::new("video.mp4"), 1_000_000, |p| println!("{}", p.summary())).await?;
//!     Ok(())
//! }
//! ```

pub mod cipher;
pub mod cli;
pub mod core;
pub mod download;
pub mod error;
pub mod utils;

// Re-export main types
pub use cipher::{CipherCache, CipherResolver, CipherTask};
pub use self::core::ProgressSnapshot;
pub use download::{AbortSignal, DownloaderConfig, RangeDownloader};
pub use error::SigfetchError;

/// Result type alias for sigfetch operations
pub type Result<T> = std::result::Result<T, SigfetchError>;
