//! Command line argument parsing

use crate::cipher::resolver::ResolverConfig;
use crate::download::downloader::DownloaderConfig;
use crate::download::fetcher::RangeMethod;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// sigfetch - signature cipher resolver and concurrent range downloader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a URL as concurrent byte ranges into one file
    Download(DownloadArgs),
    /// Resolve signatureCipher values into playable URLs
    Decipher(DecipherArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Media URL
    pub url: String,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Content length in bytes; probed from the server when omitted
    #[arg(long, value_name = "BYTES")]
    pub length: Option<u64>,

    /// Bytes per range request (e.g., 100KiB, 1MiB)
    #[arg(long, value_name = "SIZE", default_value = "100KiB", value_parser = parse_size)]
    pub packet_size: u64,

    /// Maximum concurrent range requests
    #[arg(long, default_value = "40")]
    pub workers: usize,

    /// Progress report interval (e.g., 1s, 500ms)
    #[arg(long, value_name = "DURATION", default_value = "1s")]
    pub poll_interval: humantime::Duration,

    /// Wait before retrying a failed range
    #[arg(long, value_name = "DURATION", default_value = "2s")]
    pub retry_delay: humantime::Duration,

    /// HTTP timeout per request
    #[arg(long, value_name = "DURATION", default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Request method for range requests
    #[arg(long, value_enum, default_value = "get")]
    pub method: MethodArg,

    /// Disable progress output
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DecipherArgs {
    /// signatureCipher values (url=...&s=...&sp=...)
    #[arg(required = true, value_name = "SIGNATURE_CIPHER")]
    pub ciphers: Vec<String>,

    /// Saved watch page referencing the player script
    #[arg(long, value_name = "FILE", conflicts_with = "player_url", required_unless_present = "player_url")]
    pub page: Option<PathBuf>,

    /// Player script URL
    #[arg(long, value_name = "URL")]
    pub player_url: Option<String>,

    /// Cipher cache directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disable the cipher cache
    #[arg(long, conflicts_with = "cache_dir")]
    pub no_cache: bool,

    /// How long an assembled cipher program stays usable
    #[arg(long, value_name = "DURATION", default_value = "1h")]
    pub cache_ttl: humantime::Duration,

    /// Budget for evaluating one batch of signatures
    #[arg(long, value_name = "DURATION", default_value = "5s")]
    pub eval_timeout: humantime::Duration,

    /// HTTP timeout for fetching the player script
    #[arg(long, value_name = "DURATION", default_value = "30s")]
    pub timeout: humantime::Duration,
}

/// Range request method
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum MethodArg {
    Get,
    Post,
}

impl From<MethodArg> for RangeMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => RangeMethod::Get,
            MethodArg::Post => RangeMethod::Post,
        }
    }
}

impl Args {
    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity_level() {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

impl DownloadArgs {
    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig::default()
            .with_packet_size(self.packet_size)
            .with_workers(self.workers)
            .with_poll_interval(self.poll_interval.into())
            .with_retry_delay(self.retry_delay.into())
            .with_request_timeout(self.timeout.into())
            .with_method(self.method.into())
    }
}

impl DecipherArgs {
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            evaluation_timeout: self.eval_timeout.into(),
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    /// Freshness window for cached cipher programs
    pub fn cache_freshness(&self) -> Result<chrono::Duration, chrono::OutOfRangeError> {
        chrono::Duration::from_std(self.cache_ttl.into())
    }

    /// Cache directory to use, `None` when caching is off
    pub fn cache_location(&self) -> Option<PathBuf> {
        if self.no_cache {
            return None;
        }
        Some(
            self.cache_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("sigfetch-cache")),
        )
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

/// Parse a byte size such as "4096", "100KiB" or "1.5MB"
pub fn parse_size(size: &str) -> Result<u64, String> {
    let upper = size.trim().to_uppercase();
    let number_end = upper
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(upper.len());
    if number_end == 0 {
        return Err(format!("invalid size: {}", size));
    }

    let number: f64 = upper[..number_end]
        .parse()
        .map_err(|_| format!("invalid size: {}", size))?;
    let multiplier: u64 = match upper[number_end..].trim() {
        "B" | "" => 1,
        "KB" => 1000,
        "KIB" | "K" => 1024,
        "MB" => 1000 * 1000,
        "MIB" | "M" => 1024 * 1024,
        "GB" => 1000 * 1000 * 1000,
        "GIB" | "G" => 1024 * 1024 * 1024,
        unit => return Err(format!("unknown size unit: {}", unit)),
    };

    let bytes = (number * multiplier as f64) as u64;
    if bytes == 0 {
        return Err("size must be positive".to_string());
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("100KiB"), Ok(100 * 1024));
        assert_eq!(parse_size("100k"), Ok(100 * 1024));
        assert_eq!(parse_size("1MB"), Ok(1000 * 1000));
        assert_eq!(parse_size("1.5MiB"), Ok(1536 * 1024));
        assert_eq!(parse_size(" 2GiB "), Ok(2 * 1024 * 1024 * 1024));
        assert!(parse_size("0").is_err());
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("1XB").is_err());
    }

    #[test]
    fn test_download_defaults_match_downloader_config() {
        let args = parse(&["sigfetch", "download", "https://cdn.example/v", "-o", "out.bin"]);
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert_eq!(download.url, "https://cdn.example/v");
        assert_eq!(download.output, PathBuf::from("out.bin"));
        assert_eq!(download.length, None);

        let config = download.downloader_config();
        let defaults = DownloaderConfig::default();
        assert_eq!(config.packet_size, defaults.packet_size);
        assert_eq!(config.workers, defaults.workers);
        assert_eq!(config.poll_interval, defaults.poll_interval);
        assert_eq!(config.retry_delay, defaults.retry_delay);
        assert_eq!(config.request_timeout, defaults.request_timeout);
        assert_eq!(config.method, RangeMethod::Get);
    }

    #[test]
    fn test_download_custom_values() {
        let args = parse(&[
            "sigfetch",
            "download",
            "https://cdn.example/v",
            "-o",
            "out.bin",
            "--length",
            "5000",
            "--packet-size",
            "1MiB",
            "--workers",
            "8",
            "--poll-interval",
            "250ms",
            "--timeout",
            "1m",
            "--method",
            "post",
        ]);
        let Command::Download(download) = args.command else {
            panic!("expected download command");
        };
        assert_eq!(download.length, Some(5000));

        let config = download.downloader_config();
        assert_eq!(config.packet_size, 1024 * 1024);
        assert_eq!(config.workers, 8);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.method, RangeMethod::Post);
    }

    #[test]
    fn test_decipher_with_page() {
        let args = parse(&[
            "sigfetch",
            "decipher",
            "--page",
            "watch.html",
            "url=a&s=b",
            "url=c&s=d",
        ]);
        let Command::Decipher(decipher) = args.command else {
            panic!("expected decipher command");
        };
        assert_eq!(decipher.page, Some(PathBuf::from("watch.html")));
        assert_eq!(decipher.ciphers.len(), 2);
        assert_eq!(decipher.resolver_config().evaluation_timeout, Duration::from_secs(5));
        assert!(decipher.cache_location().is_some());
        assert_eq!(decipher.cache_freshness().unwrap(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_decipher_cache_options() {
        let args = parse(&[
            "sigfetch",
            "decipher",
            "--player-url",
            "https://www.youtube.com/s/player/abc/base.js",
            "--no-cache",
            "url=a&s=b",
        ]);
        let Command::Decipher(decipher) = args.command else {
            panic!("expected decipher command");
        };
        assert_eq!(decipher.cache_location(), None);

        let args = parse(&[
            "sigfetch",
            "decipher",
            "--player-url",
            "https://www.youtube.com/s/player/abc/base.js",
            "--cache-dir",
            "/tmp/ciphers",
            "--cache-ttl",
            "10m",
            "url=a&s=b",
        ]);
        let Command::Decipher(decipher) = args.command else {
            panic!("expected decipher command");
        };
        assert_eq!(decipher.cache_location(), Some(PathBuf::from("/tmp/ciphers")));
        assert_eq!(decipher.cache_freshness().unwrap(), chrono::Duration::minutes(10));
    }

    #[test]
    fn test_decipher_requires_script_source() {
        assert!(Args::try_parse_from(["sigfetch", "decipher", "url=a&s=b"]).is_err());
        assert!(Args::try_parse_from([
            "sigfetch",
            "decipher",
            "--page",
            "watch.html",
            "--player-url",
            "https://www.youtube.com/s/player/abc/base.js",
            "url=a&s=b",
        ])
        .is_err());
    }

    #[test]
    fn test_args_verbosity_level() {
        let args = parse(&["sigfetch", "download", "u", "-o", "f"]);
        assert_eq!(args.verbosity_level(), VerbosityLevel::Normal);
        assert_eq!(args.log_filter(), "info");

        let args = parse(&["sigfetch", "-q", "download", "u", "-o", "f"]);
        assert_eq!(args.verbosity_level(), VerbosityLevel::Quiet);
        assert_eq!(args.log_filter(), "error");

        let args = parse(&["sigfetch", "download", "u", "-o", "f", "--verbose"]);
        assert_eq!(args.verbosity_level(), VerbosityLevel::Verbose);
        assert_eq!(args.log_filter(), "debug");
    }
}
