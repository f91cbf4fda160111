//! Output formatting and progress display

use crate::cli::args::VerbosityLevel;
use crate::core::progress::{format_bytes, format_duration, ProgressSnapshot};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Terminal output for the sigfetch binary
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    progress_bar: Option<ProgressBar>,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: None,
        }
    }

    /// Create a progress bar for a download of `total_size` bytes
    pub fn create_progress_bar(&mut self, total_size: u64) -> Option<ProgressBar> {
        if self.verbosity == VerbosityLevel::Quiet {
            return None;
        }

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let progress_bar = ProgressBar::new(total_size);
        progress_bar.set_style(style);
        progress_bar.set_message("Downloading...");

        self.progress_bar = Some(progress_bar.clone());
        Some(progress_bar)
    }

    /// Move the progress bar to a snapshot
    pub fn update_progress(&self, snapshot: &ProgressSnapshot) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_length(snapshot.total);
            progress_bar.set_position(snapshot.downloaded);
        }
    }

    /// Finish progress bar
    pub fn finish_progress(&self, message: &str) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.finish_with_message(message.to_string());
        }
    }

    /// Drop the progress bar after a failure
    pub fn abandon_progress(&self) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.abandon_with_message("Failed");
        }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("ℹ️  {}", message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("✅ {}", message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("⚠️  {}", message);
        }
    }

    /// Print download start message
    pub fn print_download_start(&self, url: &str, output_path: &Path, total_size: u64) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!("🚀 Starting download...");
        println!("🔗 URL: {}", url);
        println!("💾 Output: {}", output_path.display());
        println!("📦 Size: {}", format_bytes(total_size));
        println!();
    }

    /// Print download complete message
    pub fn print_download_complete(&self, output_path: &Path, total_size: u64, duration: Duration) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!();
        println!("✅ Download completed!");
        println!("💾 Saved to: {}", output_path.display());
        println!("📦 Size: {}", format_bytes(total_size));
        println!("⏱️  Time: {}", format_duration(duration));
    }

    /// Print the player script being used
    pub fn print_script(&self, script_id: &str) {
        if self.verbosity == VerbosityLevel::Verbose {
            println!("📜 Player script: {}", script_id);
        }
    }

    /// Print one resolved URL; always shown since it is the command's output
    pub fn print_resolved(&self, url: &str) {
        println!("{}", url);
    }

    /// Print resolution summary
    pub fn print_resolve_summary(&self, resolved: usize, total: usize) {
        if resolved == total {
            self.success(&format!("Resolved {} of {} signatures", resolved, total));
        } else {
            self.warning(&format!("Resolved {} of {} signatures", resolved, total));
        }
    }
}
