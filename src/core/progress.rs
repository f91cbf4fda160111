//! Download progress snapshots and human-readable formatting

use std::time::Duration;

/// Aggregate progress of one download at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// Bytes of completed packets so far
    pub downloaded: u64,
    /// Total content length
    pub total: u64,
}

impl ProgressSnapshot {
    pub fn new(downloaded: u64, total: u64) -> Self {
        Self { downloaded, total }
    }

    /// Completion percentage, 0 when the total is 0
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.downloaded as f64 * 100.0 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded >= self.total
    }

    /// Bytes still outstanding
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.downloaded)
    }

    /// "1.5 MB / 10.0 MB (15.0%)"
    pub fn summary(&self) -> String {
        format!(
            "{} / {} ({:.1}%)",
            format_bytes(self.downloaded),
            format_bytes(self.total),
            self.percent()
        )
    }
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Format a duration as "45s", "2m 5s" or "1h 3m"
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 if secs % 60 == 0 => format!("{}m", secs / 60),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ if (secs % 3600) / 60 == 0 => format!("{}h", secs / 3600),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}
