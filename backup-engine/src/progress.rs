//! Phase and byte-level progress tracking for backup jobs.
//!
//! Phases only move forward; a job that fails keeps the phase it failed in.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Preparing,
    Collecting,
    Compressing,
    Encrypting,
    Uploading,
    Verifying,
    Completed,
}

impl Phase {
    /// Percentage reported when the phase is entered.
    pub fn entry_percent(self) -> u8 {
        match self {
            Phase::Preparing => 0,
            Phase::Collecting => 10,
            Phase::Compressing => 35,
            Phase::Encrypting => 50,
            Phase::Uploading => 60,
            Phase::Verifying => 95,
            Phase::Completed => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preparing => "preparing",
            Phase::Collecting => "collecting",
            Phase::Compressing => "compressing",
            Phase::Encrypting => "encrypting",
            Phase::Uploading => "uploading",
            Phase::Verifying => "verifying",
            Phase::Completed => "completed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress information for one job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub phase: Phase,

    /// Percentage complete (0-100)
    pub percent: u8,

    /// Bytes handled by the current phase so far
    pub processed_bytes: u64,

    /// Bytes the current phase has to handle
    pub total_bytes: u64,

    /// Records collected
    pub processed_files: u64,

    /// Records expected
    pub total_files: u64,
}

impl JobProgress {
    /// Move to `next`. Returns false (and changes nothing) for backward moves.
    pub fn advance(&mut self, next: Phase) -> bool {
        if next < self.phase {
            return false;
        }
        if next != self.phase {
            self.phase = next;
            self.percent = next.entry_percent();
            self.processed_bytes = 0;
        }
        true
    }

    /// Update byte counters; percent is interpolated inside the upload window.
    pub fn update_bytes(&mut self, processed: u64, total: u64) {
        self.processed_bytes = processed;
        self.total_bytes = total;
        if self.phase == Phase::Uploading && total > 0 {
            let span = (Phase::Verifying.entry_percent() - Phase::Uploading.entry_percent()) as f64;
            let fraction = (processed.min(total) as f64) / (total as f64);
            self.percent = Phase::Uploading.entry_percent() + (span * fraction) as u8;
        }
    }

    pub fn set_files(&mut self, processed: u64, total: u64) {
        self.processed_files = processed;
        self.total_files = total;
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_starts_preparing() {
        let progress = JobProgress::default();
        assert_eq!(progress.phase, Phase::Preparing);
        assert_eq!(progress.percent, 0);
    }

    #[test]
    fn test_phases_only_move_forward() {
        let mut progress = JobProgress::default();
        assert!(progress.advance(Phase::Collecting));
        assert!(progress.advance(Phase::Encrypting));
        assert!(!progress.advance(Phase::Compressing));
        assert_eq!(progress.phase, Phase::Encrypting);
        assert_eq!(progress.percent, 50);
        assert!(progress.advance(Phase::Encrypting));
    }

    #[test]
    fn test_upload_percent_interpolates() {
        let mut progress = JobProgress::default();
        progress.advance(Phase::Uploading);
        progress.update_bytes(500, 1000);
        assert_eq!(progress.percent, 77);
        progress.update_bytes(1000, 1000);
        assert_eq!(progress.percent, 95);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
