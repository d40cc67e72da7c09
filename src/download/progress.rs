// overdrive-core - OverDrive lending protocol client
// Copyright (C) 2026 overdrive-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Coarse download progress reporting
//!
//! Media parts arrive without a reliable Content-Length, so progress is
//! reported at whole-megabyte granularity rather than as a percentage: one
//! tick per megabyte written, plus a final completion event. Callers that
//! want byte-exact accounting can read the completed file's size.

use serde::Serialize;

const MEGABYTE: u64 = 1024 * 1024;

/// One progress event for a part download
#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgress {
    /// Media id of the title being downloaded
    pub media_id: String,
    /// Display name of the part ("Part 1")
    pub part_name: String,
    /// Bytes written to disk so far
    pub bytes_downloaded: u64,
    /// Whole megabytes written so far
    pub megabytes: u64,
    /// Set on the final event for the part
    pub finished: bool,
}

/// Emits one event per megabyte boundary crossed, plus a final one.
#[derive(Debug)]
pub struct ProgressTracker {
    media_id: String,
    part_name: String,
    bytes_downloaded: u64,
    last_reported_mb: u64,
}

impl ProgressTracker {
    pub fn new(media_id: impl Into<String>, part_name: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            part_name: part_name.into(),
            bytes_downloaded: 0,
            last_reported_mb: 0,
        }
    }

    /// Record `chunk_len` more bytes; returns an event when a new whole
    /// megabyte has been crossed since the last event.
    pub fn advance(&mut self, chunk_len: u64) -> Option<DownloadProgress> {
        self.bytes_downloaded += chunk_len;
        let mb = self.bytes_downloaded / MEGABYTE;
        if mb > self.last_reported_mb {
            self.last_reported_mb = mb;
            Some(self.snapshot(false))
        } else {
            None
        }
    }

    /// The final event for the part.
    pub fn finish(&self) -> DownloadProgress {
        self.snapshot(true)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded
    }

    fn snapshot(&self, finished: bool) -> DownloadProgress {
        DownloadProgress {
            media_id: self.media_id.clone(),
            part_name: self.part_name.clone(),
            bytes_downloaded: self.bytes_downloaded,
            megabytes: self.bytes_downloaded / MEGABYTE,
            finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_once_per_megabyte() {
        let mut tracker = ProgressTracker::new("12345", "Part 1");

        // Half a megabyte: no event yet.
        assert!(tracker.advance(MEGABYTE / 2).is_none());
        // Crossing 1MB fires.
        let event = tracker.advance(MEGABYTE / 2).unwrap();
        assert_eq!(event.megabytes, 1);
        assert!(!event.finished);
        // More bytes inside the same megabyte stay silent.
        assert!(tracker.advance(1).is_none());
    }

    #[test]
    fn large_chunk_reports_latest_boundary_only() {
        let mut tracker = ProgressTracker::new("12345", "Part 1");
        let event = tracker.advance(5 * MEGABYTE + 10).unwrap();
        assert_eq!(event.megabytes, 5);
        // The skipped boundaries are not replayed.
        assert!(tracker.advance(0).is_none());
    }

    #[test]
    fn finish_carries_exact_byte_count() {
        let mut tracker = ProgressTracker::new("12345", "Part 2");
        tracker.advance(1234);
        let event = tracker.finish();
        assert!(event.finished);
        assert_eq!(event.bytes_downloaded, 1234);
        assert_eq!(event.megabytes, 0);
        assert_eq!(event.part_name, "Part 2");
    }
}
