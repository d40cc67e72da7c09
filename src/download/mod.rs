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


//! Media part download engine
//!
//! Part URLs come from the licensed descriptor: `{baseurl}/{filename}` per
//! part. Every media request carries the signed license verbatim plus the
//! ClientID it was signed for; the delivery servers check both. Parts stream
//! to `<download_dir>/<author>/<title>/<author> - <title> <part name>` in
//! chunks, with coarse megabyte-granularity progress events. The timeout
//! bounds the connect and each body read, never the whole transfer.
//!
//! A failed part does not abort the batch: the remaining parts still
//! download, and the caller gets a [`DownloadReport`] naming what completed
//! and what failed. A partially-written file from a failed part is left on
//! disk for inspection.

mod progress;

pub use progress::{DownloadProgress, ProgressTracker};

use std::collections::HashMap;
use std::path::PathBuf;

use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time;
use tracing::{info, warn};

use crate::api::client::{OverdriveClient, REQUEST_TIMEOUT, USER_AGENT};
use crate::api::License;
use crate::error::{OverdriveError, Result};

const WRITE_BUF_SZ: usize = 8 * 1024;

/// Which parts of a title to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartSelection {
    /// Every part the descriptor declares, in declaration order
    All,
    /// One part by its declared sequence number
    Number(u32),
}

/// A resolved, directly fetchable media part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Absolute URL of the part
    pub url: String,
    /// Display name from the descriptor ("Part 1")
    pub part_name: String,
}

/// The resolved parts plus the headers every part request must carry.
///
/// Callers handing downloads to an external fetcher use this instead of
/// [`OverdriveClient::download`].
#[derive(Debug, Clone)]
pub struct ResolvedParts {
    pub targets: Vec<DownloadTarget>,
    /// Header name to value, ready to attach to each request
    pub headers: HashMap<String, String>,
}

/// What a batch download actually achieved
#[derive(Debug)]
pub struct DownloadReport {
    /// Destination paths of parts that finished, in download order
    pub completed: Vec<PathBuf>,
    /// Parts that failed, with the error that stopped each
    pub failed: Vec<(String, OverdriveError)>,
}

impl DownloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl OverdriveClient {
    /// Resolve the selected parts of `media_id` into URLs and request headers.
    ///
    /// Acquires the license first; license failures propagate. Selecting a
    /// part number the descriptor does not declare fails with
    /// [`OverdriveError::PartNotFound`].
    pub async fn resolve_parts(
        &self,
        media_id: &str,
        selection: PartSelection,
    ) -> Result<ResolvedParts> {
        let license = self.get_license(media_id).await?;
        resolve_with_license(media_id, &license, selection)
    }

    /// Download the selected parts of `media_id` to the download directory.
    ///
    /// Files land in `<download_dir>/<author>/<title>/`. One part failing is
    /// recorded in the report and does not stop the remaining parts; only
    /// failures before any part starts (license, metadata) return `Err`.
    pub async fn download(
        &self,
        media_id: &str,
        selection: PartSelection,
        mut on_progress: impl FnMut(DownloadProgress),
    ) -> Result<DownloadReport> {
        let license = self.get_license(media_id).await?;
        let resolved = resolve_with_license(media_id, &license, selection)?;
        let meta = license.odm.metadata()?;

        let author = sanitize_component(&meta.author);
        let title = sanitize_component(&meta.title);
        let dir = self.download_dir.join(&author).join(&title);
        fs::create_dir_all(&dir).await?;

        let mut report = DownloadReport {
            completed: Vec::new(),
            failed: Vec::new(),
        };

        for target in &resolved.targets {
            let file_name = sanitize_component(&format!(
                "{} - {} {}",
                meta.author, meta.title, target.part_name
            ));
            let dest = dir.join(&file_name);

            info!(media_id, part = %target.part_name, dest = %dest.display(), "downloading part");
            match self
                .download_part(media_id, target, &resolved.headers, &dest, &mut on_progress)
                .await
            {
                Ok(bytes) => {
                    info!(media_id, part = %target.part_name, bytes, "part complete");
                    report.completed.push(dest);
                }
                Err(e) => {
                    // Partial file stays on disk for inspection.
                    warn!(media_id, part = %target.part_name, error = %e, "part failed, continuing");
                    report.failed.push((target.part_name.clone(), e));
                }
            }
        }

        Ok(report)
    }

    async fn download_part(
        &self,
        media_id: &str,
        target: &DownloadTarget,
        headers: &HashMap<String, String>,
        dest: &std::path::Path,
        on_progress: &mut impl FnMut(DownloadProgress),
    ) -> Result<u64> {
        let mut request = self.http.get(&target.url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        // The window bounds the connect and each body read, not the whole
        // transfer: a healthy server streaming a large part for minutes is
        // fine, a stalled one is cut off.
        let response = time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| stalled(&target.part_name))??;
        let status = response.status();
        if !status.is_success() {
            return Err(OverdriveError::DownloadFailed(format!(
                "{} returned {} for {}",
                target.part_name, status, target.url
            )));
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dest)
            .await?;
        let mut writer = BufWriter::with_capacity(WRITE_BUF_SZ, file);

        let mut tracker = ProgressTracker::new(media_id, &target.part_name);
        let mut stream = response.bytes_stream();
        loop {
            let chunk = match time::timeout(REQUEST_TIMEOUT, stream.next()).await {
                Ok(Some(chunk)) => chunk?,
                Ok(None) => break,
                Err(_) => return Err(stalled(&target.part_name)),
            };
            writer.write_all(&chunk).await?;
            if let Some(event) = tracker.advance(chunk.len() as u64) {
                on_progress(event);
            }
        }
        writer.flush().await?;

        on_progress(tracker.finish());
        Ok(tracker.bytes_downloaded())
    }
}

fn stalled(part_name: &str) -> OverdriveError {
    OverdriveError::network(
        format!("{} made no progress within {:?}", part_name, REQUEST_TIMEOUT),
        true,
    )
}

/// Build the part targets and request headers from an acquired license.
fn resolve_with_license(
    media_id: &str,
    license: &License,
    selection: PartSelection,
) -> Result<ResolvedParts> {
    let format = &license.odm.format;

    let targets: Vec<DownloadTarget> = match selection {
        PartSelection::All => format
            .parts
            .iter()
            .map(|p| DownloadTarget {
                url: format!("{}/{}", format.base_url, p.filename),
                part_name: p.name.clone(),
            })
            .collect(),
        PartSelection::Number(n) => {
            let part = license.odm.part(n).ok_or_else(|| OverdriveError::PartNotFound {
                media_id: media_id.to_string(),
                part: n,
            })?;
            vec![DownloadTarget {
                url: format!("{}/{}", format.base_url, part.filename),
                part_name: part.name.clone(),
            }]
        }
    };

    let mut headers = HashMap::new();
    headers.insert("User-Agent".to_string(), USER_AGENT.to_string());
    headers.insert("ClientID".to_string(), license.client_id.clone());
    headers.insert("License".to_string(), license.raw.clone());

    Ok(ResolvedParts { targets, headers })
}

/// Make a metadata string safe as a single path component.
///
/// Separators and characters Windows refuses are replaced; leading and
/// trailing dots or spaces are trimmed so the component cannot escape or
/// alias its directory.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
