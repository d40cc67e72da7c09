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


//! License manager: descriptor and license acquisition with on-disk caching
//!
//! Two artifacts are cached per title, keyed by media id: the media
//! descriptor (`.odm`) and the signed license (`.lic`). The descriptor's DRM
//! expiration governs both: once the window closes, both files are deleted
//! and re-fetched. A cached license whose parent descriptor is unexpired is
//! trusted and reused without re-validation; its own expiry is deliberately
//! not checked independently, matching the vendor client's trust boundary.
//!
//! State machine per media id:
//!
//! ```text
//! ODM:      absent -> fetched-valid -> expired -> absent -> fetched-valid
//! License:  absent -> acquired               (reset only on ODM expiry)
//! ```
//!
//! Unparsable cached files are treated as expired (delete and re-fetch)
//! rather than left to poison every later call.

use chrono::Utc;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::StatusCode;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::api::client::{OverdriveClient, DOWNLOAD_PATH, REQUEST_TIMEOUT, USER_AGENT};
use crate::api::content::{MediaDescriptor, Part, TitleMetadata};
use crate::crypto::{self, OMC_VERSION, OS_VERSION};
use crate::error::{DocumentKind, OverdriveError, Result};

/// A signed license paired with the descriptor it was acquired under
#[derive(Debug, Clone)]
pub struct License {
    /// ClientID from the license's SignedInfo; media-part requests must
    /// present this exact value
    pub client_id: String,
    /// The license document verbatim, as the server returned it
    pub raw: String,
    /// The descriptor this license belongs to
    pub odm: MediaDescriptor,
}

impl License {
    /// Parse a license document and pair it with its descriptor.
    pub fn parse(raw: String, odm: MediaDescriptor) -> Result<Self> {
        let client_id = extract_signed_client_id(&raw)?;
        Ok(Self {
            client_id,
            raw,
            odm,
        })
    }
}

impl OverdriveClient {
    /// Resolve the media descriptor for `media_id`, from cache when valid.
    ///
    /// A cached descriptor past its DRM expiration is deleted together with
    /// any cached license for the same media id, then re-fetched. A missing
    /// loan on the title fails with [`OverdriveError::NotEntitled`] before
    /// any descriptor fetch happens. An unexpired cached descriptor is
    /// returned with zero network calls.
    pub async fn get_odm(&self, media_id: &str) -> Result<MediaDescriptor> {
        let lock = self.media_lock(media_id).await;
        let _guard = lock.lock().await;
        self.get_odm_unlocked(media_id).await
    }

    /// Resolve the license for `media_id`, acquiring it if not cached.
    ///
    /// Depends on [`OverdriveClient::get_odm`]; descriptor failures
    /// propagate. A 400/404 from the license server is a handled
    /// [`OverdriveError::LicenseRejected`] outcome with best-effort
    /// diagnostics from the error body.
    pub async fn get_license(&self, media_id: &str) -> Result<License> {
        let lock = self.media_lock(media_id).await;
        let _guard = lock.lock().await;
        self.get_license_unlocked(media_id).await
    }

    /// Title and author for a loaned title, read from its descriptor.
    pub async fn title_metadata(&self, media_id: &str) -> Result<TitleMetadata> {
        self.get_odm(media_id).await?.metadata()
    }

    /// The declared parts of a loaned title, for selection before download.
    pub async fn part_info(&self, media_id: &str) -> Result<Vec<Part>> {
        Ok(self.get_odm(media_id).await?.format.parts)
    }

    async fn get_odm_unlocked(&self, media_id: &str) -> Result<MediaDescriptor> {
        let odm_path = self.cache.odm_path(media_id);

        if odm_path.is_file() {
            let raw = fs::read_to_string(&odm_path).await?;
            match MediaDescriptor::parse(&raw) {
                Ok(odm) if !odm.is_expired(Utc::now()) => {
                    debug!(media_id, "cached odm still valid");
                    return Ok(odm);
                }
                Ok(_) => {
                    info!(media_id, "cached odm expired, deleting odm and license");
                }
                Err(e) => {
                    warn!(media_id, error = %e, "cached odm unparsable, treating as expired");
                }
            }
            fs::remove_file(&odm_path).await?;
            let license_path = self.cache.license_path(media_id);
            if license_path.is_file() {
                fs::remove_file(&license_path).await?;
            }
        }

        // Entitlement gate: never fetch a descriptor for a title the patron
        // doesn't currently hold.
        let loans = self.get_loans().await?;
        if !loans.contains_key(media_id) {
            return Err(OverdriveError::NotEntitled {
                media_id: media_id.to_string(),
            });
        }

        info!(media_id, "downloading odm");
        let url = self.url(&format!("{}{}", DOWNLOAD_PATH, media_id));
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(OverdriveError::network(
                format!("descriptor fetch returned {}", response.status()),
                response.status().is_server_error(),
            ));
        }
        let raw = response.text().await?;

        let odm = MediaDescriptor::parse(&raw)?;
        fs::write(&odm_path, raw.as_bytes()).await?;
        Ok(odm)
    }

    async fn get_license_unlocked(&self, media_id: &str) -> Result<License> {
        let odm = self.get_odm_unlocked(media_id).await?;
        let license_path = self.cache.license_path(media_id);

        if license_path.is_file() {
            let raw = fs::read_to_string(&license_path).await?;
            match License::parse(raw, odm.clone()) {
                Ok(license) => {
                    debug!(media_id, "already have the license");
                    return Ok(license);
                }
                Err(e) => {
                    warn!(media_id, error = %e, "cached license unparsable, re-acquiring");
                    fs::remove_file(&license_path).await?;
                }
            }
        }

        info!(media_id, "acquiring license");
        let hash = crypto::license_hash(&self.client_id);
        let params = [
            ("MediaID", odm.media_id.as_str()),
            ("ClientID", self.client_id.as_str()),
            ("OMC", OMC_VERSION),
            ("OS", OS_VERSION),
            ("Hash", hash.as_str()),
        ];

        let response = self
            .http
            .get(&odm.drm.acquisition_url)
            .query(&params)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = parse_license_error(&body);
            warn!(media_id, ?code, ?message, "license server rejected the request");
            return Err(OverdriveError::LicenseRejected { code, message });
        }
        if !status.is_success() {
            return Err(OverdriveError::network(
                format!("license fetch returned {}", status),
                status.is_server_error(),
            ));
        }

        let raw = response.text().await?;
        let license = License::parse(raw, odm)?;
        fs::write(&license_path, license.raw.as_bytes()).await?;
        Ok(license)
    }
}

/// Pull SignedInfo/ClientID out of a license document.
fn extract_signed_client_id(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    loop {
        match reader.read_event().map_err(|e| {
            OverdriveError::invalid_document(DocumentKind::License, e.to_string())
        })? {
            Event::Start(ref e) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                if stack.len() >= 2
                    && stack.last().map(String::as_str) == Some("ClientID")
                    && stack[stack.len() - 2] == "SignedInfo"
                {
                    return Ok(t.unescape()
                        .map_err(|e| {
                            OverdriveError::invalid_document(DocumentKind::License, e.to_string())
                        })?
                        .into_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(OverdriveError::invalid_document(
        DocumentKind::License,
        "missing SignedInfo/ClientID",
    ))
}

/// Best-effort extraction of {ErrorCode, ErrorMessage} from a rejection body.
fn parse_license_error(xml: &str) -> (Option<String>, Option<String>) {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut code = None;
    let mut message = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                if let Ok(text) = t.unescape() {
                    match stack.last().map(String::as_str) {
                        Some("ErrorCode") => code = Some(text.into_owned()),
                        Some("ErrorMessage") => message = Some(text.into_owned()),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    (code, message)
}
