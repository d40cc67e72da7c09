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


//! Error types for overdrive-core
//!
//! Errors fall into a small taxonomy that callers are expected to branch on:
//!
//! - **Fatal to construction**: [`OverdriveError::AuthenticationFailed`],
//!   [`OverdriveError::SessionStore`], [`OverdriveError::InvalidConfiguration`].
//!   The client is unusable; credentials or configuration need correcting and
//!   the caller must not retry automatically.
//! - **Unrecoverable for the call**: [`OverdriveError::PageShapeChanged`].
//!   Either the session silently degraded or the vendor changed a page; a blind
//!   retry against the same page cannot succeed.
//! - **Handled outcomes**: [`OverdriveError::NotEntitled`] and
//!   [`OverdriveError::LicenseRejected`] are expected protocol results, not
//!   process failures, and are kept distinct from network errors.
//! - **Per-part**: download failures abort only the affected part.

use thiserror::Error;

/// Result type alias using [`OverdriveError`]
pub type Result<T> = std::result::Result<T, OverdriveError>;

/// Main error type for overdrive-core
#[derive(Error, Debug)]
pub enum OverdriveError {
    /// Login never produced a valid session. Fatal: the client cannot be
    /// constructed and the caller must surface this for credential correction.
    #[error("authentication failed for {library}: {message}")]
    AuthenticationFailed {
        message: String,
        /// Base URL of the library the login was attempted against
        library: String,
    },

    /// An expected embedded-JSON marker was absent from a vendor page, or the
    /// embedded JSON was malformed. The page shape drifted or the session is
    /// gone; either way the call cannot be retried blindly.
    #[error("page shape changed on {page}: marker `{marker}` {problem}")]
    PageShapeChanged {
        /// Client-side variable the scraper was looking for
        marker: String,
        /// Which vendor page was being scraped
        page: String,
        /// What went wrong ("not found", "unparsable", ...)
        problem: String,
    },

    /// The patron holds no active loan on this title. Handled outcome,
    /// distinct from any network failure.
    #[error("no active loan on media {media_id}")]
    NotEntitled { media_id: String },

    /// The license server rejected the acquisition request (HTTP 400/404).
    /// Diagnostics are best-effort, extracted from the error body when it parses.
    #[error("license rejected: {}", .message.as_deref().unwrap_or("no details"))]
    LicenseRejected {
        code: Option<String>,
        message: Option<String>,
    },

    /// A requested part number does not appear in the descriptor
    #[error("media {media_id} has no part {part}")]
    PartNotFound { media_id: String, part: u32 },

    /// A part download failed; only that part is aborted
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Network connectivity error
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// A spawned worker task never produced an outcome (panicked or was
    /// cancelled); recorded so fan-out callers still get one result per input
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// A vendor document (ODM, license, embedded metadata) did not parse.
    /// For cached files this is treated the same as expiry: delete and re-fetch.
    #[error("invalid {kind} document: {reason}")]
    InvalidDocument { kind: DocumentKind, reason: String },

    /// Cookie persistence failed. Fatal at construction: there is no
    /// in-memory-only fallback.
    #[error("session store error: {0}")]
    SessionStore(String),

    /// Bad library configuration (unparsable base URL, missing directories)
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// HTTP client error from reqwest
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON deserialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML parse error from quick-xml
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Standard I/O error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which vendor document failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// The media descriptor (`.odm`)
    Odm,
    /// The signed license (`.lic`)
    License,
    /// The metadata blob embedded in the descriptor
    Metadata,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Odm => write!(f, "odm"),
            DocumentKind::License => write!(f, "license"),
            DocumentKind::Metadata => write!(f, "metadata"),
        }
    }
}

impl OverdriveError {
    /// Create an AuthenticationFailed error
    pub fn auth_failed(message: impl Into<String>, library: impl Into<String>) -> Self {
        OverdriveError::AuthenticationFailed {
            message: message.into(),
            library: library.into(),
        }
    }

    /// Create a PageShapeChanged error
    pub fn page_shape(
        marker: impl Into<String>,
        page: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        OverdriveError::PageShapeChanged {
            marker: marker.into(),
            page: page.into(),
            problem: problem.into(),
        }
    }

    /// Create an InvalidDocument error
    pub fn invalid_document(kind: DocumentKind, reason: impl Into<String>) -> Self {
        OverdriveError::InvalidDocument {
            kind,
            reason: reason.into(),
        }
    }

    /// Create a NetworkError
    pub fn network(message: impl Into<String>, is_transient: bool) -> Self {
        OverdriveError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Whether this is an expected protocol outcome rather than a failure.
    ///
    /// Handled outcomes are reported to the user but must not abort the
    /// process or poison other libraries' listings.
    pub fn is_handled_outcome(&self) -> bool {
        matches!(
            self,
            OverdriveError::NotEntitled { .. } | OverdriveError::LicenseRejected { .. }
        )
    }

    /// Whether the user needs to correct credentials or configuration.
    /// These are fatal at client construction; never auto-retry.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            OverdriveError::AuthenticationFailed { .. } | OverdriveError::InvalidConfiguration(_)
        )
    }

    /// Whether a retry might plausibly succeed. Page-shape and credential
    /// failures never qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            OverdriveError::NetworkError { is_transient, .. } => *is_transient,
            OverdriveError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// User-facing message for errors that must be surfaced to the patron
    pub fn user_message(&self) -> String {
        match self {
            OverdriveError::AuthenticationFailed { library, .. } => format!(
                "Couldn't log in to {}. Please check your card number, password and library url.",
                library
            ),
            OverdriveError::NotEntitled { media_id } => format!(
                "You do not have a loan on media {}, or you are not logged in.",
                media_id
            ),
            OverdriveError::LicenseRejected { code, message } => match (code, message) {
                (Some(c), Some(m)) => format!("License server refused the request: {} ({})", m, c),
                _ => "Couldn't get a license for this title.".to_string(),
            },
            _ => self.to_string(),
        }
    }
}
