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


//! Loan catalog: the patron's current checked-out titles
//!
//! The loans page embeds the catalog as a JSON assignment to
//! `window.OverDrive.mediaItems`. Listings are fetched fresh on every call
//! and never cached: lending state changes externally at any time (a title
//! returned from another device should disappear at once), and a stale
//! listing is worse than the cost of re-fetching.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::info;

use crate::api::client::{OverdriveClient, LOANS_PATH};
use crate::api::scrape;
use crate::error::Result;

/// Marker variable carrying the loans catalog on the loans page
const MEDIA_ITEMS_MARKER: &str = "window.OverDrive.mediaItems";

/// One checked-out title, as listed on the loans page
#[derive(Debug, Clone, Deserialize)]
pub struct Loan {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "firstCreatorName", default)]
    pub first_creator_name: String,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    covers: Covers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Covers {
    #[serde(rename = "cover510Wide", default)]
    cover510_wide: Option<CoverArt>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoverArt {
    href: String,
}

impl Loan {
    /// Cover art URL, when the listing carries one
    pub fn cover_url(&self) -> Option<&str> {
        self.covers.cover510_wide.as_ref().map(|c| c.href.as_str())
    }

    /// Subjects joined for display ("Science Fiction, Classics")
    pub fn genres(&self) -> String {
        self.subjects
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl OverdriveClient {
    /// Fetch the patron's current loans, keyed by media id.
    ///
    /// A missing marker is surfaced as a page-shape failure and never retried
    /// here: the session may have silently degraded or the vendor changed the
    /// page, and a blind retry against the same page cannot succeed.
    pub async fn get_loans(&self) -> Result<HashMap<String, Loan>> {
        info!(library = %self.base_url(), "getting loans");
        let html = self.get_text(LOANS_PATH).await?;
        scrape::extract_assignment_json(&html, MEDIA_ITEMS_MARKER, "loans")
    }
}
