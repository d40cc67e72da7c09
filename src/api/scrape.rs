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


//! Embedded-JSON extraction from vendor HTML pages
//!
//! The portal embeds its state as single-line JavaScript assignments such as
//!
//! ```text
//! window.OverDrive.mediaItems = {"12345": {...}};
//! ```
//!
//! This module is the one place that knows how to peel JSON out of those
//! lines: find the line carrying the assignment, strip the variable prefix and
//! the trailing statement terminator, parse the remainder. Page-shape drift
//! fails loudly here with [`OverdriveError::PageShapeChanged`] so callers never
//! have to guess whether a session died or the vendor changed the page.

use serde::de::DeserializeOwned;

use crate::error::{OverdriveError, Result};

/// Extract the JSON assigned to `marker` somewhere in `html` and deserialize
/// it. `page` names the vendor page for error reporting only.
pub fn extract_assignment_json<T>(html: &str, marker: &str, page: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let json = extract_assignment(html, marker, page)?;
    serde_json::from_str(json).map_err(|e| {
        OverdriveError::page_shape(marker, page, format!("assignment is not valid json: {}", e))
    })
}

/// Locate the `marker = <json>;` line and return the raw JSON slice.
fn extract_assignment<'a>(html: &'a str, marker: &str, page: &str) -> Result<&'a str> {
    let line = html
        .lines()
        .find(|line| line.contains(marker))
        .ok_or_else(|| OverdriveError::page_shape(marker, page, "not found"))?;

    let after_marker = &line[line.find(marker).unwrap() + marker.len()..];
    let value = after_marker
        .trim_start()
        .strip_prefix('=')
        .ok_or_else(|| OverdriveError::page_shape(marker, page, "line is not an assignment"))?
        .trim();

    // The statement terminator is always present on the vendor's pages.
    Ok(value.strip_suffix(';').unwrap_or(value).trim_end())
}
