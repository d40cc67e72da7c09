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


//! Typed decoding of the media descriptor ("ODM") document
//!
//! The descriptor is an XML document the download endpoint returns per loaned
//! title. It carries the format's parts, the delivery base URL, the DRM
//! acquisition endpoint and expiry, and an embedded metadata blob (title,
//! creators) inside a CDATA section. Files on disk are stored verbatim as the
//! vendor returned them; this module turns them into explicit structures so
//! raw parsed-document maps never cross component boundaries.

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{DocumentKind, OverdriveError, Result};

/// A parsed media descriptor
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    /// Vendor media id this descriptor was issued for
    pub media_id: String,
    /// The audiobook format with its declared parts
    pub format: MediaFormat,
    /// DRM acquisition endpoint and expiry window
    pub drm: DrmInfo,
    /// Embedded metadata blob, verbatim; see [`MediaDescriptor::metadata`]
    pub metadata_raw: String,
}

/// One format block of a descriptor: delivery base URL plus ordered parts
#[derive(Debug, Clone)]
pub struct MediaFormat {
    pub name: String,
    /// Base delivery URL from the format's protocol section
    pub base_url: String,
    /// Parts in declaration order
    pub parts: Vec<Part>,
}

/// One contiguous audio segment of a multi-part title
#[derive(Debug, Clone)]
pub struct Part {
    /// Declared sequence number
    pub number: u32,
    /// Display name ("Part 1")
    pub name: String,
    /// Filename relative to the format's base URL
    pub filename: String,
    /// Declared duration in seconds, when present and parsable
    pub duration_secs: Option<u32>,
}

/// DRM info: where to acquire a license and until when the window is open
#[derive(Debug, Clone)]
pub struct DrmInfo {
    /// License acquisition endpoint, supplied dynamically by the descriptor
    pub acquisition_url: String,
    /// End of the DRM window; a descriptor past this instant is invalid
    pub expiration: DateTime<Utc>,
}

/// Title metadata parsed out of the descriptor's embedded blob
#[derive(Debug, Clone)]
pub struct TitleMetadata {
    pub title: String,
    /// First creator carrying the Author role
    pub author: String,
}

impl MediaDescriptor {
    /// Parse a descriptor document as returned by the download endpoint.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<String> = Vec::new();
        let mut media_id: Option<String> = None;
        let mut acquisition_url: Option<String> = None;
        let mut expiration_raw: Option<String> = None;
        let mut format_name = String::new();
        let mut base_url: Option<String> = None;
        let mut parts: Vec<Part> = Vec::new();
        let mut metadata_raw = String::new();

        let mut fields = DescriptorFields {
            media_id: &mut media_id,
            format_name: &mut format_name,
            base_url: &mut base_url,
            parts: &mut parts,
        };

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => {
                    let name = fields.absorb_element(e)?;
                    stack.push(name);
                }
                // Self-closing elements never get an End event, so they are
                // not pushed onto the element stack.
                Event::Empty(ref e) => {
                    fields.absorb_element(e)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(t) => {
                    let text = t.unescape()?.into_owned();
                    match stack.last().map(String::as_str) {
                        Some("AcquisitionUrl") => acquisition_url = Some(text),
                        Some("ExpirationDate") => expiration_raw = Some(text),
                        Some("OverDriveMedia") => metadata_raw.push_str(&text),
                        _ => {}
                    }
                }
                Event::CData(c) => {
                    // The metadata blob lives in a CDATA section directly
                    // under the document root.
                    if stack.last().map(String::as_str) == Some("OverDriveMedia") {
                        metadata_raw.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let media_id = media_id.ok_or_else(|| {
            OverdriveError::invalid_document(DocumentKind::Odm, "missing OverDriveMedia@id")
        })?;
        let acquisition_url = acquisition_url.ok_or_else(|| {
            OverdriveError::invalid_document(DocumentKind::Odm, "missing License/AcquisitionUrl")
        })?;
        let expiration_raw = expiration_raw.ok_or_else(|| {
            OverdriveError::invalid_document(DocumentKind::Odm, "missing DrmInfo/ExpirationDate")
        })?;
        let base_url = base_url.ok_or_else(|| {
            OverdriveError::invalid_document(DocumentKind::Odm, "missing Protocol@baseurl")
        })?;
        if parts.is_empty() {
            return Err(OverdriveError::invalid_document(
                DocumentKind::Odm,
                "descriptor declares no parts",
            ));
        }

        Ok(Self {
            media_id,
            format: MediaFormat {
                name: format_name,
                base_url,
                parts,
            },
            drm: DrmInfo {
                acquisition_url,
                expiration: parse_expiration(&expiration_raw)?,
            },
            metadata_raw,
        })
    }

    /// Whether the DRM window has closed as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.drm.expiration
    }

    /// Parse the embedded metadata blob into title and author.
    pub fn metadata(&self) -> Result<TitleMetadata> {
        parse_title_metadata(&self.metadata_raw)
    }

    /// Locate a part by its declared sequence number.
    pub fn part(&self, number: u32) -> Option<&Part> {
        self.format.parts.iter().find(|p| p.number == number)
    }
}

/// Mutable view over the fields a descriptor parse accumulates, so Start and
/// Empty events share one attribute-handling path.
struct DescriptorFields<'a> {
    media_id: &'a mut Option<String>,
    format_name: &'a mut String,
    base_url: &'a mut Option<String>,
    parts: &'a mut Vec<Part>,
}

impl DescriptorFields<'_> {
    fn absorb_element(&mut self, e: &quick_xml::events::BytesStart<'_>) -> Result<String> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        match name.as_str() {
            "OverDriveMedia" => {
                if let Some(attr) = e.try_get_attribute("id")? {
                    *self.media_id = Some(attr.unescape_value()?.into_owned());
                }
            }
            "Format" => {
                if let Some(attr) = e.try_get_attribute("name")? {
                    *self.format_name = attr.unescape_value()?.into_owned();
                }
            }
            "Protocol" => {
                // The download protocol carries the delivery base URL.
                let method = e
                    .try_get_attribute("method")?
                    .map(|a| a.unescape_value().map(|v| v.into_owned()))
                    .transpose()?;
                if let Some(attr) = e.try_get_attribute("baseurl")? {
                    let url = attr.unescape_value()?.into_owned();
                    if self.base_url.is_none() || method.as_deref() == Some("download") {
                        *self.base_url = Some(url);
                    }
                }
            }
            "Part" => {
                self.parts.push(parse_part(e)?);
            }
            _ => {}
        }
        Ok(name)
    }
}

fn parse_part(e: &quick_xml::events::BytesStart<'_>) -> Result<Part> {
    let attr = |name: &str| -> Result<Option<String>> {
        Ok(e.try_get_attribute(name)?
            .map(|a| a.unescape_value().map(|v| v.into_owned()))
            .transpose()?)
    };

    let number_raw = attr("number")?.ok_or_else(|| {
        OverdriveError::invalid_document(DocumentKind::Odm, "part without number attribute")
    })?;
    let number: u32 = number_raw.parse().map_err(|_| {
        OverdriveError::invalid_document(
            DocumentKind::Odm,
            format!("unparsable part number `{}`", number_raw),
        )
    })?;
    let filename = attr("filename")?.ok_or_else(|| {
        OverdriveError::invalid_document(DocumentKind::Odm, "part without filename attribute")
    })?;
    let name = attr("name")?.unwrap_or_else(|| format!("Part {}", number));
    let duration_secs = attr("duration")?.and_then(|d| parse_duration(&d));

    Ok(Part {
        number,
        name,
        filename,
        duration_secs,
    })
}

/// Parse a colon-separated duration ("31:30" or "1:02:45") into seconds.
fn parse_duration(raw: &str) -> Option<u32> {
    raw.split(':')
        .map(|piece| piece.trim().parse::<u32>().ok())
        .try_fold(0u32, |acc, piece| Some(acc * 60 + piece?))
}

/// Parse the DRM expiration timestamp. The vendor emits ISO-8601, usually
/// with a trailing `Z`, occasionally with fractional seconds and no zone.
fn parse_expiration(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.and_utc())
        .map_err(|e| {
            OverdriveError::invalid_document(
                DocumentKind::Odm,
                format!("unparsable ExpirationDate `{}`: {}", raw, e),
            )
        })
}

fn parse_title_metadata(xml: &str) -> Result<TitleMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut title: Option<String> = None;
    let mut author: Option<String> = None;
    let mut current_creator_role: Option<String> = None;

    loop {
        match reader.read_event().map_err(|e| {
            OverdriveError::invalid_document(DocumentKind::Metadata, e.to_string())
        })? {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "Creator" {
                    current_creator_role = e
                        .try_get_attribute("role")?
                        .map(|a| a.unescape_value().map(|v| v.into_owned()))
                        .transpose()?;
                }
                stack.push(name);
            }
            Event::End(_) => {
                if stack.pop().as_deref() == Some("Creator") {
                    current_creator_role = None;
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                match stack.last().map(String::as_str) {
                    Some("Title") if stack.len() == 2 => title = Some(text),
                    Some("Creator") => {
                        if author.is_none() && current_creator_role.as_deref() == Some("Author") {
                            author = Some(text);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(TitleMetadata {
        title: title.ok_or_else(|| {
            OverdriveError::invalid_document(DocumentKind::Metadata, "missing Title")
        })?,
        author: author.ok_or_else(|| {
            OverdriveError::invalid_document(DocumentKind::Metadata, "no creator with Author role")
        })?,
    })
}
