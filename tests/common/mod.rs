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


//! In-process stub of a lending portal, its license server, and its media
//! delivery endpoint, so integration tests exercise the real client against
//! real HTTP.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream;
use tokio::net::TcpListener;

use overdrive_core::api::ClientOptions;
use overdrive_core::registry::LibraryConfig;

const SESSION_COOKIE: &str = "session=ok";

/// Shared state of one stub portal instance
pub struct PortalState {
    /// Whether the login POST hands out a session cookie
    pub login_grants_session: AtomicBool,
    /// Whether the license endpoint rejects with a 400 LicenseError
    pub reject_license: AtomicBool,

    pub login_hits: AtomicUsize,
    pub account_hits: AtomicUsize,
    pub loans_hits: AtomicUsize,
    pub descriptor_hits: AtomicUsize,
    pub acquire_hits: AtomicUsize,
    pub part_hits: AtomicUsize,

    /// JSON object text assigned to the mediaItems marker
    pub loans_items: Mutex<String>,
    /// Descriptor body the download endpoint serves
    pub odm_body: Mutex<String>,
    /// Part filenames the delivery endpoint answers with a 500
    pub broken_parts: Mutex<Vec<String>>,
    /// When set, parts stream as timed chunks instead of one response body
    pub part_stream_plan: Mutex<Option<StreamPlan>>,

    /// Query parameters of the last license acquisition
    pub acquire_query: Mutex<Option<HashMap<String, String>>>,
    /// Headers of the last part request, lowercased names
    pub part_headers: Mutex<Option<HashMap<String, String>>>,
}

pub struct Portal {
    pub base_url: String,
    pub state: Arc<PortalState>,
}

/// Timed chunked delivery: `chunks` pieces with `interval` between them
#[derive(Debug, Clone, Copy)]
pub struct StreamPlan {
    pub chunks: usize,
    pub interval: std::time::Duration,
}

/// Start a stub portal on an ephemeral port.
pub async fn spawn_portal() -> Portal {
    let state = Arc::new(PortalState {
        login_grants_session: AtomicBool::new(true),
        reject_license: AtomicBool::new(false),
        login_hits: AtomicUsize::new(0),
        account_hits: AtomicUsize::new(0),
        loans_hits: AtomicUsize::new(0),
        descriptor_hits: AtomicUsize::new(0),
        acquire_hits: AtomicUsize::new(0),
        part_hits: AtomicUsize::new(0),
        loans_items: Mutex::new(dune_loan_items()),
        odm_body: Mutex::new(String::new()),
        broken_parts: Mutex::new(Vec::new()),
        part_stream_plan: Mutex::new(None),
        acquire_query: Mutex::new(None),
        part_headers: Mutex::new(None),
    });

    let app = Router::new()
        .route("/account/ozone/sign-in", get(sign_in_page))
        .route("/account/signInOzone", post(login))
        .route("/rest/account/", get(account))
        .route("/account/loans", get(loans_page))
        .route("/media/download/audiobook-mp3/:media_id", get(descriptor))
        .route("/AcquireLicense", get(acquire_license))
        .route("/parts/:filename", get(media_part))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base_url = format!("http://{}", addr);
    state
        .odm_body
        .lock()
        .unwrap()
        .push_str(&dune_odm(&base_url, "2031-01-01T00:00:00Z"));

    Portal { base_url, state }
}

impl Portal {
    pub fn hits(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// The standard test library pointing at the stub.
pub fn library(base_url: &str) -> LibraryConfig {
    LibraryConfig {
        url: base_url.to_string(),
        username: "1234567890".to_string(),
        password: Some("0000".to_string()),
    }
}

/// Options rooted under a temp dir: `data/` for state, `downloads/` for media.
pub fn client_options(root: &FsPath) -> ClientOptions {
    ClientOptions::new(root.join("data"), root.join("downloads"))
}

/// The loans catalog entry for the standard test title.
pub fn dune_loan_items() -> String {
    r#"{"12345": {"id": "12345", "title": "Dune", "firstCreatorName": "Frank Herbert", "subjects": [{"name": "Science Fiction"}]}}"#
        .to_string()
}

/// A two-part descriptor whose license and delivery URLs point back at the
/// stub server.
pub fn dune_odm(base_url: &str, expiry: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<OverDriveMedia id="12345">
  <License>
    <AcquisitionUrl>{base_url}/AcquireLicense</AcquisitionUrl>
  </License>
  <DrmInfo>
    <ExpirationDate>{expiry}</ExpirationDate>
  </DrmInfo>
  <Formats>
    <Format name="OverDrive MP3 Audiobook">
      <Protocols>
        <Protocol method="download" baseurl="{base_url}/parts"/>
      </Protocols>
      <Parts count="2">
        <Part number="1" name="Part 1" filename="Dune-Part01.mp3" duration="31:30"/>
        <Part number="2" name="Part 2" filename="Dune-Part02.mp3" duration="29:03"/>
      </Parts>
    </Format>
  </Formats>
  <![CDATA[<Metadata><Title>Dune</Title><Creators><Creator role="Author">Frank Herbert</Creator></Creators></Metadata>]]>
</OverDriveMedia>"#
    )
}

/// The payload the stub serves for a part file.
pub fn part_payload(filename: &str) -> Vec<u8> {
    format!("audio-bytes-{}", filename).into_bytes()
}

/// One timed chunk of a streamed part body.
pub fn streamed_chunk(index: usize) -> Vec<u8> {
    format!("chunk-{:02};", index).into_bytes()
}

/// The full body a [`StreamPlan`] with `chunks` pieces delivers.
pub fn streamed_payload(chunks: usize) -> Vec<u8> {
    (0..chunks).flat_map(streamed_chunk).collect()
}

async fn sign_in_page() -> impl IntoResponse {
    concat!(
        "<html><head></head><body>\n<script>\n",
        "window.OverDrive = window.OverDrive || {};\n",
        r#"window.OverDrive.loginForms = {"forms": [{"ilsName": "test-ils", "type": "Local"}]};"#,
        "\n</script>\n</body></html>"
    )
}

async fn login(State(state): State<Arc<PortalState>>) -> impl IntoResponse {
    state.login_hits.fetch_add(1, Ordering::SeqCst);
    let mut headers = HeaderMap::new();
    if state.login_grants_session.load(Ordering::SeqCst) {
        // Max-Age makes the cookie persistent so it survives a jar save.
        headers.insert(
            header::SET_COOKIE,
            format!("{}; Path=/; Max-Age=86400", SESSION_COOKIE)
                .parse()
                .unwrap(),
        );
    }
    (headers, "<html></html>")
}

async fn account(State(state): State<Arc<PortalState>>, headers: HeaderMap) -> impl IntoResponse {
    state.account_hits.fetch_add(1, Ordering::SeqCst);
    let has_session = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains(SESSION_COOKIE))
        .unwrap_or(false);
    if has_session {
        r#"{"email": "patron@example.com", "cardNumber": "1234567890"}"#
    } else {
        r#"{"sessionExpired": true}"#
    }
}

async fn loans_page(State(state): State<Arc<PortalState>>) -> impl IntoResponse {
    state.loans_hits.fetch_add(1, Ordering::SeqCst);
    let items = state.loans_items.lock().unwrap().clone();
    format!(
        "<html><body>\n<script>\nwindow.OverDrive.mediaItems = {};\n</script>\n</body></html>",
        items
    )
}

async fn descriptor(
    State(state): State<Arc<PortalState>>,
    Path(media_id): Path<String>,
) -> impl IntoResponse {
    state.descriptor_hits.fetch_add(1, Ordering::SeqCst);
    if media_id == "12345" {
        (StatusCode::OK, state.odm_body.lock().unwrap().clone())
    } else {
        (StatusCode::NOT_FOUND, String::new())
    }
}

async fn acquire_license(
    State(state): State<Arc<PortalState>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    state.acquire_hits.fetch_add(1, Ordering::SeqCst);
    let client_id = query.get("ClientID").cloned().unwrap_or_default();
    *state.acquire_query.lock().unwrap() = Some(query);

    if state.reject_license.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            "<LicenseError><ErrorCode>ClientIDInvalid</ErrorCode><ErrorMessage>Client ID not accepted</ErrorMessage></LicenseError>"
                .to_string(),
        );
    }

    // Single line: the client later sends the license verbatim as a header.
    let body = format!(
        r#"<License xmlns="http://license.overdrive.com/2008/03/License"><SignedInfo Version="1"><ContentID>12345</ContentID><ClientID>{}</ClientID></SignedInfo><Signature>c2ln</Signature></License>"#,
        client_id
    );
    (StatusCode::OK, body)
}

async fn media_part(
    State(state): State<Arc<PortalState>>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.part_hits.fetch_add(1, Ordering::SeqCst);

    let captured: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();
    *state.part_headers.lock().unwrap() = Some(captured);

    if state.broken_parts.lock().unwrap().contains(&filename) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    if let Some(plan) = *state.part_stream_plan.lock().unwrap() {
        let body = Body::from_stream(stream::unfold(0usize, move |i| async move {
            if i >= plan.chunks {
                return None;
            }
            if i > 0 {
                tokio::time::sleep(plan.interval).await;
            }
            Some((Ok::<_, std::io::Error>(Bytes::from(streamed_chunk(i))), i + 1))
        }));
        return body.into_response();
    }

    (StatusCode::OK, part_payload(&filename)).into_response()
}
