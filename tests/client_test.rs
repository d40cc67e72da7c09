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


//! Session establishment and loan listing against a stub portal

mod common;

use std::sync::atomic::Ordering;

use tempfile::TempDir;

use common::{client_options, library, spawn_portal};
use overdrive_core::api::OverdriveClient;
use overdrive_core::error::OverdriveError;

#[tokio::test]
async fn connect_logs_in_and_persists_cookies() {
    let portal = spawn_portal().await;
    let dir = TempDir::new().unwrap();

    let client = OverdriveClient::connect(library(&portal.base_url), client_options(dir.path()))
        .await
        .unwrap();

    assert_eq!(client.base_url(), portal.base_url);
    assert_eq!(portal.state.login_hits.load(Ordering::SeqCst), 1);

    // The session cookie must survive the process: persisted to the jar file.
    let jar = std::fs::read_to_string(dir.path().join("data").join("cookiejar")).unwrap();
    assert!(jar.contains("session"), "cookie jar should hold the session cookie: {}", jar);
}

#[tokio::test]
async fn second_connect_reuses_persisted_session() {
    let portal = spawn_portal().await;
    let dir = TempDir::new().unwrap();

    OverdriveClient::connect(library(&portal.base_url), client_options(dir.path()))
        .await
        .unwrap();
    assert_eq!(portal.state.login_hits.load(Ordering::SeqCst), 1);

    // Same state directory: the restored cookies validate, no second login.
    OverdriveClient::connect(library(&portal.base_url), client_options(dir.path()))
        .await
        .unwrap();
    assert_eq!(portal.state.login_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_login_is_a_credential_error() {
    let portal = spawn_portal().await;
    portal
        .state
        .login_grants_session
        .store(false, Ordering::SeqCst);
    let dir = TempDir::new().unwrap();

    let err = OverdriveClient::connect(library(&portal.base_url), client_options(dir.path()))
        .await
        .unwrap_err();

    assert!(err.is_credential_error(), "expected credential error, got {:?}", err);
    assert!(matches!(err, OverdriveError::AuthenticationFailed { .. }));
    // It did try to log in before giving up.
    assert_eq!(portal.state.login_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn each_client_gets_a_fresh_uppercase_client_id() {
    let portal = spawn_portal().await;
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let a = OverdriveClient::connect(library(&portal.base_url), client_options(dir_a.path()))
        .await
        .unwrap();
    let b = OverdriveClient::connect(library(&portal.base_url), client_options(dir_b.path()))
        .await
        .unwrap();

    assert_ne!(a.client_id(), b.client_id());
    assert_eq!(a.client_id(), a.client_id().to_uppercase());
    assert_eq!(a.client_id().len(), 36);
}

#[tokio::test]
async fn loans_come_back_keyed_by_media_id() {
    let portal = spawn_portal().await;
    let dir = TempDir::new().unwrap();

    let client = OverdriveClient::connect(library(&portal.base_url), client_options(dir.path()))
        .await
        .unwrap();

    let loans = client.get_loans().await.unwrap();
    assert_eq!(loans.len(), 1);
    let dune = &loans["12345"];
    assert_eq!(dune.title, "Dune");
    assert_eq!(dune.first_creator_name, "Frank Herbert");
    assert_eq!(dune.genres(), "Science Fiction");
}

#[tokio::test]
async fn loans_are_fetched_fresh_every_call() {
    let portal = spawn_portal().await;
    let dir = TempDir::new().unwrap();

    let client = OverdriveClient::connect(library(&portal.base_url), client_options(dir.path()))
        .await
        .unwrap();

    client.get_loans().await.unwrap();
    // The title gets returned from another device.
    *portal.state.loans_items.lock().unwrap() = "{}".to_string();
    let loans = client.get_loans().await.unwrap();
    assert!(loans.is_empty());
    assert_eq!(portal.state.loans_hits.load(Ordering::SeqCst), 2);
}
