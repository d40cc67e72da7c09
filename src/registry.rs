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


//! Multi-library registry
//!
//! A patron typically holds cards at several libraries. The registry persists
//! the configured libraries as pretty-printed JSON at
//! `<data_dir>/libraries.json` and fans client construction and loan listing
//! out across all of them concurrently. One library failing (bad credentials,
//! portal down) never hides the others' results: every fan-out returns
//! per-library outcomes, not a single collapsed `Result`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::client::normalize_base_url;
use crate::api::{ClientOptions, Loan, OverdriveClient};
use crate::error::{OverdriveError, Result};

/// One configured library card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Portal URL, or the short form patrons type ("cityname")
    pub url: String,
    /// Library card number
    pub username: String,
    /// PIN, for libraries that require one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// The set of configured libraries, persisted to `libraries.json`
#[derive(Debug)]
pub struct LibraryRegistry {
    path: PathBuf,
    libraries: Vec<LibraryConfig>,
}

impl LibraryRegistry {
    /// Load the registry, treating a missing file as an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let libraries = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };
        Ok(Self { path, libraries })
    }

    /// Persist the registry as pretty-printed JSON.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.libraries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Add or replace a library, keyed by normalized URL.
    pub fn add(&mut self, config: LibraryConfig) -> Result<()> {
        let normalized = normalize_base_url(&config.url)?;
        self.libraries
            .retain(|l| normalize_base_url(&l.url).ok().as_deref() != Some(&normalized));
        self.libraries.push(config);
        Ok(())
    }

    /// Remove a library by URL; returns whether anything was removed.
    pub fn remove(&mut self, url: &str) -> Result<bool> {
        let normalized = normalize_base_url(url)?;
        let before = self.libraries.len();
        self.libraries
            .retain(|l| normalize_base_url(&l.url).ok().as_deref() != Some(&normalized));
        Ok(self.libraries.len() != before)
    }

    pub fn libraries(&self) -> &[LibraryConfig] {
        &self.libraries
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Connect to every configured library concurrently.
    ///
    /// Each library gets its own cookie file under the data directory, so
    /// concurrent sessions never contend on one jar. The returned outcomes
    /// have exactly one entry per configured library, in configured order; a
    /// worker that dies without an answer is recorded as that library's
    /// failure, never dropped.
    pub async fn connect_all(
        &self,
        options: &ClientOptions,
    ) -> Vec<(LibraryConfig, Result<Arc<OverdriveClient>>)> {
        let mut pending = Vec::with_capacity(self.libraries.len());
        for config in self.libraries.iter().cloned() {
            let options = per_library_options(options, &config);
            let worker = tokio::spawn({
                let config = config.clone();
                async move { OverdriveClient::connect(config, options).await.map(Arc::new) }
            });
            pending.push((config, worker));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for (config, worker) in pending {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => Err(OverdriveError::TaskFailed(format!(
                    "connection worker for {}: {}",
                    config.url, e
                ))),
            };
            match &outcome {
                Ok(_) => info!(library = %config.url, "library connected"),
                Err(e) => warn!(library = %config.url, error = %e, "library connection failed"),
            }
            outcomes.push((config, outcome));
        }
        outcomes
    }
}

/// Loans from every connected library, fetched concurrently.
///
/// Returns (library base URL, outcome) per client, one entry per input in
/// input order.
pub async fn all_loans(
    clients: &[Arc<OverdriveClient>],
) -> Vec<(String, Result<HashMap<String, Loan>>)> {
    let pending: Vec<_> = clients
        .iter()
        .cloned()
        .map(|client| {
            let url = client.base_url().to_string();
            let worker = tokio::spawn(async move { client.get_loans().await });
            (url, worker)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(pending.len());
    for (url, worker) in pending {
        let outcome = match worker.await {
            Ok(loans) => loans,
            Err(e) => Err(OverdriveError::TaskFailed(format!(
                "loan listing worker for {}: {}",
                url, e
            ))),
        };
        outcomes.push((url, outcome));
    }
    outcomes
}

/// Give each library a cookie file of its own, keyed by host.
fn per_library_options(base: &ClientOptions, config: &LibraryConfig) -> ClientOptions {
    let key: String = config
        .url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let cookie_file = base.data_dir.join(format!("cookiejar-{}", key));
    ClientOptions::new(&base.data_dir, &base.download_dir).cookie_file(cookie_file)
}

/// Default registry path under a data directory.
pub fn registry_path(data_dir: &Path) -> PathBuf {
    data_dir.join("libraries.json")
}
