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


//! On-disk state: session cookies and license-artifact cache layout
//!
//! Everything the client persists lives under a single data directory:
//!
//! ```text
//! <data_dir>/cookiejar            session cookies (JSON cookie-jar format)
//! <data_dir>/lic/<media_id>.odm   cached media descriptor, stored verbatim
//! <data_dir>/lic/<media_id>.lic   cached signed license, stored verbatim
//! <data_dir>/libraries.json       configured libraries (registry)
//! ```
//!
//! A session is reusable across process restarts until the server declares it
//! expired, so the cookie jar is loaded at client construction and saved after
//! any login. Any I/O error on the data directory is fatal to construction;
//! there is no in-memory-only fallback.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;
use tracing::debug;

use crate::error::{OverdriveError, Result};

/// Persistent cookie jar backing one client's session.
///
/// The jar is shared with the HTTP client as a `reqwest` cookie provider, so
/// cookies set by login responses land here and [`SessionStore::save`] flushes
/// them to disk.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    jar: Arc<CookieStoreMutex>,
}

impl SessionStore {
    /// Load the cookie jar at `path`, creating an empty persisted store if
    /// none exists yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let jar = if path.is_file() {
            let reader = BufReader::new(fs::File::open(&path)?);
            let store = CookieStore::load_json(reader)
                .map_err(|e| OverdriveError::SessionStore(e.to_string()))?;
            debug!(path = %path.display(), "loaded cookie jar");
            Arc::new(CookieStoreMutex::new(store))
        } else {
            Arc::new(CookieStoreMutex::new(CookieStore::default()))
        };

        let store = Self { path, jar };
        if !store.path.is_file() {
            // First use: persist the empty jar so later loads see a file.
            store.save()?;
        }
        Ok(store)
    }

    /// The shared jar, for wiring into a `reqwest` client builder.
    pub fn jar(&self) -> Arc<CookieStoreMutex> {
        Arc::clone(&self.jar)
    }

    /// Flush the current cookies to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(fs::File::create(&self.path)?);
        let store = self
            .jar
            .lock()
            .map_err(|e| OverdriveError::SessionStore(format!("cookie jar poisoned: {}", e)))?;
        store
            .save_json(&mut writer)
            .map_err(|e| OverdriveError::SessionStore(e.to_string()))?;
        debug!(path = %self.path.display(), "saved cookie jar");
        Ok(())
    }

    /// Where the jar is persisted
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Cache paths for one client's license artifacts.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    data_dir: PathBuf,
}

impl CacheLayout {
    /// Create the layout rooted at `data_dir`, making the directories if
    /// needed. Failure here is fatal to client construction.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(data_dir.join("lic"))?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Session cookie file (one per client, or shared across clients at the
    /// caller's choice)
    pub fn cookie_path(&self) -> PathBuf {
        self.data_dir.join("cookiejar")
    }

    /// Cached media descriptor for `media_id`
    pub fn odm_path(&self, media_id: &str) -> PathBuf {
        self.data_dir.join("lic").join(format!("{}.odm", media_id))
    }

    /// Cached signed license for `media_id`, alongside but independent of the
    /// descriptor file
    pub fn license_path(&self, media_id: &str) -> PathBuf {
        self.data_dir.join("lic").join(format!("{}.lic", media_id))
    }

    /// Configured-libraries file used by the registry
    pub fn libraries_path(&self) -> PathBuf {
        self.data_dir.join("libraries.json")
    }
}
