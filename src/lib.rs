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


//! Client library for OverDrive library-lending portals
//!
//! Authenticates a patron against one or more library portals with plain
//! session cookies, lists current loans, acquires download licenses for
//! checked-out audiobooks, and streams their parts to disk. Sessions,
//! descriptors, and licenses are cached on disk so repeat runs stay off the
//! network.
//!
//! Entry points: [`api::OverdriveClient::connect`] for one library, or
//! [`registry::LibraryRegistry`] to manage and fan out across several.

pub mod api;
pub mod crypto;
pub mod download;
pub mod error;
pub mod registry;
pub mod storage;

pub use api::{ClientOptions, Loan, MediaDescriptor, OverdriveClient};
pub use download::{DownloadProgress, DownloadReport, PartSelection};
pub use error::{OverdriveError, Result};
pub use registry::{LibraryConfig, LibraryRegistry};
