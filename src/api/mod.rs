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


//! Client-side protocol for a library's OverDrive lending portal

mod auth;
pub(crate) mod client;
mod content;
mod library;
mod license;
mod scrape;

pub use auth::AccountInfo;
pub use client::{ClientOptions, OverdriveClient, USER_AGENT};
pub use content::{DrmInfo, MediaDescriptor, MediaFormat, Part, TitleMetadata};
pub use library::{Loan, Subject};
pub use license::License;
