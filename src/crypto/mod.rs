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


//! License-request authorization hash
//!
//! The license server authorizes an acquisition request with a keyed hash over
//! the client identity and two fixed version strings. The computation must be
//! bit-exact with the server's validator: pipe-separated concatenation, encoded
//! as UTF-16 little-endian, SHA-1 digested, base64 encoded. Any deviation in
//! byte order, separator or casing gets the request rejected with a 400/404.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::{Digest, Sha1};

/// OMC version string sent with every license request
pub const OMC_VERSION: &str = "1.2.0";

/// OS version string sent with every license request
pub const OS_VERSION: &str = "10.11.6";

/// The vendor's magic constant, stored reversed ("OVERDRIVE*MEDIA*CONSOLE")
const HASH_SECRET: &str = "ELOSNOC*AIDEM*EVIRDREVO";

/// Compute the authorization hash for a license acquisition request.
///
/// `client_id` is the uppercase UUID this client identifies itself with; the
/// same value must be sent in the request's `ClientID` query parameter.
pub fn license_hash(client_id: &str) -> String {
    let raw = format!(
        "{}|{}|{}|{}",
        client_id, OMC_VERSION, OS_VERSION, HASH_SECRET
    );

    let utf16le: Vec<u8> = raw
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();

    let digest = Sha1::digest(&utf16le);
    BASE64.encode(digest)
}
