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


//! Auth handshake against the lending portal
//!
//! The portal has no token API; authentication is plain session cookies. A
//! login is a form POST naming the library's identity provider (the "ILS"),
//! which is itself discovered by scraping the sign-in page. Session validity
//! is probed through the account-info endpoint: an explicit `sessionExpired`
//! flag means log in again, identity fields (`email` / `lastHoldEmail`) mean
//! the session is live, and anything else is an unrecoverable authentication
//! failure.

use serde::Deserialize;
use tracing::{debug, info};

use crate::api::client::{OverdriveClient, ACCOUNT_PATH, LOGIN_PATH, SIGN_IN_PATH};
use crate::api::scrape;
use crate::error::{OverdriveError, Result};

/// Marker variable carrying the sign-in page's login-form configuration
const LOGIN_FORMS_MARKER: &str = "window.OverDrive.loginForms";

/// Account-info response, reduced to the fields the validity check reads
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    /// Explicit server-side "this session is gone" flag
    #[serde(rename = "sessionExpired", default)]
    pub session_expired: Option<bool>,
    #[serde(default)]
    pub email: Option<String>,
    /// Present on accounts that only ever configured a hold-notification address
    #[serde(rename = "lastHoldEmail", default)]
    pub last_hold_email: Option<String>,
}

impl AccountInfo {
    /// Whether the response carries any identity field
    pub fn has_identity(&self) -> bool {
        self.email.is_some() || self.last_hold_email.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct LoginForms {
    forms: Vec<LoginForm>,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(rename = "ilsName")]
    ils_name: String,
}

impl OverdriveClient {
    /// Fetch the account-info document for this session.
    pub async fn account_info(&self) -> Result<AccountInfo> {
        let body = self.get_text(ACCOUNT_PATH).await?;
        serde_json::from_str(&body).map_err(|e| {
            OverdriveError::auth_failed(
                format!("account info was not json: {}", e),
                self.base_url(),
            )
        })
    }

    /// Probe whether the persisted session is still accepted by the server.
    ///
    /// Returns `Ok(false)` only for an explicit session-expired flag. A
    /// response with neither an expiry flag nor identity fields is an
    /// unrecoverable authentication failure, not a "try logging in" signal.
    pub async fn is_session_valid(&self) -> Result<bool> {
        let account = self.account_info().await?;
        if account.session_expired == Some(true) {
            debug!(library = %self.base_url(), "server declared session expired");
            return Ok(false);
        }
        if account.has_identity() {
            return Ok(true);
        }
        Err(OverdriveError::auth_failed(
            "account info had neither identity fields nor an expiry flag",
            self.base_url(),
        ))
    }

    /// Discover the library's identity-provider name from the sign-in page.
    ///
    /// The page embeds its login-form configuration as a one-line JSON
    /// assignment; the first configured form names the ILS the login POST
    /// must reference. Page-shape drift fails loudly here.
    pub async fn discover_ils_name(&self) -> Result<String> {
        let html = self.get_text(SIGN_IN_PATH).await?;
        let forms: LoginForms = scrape::extract_assignment_json(&html, LOGIN_FORMS_MARKER, "sign-in")?;
        forms
            .forms
            .into_iter()
            .next()
            .map(|f| f.ils_name)
            .ok_or_else(|| {
                OverdriveError::page_shape(LOGIN_FORMS_MARKER, "sign-in", "no login forms configured")
            })
    }

    /// POST patron credentials; the server answers by setting session cookies.
    pub async fn login(&self) -> Result<()> {
        info!(library = %self.base_url(), "logging in");
        let ils_name = self.discover_ils_name().await?;

        let mut form: Vec<(&str, &str)> = vec![
            ("ilsName", ils_name.as_str()),
            ("authType", "Local"),
            ("libraryName", ""),
            ("username", self.card_number.as_str()),
        ];
        if let Some(ref password) = self.password {
            form.push(("password", password));
        }

        self.http
            .post(self.url(LOGIN_PATH))
            .form(&form)
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_info_identity_fields() {
        let with_email: AccountInfo =
            serde_json::from_str(r#"{"email": "patron@example.com"}"#).unwrap();
        assert!(with_email.has_identity());
        assert_ne!(with_email.session_expired, Some(true));

        let hold_only: AccountInfo =
            serde_json::from_str(r#"{"lastHoldEmail": "patron@example.com"}"#).unwrap();
        assert!(hold_only.has_identity());

        let expired: AccountInfo =
            serde_json::from_str(r#"{"sessionExpired": true}"#).unwrap();
        assert_eq!(expired.session_expired, Some(true));
        assert!(!expired.has_identity());
    }

    #[test]
    fn account_info_tolerates_extra_fields() {
        let info: AccountInfo = serde_json::from_str(
            r#"{"email": "p@example.com", "cardNumber": "1234", "holds": []}"#,
        )
        .unwrap();
        assert!(info.has_identity());
    }

    #[test]
    fn login_forms_take_first_ils() {
        let forms: LoginForms = serde_json::from_str(
            r#"{"forms": [{"ilsName": "main-ils", "type": "Local"}, {"ilsName": "other"}]}"#,
        )
        .unwrap();
        assert_eq!(forms.forms[0].ils_name, "main-ils");
    }

    #[test]
    fn login_path_is_used_verbatim() {
        // The forward parameter is pre-encoded in the constant; it must not
        // be double-encoded by URL assembly.
        assert!(LOGIN_PATH.contains("forwardUrl=%2F"));
    }
}
