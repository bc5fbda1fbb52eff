//! OAuth2 refresh-token exchange.
//!
//! The token endpoint expects an `application/x-www-form-urlencoded` POST
//! with a handful of partner-specific form values and a mobile user-agent.

use reqwest::Client;
use serde::Deserialize;

use crate::core::http::execute_with_retry;
use crate::core::metrics::RunMetrics;
use crate::error::{Result, UsageError};

/// OAuth2 token endpoint.
pub const TOKEN_URL: &str = "https://xerxes-sub.xerxessecure.com/xerxes-ctrl/oauth/token";

const TOKEN_USER_AGENT: &str =
    "Dalvik/2.1.0 (Linux; U; Android 14; SM-G991B Build/G991BXXUEGXJE";

/// Extra form values the endpoint requires alongside the grant.
const TOKEN_EXTRA_VALUES: [(&str, &str); 5] = [
    ("active_x1_account_count", "true"),
    ("partner_id", "comcast"),
    ("mso_partner_hint", "true"),
    ("scope", "profile"),
    ("rm_hint", "true"),
];

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Exchange a refresh token for an access token at the production endpoint.
///
/// # Errors
///
/// Returns [`UsageError::TokenRefresh`] on transport failure, non-200 status,
/// or an unparsable response body.
pub async fn refresh(
    client: &Client,
    metrics: &RunMetrics,
    refresh_token: &str,
    client_id: &str,
    client_secret: &str,
    application_id: &str,
) -> Result<Token> {
    refresh_at(
        client,
        metrics,
        TOKEN_URL,
        refresh_token,
        client_id,
        client_secret,
        application_id,
    )
    .await
}

/// Exchange a refresh token for an access token at the given endpoint.
///
/// # Errors
///
/// Same failure modes as [`refresh`].
pub async fn refresh_at(
    client: &Client,
    metrics: &RunMetrics,
    url: &str,
    refresh_token: &str,
    client_id: &str,
    client_secret: &str,
    application_id: &str,
) -> Result<Token> {
    let mut form: Vec<(&str, &str)> = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];
    if !application_id.is_empty() {
        form.push(("application_id", application_id));
    }
    form.extend_from_slice(&TOKEN_EXTRA_VALUES);

    let request = client
        .post(url)
        .header("User-Agent", TOKEN_USER_AGENT)
        .form(&form)
        .build()
        .map_err(|e| UsageError::TokenRefresh {
            status: None,
            message: format!("failed to build request: {e}"),
        })?;

    let response = execute_with_retry(client, request, metrics)
        .await
        .map_err(|e| UsageError::TokenRefresh {
            status: None,
            message: e.to_string(),
        })?;

    let status = response.status();
    let body = response.bytes().await.map_err(|e| UsageError::TokenRefresh {
        status: Some(status.as_u16()),
        message: format!("failed to read response body: {e}"),
    })?;

    if !status.is_success() {
        return Err(UsageError::TokenRefresh {
            status: Some(status.as_u16()),
            message: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    serde_json::from_slice(&body).map_err(|e| UsageError::TokenRefresh {
        status: Some(status.as_u16()),
        message: format!("failed to parse token response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_parses_without_expiry() {
        let token: Token = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.expires_in.is_none());
    }

    #[test]
    fn token_response_parses_full() {
        let token: Token =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":3600,"scope":"profile"}"#)
                .unwrap();
        assert_eq!(token.expires_in, Some(3600));
    }
}
