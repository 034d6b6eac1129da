use super::pkce::{PkceChallenge, CHALLENGE_METHOD};
use super::AccessToken;
use crate::error_utils::{create_http_client_with_context, parse_http_response_json};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
pub const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
pub const DEFAULT_REDIRECT_URI: &str = "https://www.twitter.com/oauth/twitter";
/// Minimal scopes for reading bookmarks
pub const DEFAULT_SCOPES: &[&str] = &["bookmark.read", "bookmark.write", "tweet.read", "users.read"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OAuthError {
    #[error("Invalid authorization response URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Authorization denied: {error} {description}")]
    Denied { error: String, description: String },

    #[error("State mismatch in authorization response")]
    StateMismatch,

    #[error("No authorization code in {url}; the consent step was probably not completed in time")]
    MissingCode { url: String },

    #[error("Token exchange failed (status {status}): {message}")]
    TokenExchange { status: u16, message: String },
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: AccessToken,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    pub refresh_token: Option<AccessToken>,
}

/// OAuth 2.0 authorization code flow with PKCE for a Twitter app
pub struct OAuth2UserHandler {
    client: Client,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    scopes: Vec<String>,
    token_url: String,
}

impl OAuth2UserHandler {
    /// Creates a handler; a client secret makes it a confidential client
    /// that authenticates to the token endpoint with HTTP Basic auth.
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> Result<Self> {
        Ok(Self {
            client: create_http_client_with_context(Duration::from_secs(30))?,
            client_id: client_id.into(),
            client_secret: client_secret.filter(|s| !s.is_empty()),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            token_url: TOKEN_URL.to_string(),
        })
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// URL the user has to open to grant access
    pub fn authorization_url(&self, pkce: &PkceChallenge) -> Result<Url> {
        let scope = self.scopes.join(" ");
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", pkce.state()),
                ("code_challenge", pkce.challenge()),
                ("code_challenge_method", CHALLENGE_METHOD),
            ],
        )
        .context("Failed to build authorization URL")
    }

    /// Whether the browser has landed on the redirect after consent.
    ///
    /// Only the path is compared, since twitter.com forwards to x.com and the
    /// host the browser ends up on differs from the registered one.
    pub fn is_authorization_response(&self, url: &str) -> bool {
        let (Ok(landed), Ok(expected)) = (Url::parse(url), Url::parse(&self.redirect_uri)) else {
            return false;
        };
        landed.path().trim_end_matches('/') == expected.path().trim_end_matches('/')
            && landed
                .query_pairs()
                .any(|(key, _)| key == "code" || key == "error")
    }

    /// Extracts the authorization code from the URL the browser was
    /// redirected to, checking the state round-tripped unchanged.
    pub fn parse_authorization_response(
        &self,
        response_url: &str,
        expected_state: &str,
    ) -> Result<String, OAuthError> {
        let url = Url::parse(response_url).map_err(|e| OAuthError::InvalidUrl {
            url: response_url.to_string(),
            reason: e.to_string(),
        })?;

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        if let Some(error) = params.get("error") {
            return Err(OAuthError::Denied {
                error: error.clone(),
                description: params
                    .get("error_description")
                    .cloned()
                    .unwrap_or_default(),
            });
        }

        let Some(code) = params.get("code") else {
            let mut shown = url.clone();
            shown.set_query(None);
            return Err(OAuthError::MissingCode {
                url: shown.to_string(),
            });
        };

        if params.get("state").map(String::as_str) != Some(expected_state) {
            return Err(OAuthError::StateMismatch);
        }

        Ok(code.clone())
    }

    /// Exchanges the authorization response for an access token
    pub async fn fetch_token(
        &self,
        response_url: &str,
        pkce: &PkceChallenge,
    ) -> Result<TokenResponse> {
        let code = self.parse_authorization_response(response_url, pkce.state())?;
        debug!("Exchanging authorization code at {url}", url = self.token_url);

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", pkce.verifier()),
            ("client_id", self.client_id.as_str()),
        ];

        let mut request = self.client.post(&self.token_url).form(&form);
        if let Some(secret) = &self.client_secret {
            request = request.basic_auth(&self.client_id, Some(secret));
        }

        let response = request
            .send()
            .await
            .context("Failed to reach the OAuth2 token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenExchange {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let token: TokenResponse = parse_http_response_json(response, "OAuth2 token").await?;
        info!(
            "Obtained {token_type} access token (expires in {expires_in:?}s, scope: {scope})",
            token_type = token.token_type,
            expires_in = token.expires_in,
            scope = token.scope.as_deref().unwrap_or("unknown")
        );
        Ok(token)
    }
}
