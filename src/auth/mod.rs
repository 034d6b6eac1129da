//! Obtaining a user access token for the bookmarks API.

use crate::config_store::{ConfigStore, ACCESS_TOKEN_KEY};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

pub mod browser;
pub mod oauth;
pub mod pkce;
pub mod wait;

pub use browser::{BrowserAuthorizer, BrowserDriver, ChromiumBrowser, ManualStepWindows};
pub use oauth::{OAuth2UserHandler, OAuthError};
pub use pkce::PkceChallenge;

/// Opaque OAuth2 bearer token
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Source of the access token used by the bookmark reader
#[async_trait(?Send)]
pub trait TokenProvider {
    async fn obtain_token(&self) -> Result<AccessToken>;
}

/// Reuses the token an earlier authorization stored in the config file
pub struct StoredTokenProvider {
    token: Option<String>,
    source: String,
}

impl StoredTokenProvider {
    pub fn from_store(store: &ConfigStore) -> Self {
        Self {
            token: store.get(ACCESS_TOKEN_KEY).map(str::to_string),
            source: store.path().display().to_string(),
        }
    }
}

#[async_trait(?Send)]
impl TokenProvider for StoredTokenProvider {
    async fn obtain_token(&self) -> Result<AccessToken> {
        self.token.clone().map(AccessToken::new).with_context(|| {
            format!(
                "No '{ACCESS_TOKEN_KEY}' stored in {source}. Run the authorize step first",
                source = self.source
            )
        })
    }
}
