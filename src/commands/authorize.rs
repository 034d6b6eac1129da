use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::auth::{
    AccessToken, BrowserAuthorizer, ChromiumBrowser, ManualStepWindows, OAuth2UserHandler,
    StoredTokenProvider, TokenProvider,
};
use crate::config_store::{ConfigStore, ACCESS_TOKEN_KEY, CLIENT_ID_KEY, CLIENT_SECRET_KEY};

/// Settings for one authorization run
#[derive(Debug, Clone, Default)]
pub struct AuthorizeOptions {
    /// Overrides `client-id` from the config file
    pub client_id: Option<String>,
    /// Overrides `client-secret` from the config file
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub windows: ManualStepWindows,
    /// Skip the browser when the config file already holds a token
    pub reuse_token: bool,
}

/// App credentials with command line values taking precedence over the file
pub fn resolve_credentials(
    store: &ConfigStore,
    options: &AuthorizeOptions,
) -> Result<(String, Option<String>)> {
    let client_id = match options.client_id.as_deref().filter(|s| !s.is_empty()) {
        Some(id) => id.to_string(),
        None => store
            .require(CLIENT_ID_KEY)
            .context("Twitter app client id missing. Pass --client-id or add it to the config file")?
            .to_string(),
    };

    let client_secret = options
        .client_secret
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| store.get(CLIENT_SECRET_KEY).map(str::to_string));

    Ok((client_id, client_secret))
}

/// Obtains an access token and stores it in the config file
pub async fn execute(config_path: &Path, options: &AuthorizeOptions) -> Result<AccessToken> {
    let mut store = ConfigStore::load(config_path)?;

    if options.reuse_token && store.get(ACCESS_TOKEN_KEY).is_some() {
        info!(
            "Reusing access token stored in {path}",
            path = config_path.display()
        );
        return StoredTokenProvider::from_store(&store).obtain_token().await;
    }

    let (client_id, client_secret) = resolve_credentials(&store, options)?;
    debug!(
        "Authorizing client {client_id} ({kind} client)",
        kind = if client_secret.is_some() {
            "confidential"
        } else {
            "public"
        }
    );

    let mut oauth = OAuth2UserHandler::new(client_id, client_secret)?;
    if let Some(redirect_uri) = &options.redirect_uri {
        oauth = oauth.with_redirect_uri(redirect_uri.clone());
    }

    let browser = ChromiumBrowser::launch().await?;
    let token = BrowserAuthorizer::new(browser, oauth, options.windows)
        .obtain_token()
        .await
        .context("Authorization failed")?;

    store
        .persist_value(ACCESS_TOKEN_KEY, token.secret())
        .context("Failed to store access token")?;
    info!(
        "Access token saved to {path}",
        path = config_path.display()
    );

    Ok(token)
}
