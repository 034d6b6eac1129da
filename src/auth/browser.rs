//! Interactive login and consent through a real browser window.

use super::oauth::OAuth2UserHandler;
use super::pkce::PkceChallenge;
use super::wait::wait_until;
use super::{AccessToken, TokenProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const LOGIN_URL: &str = "https://twitter.com/i/flow/login";
/// Cookie Twitter sets once the user is logged in
pub const SESSION_COOKIE: &str = "auth_token";

/// The few browser operations the authorization flow needs
#[async_trait(?Send)]
pub trait BrowserDriver {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<Option<String>>;
    async fn has_cookie(&self, name: &str) -> Result<bool>;
    async fn close(&self) -> Result<()>;
}

/// Visible Chrome instance driven over the DevTools protocol
pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    page: Page,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumBrowser {
    /// Launches Chrome with a window the user can type into
    pub async fn launch() -> Result<Self> {
        info!("Launching browser for login");

        let config = BrowserConfig::builder()
            .with_head()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--incognito")
            .arg("--disable-infobars")
            .arg("--disable-notifications")
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chrome")?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open a browser tab")?;

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler: Mutex::new(Some(handle)),
        })
    }
}

#[async_trait(?Send)]
impl BrowserDriver for ChromiumBrowser {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>> {
        self.page
            .url()
            .await
            .context("Failed to read the current page URL")
    }

    async fn has_cookie(&self, name: &str) -> Result<bool> {
        // HttpOnly cookies such as auth_token are only visible over CDP
        let cookies = self
            .page
            .get_cookies()
            .await
            .context("Failed to read browser cookies")?;
        Ok(cookies.iter().any(|c| c.name == name))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("Failed to close browser")?;
        browser.wait().await.context("Failed to wait for browser exit")?;

        if let Some(handle) = self.handler.lock().await.take() {
            handle.await.context("Browser event handler panicked")?;
        }
        debug!("Browser closed");
        Ok(())
    }
}

/// How long to wait for each manual step
#[derive(Debug, Clone, Copy)]
pub struct ManualStepWindows {
    /// Time the user has to log in
    pub login: Duration,
    /// Time the user has to click "Authorize app"
    pub authorize: Duration,
    pub poll_interval: Duration,
}

impl Default for ManualStepWindows {
    fn default() -> Self {
        Self {
            login: Duration::from_secs(60),
            authorize: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Obtains a token by walking the user through login and consent in a
/// browser, then exchanging the redirect for a token.
pub struct BrowserAuthorizer<D> {
    driver: D,
    oauth: OAuth2UserHandler,
    windows: ManualStepWindows,
}

impl<D: BrowserDriver> BrowserAuthorizer<D> {
    pub fn new(driver: D, oauth: OAuth2UserHandler, windows: ManualStepWindows) -> Self {
        Self {
            driver,
            oauth,
            windows,
        }
    }

    async fn authorize(&self) -> Result<AccessToken> {
        let driver = &self.driver;

        info!(
            "Log in to Twitter in the browser window within {secs}s",
            secs = self.windows.login.as_secs()
        );
        driver.goto(LOGIN_URL).await?;

        let logged_in = wait_until(
            "Login",
            self.windows.login,
            self.windows.poll_interval,
            move || async move { driver.has_cookie(SESSION_COOKIE).await.unwrap_or(false) },
        )
        .await;
        if !logged_in {
            warn!("No login session detected, requesting authorization anyway");
        }

        let pkce = PkceChallenge::generate();
        let authorization_url = self.oauth.authorization_url(&pkce)?;

        info!(
            "Click \"Authorize app\" in the browser window within {secs}s",
            secs = self.windows.authorize.as_secs()
        );
        driver.goto(authorization_url.as_str()).await?;

        let oauth = &self.oauth;
        wait_until(
            "Authorization",
            self.windows.authorize,
            self.windows.poll_interval,
            move || async move {
                matches!(
                    driver.current_url().await,
                    Ok(Some(url)) if oauth.is_authorization_response(&url)
                )
            },
        )
        .await;

        let response_url = driver
            .current_url()
            .await?
            .context("Browser reported no current URL after authorization")?;

        let token = self
            .oauth
            .fetch_token(&response_url, &pkce)
            .await
            .context("Failed to exchange the authorization code for a token")?;

        Ok(token.access_token)
    }
}

#[async_trait(?Send)]
impl<D: BrowserDriver> TokenProvider for BrowserAuthorizer<D> {
    async fn obtain_token(&self) -> Result<AccessToken> {
        let result = self.authorize().await;

        if let Err(e) = self.driver.close().await {
            warn!("Failed to shut down browser cleanly: {e:#}");
        }

        result
    }
}
