use crate::auth::AccessToken;
use crate::bookmarks::BookmarkSource;
use crate::datetime_utils::{format_for_display, from_unix_timestamp};
use crate::error_utils::{
    create_http_client_with_context, parse_http_response_json, parse_json_with_context,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Twitter API specific errors with structured information
#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("Rate limit exceeded (reset at {reset_time:?}, remaining: {remaining:?})")]
    RateLimit {
        reset_time: Option<u64>,
        remaining: Option<u64>,
    },

    #[error("Access token rejected by Twitter API: {message}")]
    Unauthorized { message: String },

    #[error("Access to {resource} forbidden: {message}")]
    Forbidden { resource: String, message: String },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },
}

const TWITTER_API_BASE: &str = "https://api.twitter.com/2";

// Field sets requested for the bookmarks timeline
const BOOKMARK_EXPANSIONS: &str = "author_id,attachments.media_keys";
const BOOKMARK_TWEET_FIELDS: &str = "created_at,public_metrics,attachments";
const BOOKMARK_USER_FIELDS: &str = "username,name,profile_image_url";
const BOOKMARK_MEDIA_FIELDS: &str = "public_metrics,url,height,width,alt_text";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Twitter API rate limit information extracted from response headers
#[derive(Debug, Clone, Default)]
struct RateLimits {
    /// Maximum number of requests allowed in the current time window
    limit: Option<u64>,
    /// Number of requests remaining in the current time window
    remaining: Option<u64>,
    /// Unix timestamp when the rate limit resets
    reset: Option<u64>,
}

/// A post exactly as the v2 API returned it.
///
/// The object is kept as-is so every native field survives into the snapshot
/// in the order the API sent it. Accessors read the few fields the
/// aggregator needs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(try_from = "Map<String, Value>")]
pub struct Tweet(Map<String, Value>);

impl TryFrom<Map<String, Value>> for Tweet {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        match fields.get("id") {
            Some(Value::String(_)) => Ok(Self(fields)),
            Some(other) => Err(format!("post id must be a string, got {other}")),
            None => Err("post has no id".to_string()),
        }
    }
}

impl Tweet {
    /// The post ID (always present, checked on deserialization)
    pub fn id(&self) -> &str {
        self.0.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    /// Author ID, present when the `author_id` expansion is requested
    pub fn author_id(&self) -> Option<&str> {
        self.0.get("author_id").and_then(Value::as_str)
    }

    /// Media keys referenced by this post, if it carries any
    pub fn media_keys(&self) -> Option<Vec<&str>> {
        let keys = self.0.get("attachments")?.get("media_keys")?.as_array()?;
        Some(keys.iter().filter_map(Value::as_str).collect())
    }

    /// Engagement counts exactly as sent
    pub fn public_metrics(&self) -> Option<&Map<String, Value>> {
        self.0.get("public_metrics").and_then(Value::as_object)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub username: String,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Media {
    pub media_key: String,
    #[serde(rename = "type")]
    pub type_field: String,
    pub url: Option<String>,
    pub preview_image_url: Option<String>,
    pub height: Option<u64>,
    pub width: Option<u64>,
    pub alt_text: Option<String>,
    pub public_metrics: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Includes {
    pub users: Option<Vec<User>>,
    pub media: Option<Vec<Media>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ResponseMeta {
    pub result_count: Option<u32>,
    pub next_token: Option<String>,
}

/// Error object reported inside an otherwise successful response
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiProblem {
    pub title: Option<String>,
    pub detail: Option<String>,
    #[serde(rename = "type")]
    pub type_field: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BookmarksResponse {
    pub data: Option<Vec<Tweet>>,
    pub includes: Option<Includes>,
    pub meta: Option<ResponseMeta>,
    pub errors: Option<Vec<ApiProblem>>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: User,
}

/// Twitter API client authenticated with a user access token
pub struct TwitterClient {
    client: Client,
    bearer_token: AccessToken,
    base_url: String,
}

impl TwitterClient {
    /// Creates a new client that authenticates every request with `bearer_token`
    pub fn new(bearer_token: AccessToken) -> Result<Self> {
        let client = create_http_client_with_context(REQUEST_TIMEOUT)?;
        Ok(Self {
            client,
            bearer_token,
            base_url: TWITTER_API_BASE.to_string(),
        })
    }

    /// Points the client at a different API root (used against mock servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Parses rate limit headers from a response
    fn parse_rate_limit_headers(&self, response: &reqwest::Response) -> RateLimits {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
        };

        RateLimits {
            limit: header("x-rate-limit-limit"),
            remaining: header("x-rate-limit-remaining"),
            reset: header("x-rate-limit-reset"),
        }
    }

    /// Makes a single authenticated GET request. Failures are mapped to
    /// `TwitterError` and returned as-is, nothing is retried.
    async fn api_request(&self, resource: &str, url: &str) -> Result<reqwest::Response> {
        debug!(%resource, %url, "Making request to Twitter API");

        let response = self
            .client
            .get(url)
            .bearer_auth(self.bearer_token.secret())
            .send()
            .await
            .with_context(|| format!("Failed to send request to Twitter API for {resource}"))?;

        let rate_limits = self.parse_rate_limit_headers(&response);
        let status = response.status();

        if status.is_success() {
            debug!(
                "Received Twitter API response for {resource} with limits: {limit:?}/{remaining:?} until {reset:?}",
                limit = rate_limits.limit,
                remaining = rate_limits.remaining,
                reset = rate_limits.reset
            );
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = problem_message(&body);

        let error = match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let reset_at = rate_limits
                    .reset
                    .and_then(|r| i64::try_from(r).ok())
                    .and_then(from_unix_timestamp)
                    .map(|dt| format_for_display(&dt));
                warn!(
                    "Rate limited by Twitter API for {resource}. Limit: {limit:?}, resets at {reset_at:?} UTC",
                    limit = rate_limits.limit
                );
                TwitterError::RateLimit {
                    reset_time: rate_limits.reset,
                    remaining: rate_limits.remaining,
                }
            }
            StatusCode::UNAUTHORIZED => TwitterError::Unauthorized { message },
            StatusCode::FORBIDDEN => TwitterError::Forbidden {
                resource: resource.to_string(),
                message,
            },
            _ => TwitterError::ApiError {
                status: status.as_u16(),
                message,
            },
        };

        Err(error.into())
    }

    /// Resolves the user the access token belongs to
    pub async fn get_authenticated_user(&self) -> Result<User> {
        let url = format!(
            "{base}/users/me?user.fields={BOOKMARK_USER_FIELDS}",
            base = self.base_url
        );

        let response = self.api_request("authenticated user", &url).await?;
        let user: UserResponse = parse_http_response_json(response, "Twitter API user").await?;

        debug!(
            "Access token belongs to @{username} ({id})",
            username = user.data.username,
            id = user.data.id
        );
        Ok(user.data)
    }

    /// Fetches one page of the user's bookmarks with author and media expansions
    pub async fn get_bookmarks(&self, user_id: &str) -> Result<BookmarksResponse> {
        let url = self.build_bookmarks_url(user_id);

        let response = self.api_request("bookmarks", &url).await?;
        let bookmarks: BookmarksResponse =
            parse_http_response_json(response, "Twitter API bookmarks").await?;

        if let Some(errors) = &bookmarks.errors {
            for problem in errors {
                warn!(
                    "Twitter API reported a partial error: {title} ({detail})",
                    title = problem.title.as_deref().unwrap_or("unknown"),
                    detail = problem.detail.as_deref().unwrap_or("no detail")
                );
            }
        }

        Ok(bookmarks)
    }

    /// Builds the bookmarks URL with all fields the snapshot needs
    fn build_bookmarks_url(&self, user_id: &str) -> String {
        format!(
            "{base}/users/{user_id}/bookmarks?expansions={BOOKMARK_EXPANSIONS}\
            &tweet.fields={BOOKMARK_TWEET_FIELDS}\
            &user.fields={BOOKMARK_USER_FIELDS}\
            &media.fields={BOOKMARK_MEDIA_FIELDS}",
            base = self.base_url
        )
    }
}

#[async_trait]
impl BookmarkSource for TwitterClient {
    async fn fetch_bookmarks(&self) -> Result<BookmarksResponse> {
        let me = self
            .get_authenticated_user()
            .await
            .context("Failed to resolve the authenticated user")?;

        let response = self
            .get_bookmarks(&me.id)
            .await
            .with_context(|| format!("Failed to fetch bookmarks for @{}", me.username))?;

        let count = response.data.as_ref().map_or(0, Vec::len);
        info!(
            "Fetched {count} bookmarks for @{username}",
            username = me.username
        );

        if response
            .meta
            .as_ref()
            .and_then(|m| m.next_token.as_ref())
            .is_some()
        {
            info!("More bookmarks are available; only the most recent page was fetched");
        }

        Ok(response)
    }
}

/// Extracts a readable message from a v2 error body, falling back to the raw body
fn problem_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Problem {
        title: Option<String>,
        detail: Option<String>,
    }

    match parse_json_with_context::<Problem>(body, "API error body") {
        Ok(Problem {
            detail: Some(detail),
            ..
        }) => detail,
        Ok(Problem {
            title: Some(title),
            ..
        }) => title,
        _ if body.is_empty() => "empty response body".to_string(),
        _ => body.to_string(),
    }
}
