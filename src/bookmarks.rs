use crate::twitter::{BookmarksResponse, Media, Tweet, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Failures while joining bookmarks with their expansions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("Response contains {post_count} bookmarks but no 'users' expansion")]
    MissingUsers { post_count: usize },

    #[error("Bookmark {tweet_id} has no author_id")]
    MissingAuthorId { tweet_id: String },

    #[error("Author {author_id} of bookmark {tweet_id} is missing from the 'users' expansion")]
    UnknownAuthor { tweet_id: String, author_id: String },

    #[error("Media {media_key} attached to bookmark {tweet_id} is missing from the 'media' expansion")]
    UnknownMedia { tweet_id: String, media_key: String },
}

/// user id -> "{name} (@{username}) [{profile_image_url}]"
pub type UserIndex = IndexMap<String, String>;
/// media key -> "{url} - {height}x{width} - Alt: {alt_text} - Type: {type}"
pub type MediaIndex = IndexMap<String, String>;
/// post id -> merged post
pub type PostIndex = IndexMap<String, BookmarkedPost>;

/// A bookmarked post with its author and media resolved to summary strings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookmarkedPost {
    #[serde(flatten)]
    pub tweet: Tweet,

    pub user_name: String,

    /// Only present when the post references media keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_attachment: Option<Vec<String>>,
}

/// Everything one run produces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookmarkSnapshot {
    pub users: UserIndex,
    pub media: MediaIndex,
    pub bookmarks: PostIndex,
}

/// Anything that can produce one bookmarks response
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    async fn fetch_bookmarks(&self) -> Result<BookmarksResponse>;
}

/// Fetches bookmarks from a source and joins them with their expansions
pub struct BookmarkAggregator<S> {
    source: S,
}

impl<S: BookmarkSource> BookmarkAggregator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub async fn run(&self) -> Result<BookmarkSnapshot> {
        let response = self.source.fetch_bookmarks().await?;
        let snapshot = aggregate(response).context("Failed to aggregate bookmarks")?;

        info!(
            "Aggregated {posts} bookmarks from {users} users with {media} media items",
            posts = snapshot.bookmarks.len(),
            users = snapshot.users.len(),
            media = snapshot.media.len()
        );
        Ok(snapshot)
    }
}

pub fn user_summary(user: &User) -> String {
    format!(
        "{name} (@{username}) [{image}]",
        name = user.name,
        username = user.username,
        image = user.profile_image_url.as_deref().unwrap_or_default()
    )
}

pub fn media_summary(media: &Media) -> String {
    let dimension = |d: Option<u64>| d.map(|v| v.to_string()).unwrap_or_default();
    format!(
        "{url} - {height}x{width} - Alt: {alt} - Type: {kind}",
        url = media.url.as_deref().unwrap_or_default(),
        height = dimension(media.height),
        width = dimension(media.width),
        alt = media.alt_text.as_deref().unwrap_or_default(),
        kind = media.type_field
    )
}

pub fn index_users(users: &[User]) -> UserIndex {
    users
        .iter()
        .map(|user| (user.id.clone(), user_summary(user)))
        .collect()
}

pub fn index_media(media: &[Media]) -> MediaIndex {
    media
        .iter()
        .map(|item| (item.media_key.clone(), media_summary(item)))
        .collect()
}

/// Attaches `user_name` to every post and `media_attachment` to posts that
/// reference media. Any lookup miss aborts the merge.
pub fn merge_posts(
    tweets: Vec<Tweet>,
    users: &UserIndex,
    media: &MediaIndex,
) -> Result<PostIndex, AggregateError> {
    let mut posts = PostIndex::new();

    for tweet in tweets {
        let tweet_id = tweet.id().to_string();

        let author_id = tweet
            .author_id()
            .ok_or_else(|| AggregateError::MissingAuthorId {
                tweet_id: tweet_id.clone(),
            })?;

        let user_name = users
            .get(author_id)
            .ok_or_else(|| AggregateError::UnknownAuthor {
                tweet_id: tweet_id.clone(),
                author_id: author_id.to_string(),
            })?
            .clone();

        let media_attachment = match tweet.media_keys() {
            Some(keys) => Some(
                keys.into_iter()
                    .map(|key| {
                        media
                            .get(key)
                            .cloned()
                            .ok_or_else(|| AggregateError::UnknownMedia {
                                tweet_id: tweet_id.clone(),
                                media_key: key.to_string(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        if let Some(metrics) = tweet.public_metrics() {
            debug!(
                "Bookmark {tweet_id} by {user_name}: retweets: {retweets} | likes: {likes}",
                retweets = metrics.get("retweet_count").unwrap_or(&serde_json::Value::Null),
                likes = metrics.get("like_count").unwrap_or(&serde_json::Value::Null)
            );
        }

        posts.insert(
            tweet_id,
            BookmarkedPost {
                tweet,
                user_name,
                media_attachment,
            },
        );
    }

    Ok(posts)
}

/// Builds the user and media indexes from the expansions, then merges posts.
///
/// An empty bookmark list needs no expansions and yields an empty snapshot.
pub fn aggregate(response: BookmarksResponse) -> Result<BookmarkSnapshot, AggregateError> {
    let tweets = response.data.unwrap_or_default();
    let includes = response.includes.unwrap_or_default();

    let users = match includes.users {
        Some(users) => index_users(&users),
        None if tweets.is_empty() => UserIndex::new(),
        None => {
            return Err(AggregateError::MissingUsers {
                post_count: tweets.len(),
            })
        }
    };

    let media = includes
        .media
        .map(|items| index_media(&items))
        .unwrap_or_default();

    let bookmarks = merge_posts(tweets, &users, &media)?;

    Ok(BookmarkSnapshot {
        users,
        media,
        bookmarks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn two_users() -> serde_json::Value {
        json!([
            {"id": "1", "name": "A", "username": "a"},
            {"id": "2", "name": "B", "username": "b"}
        ])
    }

    fn response(value: serde_json::Value) -> BookmarksResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_user_summary_with_missing_image() {
        let user = User {
            id: "1".to_string(),
            name: "A".to_string(),
            username: "a".to_string(),
            profile_image_url: None,
        };
        assert_eq!(user_summary(&user), "A (@a) []");
    }

    #[test]
    fn test_user_summary_with_image() {
        let user = User {
            id: "1".to_string(),
            name: "Ada Lovelace".to_string(),
            username: "ada".to_string(),
            profile_image_url: Some("https://pbs.twimg.com/p.jpg".to_string()),
        };
        assert_eq!(
            user_summary(&user),
            "Ada Lovelace (@ada) [https://pbs.twimg.com/p.jpg]"
        );
    }

    #[test]
    fn test_media_summary() {
        let media: Media = serde_json::from_value(json!({
            "media_key": "m1", "type": "photo", "url": "http://x",
            "height": 10, "width": 20, "alt_text": "pic"
        }))
        .unwrap();
        assert_eq!(
            media_summary(&media),
            "http://x - 10x20 - Alt: pic - Type: photo"
        );
    }

    #[test]
    fn test_media_summary_for_video_without_url() {
        let media: Media = serde_json::from_value(json!({
            "media_key": "7_1", "type": "video", "height": 720, "width": 1280
        }))
        .unwrap();
        assert_eq!(media_summary(&media), " - 720x1280 - Alt:  - Type: video");
    }

    #[test]
    fn test_single_post_without_attachments() {
        let snapshot = aggregate(response(json!({
            "data": [{"id": "100", "text": "hello", "author_id": "1"}],
            "includes": {"users": two_users()}
        })))
        .unwrap();

        assert_eq!(snapshot.bookmarks.len(), 1);
        let post = snapshot.bookmarks.get("100").unwrap();
        assert_eq!(post.user_name, "A (@a) []");
        assert!(post.media_attachment.is_none());

        let value = serde_json::to_value(&snapshot.bookmarks).unwrap();
        assert_eq!(value["100"]["user_name"], "A (@a) []");
        assert!(value["100"].get("media_attachment").is_none());
        assert!(snapshot.media.is_empty());
    }

    #[test]
    fn test_single_post_with_media() {
        let snapshot = aggregate(response(json!({
            "data": [{
                "id": "100", "text": "hello", "author_id": "1",
                "attachments": {"media_keys": ["m1"]}
            }],
            "includes": {
                "users": two_users(),
                "media": [{
                    "media_key": "m1", "type": "photo", "url": "http://x",
                    "height": 10, "width": 20, "alt_text": "pic"
                }]
            }
        })))
        .unwrap();

        let post = snapshot.bookmarks.get("100").unwrap();
        assert_eq!(
            post.media_attachment,
            Some(vec!["http://x - 10x20 - Alt: pic - Type: photo".to_string()])
        );
    }

    #[test]
    fn test_media_attachment_keeps_key_order() {
        let snapshot = aggregate(response(json!({
            "data": [{
                "id": "100", "text": "two pics", "author_id": "2",
                "attachments": {"media_keys": ["m2", "m1"]}
            }],
            "includes": {
                "users": two_users(),
                "media": [
                    {"media_key": "m1", "type": "photo", "url": "http://one"},
                    {"media_key": "m2", "type": "photo", "url": "http://two"}
                ]
            }
        })))
        .unwrap();

        let attachments = snapshot
            .bookmarks
            .get("100")
            .unwrap()
            .media_attachment
            .clone()
            .unwrap();
        assert_eq!(attachments.len(), 2);
        assert!(attachments[0].starts_with("http://two"));
        assert!(attachments[1].starts_with("http://one"));
    }

    #[test]
    fn test_poll_attachment_has_no_media_attachment() {
        let snapshot = aggregate(response(json!({
            "data": [{
                "id": "100", "text": "vote", "author_id": "1",
                "attachments": {"poll_ids": ["p1"]}
            }],
            "includes": {"users": two_users()}
        })))
        .unwrap();

        assert!(snapshot.bookmarks.get("100").unwrap().media_attachment.is_none());
    }

    #[test]
    fn test_missing_users_expansion_is_an_error() {
        let error = aggregate(response(json!({
            "data": [{"id": "100", "text": "hello", "author_id": "1"}]
        })))
        .unwrap_err();
        assert_eq!(error, AggregateError::MissingUsers { post_count: 1 });
    }

    #[test]
    fn test_unknown_author_is_an_error() {
        let error = aggregate(response(json!({
            "data": [{"id": "100", "text": "hello", "author_id": "3"}],
            "includes": {"users": two_users()}
        })))
        .unwrap_err();
        assert_eq!(
            error,
            AggregateError::UnknownAuthor {
                tweet_id: "100".to_string(),
                author_id: "3".to_string()
            }
        );
        assert!(error.to_string().contains("100"));
    }

    #[test]
    fn test_missing_author_id_is_an_error() {
        let error = aggregate(response(json!({
            "data": [{"id": "100", "text": "hello"}],
            "includes": {"users": two_users()}
        })))
        .unwrap_err();
        assert_eq!(
            error,
            AggregateError::MissingAuthorId {
                tweet_id: "100".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_media_is_an_error() {
        let error = aggregate(response(json!({
            "data": [{
                "id": "100", "text": "hello", "author_id": "1",
                "attachments": {"media_keys": ["gone"]}
            }],
            "includes": {"users": two_users()}
        })))
        .unwrap_err();
        assert_eq!(
            error,
            AggregateError::UnknownMedia {
                tweet_id: "100".to_string(),
                media_key: "gone".to_string()
            }
        );
    }

    #[test]
    fn test_empty_response_is_empty_snapshot() {
        let snapshot = aggregate(response(json!({"meta": {"result_count": 0}}))).unwrap();
        assert_eq!(snapshot, BookmarkSnapshot::default());
    }

    #[test]
    fn test_indexes_keep_response_order() {
        let snapshot = aggregate(response(json!({
            "data": [
                {"id": "300", "text": "c", "author_id": "2"},
                {"id": "100", "text": "a", "author_id": "1"},
                {"id": "200", "text": "b", "author_id": "2"}
            ],
            "includes": {"users": two_users()}
        })))
        .unwrap();

        let ids: Vec<&str> = snapshot.bookmarks.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["300", "100", "200"]);
        let users: Vec<&str> = snapshot.users.keys().map(String::as_str).collect();
        assert_eq!(users, vec!["1", "2"]);
    }

    #[test]
    fn test_merged_post_keeps_native_fields() {
        let snapshot = aggregate(response(json!({
            "data": [{
                "id": "100", "text": "hello", "author_id": "1",
                "created_at": "2023-01-01T00:00:00.000Z",
                "edit_history_tweet_ids": ["100"],
                "public_metrics": {"retweet_count": 1, "reply_count": 0, "like_count": 5, "quote_count": 0}
            }],
            "includes": {"users": two_users()}
        })))
        .unwrap();

        let value = serde_json::to_value(&snapshot.bookmarks).unwrap();
        let post = &value["100"];
        assert_eq!(post["id"], "100");
        assert_eq!(post["text"], "hello");
        assert_eq!(post["created_at"], "2023-01-01T00:00:00.000Z");
        assert_eq!(post["public_metrics"]["like_count"], 5);
        assert_eq!(post["edit_history_tweet_ids"][0], "100");
    }

    #[test]
    fn test_merged_post_keeps_partial_metrics_and_field_order() {
        let snapshot = aggregate(response(json!({
            "data": [{
                "edit_history_tweet_ids": ["100"],
                "created_at": "2023-01-01T00:00:00.000Z",
                "public_metrics": {"like_count": 5},
                "author_id": "1",
                "id": "100",
                "text": "hello"
            }],
            "includes": {"users": two_users()}
        })))
        .unwrap();

        let json = serde_json::to_string(&snapshot.bookmarks).unwrap();
        assert_eq!(
            json,
            r#"{"100":{"edit_history_tweet_ids":["100"],"created_at":"2023-01-01T00:00:00.000Z","public_metrics":{"like_count":5},"author_id":"1","id":"100","text":"hello","user_name":"A (@a) []"}}"#
        );
    }

    struct StubSource(serde_json::Value);

    #[async_trait]
    impl BookmarkSource for StubSource {
        async fn fetch_bookmarks(&self) -> Result<BookmarksResponse> {
            Ok(serde_json::from_value(self.0.clone())?)
        }
    }

    #[tokio::test]
    async fn test_aggregator_runs_against_stub_source() {
        let aggregator = BookmarkAggregator::new(StubSource(json!({
            "data": [{"id": "100", "text": "hello", "author_id": "2"}],
            "includes": {"users": two_users()}
        })));

        let snapshot = aggregator.run().await.unwrap();
        assert_eq!(
            snapshot.bookmarks.get("100").unwrap().user_name,
            "B (@b) []"
        );
    }

    #[tokio::test]
    async fn test_aggregator_error_is_downcastable() {
        let aggregator = BookmarkAggregator::new(StubSource(json!({
            "data": [{"id": "100", "text": "hello", "author_id": "1"}]
        })));

        let error = aggregator.run().await.unwrap_err();
        assert_eq!(
            error.downcast_ref::<AggregateError>(),
            Some(&AggregateError::MissingUsers { post_count: 1 })
        );
    }
}
