pub mod authorize;
pub mod fetch_bookmarks;
