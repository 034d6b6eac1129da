pub mod auth;
pub mod bookmarks;
pub mod commands;
pub mod config_store;
pub mod datetime_utils;
pub mod error_utils;
pub mod filename_utils;
pub mod storage;
pub mod twitter;
