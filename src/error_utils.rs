use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON serialization/parsing error handling utilities
///
/// Serialize data to JSON indented with four spaces, with contextual error handling
pub fn serialize_to_json_with_context<T: Serialize>(data: &T, data_desc: &str) -> Result<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    data.serialize(&mut serializer)
        .with_context(|| format!("Failed to serialize {data_desc} to JSON"))?;
    String::from_utf8(buffer).with_context(|| format!("Serialized {data_desc} is not valid UTF-8"))
}

/// Parse JSON from string with contextual error handling
pub fn parse_json_with_context<T: DeserializeOwned>(json_str: &str, data_desc: &str) -> Result<T> {
    serde_json::from_str(json_str).with_context(|| format!("Failed to parse {data_desc} from JSON"))
}

/// HTTP request error handling utilities
///
/// Parse HTTP response as JSON with contextual error handling
pub async fn parse_http_response_json<T: DeserializeOwned>(
    response: reqwest::Response,
    api_desc: &str,
) -> Result<T> {
    response
        .json::<T>()
        .await
        .with_context(|| format!("Failed to parse {api_desc} response"))
}

/// Create HTTP client with contextual error handling
pub fn create_http_client_with_context(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}
