use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// OAuth2 client id of the registered Twitter app
pub const CLIENT_ID_KEY: &str = "client-id";
/// OAuth2 client secret of the registered Twitter app (confidential clients only)
pub const CLIENT_SECRET_KEY: &str = "client-secret";
/// User access token written after a successful PKCE exchange
pub const ACCESS_TOKEN_KEY: &str = "access-token-pkce";

/// Dotenv-style key-value file shared between the authorizer and the
/// bookmark reader.
///
/// Unlike the process environment, keys may contain hyphens, which is the
/// naming the stored file has always used (`client-id`, `access-token-pkce`).
pub struct ConfigStore {
    path: PathBuf,
    entries: Vec<(String, String)>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values are credentials, only show which keys are present
        let keys: Vec<&str> = self.entries.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .field("keys", &keys)
            .finish()
    }
}

impl ConfigStore {
    /// Loads the store from `path`. A missing file yields an empty store so
    /// that the first token write can create it.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(
                "Config file {path} does not exist yet, starting empty",
                path = path.display()
            );
            return Ok(Self {
                path: path.to_path_buf(),
                entries: Vec::new(),
            });
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}", path = path.display()))?;
        let entries: Vec<(String, String)> = contents.lines().filter_map(parse_line).collect();

        debug!(
            "Loaded {count} entries from {path}",
            count = entries.len(),
            path = path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value for `key`. Later lines win, empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Returns the value for `key` or an error naming the key and file.
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) => Ok(value),
            None => bail!(
                "'{key}' is not set in {path}",
                path = self.path.display()
            ),
        }
    }

    /// Stores `value` under `key`, replacing any previous line for that key
    /// and keeping every other line of the file as it was.
    pub fn persist_value(&mut self, key: &str, value: &str) -> Result<()> {
        let existing = if self.path.exists() {
            fs::read_to_string(&self.path).with_context(|| {
                format!(
                    "Failed to read config file {path}",
                    path = self.path.display()
                )
            })?
        } else {
            String::new()
        };

        let mut lines: Vec<String> = existing
            .lines()
            .filter(|line| parse_line(line).is_none_or(|(k, _)| k != key))
            .map(str::to_string)
            .collect();
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        lines.push(format_entry(key, value));

        let mut contents = lines.join("\n");
        contents.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create config directory {path}",
                        path = parent.display()
                    )
                })?;
            }
        }

        fs::write(&self.path, contents).with_context(|| {
            format!(
                "Failed to write config file {path}",
                path = self.path.display()
            )
        })?;

        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_string(), value.to_string()));

        info!(
            "Stored '{key}' in {path}",
            path = self.path.display()
        );
        Ok(())
    }

    /// Copies entries whose keys are valid environment variable names into
    /// the process environment. Variables that are already set are kept.
    ///
    /// `dotenv` stops at the first line it cannot parse, and a hyphenated key
    /// is such a line, so every variable after `client-id` would be lost.
    pub fn export_env_vars(&self) -> usize {
        let mut exported = 0;
        for (key, value) in &self.entries {
            if is_env_var_name(key) && std::env::var_os(key).is_none() {
                std::env::set_var(key, value);
                exported += 1;
            }
        }
        exported
    }
}

fn is_env_var_name(key: &str) -> bool {
    key.chars().next().is_some_and(|c| !c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses one `key = value` line. Comments, blank lines and lines without
/// `=` are skipped.
fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);

    let (key, raw_value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    Some((key.to_string(), unquote(raw_value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    // Unquoted values may carry a trailing comment
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end(),
        None => value,
    }
}

fn format_entry(key: &str, value: &str) -> String {
    if value.contains('\'') {
        format!("{key}=\"{value}\"")
    } else {
        format!("{key}='{value}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_env_vars_after_hyphenated_keys_are_exported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".env");
        fs::write(
            &path,
            "client-id = \"xx\"\nTWEETMARKS_TEST_EXPORTED_DIR=snapshots\n\
             TWEETMARKS_TEST_PRESET=from-file\n",
        )
        .unwrap();
        std::env::set_var("TWEETMARKS_TEST_PRESET", "from-shell");

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.export_env_vars(), 1);

        assert_eq!(
            std::env::var("TWEETMARKS_TEST_EXPORTED_DIR").unwrap(),
            "snapshots"
        );
        assert_eq!(std::env::var("TWEETMARKS_TEST_PRESET").unwrap(), "from-shell");
        assert!(std::env::var_os("client-id").is_none());
    }

    #[test]
    fn test_env_var_names() {
        assert!(is_env_var_name("TWITTER_CLIENT_ID"));
        assert!(is_env_var_name("RUST_LOG"));
        assert!(!is_env_var_name("client-id"));
        assert!(!is_env_var_name("1ABC"));
        assert!(!is_env_var_name(""));
    }

    #[test]
    fn test_parse_line_variants() {
        assert_eq!(
            parse_line("client-id = \"abc\""),
            Some(("client-id".to_string(), "abc".to_string()))
        );
        assert_eq!(
            parse_line("client-secret='s3cr3t'"),
            Some(("client-secret".to_string(), "s3cr3t".to_string()))
        );
        assert_eq!(
            parse_line("export RUST_LOG=debug # noisy"),
            Some(("RUST_LOG".to_string(), "debug".to_string()))
        );
        assert_eq!(parse_line("# a comment"), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("no equals sign"), None);
        assert_eq!(parse_line("=value"), None);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::load(&temp_dir.path().join(".env")).unwrap();
        assert!(store.get(CLIENT_ID_KEY).is_none());
        assert!(store.require(CLIENT_ID_KEY).is_err());
    }

    #[test]
    fn test_require_names_key_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".env");
        fs::write(&path, "client-id = \"\"\n").unwrap();

        let store = ConfigStore::load(&path).unwrap();
        let message = store.require(CLIENT_ID_KEY).unwrap_err().to_string();
        assert!(message.contains("client-id"));
        assert!(message.contains(".env"));
    }

    #[test]
    fn test_persist_value_replaces_only_token_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".env");
        fs::write(
            &path,
            "# app credentials\nclient-id = \"id\"\nclient-secret = \"secret\"\naccess-token-pkce='old'\n\n",
        )
        .unwrap();

        let mut store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY), Some("old"));

        store.persist_value(ACCESS_TOKEN_KEY, "new-token").unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "# app credentials\nclient-id = \"id\"\nclient-secret = \"secret\"\naccess-token-pkce='new-token'\n"
        );
        assert_eq!(store.get(ACCESS_TOKEN_KEY), Some("new-token"));

        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(reloaded.get(ACCESS_TOKEN_KEY), Some("new-token"));
        assert_eq!(reloaded.get(CLIENT_ID_KEY), Some("id"));
        assert_eq!(reloaded.get(CLIENT_SECRET_KEY), Some("secret"));
    }

    #[test]
    fn test_persist_value_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(".env");

        let mut store = ConfigStore::load(&path).unwrap();
        store.persist_value(ACCESS_TOKEN_KEY, "it's").unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "access-token-pkce=\"it's\"\n");
        assert_eq!(
            ConfigStore::load(&path).unwrap().get(ACCESS_TOKEN_KEY),
            Some("it's")
        );
    }

    #[test]
    fn test_debug_hides_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".env");
        fs::write(&path, "client-secret=topsecret\n").unwrap();

        let store = ConfigStore::load(&path).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("client-secret"));
        assert!(!debug.contains("topsecret"));
    }
}
