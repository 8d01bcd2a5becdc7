//! Client configuration: backend URLs, session storage and request defaults.
//!
//! # Design
//! Every URL is derived from one host so a deployment only has to name the
//! server. `load()` reads `.env` through dotenvy and then the `ADMIN_*`
//! environment variables; unset or unparsable values fall back to the
//! built-in defaults. The variable lookup is injectable so the parsing can be
//! exercised without touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{AuthSettings, DEFAULT_OBTAIN_PATH, DEFAULT_STORAGE_KEY};
use crate::options::DEFAULT_LIST_PLACEHOLDER_COUNT;

pub const DEFAULT_HOST: &str = "http://127.0.0.1:8000/";

/// Where the backend lives and where the client keeps its state.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Server root, ending with `/`.
    pub host: String,
    /// Root of the resource collections, e.g. `{host}api/`.
    pub api_url: String,
    /// Root of uploaded and static media, e.g. `{host}media/`.
    pub media_url: String,
    /// Root of the JWT endpoints, e.g. `{host}api/token/`.
    pub token_endpoint: String,
    pub obtain_path: String,
    pub storage_key: String,
    /// JSON file holding the persisted login response.
    pub storage_path: PathBuf,
    pub list_placeholder_count: usize,
    /// Applied to every request. `None` leaves the transport default.
    pub timeout: Option<Duration>,
}

impl Config {
    /// Derive every URL from `host`.
    pub fn for_host(host: &str) -> Self {
        let host = if host.ends_with('/') {
            host.to_string()
        } else {
            format!("{host}/")
        };
        Config {
            api_url: format!("{host}api/"),
            media_url: format!("{host}media/"),
            token_endpoint: format!("{host}api/token/"),
            host,
            obtain_path: DEFAULT_OBTAIN_PATH.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_path: PathBuf::from(".admin-client.json"),
            list_placeholder_count: DEFAULT_LIST_PLACEHOLDER_COUNT,
            timeout: None,
        }
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            endpoint: self.token_endpoint.clone(),
            obtain_path: self.obtain_path.clone(),
            storage_key: self.storage_key.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::for_host(DEFAULT_HOST)
    }
}

/// Build the configuration from `.env` and `ADMIN_*` environment variables.
///
/// `ADMIN_HOST` re-derives every URL; the individual URL variables override
/// the derived values.
pub fn load() -> Config {
    dotenvy::dotenv().ok();
    from_vars(|name| std::env::var(name).ok())
}

/// Build the configuration from an arbitrary variable lookup.
pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Config {
    let host = lookup("ADMIN_HOST").unwrap_or_else(|| DEFAULT_HOST.into());
    let mut config = Config::for_host(&host);

    if let Some(url) = lookup("ADMIN_API_URL") {
        config.api_url = url;
    }
    if let Some(url) = lookup("ADMIN_MEDIA_URL") {
        config.media_url = url;
    }
    if let Some(url) = lookup("ADMIN_TOKEN_ENDPOINT") {
        config.token_endpoint = url;
    }
    if let Some(path) = lookup("ADMIN_OBTAIN_PATH") {
        config.obtain_path = path;
    }
    if let Some(key) = lookup("ADMIN_STORAGE_KEY") {
        config.storage_key = key;
    }
    if let Some(path) = lookup("ADMIN_STORAGE_PATH") {
        config.storage_path = PathBuf::from(path);
    }
    config.list_placeholder_count = lookup("ADMIN_LIST_PLACEHOLDER_COUNT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_LIST_PLACEHOLDER_COUNT);
    config.timeout = lookup("ADMIN_TIMEOUT_SECS")
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs);

    config
}
