//! # Settings
//!
//! Runtime configuration for requests and the table facade. Settings are a
//! plain value: load them once, wrap them in an `Arc` and hand them to every
//! `RequestJson` or subsystem that needs them.

use std::path::Path;

use log::{debug, warn};
use serde::{Serialize, Deserialize};

use crate::constants::env;
use crate::error::WorldsbaseResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log request bodies and URL parameters. Off by default since payloads
    /// may contain credentials.
    pub extended_log: bool,

    /// Decode responses with the incremental reader instead of the bulk path
    pub use_chunked_parser: bool,

    /// Base URL of the table backend, with or without a trailing slash
    pub base_url: String,

    /// Value sent in the `x-api-key` header by the table facade
    pub api_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extended_log: false,
            use_chunked_parser: false,
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> WorldsbaseResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON settings file
    pub fn from_json_file(path: impl AsRef<Path>) -> WorldsbaseResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        debug!("Loaded settings from {}", path.display());
        Self::from_json_str(&contents)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(env::BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(api_key) = lookup(env::API_KEY) {
            self.api_key = api_key;
        }
        if let Some(flag) = lookup(env::EXTENDED_LOG) {
            self.extended_log = parse_flag(env::EXTENDED_LOG, &flag, self.extended_log);
        }
        if let Some(flag) = lookup(env::CHUNKED_PARSER) {
            self.use_chunked_parser = parse_flag(env::CHUNKED_PARSER, &flag, self.use_chunked_parser);
        }
        self
    }

    /// Join an endpoint path onto the base URL with exactly one slash between
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_flag(name: &str, value: &str, current: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => {
            warn!("Ignoring unrecognised value '{}' for {}", other, name);
            current
        }
    }
}
