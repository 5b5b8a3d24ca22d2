use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;

/// Backend origin used when `DDG2API_BACKEND_URL` is not set.
pub const DEFAULT_BACKEND_URL: &str = "https://duckduckgo.com";

/// Public model identifiers and the backend identifiers they map to, in listing order.
const DEFAULT_MODELS: [(&str, &str); 4] = [
    ("gpt-4o-mini", "gpt-4o-mini"),
    ("claude-3-haiku-20240307", "claude-3-haiku-20240307"),
    (
        "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
        "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
    ),
    (
        "mistralai/Mixtral-8x7B-Instruct-v0.1",
        "mistralai/Mixtral-8x7B-Instruct-v0.1",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /// Identifier callers use and see in `/v1/models`.
    pub id: String,
    /// Identifier sent to the backend.
    pub backend_id: String,
}

/// Ordered allow-list of models the relay will forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_MODELS.iter().map(|(id, backend)| ModelEntry {
            id: (*id).to_string(),
            backend_id: (*backend).to_string(),
        }))
    }
}

impl ModelCatalog {
    pub fn new(entries: impl IntoIterator<Item = ModelEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Backend identifier for a public model id, if allow-listed.
    pub fn resolve(&self, id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.backend_id.as_str())
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpSettings {
    /// Overall per-request timeout; `None` leaves the transport defaults in place.
    pub timeout: Option<Duration>,
    /// Proxy applied to all schemes.
    pub proxy_url: Option<String>,
    /// Disable every proxy, including the ones reqwest picks up from the environment.
    pub no_proxy: bool,
}

/// Process-wide configuration. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Accepted bearer keys. Empty disables the API-key gate.
    pub api_keys: HashSet<String>,
    pub debug_mode: bool,
    /// Route prefix such as `/relay`, or empty.
    pub path_prefix: String,
    /// Backend origin, without trailing slash.
    pub backend_base_url: String,
    pub models: ModelCatalog,
    pub http: HttpSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            api_keys: HashSet::new(),
            debug_mode: false,
            path_prefix: String::new(),
            backend_base_url: DEFAULT_BACKEND_URL.to_string(),
            models: ModelCatalog::default(),
            http: HttpSettings::default(),
        }
    }
}

impl RelayConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(p) => p
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {p}"))?,
            None => defaults.port,
        };

        let timeout = match get("DDG2API_HTTP_TIMEOUT_SECONDS") {
            Some(secs) => Some(Duration::from_secs(secs.parse::<u64>().with_context(
                || format!("Invalid DDG2API_HTTP_TIMEOUT_SECONDS value: {secs}"),
            )?)),
            None => None,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            api_keys: get("API_KEYS")
                .map(|keys| parse_api_keys(&keys))
                .unwrap_or_default(),
            debug_mode: get("DEBUG_MODE").is_some_and(|v| v == "true"),
            path_prefix: get("PATH_PREFIX")
                .map(|p| normalize_prefix(&p))
                .unwrap_or_default(),
            backend_base_url: get("DDG2API_BACKEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.backend_base_url),
            models: defaults.models,
            http: HttpSettings {
                timeout,
                proxy_url: get("DDG2API_PROXY_URL"),
                no_proxy: get("DDG2API_NO_PROXY").is_some_and(|v| is_truthy(&v)),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

/// Split a comma-separated key list, trimming entries and dropping empty ones.
pub fn parse_api_keys(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// `relay`, `/relay` and `/relay/` all become `/relay`; blank becomes empty.
pub fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

pub fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
