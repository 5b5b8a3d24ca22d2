use anyhow::{Context, Result};
use http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{is_truthy, HttpSettings, RelayConfig};
use crate::upstream::DuckChat;

/// Load a dotenv file into the process environment. Existing variables win.
///
/// Order: explicit `ENV_FILE` / `DOTENV_PATH`, then `.env` in the working
/// directory, then the first `.env` found walking up from the executable.
/// Returns a description of the source for logging once tracing is up.
pub fn load_env() -> String {
    for key in ["ENV_FILE", "DOTENV_PATH"] {
        if let Ok(p) = std::env::var(key) {
            let p = p.trim();
            if !p.is_empty()
                && std::path::Path::new(p).is_file()
                && dotenvy::from_filename(p).is_ok()
            {
                return format!("{p} ({key})");
            }
        }
    }

    if let Ok(path) = dotenvy::dotenv() {
        return path.display().to_string();
    }

    if let Ok(exe) = std::env::current_exe() {
        let mut dir_opt = exe.parent();
        while let Some(dir) = dir_opt {
            let candidate = dir.join(".env");
            if candidate.is_file() && dotenvy::from_filename(&candidate).is_ok() {
                return candidate.display().to_string();
            }
            dir_opt = dir.parent();
        }
    }

    "none".into()
}

/// Initialize structured tracing. `RUST_LOG` wins; otherwise `DEBUG_MODE` picks the level.
pub fn init_tracing(debug_mode: bool) {
    let default_filter = if debug_mode {
        "debug,tower_http=debug,hyper=info,reqwest=info"
    } else {
        "info,tower_http=info"
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());
    let subscriber = fmt().with_env_filter(EnvFilter::new(filter)).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Shared, read-only application state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub backend: DuckChat,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let http = build_http_client(&config.http)?;
        let backend = DuckChat::new(http, config.backend_base_url.clone(), config.models.clone());
        Ok(Self { config, backend })
    }
}

/// Build the outbound HTTP client.
///
/// No default User-Agent is set: every backend call carries the fixed browser
/// header set instead. HTTP/1 header names are written title-cased.
pub fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().http1_title_case_headers();

    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }

    if settings.no_proxy {
        builder = builder.no_proxy();
    } else if let Some(url) = settings.proxy_url.as_deref() {
        let proxy =
            reqwest::Proxy::all(url).with_context(|| format!("Invalid proxy URL: {url}"))?;
        builder = builder.proxy(proxy);
    }

    builder.build().context("Failed to build HTTP client")
}

/// Build a CORS layer from environment variables.
///
/// Environment variables:
/// - CORS_ALLOWED_ORIGINS: "*" or comma-separated origins (e.g., "https://a.com, https://b.com")
/// - CORS_ALLOWED_METHODS: "*" or comma-separated methods (e.g., "GET,POST,OPTIONS")
/// - CORS_ALLOWED_HEADERS: "*" or comma-separated request header names
/// - CORS_ALLOW_CREDENTIALS: disable with 0,false,no,off
/// - CORS_MAX_AGE: max age in seconds (u64)
///
/// Defaults are permissive: origin and requested headers are mirrored, methods are
/// GET/POST/OPTIONS, credentials are allowed and preflight results cache for a day.
/// Wildcards are rendered as mirroring because browsers reject `*` alongside credentials.
pub fn cors_layer_from_env() -> CorsLayer {
    let var = |key: &str| {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let origins = match var("CORS_ALLOWED_ORIGINS") {
        Some(s) if s != "*" => {
            let vals: Vec<HeaderValue> = split_list(&s)
                .filter_map(|p| HeaderValue::from_str(p).ok())
                .collect();
            if vals.is_empty() {
                AllowOrigin::mirror_request()
            } else {
                AllowOrigin::list(vals)
            }
        }
        _ => AllowOrigin::mirror_request(),
    };

    let methods = match var("CORS_ALLOWED_METHODS") {
        Some(s) if s == "*" => AllowMethods::mirror_request(),
        Some(s) => {
            let vals: Vec<Method> = split_list(&s)
                .filter_map(|p| Method::from_bytes(p.to_ascii_uppercase().as_bytes()).ok())
                .collect();
            if vals.is_empty() {
                default_methods()
            } else {
                AllowMethods::list(vals)
            }
        }
        None => default_methods(),
    };

    let headers = match var("CORS_ALLOWED_HEADERS") {
        Some(s) if s != "*" => {
            let vals: Vec<HeaderName> = split_list(&s)
                .filter_map(|p| HeaderName::try_from(p).ok())
                .collect();
            if vals.is_empty() {
                AllowHeaders::mirror_request()
            } else {
                AllowHeaders::list(vals)
            }
        }
        _ => AllowHeaders::mirror_request(),
    };

    let credentials = var("CORS_ALLOW_CREDENTIALS")
        .map(|v| is_truthy(&v))
        .unwrap_or(true);

    let max_age = var("CORS_MAX_AGE")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(86_400);

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(credentials)
        .max_age(Duration::from_secs(max_age))
}

fn default_methods() -> AllowMethods {
    AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS])
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|p| !p.is_empty())
}
