use std::{collections::HashSet, path::PathBuf};

use url::Url;

use crate::{error::ApiError, validate::AllowList};

pub const DEFAULT_API_KEY: &str = "changeme";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_COBALT_API_URL: &str = "https://api.cobalt.tools";
pub const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";

/// Which extraction strategy this process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Local,
}

impl BackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "remote" | "cobalt" => Some(Self::Remote),
            "local" | "yt-dlp" | "ytdlp" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: String,
    pub bind_addr: String,
    pub backend: BackendKind,
    pub cobalt_api_url: String,
    pub yt_dlp_bin: String,
    pub transfer_dir: PathBuf,
    /// Normalized CORS origins; empty disables CORS.
    pub allowed_origins: Vec<String>,
    pub allow_list: AllowList,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(ToString::to_string));

        let backend = match read("BACKEND") {
            Some(value) => BackendKind::parse(&value).ok_or_else(|| {
                ApiError::internal(format!("BACKEND must be 'remote' or 'local', got {value:?}"))
            })?,
            None => BackendKind::Remote,
        };

        let allowed_origins = read("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(|origin| {
                        normalize_origin(origin).ok_or_else(|| {
                            ApiError::internal(format!(
                                "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                            ))
                        })
                    })
                    .collect::<Result<HashSet<_>, _>>()
            })
            .transpose()?
            .map(|origins| {
                let mut origins = origins.into_iter().collect::<Vec<_>>();
                origins.sort();
                origins
            })
            .unwrap_or_default();

        Ok(Self {
            // The secret is used byte for byte; only an empty value counts as unset.
            api_key: lookup("API_KEY")
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
            bind_addr: resolve_bind_addr(read("APP_ADDR"), read("PORT"))?,
            backend,
            cobalt_api_url: read("COBALT_API_URL")
                .unwrap_or_else(|| DEFAULT_COBALT_API_URL.to_string()),
            yt_dlp_bin: read("YT_DLP_BIN").unwrap_or_else(|| DEFAULT_YT_DLP_BIN.to_string()),
            transfer_dir: read("TRANSFER_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("videosnap")),
            allowed_origins,
            allow_list: AllowList::default(),
        })
    }

    pub fn uses_default_api_key(&self) -> bool {
        self.api_key == DEFAULT_API_KEY
    }
}

fn resolve_bind_addr(app_addr: Option<String>, port: Option<String>) -> Result<String, ApiError> {
    if let Some(configured) = app_addr {
        return Ok(configured);
    }

    let port = match port {
        Some(value) => value
            .parse::<u16>()
            .map_err(|_| ApiError::internal(format!("PORT must be a port number, got {value:?}")))?,
        None => DEFAULT_PORT,
    };

    Ok(format!("0.0.0.0:{port}"))
}

/// Reduces an origin to `scheme://host[:port]`, dropping a default port.
/// Anything with a path, query or fragment is not an origin.
pub fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let bare = parsed.path() == "/" && parsed.query().is_none() && parsed.fragment().is_none();
    if !bare || !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    Some(parsed.origin().ascii_serialization())
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<RelayConfig, ApiError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        RelayConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_key, "changeme");
        assert!(config.uses_default_api_key());
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.backend, BackendKind::Remote);
        assert_eq!(config.cobalt_api_url, "https://api.cobalt.tools");
        assert_eq!(config.yt_dlp_bin, "yt-dlp");
        assert!(config.allowed_origins.is_empty());
        assert!(config.transfer_dir.ends_with("videosnap"));
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("API_KEY", " real-secret "),
            ("PORT", "8080"),
            ("BACKEND", "Local"),
            ("YT_DLP_BIN", "/opt/yt-dlp"),
            ("TRANSFER_DIR", "/var/tmp/snap"),
        ])
        .unwrap();
        assert_eq!(config.api_key, " real-secret ");
        assert!(!config.uses_default_api_key());
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.yt_dlp_bin, "/opt/yt-dlp");
        assert_eq!(config.transfer_dir, PathBuf::from("/var/tmp/snap"));
    }

    #[test]
    fn app_addr_wins_over_port() {
        let config = config_from(&[("APP_ADDR", "127.0.0.1:9000"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("API_KEY", ""), ("PORT", "")]).unwrap();
        assert_eq!(config.api_key, "changeme");
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
    }

    #[test]
    fn api_key_is_not_trimmed() {
        let config = config_from(&[("API_KEY", "  ")]).unwrap();
        assert_eq!(config.api_key, "  ");
        assert!(!config.uses_default_api_key());

        let config = config_from(&[("API_KEY", "key\n")]).unwrap();
        assert_eq!(config.api_key, "key\n");
    }

    #[test]
    fn rejects_bad_port_and_backend() {
        assert!(config_from(&[("PORT", "http")]).is_err());
        assert!(config_from(&[("PORT", "70000")]).is_err());
        assert!(config_from(&[("BACKEND", "ffmpeg")]).is_err());
    }

    #[test]
    fn normalizes_allowed_origins() {
        let config = config_from(&[(
            "ALLOWED_ORIGINS",
            "https://App.Example.com, http://localhost:5173,https://app.example.com:443",
        )])
        .unwrap();
        assert_eq!(
            config.allowed_origins,
            ["http://localhost:5173", "https://app.example.com"]
        );
    }

    #[test]
    fn rejects_origins_with_paths() {
        assert!(config_from(&[("ALLOWED_ORIGINS", "https://example.com/app")]).is_err());
        assert!(config_from(&[("ALLOWED_ORIGINS", "ftp://example.com")]).is_err());
    }
}
