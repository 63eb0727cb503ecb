//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Proxy listener configuration
    pub server: ServerConfig,
    /// Origin the proxy forwards to
    pub upstream: UpstreamConfig,
    /// Offline cache worker configuration
    pub offline: OfflineConfig,
    /// Analysis client configuration
    pub client: ClientConfig,
    /// Cross-origin policy for the proxy
    pub cors: CorsConfig,
    /// API rate limiting
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("TOKEN_ANALYZER_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} in the URLs
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.upstream.url = Self::expand_string(&re, &self.upstream.url);
        self.client.endpoint = Self::expand_string(&re, &self.client.endpoint);
        if let Some(dir) = &self.offline.storage_dir {
            let expanded = Self::expand_string(&re, &dir.to_string_lossy());
            self.offline.storage_dir = Some(PathBuf::from(expanded));
        }
        Ok(())
    }

    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Reject values the proxy cannot run with
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.upstream.url)
            .map_err(|e| Error::Config(format!("Invalid upstream url {}: {e}", self.upstream.url)))?;
        if !self.offline.api_prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "offline.api_prefix must start with '/': {}",
                self.offline.api_prefix
            )));
        }
        if self.offline.version.trim().is_empty() {
            return Err(Error::Config("offline.version must not be empty".to_string()));
        }
        // The version names the cache bucket and its directory
        crate::offline::storage::validate_bucket_name(&self.offline.version)
            .map_err(|_| Error::Config(format!("offline.version may only use [A-Za-z0-9._-]: {}", self.offline.version)))?;
        Ok(())
    }
}

/// Proxy listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Origin serving the page shell, static assets and the analysis API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the origin
    pub url: String,
    /// Timeout for each upstream request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Offline cache worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Intercept requests with the cache worker
    pub enabled: bool,
    /// Name of the current cache bucket; the only version identifier
    pub version: String,
    /// Requests whose path starts with this go network-first
    pub api_prefix: String,
    /// Served for HTML navigations when both cache and network fail
    pub offline_page: String,
    /// URLs precached at install time
    pub manifest: Vec<String>,
    /// Persist cache buckets here (in memory when unset)
    pub storage_dir: Option<PathBuf>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            version: "token-analyzer-cache-v1".to_string(),
            api_prefix: "/api/".to_string(),
            offline_page: "/offline.html".to_string(),
            manifest: default_manifest(),
            storage_dir: None,
        }
    }
}

fn default_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/styles.css",
        "/client.js",
        "/manifest.json",
        "/offline.html",
        "/icons/icon-192.png",
        "/icons/icon-512.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Analysis client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Full URL of the analyze endpoint
    pub endpoint: String,
    /// Give up on the analysis request after this long (waits forever when unset)
    #[serde(default, with = "humantime_serde::option")]
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:39500/api/analyze".to_string(),
            request_timeout: None,
        }
    }
}

/// Cross-origin policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Emit CORS headers
    pub enabled: bool,
    /// Origins allowed to call the proxy
    pub allowed_origins: Vec<String>,
    /// Preflight cache lifetime
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5000".to_string(),
                "https://token-analyzer.vercel.app".to_string(),
            ],
            max_age: Duration::from_secs(86400),
        }
    }
}

/// Per-client rate limit on API submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests allowed per client IP per minute
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
        }
    }
}

/// Human-readable durations ("30s", "5m", "100ms")
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a human-readable duration string
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let number = |n: &str| n.trim().parse::<u64>().map_err(|e| format!("invalid duration '{s}': {e}"));
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins)?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration '{s}' is too large"))
        } else {
            number(s).map(Duration::from_secs)
        }
    }

    /// Same format for optional durations
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize an optional duration
        ///
        /// # Errors
        ///
        /// Returns a serialization error if the serializer fails.
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional duration
        ///
        /// # Errors
        ///
        /// Returns a deserialization error if the string cannot be parsed as a duration.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_deployment() {
        let config = Config::default();
        assert_eq!(config.server.port, 39500);
        assert_eq!(config.offline.version, "token-analyzer-cache-v1");
        assert_eq!(config.offline.api_prefix, "/api/");
        assert_eq!(config.offline.manifest.len(), 8);
        assert!(config.offline.manifest.contains(&"/offline.html".to_string()));
        assert_eq!(config.rate_limit.requests_per_minute, 60);
        assert!(config.client.request_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_overrides() {
        let yaml = r#"
upstream:
  url: "http://origin.test:8080"
  timeout: 250ms
offline:
  version: token-analyzer-cache-v2
  storage_dir: /var/cache/token-analyzer
client:
  request_timeout: 2m
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.upstream.url, "http://origin.test:8080");
        assert_eq!(config.upstream.timeout, Duration::from_millis(250));
        assert_eq!(config.offline.version, "token-analyzer-cache-v2");
        assert_eq!(config.offline.api_prefix, "/api/");
        assert_eq!(config.client.request_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzer.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "server:\n  port: 40001\noffline:\n  enabled: false").unwrap();
        drop(f);

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 40001);
        assert!(!config.offline.enabled);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/analyzer.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_relative_api_prefix() {
        let mut config = Config::default();
        config.offline.api_prefix = "api/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn expands_env_defaults() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        let value = Config::expand_string(&re, "http://${TOKEN_ANALYZER_TEST_UNSET_HOST:-origin}:3000");
        assert_eq!(value, "http://origin:3000");
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(humantime_serde::parse("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(humantime_serde::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(humantime_serde::parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(humantime_serde::parse("7").unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn oversized_minutes_are_an_error() {
        let max = format!("{}m", u64::MAX / 60);
        assert_eq!(humantime_serde::parse(&max).unwrap(), Duration::from_secs(u64::MAX / 60 * 60));

        let err = humantime_serde::parse("307445734561825861m").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(humantime_serde::parse("xm").is_err());
    }

    #[test]
    fn rejects_version_unusable_as_bucket_name() {
        for version in ["cache v1", "../escape", "..", "v1/current"] {
            let mut config = Config::default();
            config.offline.version = version.to_string();
            assert!(config.validate().is_err(), "{version} accepted");
        }

        let mut config = Config::default();
        config.offline.version = "token-analyzer-cache_v1.2".to_string();
        assert!(config.validate().is_ok());
    }
}
