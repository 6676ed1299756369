use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const ENV_API_URL: &str = "CLAIMS_API_URL";
const ENV_TIMEOUT_SECS: &str = "CLAIMS_REQUEST_TIMEOUT_SECS";

/// Connection settings for the claims backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL the `/api/...` paths are joined onto.
    pub base_url: String,
    /// Upper bound for a single backend call. `None` waits indefinitely.
    #[serde(with = "timeout_secs")]
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            user_agent: format!("claim-flow/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `CLAIMS_API_URL` and `CLAIMS_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("invalid client configuration")
    }

    /// Read a YAML file, then apply environment overrides on top.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_yaml_str(&raw)?.with_env_overrides();
        info!(path = %path.display(), base_url = %config.base_url, "Loaded client configuration");
        Ok(config)
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_TIMEOUT_SECS).ok(),
        )
    }

    fn with_overrides(mut self, base_url: Option<String>, timeout_secs: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(secs) = timeout_secs.and_then(|s| s.trim().parse::<u64>().ok()) {
            self.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        self
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

mod timeout_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.map(|d| d.as_secs()).unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }
}
