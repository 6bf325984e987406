//! Client configuration
//!
//! Values are layered: built-in defaults first, then `R8IT_*` environment
//! variables (for example `R8IT_API_BASE_URL` or `R8IT_ANALYSIS_TIMEOUT_SECS`).

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Prefix of the environment variables read by [`ClientConfig::from_env`]
pub const ENV_PREFIX: &str = "R8IT";

/// Configuration shared by the API client and the review capture flow
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the identity backend, including the `/api` path
    pub api_base_url: String,
    /// Full URL of the image analysis endpoint
    pub analysis_url: String,
    /// Timeout applied to every identity request, in seconds
    pub request_timeout_secs: u64,
    /// Upper bound on one image analysis, in seconds
    pub analysis_timeout_secs: u64,
    /// How long the published confirmation stays before the session resets
    pub publish_reset_delay_ms: u64,
    /// File holding persisted client state; the caller picks a default when unset
    pub storage_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Load the configuration from defaults and environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Config::builder()
            .set_default("api_base_url", "http://localhost:5000/api")?
            .set_default("analysis_url", "http://localhost:5000/api/analyze-image")?
            .set_default("request_timeout_secs", 30)?
            .set_default("analysis_timeout_secs", 60)?
            .set_default("publish_reset_delay_ms", 2000)?
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: ClientConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url must not be empty".into()));
        }
        if self.analysis_url.trim().is_empty() {
            return Err(ConfigError::Invalid("analysis_url must not be empty".into()));
        }
        if self.analysis_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "analysis_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn publish_reset_delay(&self) -> Duration {
        Duration::from_millis(self.publish_reset_delay_ms)
    }
}
