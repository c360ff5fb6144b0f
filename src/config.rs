//! # Configuration Management
//!
//! Loads application configuration from multiple sources, highest priority
//! first:
//! 1. Deployment environment variables (`HOST`, `PORT`, `AUDIOHOOK_ORG_ID`,
//!    `AUDIOHOOK_API_KEY`, `MEDIA_PATH`)
//! 2. Environment variables with the `APP_` prefix (double underscore as
//!    the section separator, e.g. `APP_AUTH__API_KEY`)
//! 3. Configuration file (`config.toml`)
//! 4. Built-in defaults
//!
//! The authentication section has no usable defaults on purpose: the server
//! refuses to start until an organization id and API key are configured.

use crate::protocol::media::ChannelPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
    pub protocol: ProtocolConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Identity the AudioHook client must present at connection establishment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Value required in the `audiohook-organization-id` header
    pub organization_id: String,
    /// Shared secret required in the `x-api-key` header
    pub api_key: String,
}

/// Where finalized WAV recordings are written and served from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub path: String,
}

impl MediaConfig {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

/// Protocol-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// How strictly offered channel layouts are matched during negotiation
    pub channel_policy: ChannelPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            auth: AuthConfig {
                organization_id: String::new(),
                api_key: String::new(),
            },
            media: MediaConfig {
                path: "media".to_string(),
            },
            protocol: ProtocolConfig {
                channel_policy: ChannelPolicy::default(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // deployment platform conventions that don't follow the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }
        if let Ok(org_id) = env::var("AUDIOHOOK_ORG_ID") {
            settings = settings.set_override("auth.organization_id", org_id)?;
        }
        if let Ok(api_key) = env::var("AUDIOHOOK_API_KEY") {
            settings = settings.set_override("auth.api_key", api_key)?;
        }
        if let Ok(media_path) = env::var("MEDIA_PATH") {
            settings = settings.set_override("media.path", media_path)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Check that the loaded configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.auth.organization_id.is_empty() {
            return Err(anyhow::anyhow!(
                "auth.organization_id must be configured (AUDIOHOOK_ORG_ID)"
            ));
        }

        if self.auth.api_key.is_empty() {
            return Err(anyhow::anyhow!(
                "auth.api_key must be configured (AUDIOHOOK_API_KEY)"
            ));
        }

        if self.media.path.is_empty() {
            return Err(anyhow::anyhow!("media.path cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.organization_id = "org-123".to_string();
        config.auth.api_key = "secret".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.media.path, "media");
        assert_eq!(config.protocol.channel_policy, ChannelPolicy::Any);
        // defaults are not runnable until auth is configured
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configured_auth_passes_validation() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let mut config = configured();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.media.path = String::new();
        assert!(config.validate().is_err());

        let mut config = configured();
        config.auth.api_key = String::new();
        assert!(config.validate().is_err());
    }
}
