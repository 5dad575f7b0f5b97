//! Node configuration.
//!
//! Loaded from an optional YAML file, then overridden by `AGORA__*`
//! environment variables (for example `AGORA__CLIENT__QUEUE_CAPACITY=512`),
//! then by command-line flags in `main`.

use agora_realtime::{ClientConfig, DispatcherConfig, GroupId, HubConfig, UserId, UserProfile};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the Agora node.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub hub: HubSettings,
    pub client: ClientSettings,
    /// Users, sessions and groups loaded into the in-memory stores.
    pub seed: SeedConfig,
}

impl Config {
    /// Load configuration from `path` (if it exists) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("AGORA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let client = &self.client;
        if client.queue_capacity == 0 {
            return Err(ConfigError::Invalid("client.queue_capacity must be > 0".into()));
        }
        if client.pong_wait_secs == 0 || client.write_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "client.pong_wait_secs and client.write_wait_secs must be > 0".into(),
            ));
        }
        let ping = self.client_config().ping_period;
        if ping.is_zero() || ping >= Duration::from_secs(client.pong_wait_secs) {
            return Err(ConfigError::Invalid(
                "client.ping_period_secs must be > 0 and shorter than client.pong_wait_secs".into(),
            ));
        }
        if self.hub.command_capacity == 0 || self.hub.presence_capacity == 0 {
            return Err(ConfigError::Invalid("hub capacities must be > 0".into()));
        }
        Ok(())
    }

    /// Hub settings.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            command_capacity: self.hub.command_capacity,
            presence_capacity: self.hub.presence_capacity,
        }
    }

    /// Per-connection settings.
    pub fn client_config(&self) -> ClientConfig {
        let pong_wait = Duration::from_secs(self.client.pong_wait_secs);
        ClientConfig {
            queue_capacity: self.client.queue_capacity,
            write_wait: Duration::from_secs(self.client.write_wait_secs),
            pong_wait,
            ping_period: self
                .client
                .ping_period_secs
                .map(Duration::from_secs)
                .unwrap_or(pong_wait * 9 / 10),
        }
    }

    /// Inbound message limits.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_frame_bytes: self.client.max_frame_bytes,
            max_content_chars: self.client.max_content_chars,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Output format (pretty or json).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Hub channel sizes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubSettings {
    pub command_capacity: usize,
    pub presence_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        let defaults = HubConfig::default();
        Self {
            command_capacity: defaults.command_capacity,
            presence_capacity: defaults.presence_capacity,
        }
    }
}

/// Connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Outbound queue capacity per connection.
    pub queue_capacity: usize,
    /// Seconds allowed to write one frame.
    pub write_wait_secs: u64,
    /// Seconds allowed between pongs.
    pub pong_wait_secs: u64,
    /// Seconds between pings. Defaults to 9/10 of `pong_wait_secs`.
    pub ping_period_secs: Option<u64>,
    /// Maximum inbound frame size in bytes.
    pub max_frame_bytes: usize,
    /// Maximum message length in characters.
    pub max_content_chars: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let client = ClientConfig::default();
        let dispatcher = DispatcherConfig::default();
        Self {
            queue_capacity: client.queue_capacity,
            write_wait_secs: client.write_wait.as_secs(),
            pong_wait_secs: client.pong_wait.as_secs(),
            ping_period_secs: None,
            max_frame_bytes: dispatcher.max_frame_bytes,
            max_content_chars: dispatcher.max_content_chars,
        }
    }
}

/// Demo data for the in-memory stores.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SeedConfig {
    pub users: Vec<SeedUser>,
    pub groups: Vec<SeedGroup>,
}

/// A user with a ready-made session token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedUser {
    pub session_token: String,
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl SeedUser {
    /// Display metadata for the user.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.user_id,
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// A group and its members.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedGroup {
    pub id: GroupId,
    pub members: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let client = config.client_config();
        assert_eq!(client.queue_capacity, 256);
        assert_eq!(client.ping_period, Duration::from_secs(54));
        assert_eq!(config.server.addr.port(), 8080);
    }

    #[test]
    fn test_ping_must_be_shorter_than_pong_wait() {
        let mut config = Config::default();
        config.client.ping_period_secs = Some(60);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.client.ping_period_secs = Some(30);
        assert!(config.validate().is_ok());
        assert_eq!(config.client_config().ping_period, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_queue_rejected() {
        let mut config = Config::default();
        config.client.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_yaml_seed_deserialization() {
        let yaml = r#"
seed:
  users:
    - session_token: "alice-token"
      user_id: 1
      username: "alice"
  groups:
    - id: 7
      members: [1, 2]
"#;
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.seed.users[0].profile().username, "alice");
        assert_eq!(config.seed.groups[0].members, vec![1, 2]);
        assert_eq!(config.client.queue_capacity, 256);
    }
}
