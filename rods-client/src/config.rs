//! Session configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. JSON environment file (`IRODS_ENVIRONMENT_FILE`, or
//!    `~/.irods/irods_environment.json` when it exists)
//! 3. Environment variables (`IRODS_HOST`, `IRODS_PORT`, `IRODS_USER_NAME`,
//!    `IRODS_ZONE_NAME`, `IRODS_PASSWORD`)
//!
//! A session's configuration is fixed once it is connected.

use rods_protocol::DEFAULT_PORT;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default read buffer size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (4 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Environment variable naming an explicit environment file.
pub const ENVIRONMENT_FILE_VAR: &str = "IRODS_ENVIRONMENT_FILE";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Connection and identity settings for a session.
#[derive(Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub zone: String,
    pub password: String,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Timeout for each response; `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: String::new(),
            zone: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(60)),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("zone", &self.zone)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        zone: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            zone: zone.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    /// Returns the `host:port` address to connect to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads configuration from the environment file, then applies
    /// environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::from_environment()?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`SessionConfig::load`] but leaves validation to the caller, so
    /// command-line flags can still fill in missing settings.
    pub fn from_environment() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(ENVIRONMENT_FILE_VAR) {
            config = Self::from_file(&path)?;
        } else if let Some(path) = default_environment_file().filter(|p| p.exists()) {
            tracing::debug!("Using environment file {}", path.display());
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a JSON environment file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let file: EnvironmentFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

        let mut config = Self::default();
        file.apply(&mut config);
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("IRODS_HOST") {
            self.host = host;
        }

        if let Some(port) = lookup("IRODS_PORT") {
            match port.parse() {
                Ok(parsed) => self.port = parsed,
                Err(_) => tracing::warn!("Ignoring invalid IRODS_PORT value {:?}", port),
            }
        }

        if let Some(user) = lookup("IRODS_USER_NAME") {
            self.user = user;
        }

        if let Some(zone) = lookup("IRODS_ZONE_NAME") {
            self.zone = zone;
        }

        if let Some(password) = lookup("IRODS_PASSWORD") {
            self.password = password;
        }
    }

    /// Checks that the identity settings are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Missing("irods_host"));
        }
        if self.user.is_empty() {
            return Err(ConfigError::Missing("irods_user_name"));
        }
        if self.zone.is_empty() {
            return Err(ConfigError::Missing("irods_zone_name"));
        }
        Ok(())
    }
}

fn default_environment_file() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".irods").join("irods_environment.json"))
}

/// On-disk environment file; unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvironmentFile {
    irods_host: Option<String>,
    irods_port: Option<u16>,
    irods_user_name: Option<String>,
    irods_zone_name: Option<String>,
    irods_password: Option<String>,
    irods_connection_timeout: Option<u64>,
}

impl EnvironmentFile {
    fn apply(self, config: &mut SessionConfig) {
        if let Some(host) = self.irods_host {
            config.host = host;
        }
        if let Some(port) = self.irods_port {
            config.port = port;
        }
        if let Some(user) = self.irods_user_name {
            config.user = user;
        }
        if let Some(zone) = self.irods_zone_name {
            config.zone = zone;
        }
        if let Some(password) = self.irods_password {
            config.password = password;
        }
        if let Some(secs) = self.irods_connection_timeout {
            config.connect_timeout = Duration::from_secs(secs);
        }
    }
}
