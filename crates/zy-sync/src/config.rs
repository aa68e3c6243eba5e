//! Lock configuration.
//!
//! Only process-shared locks consult the configuration; thread-scoped locks
//! have nothing to tune.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};

/// Longest namespace accepted. Keeps segment names under the 31 byte limit
/// some platforms put on shared memory object names.
pub const MAX_NAMESPACE_LEN: usize = 8;

/// Configuration for process-shared locks.
///
/// ```rust
/// use std::time::Duration;
/// use zy_sync::LockConfig;
///
/// let config = LockConfig::builder()
///     .namespace("svc")
///     .attach_timeout(Duration::from_secs(2))
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Prefix of every shared memory object name. Locks with the same name in
    /// different namespaces are unrelated.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// How long an attacher waits for the creator to finish initializing a
    /// segment it has just created.
    #[serde(default = "default_attach_timeout")]
    #[serde(with = "humantime_serde")]
    pub attach_timeout: Duration,

    /// Sleep between checks while waiting for initialization.
    #[serde(default = "default_poll_interval")]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_namespace() -> String {
    "zy".to_string()
}

fn default_attach_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1)
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            attach_timeout: default_attach_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl LockConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> LockConfigBuilder {
        LockConfigBuilder::new()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(LockError::config("namespace cannot be empty"));
        }
        if self.namespace.len() > MAX_NAMESPACE_LEN {
            return Err(LockError::config(format!(
                "namespace must be at most {MAX_NAMESPACE_LEN} characters"
            )));
        }
        if !self
            .namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(LockError::config(
                "namespace must contain only ASCII alphanumeric characters, hyphens, and underscores",
            ));
        }
        if self.attach_timeout.is_zero() {
            return Err(LockError::config("attach_timeout must be greater than 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(LockError::config("poll_interval must be greater than 0"));
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// Returns an error if the document cannot be parsed or is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LockError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LockError::config(format!("failed to read config: {e}")))?;
        Self::from_toml_str(&content)
    }
}

/// Builder for [`LockConfig`].
#[derive(Debug, Clone)]
pub struct LockConfigBuilder {
    config: LockConfig,
}

impl LockConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LockConfig::default(),
        }
    }

    /// Shared memory name prefix.
    ///
    /// Default: `"zy"`
    #[must_use]
    pub fn namespace(mut self, value: impl Into<String>) -> Self {
        self.config.namespace = value.into();
        self
    }

    /// Bound on waiting for a freshly created segment.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn attach_timeout(mut self, value: Duration) -> Self {
        self.config.attach_timeout = value;
        self
    }

    /// Poll interval while waiting for a segment.
    ///
    /// Default: 1 millisecond
    #[must_use]
    pub const fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> LockConfig {
        self.config
    }
}

impl Default for LockConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
