//! Server configuration.
//!
//! [`ServerConfig`] is the validated, in-memory form used by every component.
//! [`ServerSettings`] is its serde representation (durations in whole
//! seconds) for loading from JSON files or embedding in a host's own config.

use std::time::Duration;

use serde::Deserialize;
use static_assertions::const_assert;
use thiserror::Error;

use crate::transport::{TransportKind, UnsupportedTransport};

/// Namespace served when none is configured.
pub const DEFAULT_NAMESPACE: &str = "socket.io";
/// Seconds between server heartbeats on streaming transports.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5;
/// Seconds without client activity before a session is killed.
pub const DEFAULT_DISCONNECT_TIMEOUT_SECS: u64 = 10;
/// Largest legacy WebSocket frame accepted by default.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

// Heartbeats must arrive before the liveness deadline lapses.
const_assert!(DEFAULT_HEARTBEAT_SECS < DEFAULT_DISCONNECT_TIMEOUT_SECS);

/// Configuration rejected by [`ServerConfig::validate`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("namespace must not be empty")]
    EmptyNamespace,

    #[error("no transports configured")]
    NoTransports,

    /// A duration was configured as zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending setting.
        field: &'static str,
    },

    /// Heartbeats would never arrive before the session times out.
    #[error("heartbeat interval {heartbeat:?} must be shorter than disconnect timeout {timeout:?}")]
    HeartbeatTooSlow {
        heartbeat: Duration,
        timeout: Duration,
    },

    #[error(transparent)]
    UnknownTransport(#[from] UnsupportedTransport),

    /// The settings document could not be parsed.
    #[error("invalid settings: {0}")]
    Parse(String),
}

/// Validated server configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    namespace: String,
    heartbeat_interval: Duration,
    disconnect_timeout: Duration,
    transports: Vec<TransportKind>,
    max_frame_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            disconnect_timeout: Duration::from_secs(DEFAULT_DISCONNECT_TIMEOUT_SECS),
            transports: TransportKind::ALL.to_vec(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Serve `namespace` instead of the default.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Interval between server heartbeats; also the polling wait.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Inactivity period after which a session is killed.
    #[must_use]
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Advertise only `transports`, in preference order.
    #[must_use]
    pub fn with_transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        self.transports = transports.into_iter().collect();
        self
    }

    /// Limit legacy WebSocket frames to `len` bytes.
    #[must_use]
    pub fn with_max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len;
        self
    }

    /// Check the settings are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first violated rule.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.transports.is_empty() {
            return Err(ConfigError::NoTransports);
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "heartbeat_interval",
            });
        }
        if self.disconnect_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "disconnect_timeout",
            });
        }
        if self.heartbeat_interval >= self.disconnect_timeout {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat: self.heartbeat_interval,
                timeout: self.disconnect_timeout,
            });
        }
        Ok(self)
    }

    #[must_use]
    pub fn namespace(&self) -> &str { &self.namespace }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration { self.heartbeat_interval }

    #[must_use]
    pub fn disconnect_timeout(&self) -> Duration { self.disconnect_timeout }

    /// How long a polling GET waits for outbound messages.
    #[must_use]
    pub fn poll_timeout(&self) -> Duration { self.heartbeat_interval }

    #[must_use]
    pub fn transports(&self) -> &[TransportKind] { &self.transports }

    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Whether `kind` is advertised to clients.
    #[must_use]
    pub fn advertises(&self, kind: TransportKind) -> bool { self.transports.contains(&kind) }
}

/// Serialized settings, typically read from a JSON file.
///
/// Missing fields fall back to the defaults of [`ServerConfig`].
///
/// ```
/// use socketframe::config::{ServerConfig, ServerSettings};
///
/// let settings: ServerSettings =
///     serde_json::from_str(r#"{"namespace":"rt","transports":["websocket"]}"#).unwrap();
/// let config = ServerConfig::try_from(settings).unwrap();
/// assert_eq!(config.namespace(), "rt");
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub namespace: Option<String>,
    pub heartbeat_interval_secs: Option<u64>,
    pub disconnect_timeout_secs: Option<u64>,
    /// Transport names in preference order.
    pub transports: Option<Vec<String>>,
    pub max_frame_length: Option<usize>,
}

impl ServerSettings {
    /// Parse settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl TryFrom<ServerSettings> for ServerConfig {
    type Error = ConfigError;

    fn try_from(settings: ServerSettings) -> Result<Self, Self::Error> {
        let mut config = ServerConfig::default();
        if let Some(namespace) = settings.namespace {
            config = config.with_namespace(namespace);
        }
        if let Some(secs) = settings.heartbeat_interval_secs {
            config = config.with_heartbeat_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.disconnect_timeout_secs {
            config = config.with_disconnect_timeout(Duration::from_secs(secs));
        }
        if let Some(names) = settings.transports {
            let kinds = names
                .iter()
                .map(|name| name.parse::<TransportKind>())
                .collect::<Result<Vec<_>, _>>()?;
            config = config.with_transports(kinds);
        }
        if let Some(len) = settings.max_frame_length {
            config = config.with_max_frame_length(len);
        }
        config.validate()
    }
}
