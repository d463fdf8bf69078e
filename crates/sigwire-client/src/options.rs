//! Socket configuration

use serde::{Deserialize, Serialize};
use sigwire_core::{DEFAULT_KEY, DEFAULT_PORT, SIGNALING_PATH};
use std::time::Duration;
use tracing::Level;
use url::form_urlencoded;

/// Policy for read errors that are not a graceful close.
///
/// Consecutive failures back off exponentially from `base_delay_ms`; a
/// successful read resets the count. Once `max_retries` is exceeded the
/// connection is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadRetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl ReadRetryPolicy {
    /// Tear down on the first non-graceful read error
    pub fn terminal() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based), or None once exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 1u64 << (attempt - 1).min(16);
        Some(Duration::from_millis(self.base_delay_ms.saturating_mul(factor)))
    }
}

impl Default for ReadRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
        }
    }
}

/// Signaling socket configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    pub host: String,
    pub port: u16,
    /// Path prefix in front of `/peerjs`
    pub path: String,
    /// API key
    pub key: String,
    /// Use `wss` instead of `ws`
    pub secure: bool,
    /// Keepalive ping period in milliseconds
    pub ping_interval_ms: u64,
    /// Diagnostic verbosity: 0 errors, 1 warnings, 2 info, 3 debug
    pub debug: u8,
    pub read_retry: ReadRetryPolicy,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            host: "0.peerjs.com".to_string(),
            port: DEFAULT_PORT,
            path: "/".to_string(),
            key: DEFAULT_KEY.to_string(),
            secure: true,
            ping_interval_ms: 5000,
            debug: 0,
            read_retry: ReadRetryPolicy::default(),
        }
    }
}

impl SocketOptions {
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the keepalive period in milliseconds
    pub fn ping_interval(mut self, ms: u64) -> Self {
        self.ping_interval_ms = ms;
        self
    }

    pub fn debug(mut self, level: u8) -> Self {
        self.debug = level;
        self
    }

    pub fn read_retry(mut self, policy: ReadRetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Keepalive period. Never zero, so the ticker cannot spin.
    pub fn keepalive_period(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    /// Most verbose level the socket's own diagnostics are emitted at
    pub fn log_level(&self) -> Level {
        match self.debug {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            _ => Level::DEBUG,
        }
    }

    /// Whether diagnostics at `level` are enabled by `debug`
    pub fn logs(&self, level: Level) -> bool {
        level <= self.log_level()
    }

    /// URL up to and including the key, shared by every connection attempt
    pub fn base_url(&self) -> String {
        let path = self.path.trim_end_matches('/');
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("key", &self.key)
            .finish();
        format!(
            "{}://{}:{}{}{}?{}",
            self.scheme(),
            self.host,
            self.port,
            path,
            SIGNALING_PATH,
            query
        )
    }

    /// Full connection URL for a peer id and session token
    pub fn build_url(&self, id: &str, token: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("id", id)
            .append_pair("token", token)
            .finish();
        format!("{}&{}", self.base_url(), query)
    }
}
