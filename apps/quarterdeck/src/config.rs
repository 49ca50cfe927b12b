use std::env;
use std::time::Duration;
#[cfg(test)]
use std::sync::Mutex;

const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Quarterdeck application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// The executor socket address (defaults to "127.0.0.1:8080")
    pub session_server: String,
    /// Bound on waiting for a command result before it is failed
    pub command_timeout: Duration,
    /// Delay before the single scheduled reconnect attempt after a drop
    pub reconnect_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let server = env::var("QUARTERDECK_SESSION_SERVER")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference on macOS
        let server = if server.starts_with("localhost:") {
            server.replacen("localhost", "127.0.0.1", 1)
        } else {
            server
        };
        Self {
            session_server: server,
            command_timeout: secs_var(
                "QUARTERDECK_COMMAND_TIMEOUT",
                DEFAULT_COMMAND_TIMEOUT_SECS,
            ),
            reconnect_delay: secs_var(
                "QUARTERDECK_RECONNECT_DELAY",
                DEFAULT_RECONNECT_DELAY_SECS,
            ),
        }
    }
}

fn secs_var(var: &str, default: u64) -> Duration {
    let secs = env::var(var)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_server: "127.0.0.1:8080".to_string(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
        }
    }
}
