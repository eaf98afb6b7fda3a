use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(default = "redis://localhost:6379/")]
    pub redis_url: String,

    /// Base URL for the identifier-scoped credential lookup; the parent id is
    /// appended as a path segment.
    #[envconfig(default = "http://localhost:8010/token")]
    pub token_url: String,

    #[envconfig(default = "http://localhost:8020/summary")]
    pub summary_url: String,

    #[envconfig(default = "http://localhost:8020/current-logs")]
    pub current_logs_url: String,

    /// Base URL for the profile lookup; the child id is appended as a path
    /// segment.
    #[envconfig(default = "http://localhost:8030/profile")]
    pub profile_url: String,

    /// Endpoint receiving terminal-failure audit records.
    #[envconfig(default = "http://localhost:8040/failures")]
    pub audit_url: String,

    #[envconfig(default = "5000")]
    pub request_timeout: EnvMsDuration,

    /// Aggregation window requested from the summary lookup.
    #[envconfig(default = "week")]
    pub summary_mode: String,

    #[envconfig(default = "UTC")]
    pub time_zone: String,

    /// Prepended to every cache key. Empty in production; tests set a fixed
    /// literal so entries never collide with production keys.
    #[envconfig(default = "")]
    pub cache_key_prefix: String,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
