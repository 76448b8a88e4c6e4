//! Session configuration.
//!
//! Read from the environment by [`Config::from_env`]:
//!
//! - `Z21_HOST`: address of the command station (default: `192.168.0.111`)
//! - `Z21_PORT`: UDP port (default: 21105)
//! - `Z21_TIMEOUT_MS`: receive window in milliseconds (default: 3000)
//! - `Z21_VERBOSE`: log raw datagrams (`1` or `true`)

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_PORT;

pub const ENV_HOST: &str = "Z21_HOST";
pub const ENV_PORT: &str = "Z21_PORT";
pub const ENV_TIMEOUT_MS: &str = "Z21_TIMEOUT_MS";
pub const ENV_VERBOSE: &str = "Z21_VERBOSE";

/// Factory address of a Z21.
pub const DEFAULT_HOST: &str = "192.168.0.111";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// How long a receive waits before failing with [`Error::Timeout`].
    pub timeout: Duration,
    /// Log every datagram sent and received as hex.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            verbose: false,
        }
    }
}

impl Config {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// `host:port` as passed to the socket.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset or empty keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get(ENV_HOST) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = get(ENV_PORT) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("{ENV_PORT}='{port}' is not a port number")))?;
        }
        if let Some(ms) = get(ENV_TIMEOUT_MS) {
            let ms = ms
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|&ms| ms > 0)
                .ok_or_else(|| Error::InvalidArgument(format!("{ENV_TIMEOUT_MS}='{ms}' is not a positive number")))?;
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(verbose) = get(ENV_VERBOSE) {
            let verbose = verbose.trim();
            config.verbose = verbose == "1" || verbose.eq_ignore_ascii_case("true");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.address(), "192.168.0.111:21105");
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn environment_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_HOST, "192.168.178.242"),
            (ENV_PORT, "21106"),
            (ENV_TIMEOUT_MS, "500"),
            (ENV_VERBOSE, "TRUE"),
        ]))
        .unwrap();
        assert_eq!(config.address(), "192.168.178.242:21106");
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert!(config.verbose);
    }

    #[test]
    fn empty_values_keep_defaults() {
        let config = Config::from_lookup(lookup(&[(ENV_HOST, "  "), (ENV_VERBOSE, "")])).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert!(!config.verbose);
    }

    #[test]
    fn malformed_port_is_rejected() {
        let err = Config::from_lookup(lookup(&[(ENV_PORT, "z21")])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "0")])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(Config::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "1")])).is_ok());
    }
}
