//! Session configuration.
//!
//! Everything a session needs to find and talk to the DUT, resolved once
//! when the session is created.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_POSIX_SERVER_PORT: u16 = 40000;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_RPC_KEEPALIVE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DutConfig {
    /// Posix server address; empty means 127.0.0.1.
    pub posix_server_ip: String,
    pub posix_server_port: u16,
    /// Deadline applied by calls that don't take one.
    #[serde(with = "millis")]
    pub rpc_timeout: Duration,
    #[serde(with = "millis")]
    pub rpc_keepalive: Duration,
    /// DUT address listeners bind to.
    pub remote_ipv4: Ipv4Addr,
    pub remote_ipv6: Ipv6Addr,
}

impl Default for DutConfig {
    fn default() -> Self {
        Self {
            posix_server_ip: String::new(),
            posix_server_port: DEFAULT_POSIX_SERVER_PORT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            rpc_keepalive: DEFAULT_RPC_KEEPALIVE,
            remote_ipv4: Ipv4Addr::UNSPECIFIED,
            remote_ipv6: Ipv6Addr::UNSPECIFIED,
        }
    }
}

impl DutConfig {
    /// Defaults overlaid with `POSIX_SERVER_IP`, `POSIX_SERVER_PORT`,
    /// `RPC_TIMEOUT_MS`, `RPC_KEEPALIVE_MS`, `REMOTE_IPV4` and `REMOTE_IPV6`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`DutConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ip) = lookup("POSIX_SERVER_IP") {
            config.posix_server_ip = ip;
        }
        if let Some(port) = parse_var(&lookup, "POSIX_SERVER_PORT")? {
            config.posix_server_port = port;
        }
        if let Some(duration) = parse_millis_var(&lookup, "RPC_TIMEOUT_MS")? {
            config.rpc_timeout = duration;
        }
        if let Some(duration) = parse_millis_var(&lookup, "RPC_KEEPALIVE_MS")? {
            config.rpc_keepalive = duration;
        }
        if let Some(addr) = parse_var(&lookup, "REMOTE_IPV4")? {
            config.remote_ipv4 = addr;
        }
        if let Some(addr) = parse_var(&lookup, "REMOTE_IPV6")? {
            config.remote_ipv6 = addr;
        }
        Ok(config)
    }

    /// Parses JSON; missing fields keep their defaults, durations are milliseconds.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Resolves the posix server endpoint.
    pub fn server_address(&self) -> Result<SocketAddr, ConfigError> {
        let host = if self.posix_server_ip.is_empty() {
            Ipv4Addr::LOCALHOST.to_string()
        } else {
            self.posix_server_ip.clone()
        };
        let endpoint = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.posix_server_port)
        } else {
            format!("{}:{}", host, self.posix_server_port)
        };

        let mut resolved = endpoint
            .to_socket_addrs()
            .map_err(|err| ConfigError::Resolve {
                addr: endpoint.clone(),
                reason: err.to_string(),
            })?;
        resolved.next().ok_or_else(|| ConfigError::Resolve {
            addr: endpoint,
            reason: "no addresses found".to_string(),
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { var, value }),
    }
}

/// A duration in whole milliseconds; zero is rejected.
fn parse_millis_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match parse_var::<u64>(lookup, var)? {
        Some(0) => Err(ConfigError::InvalidVar {
            var,
            value: lookup(var).unwrap_or_default(),
        }),
        ms => Ok(ms.map(Duration::from_millis)),
    }
}

mod millis {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match u64::deserialize(deserializer)? {
            0 => Err(D::Error::custom("duration must be at least 1 ms")),
            ms => Ok(Duration::from_millis(ms)),
        }
    }
}
