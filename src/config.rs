//! Configuration module for the ping/pong fixture server.
//!
//! Supports command-line arguments, environment variables and a TOML
//! configuration file. CLI arguments (or their environment variables) take
//! precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the fixture server
#[derive(Parser, Debug, Default)]
#[command(name = "pingpong-fixture")]
#[command(author = "pingpong-fixture authors")]
#[command(version = "0.1.0")]
#[command(about = "A fixed-width ping/pong server for protocol client tests", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, env = "PINGPONG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to (e.g., 127.0.0.1 or localhost)
    #[arg(long, env = "PINGPONG_HOST")]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "PINGPONG_PORT")]
    pub port: Option<u16>,

    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Read/write timeout per connection in milliseconds (0 = block forever)
    #[arg(long, env = "PINGPONG_IO_TIMEOUT_MS")]
    pub io_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Per-connection read/write timeout in milliseconds
    #[serde(default)]
    pub io_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            io_timeout_ms: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

// Sessions are serviced one at a time.
fn default_backlog() -> i32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub backlog: i32,
    pub io_timeout: Option<Duration>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args, environment and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge already-parsed CLI args with the TOML file they point at.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let host = cli.host.unwrap_or(toml_config.server.host);
        let port = cli.port.unwrap_or(toml_config.server.port);
        let io_timeout_ms = cli.io_timeout_ms.unwrap_or(toml_config.server.io_timeout_ms);

        Ok(Config {
            addr: resolve(&host, port)?,
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog).max(1),
            io_timeout: (io_timeout_ms > 0).then(|| Duration::from_millis(io_timeout_ms)),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Resolve `host:port`, preferring an IPv4 address.
fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let to_err = |e| ConfigError::Resolve(format!("{host}:{port}"), e);
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs().map_err(to_err)?.collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            to_err(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses for host",
            ))
        })
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Failed to resolve listen address '{0}': {1}")]
    Resolve(String, #[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.server.backlog, 1);
        assert_eq!(config.server.io_timeout_ms, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 6001
            backlog = 4
            io_timeout_ms = 2500

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 6001);
        assert_eq!(config.server.backlog, 4);
        assert_eq!(config.server.io_timeout_ms, 2500);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("[server]\nport = 7001\n").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7001);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_merge_defaults() {
        let config = Config::merge(CliArgs::default(), TomlConfig::default()).unwrap();
        assert_eq!(config.addr, "127.0.0.1:5001".parse().unwrap());
        assert_eq!(config.backlog, 1);
        assert_eq!(config.io_timeout, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 6001
            io_timeout_ms = 100

            [logging]
            level = "warn"
        "#,
        )
        .unwrap();
        let cli = CliArgs {
            port: Some(7001),
            io_timeout_ms: Some(0),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };

        let config = Config::merge(cli, toml_config).unwrap();
        assert_eq!(config.addr.port(), 7001);
        assert_eq!(config.io_timeout, None);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_io_timeout_from_toml() {
        let toml_config: TomlConfig = toml::from_str("[server]\nio_timeout_ms = 250\n").unwrap();
        let config = Config::merge(CliArgs::default(), toml_config).unwrap();
        assert_eq!(config.io_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_backlog_is_at_least_one() {
        let cli = CliArgs {
            backlog: Some(0),
            ..Default::default()
        };
        let config = Config::merge(cli, TomlConfig::default()).unwrap();
        assert_eq!(config.backlog, 1);
    }

    #[test]
    fn test_resolve_localhost() {
        let addr = resolve("localhost", 5001).unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 5001);
    }

    #[test]
    fn test_resolve_unknown_host() {
        assert!(matches!(
            resolve("no such host.invalid", 5001),
            Err(ConfigError::Resolve(..))
        ));
    }

    #[test]
    fn test_cli_parsing() {
        let cli = CliArgs::try_parse_from([
            "pingpong-fixture",
            "--host",
            "127.0.0.1",
            "-p",
            "6123",
            "--io-timeout-ms",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(6123));
        assert_eq!(cli.io_timeout_ms, Some(50));
    }

    #[test]
    fn test_missing_config_file() {
        let cli = CliArgs {
            config: Some(PathBuf::from("/nonexistent/pingpong.toml")),
            ..Default::default()
        };
        match Config::from_args(cli) {
            Err(ConfigError::FileRead(path, _)) => {
                assert_eq!(path, PathBuf::from("/nonexistent/pingpong.toml"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
