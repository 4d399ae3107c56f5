use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    #[serde(deserialize_with = "deserialize_bytes")]
    pub max_decompressed_payload_bytes: u64,
}

/// Command line arguments for configuration overrides, matching the flags the optimizer's
/// launch scripts pass.
#[derive(Parser, Debug, Clone)]
#[command(name = "videx-server")]
#[command(version, about = "Virtual storage-engine statistics server")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server listen address (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_ip: Option<String>,

    /// Server listen port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Force debug-level logging
    #[arg(long)]
    pub debug: bool,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support.
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with VIDEX_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - VIDEX_SERVER_IP: listen address (default: 127.0.0.1)
    /// - VIDEX_PORT: listen port (default: 8000)
    /// - VIDEX_LOG_LEVEL: logging level, e.g. "info" or "debug"
    /// - VIDEX_LOG_DIRECTORY: directory for a rolling log file
    /// - VIDEX_MAX_PAYLOAD_BYTES: decompressed task-payload cap, accepts "64MB" style sizes
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VIDEX_SERVER_IP") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("VIDEX_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(level) = std::env::var("VIDEX_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(dir) = std::env::var("VIDEX_LOG_DIRECTORY") {
            self.logging.directory = Some(PathBuf::from(dir));
            tracing::info!("Override logging.directory from env");
        }

        if let Ok(bytes) = std::env::var("VIDEX_MAX_PAYLOAD_BYTES") {
            match parse_bytes(&bytes) {
                Ok(val) => {
                    self.limits.max_decompressed_payload_bytes = val;
                    tracing::info!(
                        "Override limits.max_decompressed_payload_bytes from env: {}",
                        val
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid VIDEX_MAX_PAYLOAD_BYTES '{}': {} (keep {})",
                    bytes,
                    e,
                    self.limits.max_decompressed_payload_bytes
                ),
            }
        }
    }

    /// Apply command line argument overrides (highest priority).
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_ip {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if args.debug {
            self.logging.level = "debug".to_string();
            tracing::info!("Override logging.level from CLI: debug");
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("server.port cannot be 0");
        }
        if self.limits.max_decompressed_payload_bytes == 0 {
            anyhow::bail!("limits.max_decompressed_payload_bytes must be > 0");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];
        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), directory: None }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_decompressed_payload_bytes: 64 * 1024 * 1024 }
    }
}

fn parse_bytes(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }
    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "b" => Ok(n),
        "kb" => Ok(n * 1024),
        "mb" => Ok(n * 1024 * 1024),
        "gb" => Ok(n * 1024 * 1024 * 1024),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn deserialize_bytes<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a byte count or a string like '64MB'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_bytes(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_bytes(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_byte_sizes() {
        assert_eq!(parse_bytes("64MB").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_bytes("1024").unwrap(), 1024);
        assert_eq!(parse_bytes("2GB").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
