use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, io, path::Path};
use tracing::info;

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: ListenConfig,
    pub tunnel: TunnelConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub ip: String,
    pub port: u16,
    pub allowed_client_ips: Option<Vec<String>>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 80,
            allowed_client_ips: None,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Shared secret expected in the `X-Pass` header. Empty means no secret
    /// is configured and only loopback targets are accepted.
    pub secret: String,
    /// Target used when the client does not send an `X-Real-Host` header.
    pub default_host: String,
    pub buffer_size: usize,
    /// Number of 3-second idle ticks before a relay session is torn down.
    pub idle_ticks: u32,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            default_host: "127.0.0.1:22".to_string(),
            buffer_size: 8196 * 8,
            idle_ticks: 60,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(config_file = %path.display(), "No config file found, using built-in defaults");
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read config file {}", path.display()));
        }
    };
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse {} as valid TOML", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_values() {
        let config = Config::default();
        assert_eq!(config.listen.ip, "0.0.0.0");
        assert_eq!(config.listen.port, 80);
        assert!(config.listen.allowed_client_ips.is_none());
        assert!(config.tunnel.secret.is_empty());
        assert_eq!(config.tunnel.default_host, "127.0.0.1:22");
        assert_eq!(config.tunnel.buffer_size, 8196 * 8);
        assert_eq!(config.tunnel.idle_ticks, 60);
    }

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            [listen]
            ip = "127.0.0.1"
            port = 8080
            allowed_client_ips = ["10.0.0.0/8"]

            [tunnel]
            secret = "hunter2"
            default_host = "127.0.0.1:2222"
            buffer_size = 4096
            idle_ticks = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.listen.ip, "127.0.0.1");
        assert_eq!(config.listen.port, 8080);
        assert_eq!(
            config.listen.allowed_client_ips,
            Some(vec!["10.0.0.0/8".to_string()])
        );
        assert_eq!(config.tunnel.secret, "hunter2");
        assert_eq!(config.tunnel.default_host, "127.0.0.1:2222");
        assert_eq!(config.tunnel.buffer_size, 4096);
        assert_eq!(config.tunnel.idle_ticks, 10);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [listen]
            port = 8888
            "#,
        )
        .unwrap();
        assert_eq!(config.listen.ip, "0.0.0.0");
        assert_eq!(config.listen.port, 8888);
        assert_eq!(config.tunnel.default_host, "127.0.0.1:22");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/ws-tunnel-config.toml")).unwrap();
        assert_eq!(config.listen.port, 80);
    }
}
