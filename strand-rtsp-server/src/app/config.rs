use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use config::{Config, ConfigError};

use crate::conn::ConnectionConfig;

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Time a recording client may stay silent before it is disconnected.
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Number of RTP packets each connection decodes into before reusing
    /// them.
    pub read_buffer_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 554,
            read_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            read_buffer_count: 256,
        }
    }
}

impl ServerConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            read_buffer_count: self.read_buffer_count,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("strand"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::{AppConfig, ServerConfig};

    #[test]
    fn defaults() {
        let config = ServerConfig::default().connection_config();
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.read_buffer_count, 256);
    }

    #[test]
    fn from_yaml_file_with_partial_server_section() {
        let path = std::env::temp_dir().join(format!("strand-config-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "server:\n  port: 8554\n  read_timeout_ms: 2500").unwrap();
        drop(file);

        let config = AppConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.port, 8554);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(
            config.server.connection_config().read_timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(config.server.read_buffer_count, 256);
    }
}
