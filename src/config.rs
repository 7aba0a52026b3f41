use std::{
    net::{Ipv4Addr, SocketAddr},
    num::{NonZeroU64, NonZeroUsize},
    time::Duration,
};

use crate::web::StreamSettings;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LogcastConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Seconds between keep-alive comments on idle live streams (default: 5)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: NonZeroU64,
    /// Events buffered per stream before the reader waits (default: 256)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: NonZeroUsize,
    /// Docker daemon address, e.g. `tcp://10.0.0.5:2375`. The local socket
    /// is used when unset.
    #[serde(default)]
    pub docker_host: Option<String>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_ping_interval() -> NonZeroU64 {
    NonZeroU64::new(5).expect("non-zero")
}

fn default_event_buffer() -> NonZeroUsize {
    NonZeroUsize::new(crate::logs::generator::DEFAULT_CAPACITY).expect("non-zero")
}

impl Default for LogcastConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_secs: default_ping_interval(),
            event_buffer: default_event_buffer(),
            docker_host: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl LogcastConfig {
    fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(val)?)
    }

    /// Load the config file named on the command line. A missing file is not
    /// an error; every setting has a default.
    pub fn try_init() -> Result<Self, ConfigError> {
        let args = crate::cli::get_cli_args();
        let mut config = match std::fs::read_to_string(&args.config) {
            Ok(contents) => Self::try_init_from_string(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "No config file at {}, using defaults",
                    args.config.display()
                );
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(listen) = args.listen {
            config.listen = listen;
        }
        Ok(config)
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            ping_interval: Duration::from_secs(self.ping_interval_secs.get()),
            event_buffer: self.event_buffer.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = LogcastConfig::try_init_from_string("").unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.stream_settings().ping_interval, Duration::from_secs(5));
        assert_eq!(config.stream_settings().event_buffer, 256);
        assert_eq!(config.docker_host, None);
    }

    #[test]
    fn test_overrides() {
        let config = LogcastConfig::try_init_from_string(
            r#"
            listen = "127.0.0.1:9000"
            ping_interval_secs = 15
            event_buffer = 32
            docker_host = "tcp://10.0.0.5:2375"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.stream_settings().ping_interval, Duration::from_secs(15));
        assert_eq!(config.event_buffer.get(), 32);
        assert_eq!(config.docker_host.as_deref(), Some("tcp://10.0.0.5:2375"));
    }

    #[test]
    fn test_zero_ping_interval_is_rejected() {
        let err = LogcastConfig::try_init_from_string("ping_interval_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
