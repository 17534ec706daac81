use anyhow::Context;
use serde::Deserialize;

use crate::http::parser::DEFAULT_MAX_HEADER_SIZE;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

/// Settings for a [`Server`](crate::server::Server) and its connections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the bundled run loop binds to.
    pub listen_addr: String,
    /// gzip/deflate level, 0-9.
    pub compression_level: u32,
    /// Upper bound on buffers handed to one vectored write.
    pub max_write_segments: usize,
    pub max_header_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            compression_level: 6,
            max_write_segments: 1024,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// The YAML file named by `LANTERN_CONFIG` is read if the variable is
    /// set. `LISTEN` overrides the listen address either way.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("LANTERN_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                Self::from_yaml(&text).with_context(|| format!("parsing config file {path}"))?
            }
            Err(_) => Self::default(),
        };
        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let server = &self.server;
        anyhow::ensure!(
            server.compression_level <= 9,
            "compression_level must be between 0 and 9, got {}",
            server.compression_level
        );
        anyhow::ensure!(server.max_write_segments > 0, "max_write_segments must be positive");
        anyhow::ensure!(server.max_header_size > 0, "max_header_size must be positive");
        Ok(())
    }
}
