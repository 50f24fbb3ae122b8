//! # Basalt Configuration
//!
//! All node settings live in a single `basalt.toml` file. The recognized
//! sections are `net` (listen address, advertised port, seed peers), `rpc`
//! (service address), `keys` (identity key directory) and `miner`
//! (proof-of-work complexity handed to the external miner).

#![warn(missing_docs)]
#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its accepted range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Peer-to-peer networking.
    pub net: NetConfig,
    /// RPC service surface.
    pub rpc: RpcConfig,
    /// Node identity keys.
    pub keys: KeysConfig,
    /// Mining parameters.
    pub miner: MinerConfig,
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        debug!(
            listen = %config.net.listen_addr,
            seeds = config.net.nodes.len(),
            "configuration parsed"
        );
        Ok(config)
    }

    /// Checks internal consistency and value ranges.
    pub fn validate(&self) -> Result<()> {
        self.net.validate()?;
        self.rpc.validate()?;
        self.miner.validate()?;
        Ok(())
    }
}

/// `[net]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Address the node listens on for peer connections.
    pub listen_addr: SocketAddr,
    /// Port advertised to peers for incoming connections; defaults to the
    /// listen port.
    pub public_port: Option<u16>,
    /// Seed peers dialed at startup.
    pub nodes: Vec<SocketAddr>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:20203".parse().expect("static address"),
            public_port: None,
            nodes: Vec::new(),
        }
    }
}

impl NetConfig {
    fn validate(&self) -> Result<()> {
        if self.public_port == Some(0) {
            return Err(ConfigError::Invalid("net.public_port must not be 0".into()));
        }
        if self.nodes.iter().any(|n| *n == self.listen_addr) {
            return Err(ConfigError::Invalid(
                "net.nodes must not contain the node's own listen address".into(),
            ));
        }
        Ok(())
    }

    /// The port peers should dial back.
    pub fn advertised_port(&self) -> u16 {
        self.public_port.unwrap_or_else(|| self.listen_addr.port())
    }
}

/// `[rpc]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Address the RPC transport binds.
    pub address: SocketAddr,
    /// Upper bound on concurrently served RPC calls.
    pub max_in_flight: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:50051".parse().expect("static address"),
            max_in_flight: 64,
        }
    }
}

impl RpcConfig {
    fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "rpc.max_in_flight must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// `[keys]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Directory holding the node identity key; created on first start.
    pub directory: PathBuf,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("keys"),
        }
    }
}

/// `[miner]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Proof-of-work complexity target handed to the miner.
    pub complexity: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self { complexity: 16 }
    }
}

impl MinerConfig {
    fn validate(&self) -> Result<()> {
        if self.complexity == 0 {
            return Err(ConfigError::Invalid(
                "miner.complexity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn full_file_parses() {
        let config = Config::from_toml(
            r#"
            [net]
            listen_addr = "0.0.0.0:20203"
            public_port = 20203
            nodes = ["10.0.0.1:20203", "10.0.0.2:20203"]

            [rpc]
            address = "127.0.0.1:50051"

            [keys]
            directory = "/var/lib/basalt/keys"

            [miner]
            complexity = 22
            "#,
        )
        .unwrap();

        assert_eq!(config.net.nodes.len(), 2);
        assert_eq!(config.net.advertised_port(), 20203);
        assert_eq!(config.miner.complexity, 22);
        assert_eq!(config.keys.directory, PathBuf::from("/var/lib/basalt/keys"));
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = Config::from_toml("[net]\nlisten_addr = \"127.0.0.1:9000\"\n").unwrap();
        assert_eq!(config.net.advertised_port(), 9000);
        assert_eq!(config.rpc.max_in_flight, 64);
    }

    #[test]
    fn zero_complexity_is_rejected() {
        let err = Config::from_toml("[miner]\ncomplexity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn own_address_in_seeds_is_rejected() {
        let err = Config::from_toml(
            "[net]\nlisten_addr = \"10.0.0.1:20203\"\nnodes = [\"10.0.0.1:20203\"]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
