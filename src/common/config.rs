//! # Configuration
//!
//! Configuration structures for the primary and standby orchestrators, with
//! TOML parsing utilities. Every field has a default matching the reference
//! deployment, so the binaries run with no configuration file at all; a
//! `--config` file overrides selectively.

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;

/// Load a TOML configuration file and deserialize it into the given type.
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// One entry in the credential seed list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub password: String,
}

/// Where the primary listens for clients and workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub client_port: u16,
    pub worker_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            client_port: 5000,
            worker_port: 5001,
        }
    }
}

/// Where the primary reaches its standby replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StandbyEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for StandbyEndpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5002,
        }
    }
}

/// Primary-side timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds without a heartbeat before a worker is declared dead.
    pub heartbeat_timeout_secs: u64,
    /// Seconds between attempts to reach the standby.
    pub reconnect_backoff_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: 10,
            reconnect_backoff_secs: 5,
        }
    }
}

/// Credential seed for the auth registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub users: Vec<UserEntry>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: vec![
                UserEntry {
                    username: "cliente1".to_string(),
                    password: "senha123".to_string(),
                },
                UserEntry {
                    username: "cliente2".to_string(),
                    password: "senha456".to_string(),
                },
            ],
        }
    }
}

/// Complete configuration for the primary orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub network: NetworkConfig,
    pub standby: StandbyEndpoint,
    pub timing: TimingConfig,
    pub auth: AuthConfig,
}

impl OrchestratorConfig {
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.network.host, self.network.client_port)
    }

    pub fn worker_addr(&self) -> String {
        format!("{}:{}", self.network.host, self.network.worker_port)
    }

    pub fn standby_addr(&self) -> String {
        format!("{}:{}", self.standby.host, self.standby.port)
    }
}

/// Where the standby listens for the primary's replication stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationListen {
    pub host: String,
    pub port: u16,
}

impl Default for ReplicationListen {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5002,
        }
    }
}

/// The primary endpoints the standby probes before declaring failover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryEndpoints {
    pub host: String,
    pub client_port: u16,
    pub worker_port: u16,
}

impl Default for PrimaryEndpoints {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            client_port: 5000,
            worker_port: 5001,
        }
    }
}

/// Standby-side timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverTiming {
    /// Seconds of replication silence before probing the primary.
    pub failover_timeout_secs: u64,
}

impl Default for FailoverTiming {
    fn default() -> Self {
        Self {
            failover_timeout_secs: 15,
        }
    }
}

/// Complete configuration for the standby orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StandbyConfig {
    pub listen: ReplicationListen,
    pub primary: PrimaryEndpoints,
    pub timing: FailoverTiming,
}

impl StandbyConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }
}
