//! Configuration management for ukfaas
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (`UKFAAS_*` prefix, highest precedence)
//! 2. `ukfaas.local.toml` (gitignored, local overrides)
//! 3. `ukfaas.toml` (git-tracked, project config)
//! 4. Built-in defaults (lowest precedence)

use std::path::PathBuf;
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

mod loader;

pub use loader::ConfigLoader;

/// Main ukfaas configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UkfaasConfig {
    pub provider: ProviderConfig,
    pub containerd: ContainerdConfig,
    pub network: NetworkConfig,
    pub paths: PathsConfig,
}

/// The HTTP provider surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// TCP port the provider listens on.
    pub port: u16,

    /// Socket read timeout, seconds.
    pub read_timeout_secs: u64,

    /// Socket write timeout, seconds. Also bounds the invoke readiness
    /// wait.
    pub write_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            read_timeout_secs: 60,
            write_timeout_secs: 60,
        }
    }
}

/// The containerd daemon providing the OCI image store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerdConfig {
    pub socket: PathBuf,

    /// Namespace unikernel images are pulled into.
    pub namespace: String,
}

impl Default for ContainerdConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/containerd/containerd.sock"),
            namespace: "openfaas".to_string(),
        }
    }
}

/// Bridge and virtual-IP addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Name of the replica bridge.
    pub bridge_name: String,

    /// Gateway address and prefix of the replica bridge.
    pub bridge_gateway: Ipv4Net,

    /// Pool virtual service IPs are allocated from.
    pub service_subnet: Ipv4Net,

    /// TCP port of the in-VM watchdog.
    pub watchdog_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge_name: "openfaas0".to_string(),
            bridge_gateway: "10.63.0.1/16".parse().expect("valid default gateway"),
            service_subnet: "10.63.0.0/16".parse().expect("valid default subnet"),
            watchdog_port: 8080,
        }
    }
}

/// State directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where pulled images are unpacked.
    pub oci_dir: PathBuf,

    /// Per-replica state directories.
    pub machine_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            oci_dir: PathBuf::from("/tmp/ukfaas/oci"),
            machine_dir: PathBuf::from("/tmp/ukfaas/machines"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_platform_conventions() {
        let config = UkfaasConfig::default();

        assert_eq!(config.provider.port, 8081);
        assert_eq!(config.network.bridge_name, "openfaas0");
        assert_eq!(config.network.watchdog_port, 8080);
        assert_eq!(config.network.service_subnet.to_string(), "10.63.0.0/16");
        assert_eq!(
            config.containerd.socket,
            PathBuf::from("/run/containerd/containerd.sock")
        );
    }
}
