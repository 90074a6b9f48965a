// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Provider configuration, read from YAML.
//!
//! ```yaml
//! heartbeat_timeout_ms: 3000
//! outbound_queue_depth: 4
//! transport:
//!   kind: udp
//!   multicast_endpoint: 230.0.0.1:6666
//!   static_endpoints: [192.168.1.20:6666]
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::CodecSettings;
use crate::connection::ConnectionTimings;
use crate::error::{LiveLinkError, Result};

/// Environment variable naming a YAML file used by [`ProviderConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "LIVELINK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub discovery_interval_ms: u64,
    pub discovery_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    /// Poll interval for transports that cannot signal arrivals. Workers on
    /// the UDP and loopback transports sleep until a datagram arrives or
    /// the next announce/heartbeat/timeout is due.
    pub worker_tick_ms: u64,
    /// Pending frames kept per subject before the oldest is dropped.
    pub outbound_queue_depth: usize,
    pub rotation_tolerance: f64,
    pub transport: TransportConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            discovery_interval_ms: 1000,
            discovery_timeout_ms: 5000,
            heartbeat_interval_ms: 1000,
            heartbeat_timeout_ms: 3000,
            worker_tick_ms: 10,
            outbound_queue_depth: 4,
            rotation_tolerance: 1e-3,
            transport: TransportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Udp(UdpConfig),
    /// In-process bus, looked up (or created) by name.
    Loopback(LoopbackConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Udp(UdpConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub unicast_endpoint: SocketAddr,
    pub multicast_endpoint: SocketAddr,
    /// Engines that cannot be reached through multicast.
    pub static_endpoints: Vec<SocketAddr>,
    pub multicast_ttl: u32,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            unicast_endpoint: SocketAddr::from(([0, 0, 0, 0], 0)),
            multicast_endpoint: SocketAddr::from(([230, 0, 0, 1], 6666)),
            static_endpoints: Vec::new(),
            multicast_ttl: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    pub bus: String,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            bus: "default".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Parse and validate YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| LiveLinkError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file. Missing or unparseable files are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LiveLinkError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            LiveLinkError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;

        tracing::info!("Loaded provider config from {}", path.display());
        Ok(config)
    }

    /// Load from a YAML file, falling back to defaults when it is missing
    /// or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Load the file named by `LIVELINK_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("discovery_interval_ms", self.discovery_interval_ms),
            ("discovery_timeout_ms", self.discovery_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
            ("worker_tick_ms", self.worker_tick_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(LiveLinkError::Configuration(format!(
                    "{field} must be greater than zero"
                )));
            }
        }

        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(LiveLinkError::Configuration(format!(
                "heartbeat_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.heartbeat_timeout_ms, self.heartbeat_interval_ms
            )));
        }

        if self.outbound_queue_depth == 0 {
            return Err(LiveLinkError::Configuration(
                "outbound_queue_depth must be at least 1".into(),
            ));
        }

        if !self.rotation_tolerance.is_finite() || self.rotation_tolerance <= 0.0 {
            return Err(LiveLinkError::Configuration(format!(
                "rotation_tolerance must be a positive number, got {}",
                self.rotation_tolerance
            )));
        }

        match &self.transport {
            TransportConfig::Udp(udp) => {
                if !udp.multicast_endpoint.ip().is_multicast() {
                    return Err(LiveLinkError::Configuration(format!(
                        "{} is not a multicast address",
                        udp.multicast_endpoint
                    )));
                }
            }
            TransportConfig::Loopback(loopback) => {
                if loopback.bus.is_empty() {
                    return Err(LiveLinkError::Configuration(
                        "loopback bus name is empty".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn timings(&self) -> ConnectionTimings {
        ConnectionTimings {
            discovery_interval: Duration::from_millis(self.discovery_interval_ms),
            discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
        }
    }

    pub fn worker_tick(&self) -> Duration {
        Duration::from_millis(self.worker_tick_ms)
    }

    pub fn codec_settings(&self) -> CodecSettings {
        CodecSettings {
            rotation_tolerance: self.rotation_tolerance,
        }
    }

    /// Defaults with a loopback transport on `bus`.
    pub fn loopback(bus: impl Into<String>) -> Self {
        Self {
            transport: TransportConfig::Loopback(LoopbackConfig { bus: bus.into() }),
            ..Self::default()
        }
    }
}
