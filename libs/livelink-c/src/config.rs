// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process-wide limits of the C façade.
//!
//! Read from the same YAML file as the provider settings (named by
//! `LIVELINK_CONFIG`); provider keys are ignored here.

use std::path::Path;

use livelink::config::CONFIG_ENV_VAR;
use livelink::{LiveLinkError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    /// Live provider handles allowed at once.
    pub max_providers: usize,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self { max_providers: 64 }
    }
}

impl FacadeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| LiveLinkError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file named by `LIVELINK_CONFIG`. Any problem falls back to
    /// defaults: the table is sized once and a bad file must not leave the
    /// library unusable.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) else {
            return Self::default();
        };
        let path = Path::new(&path);
        let loaded = std::fs::read_to_string(path)
            .map_err(|e| {
                LiveLinkError::Configuration(format!("Failed to read {}: {}", path.display(), e))
            })
            .and_then(|yaml| Self::from_yaml_str(&yaml));

        match loaded {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using default façade limits", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_providers == 0 {
            return Err(LiveLinkError::Configuration(
                "max_providers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
