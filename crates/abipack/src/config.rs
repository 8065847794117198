// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Callback bridge configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! token_pool_initial: 32
//! token_pool_max: 1024
//! default_timeout_ms: 5000
//! pump:
//!   local_task:
//!     interval_ms: 4
//! callback_mode: allow_spontaneous
//! ```

use crate::bridge::{CallbackMode, PumpScheduler};
use crate::error::{AbiError, AbiResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Native symbol pumped by [`crate::CallbackBridge::tick`].
pub const DEFAULT_PROCESS_EVENTS: &str = "wgpuInstanceProcessEvents";

/// Settings for one [`crate::CallbackBridge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Initial token pool capacity.
    pub token_pool_initial: usize,

    /// Hard cap the pool may double up to.
    pub token_pool_max: usize,

    /// Deadline applied to every call (None = wait forever).
    pub default_timeout_ms: Option<u64>,

    /// How `process_events` gets scheduled.
    pub pump: PumpScheduler,

    /// Mode written into every callback info struct.
    pub callback_mode: CallbackMode,

    /// Native entry point that drains pending callbacks.
    pub process_events_symbol: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            token_pool_initial: 16,
            token_pool_max: 4096,
            default_timeout_ms: None,
            pump: PumpScheduler::Manual,
            callback_mode: CallbackMode::AllowProcessEvents,
            process_events_symbol: DEFAULT_PROCESS_EVENTS.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Check value ranges.
    pub fn validate(&self) -> AbiResult<()> {
        if self.token_pool_initial == 0 {
            return Err(AbiError::Config("token_pool_initial must be > 0".into()));
        }
        if self.token_pool_initial > self.token_pool_max {
            return Err(AbiError::Config(format!(
                "token_pool_initial ({}) exceeds token_pool_max ({})",
                self.token_pool_initial, self.token_pool_max
            )));
        }
        if self.token_pool_max > u32::MAX as usize {
            return Err(AbiError::Config("token_pool_max must fit in u32".into()));
        }
        if let PumpScheduler::LocalTask { interval_ms: 0 } = self.pump {
            return Err(AbiError::Config("pump interval_ms must be > 0".into()));
        }
        if self.process_events_symbol.is_empty() {
            return Err(AbiError::Config("process_events_symbol is empty".into()));
        }
        Ok(())
    }

    /// Parse and validate a YAML document.
    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_str(yaml: &str) -> AbiResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| AbiError::Config(format!("YAML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    #[cfg(feature = "config-loaders")]
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> AbiResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AbiError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    #[cfg(feature = "config-loaders")]
    pub fn to_yaml(&self) -> AbiResult<String> {
        serde_yaml::to_string(self).map_err(|e| AbiError::Config(e.to_string()))
    }
}
