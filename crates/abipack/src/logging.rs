// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging initialization.
//!
//! The library itself only emits through the `log` facade. Hosts that have
//! no logger of their own can install `env_logger` with one of these.

use crate::error::{AbiError, AbiResult};
use log::LevelFilter;

fn already_installed(e: log::SetLoggerError) -> AbiError {
    AbiError::Config(format!("logger already installed: {}", e))
}

/// Initialize console logging at `level`.
pub fn init_logging(level: LevelFilter) -> AbiResult<()> {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init()
        .map_err(already_installed)
}

/// Initialize logging from `RUST_LOG`, falling back to `default_level`.
pub fn init_logging_env(default_level: LevelFilter) -> AbiResult<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level.to_string()),
    )
    .format_timestamp_millis()
    .try_init()
    .map_err(already_installed)
}

/// Initialize logging with a filter string (e.g. `"abipack=debug,info"`).
pub fn init_logging_with_filter(filter: &str) -> AbiResult<()> {
    if filter.trim().is_empty() {
        return Err(AbiError::Config("empty log filter".into()));
    }
    env_logger::Builder::new()
        .parse_filters(filter)
        .format_timestamp_millis()
        .try_init()
        .map_err(already_installed)
}
