// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Load-time configuration from the environment

use crate::error::{Error, Result};
use crate::log_sink::DEFAULT_LOG_PATH;
use crate::striping::StripingHint;
use std::path::PathBuf;

pub const ENV_LOG: &str = "FILE_OPEN_LOG";
pub const ENV_ENABLED: &str = "FILE_OPEN_ENABLED";
pub const ENV_STRIPING: &str = "FILE_OPEN_STRIPING";
pub const ENV_STRIPE_COUNT: &str = "FILE_OPEN_STRIPE_COUNT";
pub const ENV_STRIPE_SIZE: &str = "FILE_OPEN_STRIPE_SIZE";
pub const ENV_LOG_LEVEL: &str = "FILE_OPEN_LOG_LEVEL";

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimConfig {
    /// When false the shim installs nothing and every call passes through
    pub enabled: bool,
    pub log_path: PathBuf,
    /// `None` selects the logging-only variant
    pub striping: Option<StripingHint>,
    /// `EnvFilter` directive for diagnostics
    pub log_level: String,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            striping: Some(StripingHint::default()),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ShimConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = !is_falsy(lookup(ENV_ENABLED).as_deref());

        let log_path = lookup(ENV_LOG)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH));

        let striping = if is_falsy(lookup(ENV_STRIPING).as_deref()) {
            None
        } else {
            let defaults = StripingHint::default();
            Some(StripingHint {
                stripe_count: parse_positive(&lookup, ENV_STRIPE_COUNT, defaults.stripe_count)?,
                stripe_size: parse_positive(&lookup, ENV_STRIPE_SIZE, defaults.stripe_size)?,
            })
        };

        let log_level = lookup(ENV_LOG_LEVEL)
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            enabled,
            log_path,
            striping,
            log_level,
        })
    }
}

fn is_falsy(value: Option<&str>) -> bool {
    matches!(
        value.map(|s| s.trim().to_ascii_lowercase()),
        Some(ref v) if v == "0" || v == "false" || v == "no" || v == "off"
    )
}

fn parse_positive<F>(lookup: &F, key: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(Error::Config(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
        Ok(value) => Ok(value),
    }
}
