// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::retry;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace holding master backing secrets
    pub operator_namespace: String,
    /// Maximum number of parallel reconciles per resource kind
    pub concurrency: u16,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let operator_namespace = lookup("OPERATOR_NAMESPACE")
            .filter(|ns| !ns.is_empty())
            .context("OPERATOR_NAMESPACE environment variable not set")?;

        let concurrency = parse_or(&lookup, "CONTROLLER_CONCURRENCY", retry::CONCURRENCY)?;
        let retry_base = parse_or(&lookup, "RETRY_BASE_SECS", retry::BASE_SECS)?;
        let retry_max = parse_or(&lookup, "RETRY_MAX_SECS", retry::MAX_SECS)?;

        Ok(Config {
            operator_namespace,
            concurrency,
            retry_base: Duration::from_secs(retry_base),
            retry_max: Duration::from_secs(retry_max.max(retry_base)),
        })
    }

    /// Configuration used by unit tests
    #[cfg(test)]
    pub fn for_namespace(operator_namespace: &str) -> Self {
        Config {
            operator_namespace: operator_namespace.to_string(),
            concurrency: retry::CONCURRENCY,
            retry_base: Duration::from_secs(retry::BASE_SECS),
            retry_max: Duration::from_secs(retry::MAX_SECS),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, value)),
        None => Ok(default),
    }
}
