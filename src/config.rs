// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{action, api, load_balancer};
use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// How far listener and target convergence goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvergenceMode {
    /// Add missing and correct mismatched entries, never remove extras
    #[default]
    Additive,
    /// Additionally remove listeners and targets that are no longer desired
    Full,
}

impl FromStr for ConvergenceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "additive" => Ok(ConvergenceMode::Additive),
            "full" => Ok(ConvergenceMode::Full),
            other => bail!("unknown convergence mode '{}', expected 'additive' or 'full'", other),
        }
    }
}

/// Controller configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// API token used as bearer credential
    pub token: String,
    /// The private network whose routes are reconciled
    pub network_id: i64,
    pub endpoint: Url,
    pub load_balancer_type: String,
    pub load_balancer_location: String,
    pub convergence_mode: ConvergenceMode,
    pub action_poll_interval: Duration,
    /// Log every API request and response status
    pub debug: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup("HCLOUD_TOKEN").context("HCLOUD_TOKEN environment variable not set")?;
        if token.trim().is_empty() {
            bail!("HCLOUD_TOKEN environment variable is empty");
        }

        let network_id = lookup("HCLOUD_NETWORK")
            .context("HCLOUD_NETWORK environment variable not set")?
            .trim()
            .parse::<i64>()
            .context("HCLOUD_NETWORK must be an integer network ID")?;

        let endpoint = lookup("HCLOUD_ENDPOINT").unwrap_or_else(|| api::DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint)
            .with_context(|| format!("HCLOUD_ENDPOINT is not a valid URL: {}", endpoint))?;

        let convergence_mode = match lookup("HCLOUD_CONVERGENCE_MODE") {
            Some(mode) => mode.parse()?,
            None => ConvergenceMode::default(),
        };

        let poll_ms = match lookup("HCLOUD_ACTION_POLL_INTERVAL_MS") {
            Some(ms) => ms
                .parse::<u64>()
                .context("HCLOUD_ACTION_POLL_INTERVAL_MS must be a number of milliseconds")?,
            None => action::POLL_INTERVAL_MS,
        };

        Ok(Config {
            token,
            network_id,
            endpoint,
            load_balancer_type: lookup("HCLOUD_LOAD_BALANCER_TYPE")
                .unwrap_or_else(|| load_balancer::DEFAULT_TYPE.to_string()),
            load_balancer_location: lookup("HCLOUD_LOAD_BALANCER_LOCATION")
                .unwrap_or_else(|| load_balancer::DEFAULT_LOCATION.to_string()),
            convergence_mode,
            action_poll_interval: Duration::from_millis(poll_ms.max(1)),
            debug: lookup("HCLOUD_DEBUG").is_some_and(|v| !v.is_empty()),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("network_id", &self.network_id)
            .field("endpoint", &self.endpoint.as_str())
            .field("load_balancer_type", &self.load_balancer_type)
            .field("load_balancer_location", &self.load_balancer_location)
            .field("convergence_mode", &self.convergence_mode)
            .field("action_poll_interval", &self.action_poll_interval)
            .field("debug", &self.debug)
            .finish()
    }
}
