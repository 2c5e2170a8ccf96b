use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Format for the persisted refresh-token expiry, UTC.
pub const REFRESH_TOKEN_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Keys that must be present before the user-consent flow can run.
pub const AUTH_REQUIRED_CONFIG_KEYS: &[&str] =
    &["client_id", "client_secret", "environment", "redirect_uri"];

/// Keys that must be present before a sync can run.
pub const SYNC_REQUIRED_CONFIG_KEYS: &[&str] = &[
    "client_id",
    "client_secret",
    "environment",
    "redirect_uri",
    "realm_id",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub environment: String,
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<String>,
}

impl Config {
    /// Load and validate the config file. Missing required keys and an
    /// unknown environment fail here, before any network call.
    pub fn load(path: &Path, required_keys: &[&str]) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config `{}`", path.display()))?;
        let raw: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing config `{}`", path.display()))?;

        let missing: Vec<&str> = required_keys
            .iter()
            .filter(|key| raw.get(**key).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            bail!("config is missing required keys: {missing:?}");
        }

        let config: Config = serde_json::from_value(raw)
            .with_context(|| format!("decoding config `{}`", path.display()))?;

        if !matches!(config.environment.as_str(), "sandbox" | "production") {
            bail!(
                "environment must be either \"sandbox\" or \"production\", got `{}`",
                config.environment
            );
        }

        Ok(config)
    }

    /// Reporting API host for the configured environment.
    pub fn base_url(&self) -> &'static str {
        match self.environment.as_str() {
            "sandbox" => "https://sandbox-quickbooks.api.intuit.com",
            _ => "https://quickbooks.api.intuit.com",
        }
    }

    /// Rewrite the config file in place. Called whenever refresh-token
    /// material drifts, before any report fetch proceeds.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing config")?;
        fs::write(path, json).with_context(|| format!("rewriting config `{}`", path.display()))
    }
}
