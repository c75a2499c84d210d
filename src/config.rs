//! Runtime configuration read from the environment (and `.env` if present).

use crate::stats::Locale;
use std::{env, path::PathBuf, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Directory holding one JSON file per storage key.
    pub data_path: PathBuf,
    /// Base URL of the AI flow server.
    pub ai_gateway_url: String,
    pub ai_api_key: Option<String>,
    pub ai_timeout: Duration,
    /// Decides the first day of the week in analytics.
    pub locale: Locale,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            data_path: PathBuf::from("data"),
            ai_gateway_url: "http://127.0.0.1:3400".to_string(),
            ai_api_key: None,
            ai_timeout: Duration::from_secs(60),
            locale: Locale::Bn,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from `lookup`, falling back to defaults for unset
    /// variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => parse("PORT", value)?,
            None => defaults.port,
        };
        let ai_timeout = match var("AI_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse("AI_TIMEOUT_SECS", value)?),
            None => defaults.ai_timeout,
        };
        let locale = match var("APP_LOCALE") {
            Some(value) => parse("APP_LOCALE", value)?,
            None => defaults.locale,
        };

        Ok(Self {
            port,
            data_path: var("APP_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            ai_gateway_url: var("AI_GATEWAY_URL").unwrap_or(defaults.ai_gateway_url),
            ai_api_key: var("AI_API_KEY").map(|key| key.trim().to_string()),
            ai_timeout,
            locale,
        })
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
