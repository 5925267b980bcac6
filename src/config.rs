use std::fmt;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const PAIRS_VAR: &str = "TELEGRAM_WEBHOOK_PAIRS";
pub const TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const WEBHOOK_VAR: &str = "N8N_WEBHOOK_URL";
pub const DEBUG_VAR: &str = "DEBUG";
pub const API_URL_VAR: &str = "TELEGRAM_API_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TELEGRAM_WEBHOOK_PAIRS")]
    InvalidFormat(#[source] serde_json::Error),

    #[error("TELEGRAM_WEBHOOK_PAIRS must include at least one bot")]
    EmptyList,

    #[error("TELEGRAM_WEBHOOK_PAIRS[{index}] {field} is required")]
    MissingField { index: usize, field: &'static str },

    #[error("{0} environment variable is not set")]
    MissingVar(&'static str),

    #[error("TELEGRAM_API_URL is not a valid URL: {value}")]
    InvalidApiUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// One bot token and the webhook its messages are forwarded to.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "webhook")]
    pub webhook_url: String,
}

// Tokens end up in logs via `{:?}` far too easily.
impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Never empty.
    pub bots: Vec<BotConfig>,
    pub debug: bool,
    /// Bot API base URL shared by every bot; `None` means the public API.
    pub telegram_api_url: Option<Url>,
}

impl Config {
    /// Resolve the configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset. `TELEGRAM_WEBHOOK_PAIRS` takes precedence
    /// over the legacy `TELEGRAM_BOT_TOKEN` / `N8N_WEBHOOK_URL` pair whenever
    /// it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let debug = var(DEBUG_VAR).as_deref() == Some("true");

        let telegram_api_url = var(API_URL_VAR)
            .map(|value| {
                Url::parse(&value).map_err(|source| ConfigError::InvalidApiUrl { value, source })
            })
            .transpose()?;

        let bots = match var(PAIRS_VAR) {
            Some(pairs) => parse_pairs(&pairs)?,
            None => {
                let token = var(TOKEN_VAR).ok_or(ConfigError::MissingVar(TOKEN_VAR))?;
                let webhook_url = var(WEBHOOK_VAR).ok_or(ConfigError::MissingVar(WEBHOOK_VAR))?;
                vec![BotConfig { token, webhook_url }]
            }
        };

        Ok(Self {
            bots,
            debug,
            telegram_api_url,
        })
    }
}

fn parse_pairs(raw: &str) -> Result<Vec<BotConfig>, ConfigError> {
    // A JSON `null` is treated like an empty list.
    let bots: Option<Vec<BotConfig>> =
        serde_json::from_str(raw).map_err(ConfigError::InvalidFormat)?;
    let bots = bots.unwrap_or_default();

    if bots.is_empty() {
        return Err(ConfigError::EmptyList);
    }

    for (index, bot) in bots.iter().enumerate() {
        if bot.token.is_empty() {
            return Err(ConfigError::MissingField {
                index,
                field: "token",
            });
        }
        if bot.webhook_url.is_empty() {
            return Err(ConfigError::MissingField {
                index,
                field: "webhook",
            });
        }
    }

    Ok(bots)
}
