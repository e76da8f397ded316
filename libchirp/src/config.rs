//! Configuration management for Chirp
//!
//! Configuration comes from environment variables, optionally seeded from a
//! `.env` file in the working directory. Everything is validated up front so
//! the service fails at startup with one message naming every problem rather
//! than halfway through its first tick.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use secrecy::SecretString;

use crate::error::{ConfigError, Result};

pub const DEFAULT_TWITTER_API_BASE: &str = "https://api.twitter.com";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
pub const DEFAULT_SCOPES: &str = "tweet.read tweet.write users.read offline.access";
pub const DEFAULT_GENERATION_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_GENERATION_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_TRENDING_QUERY: &str =
    "(AI OR \"machine learning\" OR LLM) lang:en -is:retweet -is:reply";

/// How the one-time authorization flow obtains its code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Listen on the redirect URI for the browser callback
    Callback,
    /// Operator pastes the code (or redirected URL) on stdin
    Manual,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "callback" => Ok(AuthMode::Callback),
            "manual" => Ok(AuthMode::Manual),
            other => Err(format!("expected 'callback' or 'manual', got '{}'", other)),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub twitter: TwitterConfig,
    pub generation: GenerationConfig,
    pub schedule: ScheduleConfig,
    pub behavior: BehaviorConfig,
    /// Address for the liveness endpoint; `None` disables it
    pub health_addr: Option<SocketAddr>,
}

#[derive(Debug)]
pub struct TwitterConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub redirect_uri: Option<String>,
    pub api_base: String,
    pub authorize_url: String,
    pub scopes: Vec<String>,
    pub auth_mode: AuthMode,
}

#[derive(Debug)]
pub struct GenerationConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub poll_interval: Duration,
    pub post_interval: Duration,
    pub trending_interval: Duration,
    pub mentions_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            post_interval: Duration::from_secs(60 * 60),
            trending_interval: Duration::from_secs(30 * 60),
            mentions_interval: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorConfig {
    pub trending_query: String,
    pub search_limit: usize,
    pub mentions_limit: usize,
    pub replies_per_tick: usize,
    pub dedupe_capacity: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            trending_query: DEFAULT_TRENDING_QUERY.to_string(),
            search_limit: 10,
            mentions_limit: 10,
            replies_per_tick: 2,
            dedupe_capacity: 1000,
        }
    }
}

impl TwitterConfig {
    /// Load only the platform settings from `.env` and the environment
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Platform settings for running the authorization flow on its own.
    ///
    /// The redirect URI is always required here and no generation key is.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let mut missing = Vec::new();

        let client_id = vars.required("TWITTER_CLIENT_ID", &mut missing);
        let client_secret = vars.required("TWITTER_CLIENT_SECRET", &mut missing);
        let redirect_uri = vars.required("TWITTER_REDIRECT_URI", &mut missing);

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing).into());
        }

        vars.twitter(
            client_id.unwrap_or_default(),
            client_secret.unwrap_or_default(),
            redirect_uri,
        )
    }
}

fn load_dotenv() {
    if let Err(e) = dotenv::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }
}

impl Config {
    /// Load configuration from `.env` (if present) and the process environment
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let mut missing = Vec::new();

        let client_id = vars.required("TWITTER_CLIENT_ID", &mut missing);
        let client_secret = vars.required("TWITTER_CLIENT_SECRET", &mut missing);
        let api_key = vars.required("GROQ_API_KEY", &mut missing);

        // Only the interactive flow needs a redirect URI
        let redirect_uri = if vars.optional("TWITTER_REFRESH_TOKEN").is_none() {
            vars.required("TWITTER_REDIRECT_URI", &mut missing)
        } else {
            vars.optional("TWITTER_REDIRECT_URI")
        };

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing).into());
        }

        let twitter = vars.twitter(
            client_id.unwrap_or_default(),
            client_secret.unwrap_or_default(),
            redirect_uri,
        )?;

        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            poll_interval: vars.duration("CHIRP_POLL_INTERVAL", defaults.poll_interval)?,
            post_interval: vars.duration("CHIRP_POST_INTERVAL", defaults.post_interval)?,
            trending_interval: vars
                .duration("CHIRP_TRENDING_INTERVAL", defaults.trending_interval)?,
            mentions_interval: vars
                .duration("CHIRP_MENTIONS_INTERVAL", defaults.mentions_interval)?,
        };

        let defaults = BehaviorConfig::default();
        let behavior = BehaviorConfig {
            trending_query: vars
                .optional("CHIRP_TRENDING_QUERY")
                .unwrap_or(defaults.trending_query),
            search_limit: vars.count("CHIRP_SEARCH_LIMIT", defaults.search_limit)?,
            mentions_limit: vars.count("CHIRP_MENTIONS_LIMIT", defaults.mentions_limit)?,
            replies_per_tick: vars.count("CHIRP_REPLIES_PER_TICK", defaults.replies_per_tick)?,
            dedupe_capacity: vars.count("CHIRP_DEDUPE_CAPACITY", defaults.dedupe_capacity)?,
        };

        let health_addr = match (vars.optional("CHIRP_HEALTH_ADDR"), vars.optional("PORT")) {
            (Some(addr), _) => Some(
                addr.parse::<SocketAddr>()
                    .map_err(|e| invalid("CHIRP_HEALTH_ADDR", e.to_string()))?,
            ),
            (None, Some(port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| invalid("PORT", e.to_string()))?;
                Some(SocketAddr::from(([0, 0, 0, 0], port)))
            }
            (None, None) => None,
        };

        Ok(Self {
            twitter,
            generation: GenerationConfig {
                api_key: SecretString::from(api_key.unwrap_or_default()),
                base_url: vars
                    .optional("GENERATION_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GENERATION_BASE_URL.to_string()),
                model: vars
                    .optional("GENERATION_MODEL")
                    .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            },
            schedule,
            behavior,
            health_addr,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Blank values count as unset
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str, missing: &mut Vec<String>) -> Option<String> {
        let value = self.optional(key);
        if value.is_none() {
            missing.push(key.to_string());
        }
        value
    }

    /// Everything platform-related once the required keys are known present
    fn twitter(
        &self,
        client_id: String,
        client_secret: String,
        redirect_uri: Option<String>,
    ) -> Result<TwitterConfig> {
        if let Some(uri) = &redirect_uri {
            Url::parse(uri).map_err(|e| invalid("TWITTER_REDIRECT_URI", e.to_string()))?;
        }

        let auth_mode = match self.optional("CHIRP_AUTH_MODE") {
            Some(raw) => raw
                .parse::<AuthMode>()
                .map_err(|reason| invalid("CHIRP_AUTH_MODE", reason))?,
            None => AuthMode::Callback,
        };

        let scopes = self
            .optional("TWITTER_SCOPES")
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(TwitterConfig {
            client_id,
            client_secret: SecretString::from(client_secret),
            access_token: self.optional("TWITTER_ACCESS_TOKEN").map(SecretString::from),
            refresh_token: self.optional("TWITTER_REFRESH_TOKEN").map(SecretString::from),
            redirect_uri,
            api_base: self
                .optional("TWITTER_API_BASE")
                .unwrap_or_else(|| DEFAULT_TWITTER_API_BASE.to_string()),
            authorize_url: self
                .optional("TWITTER_AUTHORIZE_URL")
                .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
            scopes,
            auth_mode,
        })
    }

    fn duration(&self, key: &str, default: Duration) -> Result<Duration> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        // Bare numbers are seconds, matching --poll-interval
        let parsed = match raw.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => humantime::parse_duration(&raw).map_err(|e| {
                invalid(key, format!("{} (expected seconds or a duration like 90s or 1h)", e))
            })?,
        };
        if parsed.is_zero() {
            return Err(invalid(key, "duration must be greater than zero".to_string()).into());
        }
        Ok(parsed)
    }

    fn count(&self, key: &str, default: usize) -> Result<usize> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        match raw.parse::<usize>() {
            Ok(0) => Err(invalid(key, "must be greater than zero".to_string()).into()),
            Ok(n) => Ok(n),
            Err(e) => Err(invalid(key, e.to_string()).into()),
        }
    }
}

fn invalid(key: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason,
    }
}
