use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::generation::ModelRoute;
use crate::retry::RetryPolicy;

pub const DEFAULT_API_ROOT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const DEFAULT_TREND_FEEDS: &[&str] = &[
    "https://trends.google.com/trends/trendingsearches/daily/rss?geo=SA",
    "https://trends.google.com/trends/trendingsearches/daily/rss?geo=EG",
];

/// How the destination blog is authorized.
#[derive(Clone)]
pub enum Credentials {
    /// Exchanged for an access token at the start of every run.
    Refresh {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    },
    /// An access token obtained outside the bot.
    AccessToken(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Refresh {
                client_id,
                token_uri,
                ..
            } => f
                .debug_struct("Refresh")
                .field("client_id", client_id)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
            Credentials::AccessToken(_) => f.write_str("AccessToken(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    Live,
    Draft,
}

impl PublishMode {
    pub fn is_draft(self) -> bool {
        self == PublishMode::Draft
    }
}

/// Topic sourcing knobs. None of them is a secret.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSettings {
    pub trend_feeds: Vec<String>,
    pub feed_take: usize,
    pub history_limit: usize,
    pub topic_seed: Option<u64>,
}

impl TopicSettings {
    pub fn from_env() -> Result<Self> {
        try_load_dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_blank(&lookup, key);

        let trend_feeds = match get("TREND_FEEDS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_TREND_FEEDS.iter().map(|s| s.to_string()).collect(),
        };

        let topic_seed = match get("TOPIC_SEED") {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("TOPIC_SEED is not a number: {}", raw))?,
            ),
            None => None,
        };

        Ok(Self {
            trend_feeds,
            feed_take: parse_or("FEED_TAKE", get("FEED_TAKE"), 2usize)?.clamp(2, 5),
            history_limit: parse_or("HISTORY_LIMIT", get("HISTORY_LIMIT"), 15usize)?.clamp(1, 50),
            topic_seed,
        })
    }
}

#[derive(Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_api_root: String,
    pub models: Vec<ModelRoute>,
    pub request_timeout: Duration,
    pub pacing: Duration,
    pub retry: RetryPolicy,
    pub credentials: Credentials,
    pub blog_url: Option<String>,
    pub blog_id: Option<String>,
    pub publish_mode: PublishMode,
    pub trend_feeds: Vec<String>,
    pub feed_take: usize,
    pub history_limit: usize,
    pub topic_seed: Option<u64>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_api_root", &self.gemini_api_root)
            .field("models", &self.models)
            .field("request_timeout", &self.request_timeout)
            .field("pacing", &self.pacing)
            .field("retry", &self.retry)
            .field("credentials", &self.credentials)
            .field("blog_url", &self.blog_url)
            .field("blog_id", &self.blog_id)
            .field("publish_mode", &self.publish_mode)
            .field("trend_feeds", &self.trend_feeds)
            .field("feed_take", &self.feed_take)
            .field("history_limit", &self.history_limit)
            .field("topic_seed", &self.topic_seed)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        try_load_dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_blank(&lookup, key);

        let gemini_api_key = get("GEMINI_API_KEY");
        let token_blob = get("BLOGGER_TOKEN_JSON");

        let mut missing = Vec::new();
        if gemini_api_key.is_none() {
            missing.push("GEMINI_API_KEY");
        }

        let credentials = match token_blob {
            Some(blob) => parse_token_blob(&blob)?,
            None => {
                let client_id = get("CLIENT_ID");
                let client_secret = get("CLIENT_SECRET");
                let refresh_token = get("REFRESH_TOKEN");
                for (name, value) in [
                    ("CLIENT_ID", &client_id),
                    ("CLIENT_SECRET", &client_secret),
                    ("REFRESH_TOKEN", &refresh_token),
                ] {
                    if value.is_none() {
                        missing.push(name);
                    }
                }
                match (client_id, client_secret, refresh_token) {
                    (Some(client_id), Some(client_secret), Some(refresh_token)) => {
                        Some(Credentials::Refresh {
                            client_id,
                            client_secret,
                            refresh_token,
                            token_uri: DEFAULT_TOKEN_URI.to_string(),
                        })
                    }
                    _ => None,
                }
            }
        };

        if !missing.is_empty() {
            anyhow::bail!(
                "Missing secrets: {}.\n\n\
                Set them as environment variables or create ~/.config/blog-autopilot/.env with:\n  \
                GEMINI_API_KEY=your_key_here\n  \
                CLIENT_ID=...\n  \
                CLIENT_SECRET=...\n  \
                REFRESH_TOKEN=...\n\n\
                BLOGGER_TOKEN_JSON may replace the three OAuth variables.",
                missing.join(", ")
            );
        }

        let (Some(gemini_api_key), Some(credentials)) = (gemini_api_key, credentials) else {
            anyhow::bail!("Blogger credentials are incomplete");
        };

        let publish_mode = match get("PUBLISH_MODE").as_deref() {
            None | Some("live") => PublishMode::Live,
            Some("draft") => PublishMode::Draft,
            Some(other) => anyhow::bail!("PUBLISH_MODE must be 'live' or 'draft', got '{}'", other),
        };

        let models = match get("GEMINI_MODELS") {
            Some(list) => parse_model_list(&list)?,
            None => ModelRoute::default_routes(),
        };

        let topics = TopicSettings::from_lookup(&lookup)?;

        let retry = RetryPolicy {
            max_tries: parse_or("GEN_MAX_TRIES", get("GEN_MAX_TRIES"), 3u32)?.max(1),
            base_delay: Duration::from_millis(parse_or(
                "GEN_BACKOFF_BASE_MS",
                get("GEN_BACKOFF_BASE_MS"),
                2000u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                "GEN_BACKOFF_MAX_MS",
                get("GEN_BACKOFF_MAX_MS"),
                60_000u64,
            )?),
            jitter: 0.25,
        };

        Ok(Self {
            gemini_api_key,
            gemini_api_root: get("GEMINI_API_ROOT").unwrap_or_else(|| DEFAULT_API_ROOT.to_string()),
            models,
            request_timeout: Duration::from_secs(parse_or(
                "GEN_TIMEOUT_SECS",
                get("GEN_TIMEOUT_SECS"),
                120u64,
            )?),
            pacing: Duration::from_millis(parse_or("GEN_PACING_MS", get("GEN_PACING_MS"), 0u64)?),
            retry,
            credentials,
            blog_url: get("BLOG_URL"),
            blog_id: get("BLOG_ID"),
            publish_mode,
            trend_feeds: topics.trend_feeds,
            feed_take: topics.feed_take,
            history_limit: topics.history_limit,
            topic_seed: topics.topic_seed,
        })
    }

}

/// Try to load .env from multiple locations
fn try_load_dotenv() {
    // 1. Current directory (for development)
    if dotenvy::dotenv().is_ok() {
        return;
    }

    // 2. ~/.config/blog-autopilot/.env
    if let Some(config_dir) = dirs::config_dir() {
        let config_path = config_dir.join("blog-autopilot").join(".env");
        if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
            return;
        }
    }

    // 3. ~/.env
    if let Some(home_dir) = dirs::home_dir() {
        let home_path = home_dir.join(".env");
        if home_path.exists() {
            let _ = dotenvy::from_path(&home_path);
        }
    }

    // If none found, the scheduler may have exported the variables itself
}

/// Empty values count as unset.
fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} is not a valid number: {}", name, raw)),
        None => Ok(default),
    }
}

/// Parses `version:model` pairs, e.g. `v1beta:gemini-2.0-flash,v1:gemini-1.0-pro`.
fn parse_model_list(list: &str) -> Result<Vec<ModelRoute>> {
    let routes = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (version, model) = pair
                .split_once(':')
                .with_context(|| format!("GEMINI_MODELS entry '{}' is not version:model", pair))?;
            Ok(ModelRoute::new(version.trim(), model.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    if routes.is_empty() {
        anyhow::bail!("GEMINI_MODELS is set but lists no models");
    }
    Ok(routes)
}

#[derive(serde::Deserialize)]
struct TokenBlob {
    token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    token_uri: Option<String>,
}

fn parse_token_blob(blob: &str) -> Result<Option<Credentials>> {
    let parsed: TokenBlob =
        serde_json::from_str(blob).context("BLOGGER_TOKEN_JSON is not valid JSON")?;

    if let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
        parsed.refresh_token,
        parsed.client_id,
        parsed.client_secret,
    ) {
        return Ok(Some(Credentials::Refresh {
            client_id,
            client_secret,
            refresh_token,
            token_uri: parsed
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        }));
    }

    match parsed.token.or(parsed.access_token) {
        Some(token) => Ok(Some(Credentials::AccessToken(token))),
        None => anyhow::bail!(
            "BLOGGER_TOKEN_JSON needs either a token or refresh_token/client_id/client_secret"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("GEMINI_API_KEY", "test-key"),
        ("CLIENT_ID", "id"),
        ("CLIENT_SECRET", "secret"),
        ("REFRESH_TOKEN", "refresh"),
    ];

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let config = Config::from_lookup(lookup_from(BASE)).unwrap();

        assert_eq!(config.publish_mode, PublishMode::Live);
        assert_eq!(config.retry.max_tries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(2000));
        assert_eq!(config.history_limit, 15);
        assert_eq!(config.feed_take, 2);
        assert_eq!(config.trend_feeds.len(), 2);
        assert_eq!(config.models, ModelRoute::default_routes());
        assert!(matches!(config.credentials, Credentials::Refresh { .. }));
    }

    #[test]
    fn topic_settings_need_no_secrets() {
        let settings = TopicSettings::from_lookup(lookup_from(&[
            ("TREND_FEEDS", "https://a.test/rss"),
            ("FEED_TAKE", "9"),
            ("TOPIC_SEED", "42"),
        ]))
        .unwrap();

        assert_eq!(settings.trend_feeds, vec!["https://a.test/rss"]);
        assert_eq!(settings.feed_take, 5);
        assert_eq!(settings.history_limit, 15);
        assert_eq!(settings.topic_seed, Some(42));

        let defaults = TopicSettings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(defaults.trend_feeds.len(), DEFAULT_TREND_FEEDS.len());
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
    }

    #[test]
    fn missing_secrets_are_all_named() {
        let err = Config::from_lookup(lookup_from(&[("CLIENT_ID", "id")])).unwrap_err();
        let msg = err.to_string();

        assert!(msg.contains("GEMINI_API_KEY"));
        assert!(msg.contains("CLIENT_SECRET"));
        assert!(msg.contains("REFRESH_TOKEN"));
        assert!(!msg.contains("CLIENT_ID,"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "   "),
            ("CLIENT_ID", "id"),
            ("CLIENT_SECRET", "secret"),
            ("REFRESH_TOKEN", "refresh"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn token_blob_replaces_oauth_variables() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("BLOGGER_TOKEN_JSON", r#"{"token": "ya29.abc"}"#),
        ]))
        .unwrap();

        match config.credentials {
            Credentials::AccessToken(token) => assert_eq!(token, "ya29.abc"),
            other => panic!("unexpected credentials: {:?}", other),
        }
    }

    #[test]
    fn token_blob_with_refresh_fields_keeps_token_uri() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            (
                "BLOGGER_TOKEN_JSON",
                r#"{"refresh_token": "r", "client_id": "c", "client_secret": "s", "token_uri": "https://example.test/token"}"#,
            ),
        ]))
        .unwrap();

        match config.credentials {
            Credentials::Refresh { token_uri, .. } => {
                assert_eq!(token_uri, "https://example.test/token")
            }
            other => panic!("unexpected credentials: {:?}", other),
        }
    }

    #[test]
    fn publish_mode_and_tuning_are_parsed() {
        let mut pairs = BASE.to_vec();
        pairs.extend_from_slice(&[
            ("PUBLISH_MODE", "draft"),
            ("GEN_MAX_TRIES", "5"),
            ("GEN_BACKOFF_BASE_MS", "10"),
            ("GEN_PACING_MS", "250"),
            ("FEED_TAKE", "9"),
            ("TOPIC_SEED", "42"),
            ("GEMINI_MODELS", "v1beta:gemini-2.0-flash, v1:gemini-1.0-pro"),
        ]);
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();

        assert!(config.publish_mode.is_draft());
        assert_eq!(config.retry.max_tries, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.pacing, Duration::from_millis(250));
        assert_eq!(config.feed_take, 5);
        assert_eq!(config.topic_seed, Some(42));
        assert_eq!(
            config.models,
            vec![
                ModelRoute::new("v1beta", "gemini-2.0-flash"),
                ModelRoute::new("v1", "gemini-1.0-pro"),
            ]
        );
    }

    #[test]
    fn unknown_publish_mode_is_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("PUBLISH_MODE", "scheduled"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn debug_output_hides_the_api_key() {
        let config = Config::from_lookup(lookup_from(BASE)).unwrap();
        let rendered = format!("{:?}", config);

        assert!(!rendered.contains("test-key"));
        assert!(!rendered.contains("refresh\""));
    }
}
