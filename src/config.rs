use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::compose::MAX_TAGS;

const DEFAULT_ENV_PREFIX: &str = "SONGFEED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_mutation_timeout", with = "humantime_serde")]
    pub mutation_timeout: Duration,
    #[serde(default)]
    pub session_cookie: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            mutation_timeout: default_mutation_timeout(),
            session_cookie: String::new(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_user_agent() -> String {
    format!("songfeed/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_mutation_timeout() -> Duration {
    Duration::from_secs(15)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default)]
    pub post_to_twitter: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_tags: default_max_tags(),
            post_to_twitter: false,
        }
    }
}

fn default_max_tags() -> usize {
    MAX_TAGS
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    // An explicit path that does not exist means defaults, not the user's file.
    let path = options.config_file.or_else(default_config_path);
    if let Some(path) = path.filter(|path| path.exists()) {
        cfg = merge_config(cfg, read_config_file(&path)?);
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.timeout.is_zero() {
        base.api.timeout = other.api.timeout;
    }
    if !other.api.mutation_timeout.is_zero() {
        base.api.mutation_timeout = other.api.mutation_timeout;
    }
    if !other.api.session_cookie.is_empty() {
        base.api.session_cookie = other.api.session_cookie;
    }

    if other.feed.max_tags != 0 {
        base.feed.max_tags = other.feed.max_tags.min(MAX_TAGS);
    }
    base.feed.post_to_twitter = other.feed.post_to_twitter;

    base
}

/// Applies `<PREFIX>_SECTION__KEY=value` overrides on top of `cfg`.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.session_cookie" => cfg.api.session_cookie = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "api.mutation_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.mutation_timeout = duration;
            }
        }
        "feed.max_tags" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.max_tags = parsed.min(MAX_TAGS);
            }
        }
        "feed.post_to_twitter" => {
            cfg.feed.post_to_twitter = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        _ => {}
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("songfeed").join("config.yaml"))
}

/// Stores the session cookie copied from a signed-in browser.
pub fn save_session_cookie(path: Option<PathBuf>, cookie: &str) -> Result<PathBuf> {
    let cookie = cookie.trim();
    anyhow::ensure!(!cookie.is_empty(), "config: api.session_cookie is required");

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };
    cfg.api.session_cookie = cookie.to_string();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}
