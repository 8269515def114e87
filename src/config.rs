// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration: a TOML file with environment overrides on top.
//!
//! Every field has a default, so both the file and any single key may be
//! absent. Secrets are usually supplied through the environment
//! (`TELEGRAM_BOT_TOKEN`, `YT_API_KEY`) rather than the file.

use std::fs;
use std::path::Path;

use clipcards_core::SUMMARY_MAX_CHARS;
use serde::Deserialize;

use crate::error::Fallible;
use crate::error::fail;

pub const DEFAULT_CONFIG_PATH: &str = "clipcards.toml";
pub const DEFAULT_DB_PATH: &str = "clipcards.db.json";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub youtube: YouTubeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cards: CardsConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token. `TELEGRAM_BOT_TOKEN` overrides.
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YouTubeConfig {
    /// Data API v3 key. `YT_API_KEY` overrides.
    pub api_key: Option<String>,
    /// Caption languages, in preference order.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Whether to fetch transcripts at all.
    #[serde(default = "default_true")]
    pub transcripts_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Where the session database lives. `CLIPCARDS_DB` overrides.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardsConfig {
    /// Longest transcript summary a card will carry, in characters.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_summary_max_chars() -> usize {
    SUMMARY_MAX_CHARS
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        YouTubeConfig {
            api_key: None,
            languages: default_languages(),
            transcripts_enabled: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            db_path: default_db_path(),
        }
    }
}

impl Default for CardsConfig {
    fn default() -> Self {
        CardsConfig {
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

impl Config {
    /// Load from a TOML file, then apply environment overrides. A missing
    /// file is the defaults; a malformed file is an error.
    pub fn load(path: &Path) -> Fallible<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            log::debug!("no config file at {}, using defaults", path.display());
            Config::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an environment lookup. Only the variables that
    /// are actually set override the file.
    fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.token = Some(token);
        }
        if let Some(key) = get("YT_API_KEY") {
            self.youtube.api_key = Some(key);
        }
        if let Some(path) = get("CLIPCARDS_DB") {
            self.storage.db_path = path;
        }
    }

    /// The bot token, which has no default.
    pub fn telegram_token(&self) -> Fallible<&str> {
        match self.telegram.token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => fail("no Telegram token: set TELEGRAM_BOT_TOKEN or [telegram] token"),
        }
    }

    /// The Data API key, which has no default.
    pub fn youtube_api_key(&self) -> Fallible<&str> {
        match self.youtube.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => fail("no YouTube API key: set YT_API_KEY or [youtube] api_key"),
        }
    }
}
