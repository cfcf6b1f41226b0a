use std::path::Path;

use serde::Deserialize;

use crate::Error;
use crate::repeat::eligibility::AttachmentKind;
use crate::repeat::policy::ProbabilityTable;

/// Env var that disables the repeat feature when set to `1`.
pub const REPEAT_DISABLED_ENV: &str = "AOBA_FEATURE_REPEAT_DISABLED";
/// Env var holding the bot token when `telegram.token` is absent.
pub const BOT_TOKEN_ENV: &str = "AOBA_BOT_TOKEN";
/// Env var holding the database URL when `database.url` is absent.
pub const DATABASE_URL_ENV: &str = "AOBA_DATABASE_URL";

/// Top-level configuration loaded from `aoba.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AobaConfig {
    #[serde(default)]
    pub repeat: RepeatConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_true() -> bool {
    true
}

fn default_observation_window() -> u64 {
    120 // 2 minutes
}

fn default_cooldown() -> u64 {
    600 // 10 minutes
}

fn default_reaper_interval() -> u64 {
    1800 // 30 minutes
}

fn default_min_text_length() -> usize {
    2
}

fn default_max_text_length() -> usize {
    100
}

fn default_attachment_kinds() -> Vec<AttachmentKind> {
    vec![AttachmentKind::Sticker]
}

/// Repetition detection ("join in") settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RepeatConfig {
    /// Whether the feature is registered at all. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds during which distinct-user sightings are counted together.
    #[serde(default = "default_observation_window")]
    pub observation_window_seconds: u64,

    /// Seconds after an echo during which the same content cannot retrigger.
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Seconds between reaper sweeps.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,

    /// Minimum trimmed text length in characters.
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,

    /// Maximum trimmed text length in characters.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// Attachment kinds eligible for repetition. Defaults to static stickers.
    #[serde(default = "default_attachment_kinds")]
    pub attachment_kinds: Vec<AttachmentKind>,

    #[serde(default)]
    pub probability: ProbabilityTable,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            observation_window_seconds: default_observation_window(),
            cooldown_seconds: default_cooldown(),
            reaper_interval_seconds: default_reaper_interval(),
            min_text_length: default_min_text_length(),
            max_text_length: default_max_text_length(),
            attachment_kinds: default_attachment_kinds(),
            probability: ProbabilityTable::default(),
        }
    }
}

/// Upper bound for every window and interval: ten years.
pub const MAX_WINDOW_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Out-of-range values saturate; window arithmetic downstream is checked.
fn seconds_to_duration(seconds: u64) -> chrono::Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl RepeatConfig {
    pub fn observation_window(&self) -> chrono::Duration {
        seconds_to_duration(self.observation_window_seconds)
    }

    pub fn cooldown_window(&self) -> chrono::Duration {
        seconds_to_duration(self.cooldown_seconds)
    }

    pub fn reaper_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reaper_interval_seconds)
    }

    fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("observation_window_seconds", self.observation_window_seconds),
            ("cooldown_seconds", self.cooldown_seconds),
            ("reaper_interval_seconds", self.reaper_interval_seconds),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("repeat.{name} must be at least 1")));
            }
            if value > MAX_WINDOW_SECONDS {
                return Err(Error::Config(format!(
                    "repeat.{name} must be at most {MAX_WINDOW_SECONDS} (10 years)"
                )));
            }
        }
        if self.min_text_length == 0 {
            return Err(Error::Config(
                "repeat.min_text_length must be at least 1".into(),
            ));
        }
        if self.min_text_length > self.max_text_length {
            return Err(Error::Config(format!(
                "repeat.min_text_length ({}) must not exceed repeat.max_text_length ({})",
                self.min_text_length, self.max_text_length
            )));
        }
        self.probability.validate()
    }
}

/// Configuration for the Telegram bot channel.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Whether the Telegram bot is enabled. Defaults to `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bot token. Falls back to `AOBA_BOT_TOKEN` env var when absent.
    #[serde(default)]
    pub token: Option<String>,

    /// Ignore updates queued while the bot was offline. Defaults to `true`.
    #[serde(default = "default_true")]
    pub drop_pending_updates: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            drop_pending_updates: true,
        }
    }
}

/// Durable storage settings. Without a URL the in-memory store is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. Falls back to `AOBA_DATABASE_URL` env var when absent.
    #[serde(default)]
    pub url: Option<String>,
}

impl AobaConfig {
    /// Parse a TOML string into an `AobaConfig`.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Like `from_file`, but a missing file yields the defaults.
    ///
    /// Used for the implicit default path; an explicitly requested file
    /// should go through `from_file` so a typo is reported.
    pub fn from_file_or_default(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Fill secrets and toggles from the environment.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if lookup(REPEAT_DISABLED_ENV).as_deref() == Some("1") {
            self.repeat.enabled = false;
        }
        if self.telegram.token.is_none() {
            self.telegram.token = lookup(BOT_TOKEN_ENV).filter(|t| !t.is_empty());
        }
        if self.database.url.is_none() {
            self.database.url = lookup(DATABASE_URL_ENV).filter(|u| !u.is_empty());
        }
    }

    fn validate(&self) -> Result<(), Error> {
        self.repeat.validate()?;
        if let Some(ref token) = self.telegram.token
            && token.trim().is_empty()
        {
            return Err(Error::Config("telegram.token must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = AobaConfig::from_toml("").unwrap();
        assert!(config.repeat.enabled);
        assert_eq!(config.repeat.observation_window_seconds, 120);
        assert_eq!(config.repeat.cooldown_seconds, 600);
        assert_eq!(config.repeat.reaper_interval_seconds, 1800);
        assert_eq!(config.repeat.min_text_length, 2);
        assert_eq!(config.repeat.max_text_length, 100);
        assert_eq!(config.repeat.attachment_kinds, vec![AttachmentKind::Sticker]);
        assert_eq!(config.repeat.probability, ProbabilityTable::default());
        assert!(config.telegram.enabled);
        assert!(config.telegram.token.is_none());
        assert!(config.telegram.drop_pending_updates);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn full_toml() {
        let toml_str = r#"
[repeat]
enabled = false
observation_window_seconds = 300
cooldown_seconds = 900
reaper_interval_seconds = 60
min_text_length = 3
max_text_length = 50
attachment_kinds = ["sticker", "animated_sticker"]

[repeat.probability]
text = [0.3, 0.6]
attachment = [1.0]

[telegram]
enabled = false
token = "123:ABC"
drop_pending_updates = false

[database]
url = "postgres://localhost/aoba"
"#;
        let config = AobaConfig::from_toml(toml_str).unwrap();
        assert!(!config.repeat.enabled);
        assert_eq!(config.repeat.observation_window(), chrono::Duration::minutes(5));
        assert_eq!(config.repeat.cooldown_window(), chrono::Duration::minutes(15));
        assert_eq!(
            config.repeat.reaper_interval(),
            std::time::Duration::from_secs(60)
        );
        assert_eq!(config.repeat.min_text_length, 3);
        assert_eq!(config.repeat.max_text_length, 50);
        assert_eq!(
            config.repeat.attachment_kinds,
            vec![AttachmentKind::Sticker, AttachmentKind::AnimatedSticker]
        );
        assert_eq!(config.repeat.probability.text, vec![0.3, 0.6]);
        assert_eq!(config.repeat.probability.attachment, vec![1.0]);
        assert!(!config.telegram.enabled);
        assert_eq!(config.telegram.token.as_deref(), Some("123:ABC"));
        assert!(!config.telegram.drop_pending_updates);
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/aoba")
        );
    }

    #[test]
    fn partial_probability_keeps_other_row_default() {
        let toml_str = r#"
[repeat.probability]
text = [0.1]
"#;
        let config = AobaConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.repeat.probability.text, vec![0.1]);
        assert_eq!(config.repeat.probability.attachment, vec![0.9, 1.0]);
    }

    #[test]
    fn zero_window_rejected() {
        let err = AobaConfig::from_toml("[repeat]\nobservation_window_seconds = 0").unwrap_err();
        assert!(
            err.to_string()
                .contains("repeat.observation_window_seconds must be at least 1"),
            "{err}"
        );
        let err = AobaConfig::from_toml("[repeat]\ncooldown_seconds = 0").unwrap_err();
        assert!(err.to_string().contains("cooldown_seconds"), "{err}");
        let err = AobaConfig::from_toml("[repeat]\nreaper_interval_seconds = 0").unwrap_err();
        assert!(err.to_string().contains("reaper_interval_seconds"), "{err}");
    }

    #[test]
    fn huge_window_rejected() {
        let toml_str = format!("[repeat]\ncooldown_seconds = {}", u64::MAX / 2);
        let err = AobaConfig::from_toml(&toml_str);
        // toml integers are i64; either the parser or validation must refuse it.
        assert!(err.is_err());

        let err = AobaConfig::from_toml("[repeat]\ncooldown_seconds = 10000000000000").unwrap_err();
        assert!(err.to_string().contains("repeat.cooldown_seconds must be at most"), "{err}");
        let err =
            AobaConfig::from_toml("[repeat]\nobservation_window_seconds = 315360001").unwrap_err();
        assert!(err.to_string().contains("observation_window_seconds"), "{err}");
    }

    #[test]
    fn ten_year_window_accepted() {
        let toml_str = format!("[repeat]\ncooldown_seconds = {MAX_WINDOW_SECONDS}");
        let config = AobaConfig::from_toml(&toml_str).unwrap();
        let now = chrono::Utc::now();
        assert!(now.checked_sub_signed(config.repeat.cooldown_window()).is_some());
    }

    #[test]
    fn oversized_seconds_saturate_instead_of_panicking() {
        let config = RepeatConfig {
            cooldown_seconds: u64::MAX,
            observation_window_seconds: i64::MAX as u64,
            ..RepeatConfig::default()
        };
        assert_eq!(config.cooldown_window(), chrono::Duration::MAX);
        assert_eq!(config.observation_window(), chrono::Duration::MAX);
    }

    #[test]
    fn length_bounds_validated() {
        let err = AobaConfig::from_toml("[repeat]\nmin_text_length = 0").unwrap_err();
        assert!(err.to_string().contains("min_text_length"), "{err}");
        let err = AobaConfig::from_toml("[repeat]\nmin_text_length = 10\nmax_text_length = 5")
            .unwrap_err();
        assert!(err.to_string().contains("must not exceed"), "{err}");
    }

    #[test]
    fn decreasing_probability_rejected() {
        let toml_str = r#"
[repeat.probability]
attachment = [1.0, 0.5]
"#;
        let err = AobaConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("non-decreasing"), "{err}");
    }

    #[test]
    fn unknown_attachment_kind_rejected() {
        let err = AobaConfig::from_toml("[repeat]\nattachment_kinds = [\"photo\"]");
        assert!(err.is_err());
    }

    #[test]
    fn empty_token_rejected() {
        let err = AobaConfig::from_toml("[telegram]\ntoken = \"  \"").unwrap_err();
        assert!(err.to_string().contains("telegram.token"), "{err}");
    }

    #[test]
    fn invalid_toml_syntax() {
        let err = AobaConfig::from_toml("[repeat").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn from_file_nonexistent_path() {
        let err = AobaConfig::from_file(Path::new("/nonexistent/aoba.toml")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("failed to read"), "error: {msg}");
    }

    #[test]
    fn from_file_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AobaConfig::from_file_or_default(&dir.path().join("aoba.toml")).unwrap();
        assert_eq!(config.repeat.cooldown_seconds, 600);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aoba.toml");
        std::fs::write(&path, "[repeat]\ncooldown_seconds = 30\n").unwrap();
        let config = AobaConfig::from_file_or_default(&path).unwrap();
        assert_eq!(config.repeat.cooldown_seconds, 30);
    }

    #[test]
    fn env_disables_repeat() {
        let mut config = AobaConfig::default();
        config.apply_env(env(&[(REPEAT_DISABLED_ENV, "1")]));
        assert!(!config.repeat.enabled);

        let mut config = AobaConfig::default();
        config.apply_env(env(&[(REPEAT_DISABLED_ENV, "0")]));
        assert!(config.repeat.enabled);
    }

    #[test]
    fn env_fills_missing_secrets() {
        let mut config = AobaConfig::default();
        config.apply_env(env(&[
            (BOT_TOKEN_ENV, "42:XYZ"),
            (DATABASE_URL_ENV, "postgres://db/aoba"),
        ]));
        assert_eq!(config.telegram.token.as_deref(), Some("42:XYZ"));
        assert_eq!(config.database.url.as_deref(), Some("postgres://db/aoba"));
    }

    #[test]
    fn env_does_not_override_file_values() {
        let mut config =
            AobaConfig::from_toml("[telegram]\ntoken = \"file\"\n[database]\nurl = \"pg://file\"")
                .unwrap();
        config.apply_env(env(&[
            (BOT_TOKEN_ENV, "env"),
            (DATABASE_URL_ENV, "pg://env"),
        ]));
        assert_eq!(config.telegram.token.as_deref(), Some("file"));
        assert_eq!(config.database.url.as_deref(), Some("pg://file"));
    }

    #[test]
    fn env_ignores_empty_values() {
        let mut config = AobaConfig::default();
        config.apply_env(env(&[(BOT_TOKEN_ENV, ""), (DATABASE_URL_ENV, "")]));
        assert!(config.telegram.token.is_none());
        assert!(config.database.url.is_none());
    }
}
