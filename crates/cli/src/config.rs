//! Configuration loading and management

use anyhow::{Context, Result};
use news_digest_domain::DEFAULT_MAX_SUBSCRIPTIONS;
use news_digest_domain::usecases::{DeliveryConfig, PollEngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub normalizer: NormalizerSection,

    #[serde(default)]
    pub delivery: DeliverySection,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerSection {
    #[serde(default = "default_ad_markers")]
    pub ad_markers: Vec<String>,

    #[serde(default)]
    pub extra_stopwords: Vec<String>,

    /// `form<TAB>lemma` entries consulted before the Russian dictionary
    #[serde(default)]
    pub lexicon_path: Option<PathBuf>,
}

/// Message text overrides; unset fields keep the built-in wording
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliverySection {
    #[serde(default)]
    pub header: Option<String>,

    #[serde(default)]
    pub separator: Option<String>,

    #[serde(default)]
    pub source_label: Option<String>,

    #[serde(default)]
    pub accept_label: Option<String>,

    #[serde(default)]
    pub skip_label: Option<String>,

    #[serde(default)]
    pub accept_ack: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_preview_base_url")]
    pub preview_base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_long_poll_timeout")]
    pub long_poll_timeout_secs: u64,
}

// Default value functions
fn default_state_db_path() -> PathBuf {
    PathBuf::from("./news_digest.sqlite")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_subscriptions() -> usize {
    DEFAULT_MAX_SUBSCRIPTIONS
}

fn default_interval() -> u64 {
    300
}

fn default_error_backoff() -> u64 {
    60
}

fn default_batch_limit() -> usize {
    5
}

fn default_ad_markers() -> Vec<String> {
    vec!["реклама".to_string()]
}

fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_preview_base_url() -> String {
    "https://t.me".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_long_poll_timeout() -> u64 {
    30
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_db_path: default_state_db_path(),
            log_level: default_log_level(),
            max_subscriptions: default_max_subscriptions(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            error_backoff_secs: default_error_backoff(),
            batch_limit: default_batch_limit(),
        }
    }
}

impl Default for NormalizerSection {
    fn default() -> Self {
        Self {
            ad_markers: default_ad_markers(),
            extra_stopwords: vec![],
            lexicon_path: None,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            api_base_url: default_api_base_url(),
            preview_base_url: default_preview_base_url(),
            request_timeout_secs: default_request_timeout(),
            long_poll_timeout_secs: default_long_poll_timeout(),
        }
    }
}

impl PollingConfig {
    pub fn engine_config(&self) -> PollEngineConfig {
        PollEngineConfig {
            poll_interval: Duration::from_secs(self.interval_secs.max(1)),
            error_backoff: Duration::from_secs(self.error_backoff_secs.max(1)),
            batch_limit: self.batch_limit.max(1),
        }
    }
}

impl DeliverySection {
    pub fn delivery_config(&self) -> DeliveryConfig {
        let defaults = DeliveryConfig::default();
        let pick = |value: &Option<String>, default: String| value.clone().unwrap_or(default);

        DeliveryConfig {
            header: pick(&self.header, defaults.header),
            separator: pick(&self.separator, defaults.separator),
            source_label: pick(&self.source_label, defaults.source_label),
            accept_label: pick(&self.accept_label, defaults.accept_label),
            skip_label: pick(&self.skip_label, defaults.skip_label),
            accept_ack: pick(&self.accept_ack, defaults.accept_ack),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("NEWS_DIGEST")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# news-digest configuration

[general]
state_db_path = "./news_digest.sqlite"
log_level = "info"
# Per-user subscription cap
max_subscriptions = 10

[polling]
interval_secs = 300
# Pause after a cycle aborted by a storage failure
error_backoff_secs = 60
# Posts fetched per channel per cycle
batch_limit = 5

[normalizer]
# Lines starting with "<marker>:" open an advertisement block that runs to the end of the post
ad_markers = ["реклама"]
extra_stopwords = []
# lexicon_path = "./lexicon.tsv"  # form<TAB>lemma per line

[delivery]
# header = "📰 [Обработанная новость]"
# separator = "➖➖➖"
# source_label = "Источник:"
# accept_label = "✅ Опубликовать"
# skip_label = "❌ Пропустить"
# accept_ack = "Текст готов к использованию"

[telegram]
bot_token_env = "TELEGRAM_BOT_TOKEN"
api_base_url = "https://api.telegram.org"
preview_base_url = "https://t.me"
request_timeout_secs = 30
long_poll_timeout_secs = 30
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_toml_parses_to_defaults() {
        let parsed: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(parsed.general.state_db_path, defaults.general.state_db_path);
        assert_eq!(parsed.general.max_subscriptions, 10);
        assert_eq!(parsed.polling.interval_secs, 300);
        assert_eq!(parsed.polling.error_backoff_secs, 60);
        assert_eq!(parsed.polling.batch_limit, 5);
        assert_eq!(parsed.normalizer.ad_markers, vec!["реклама".to_string()]);
        assert_eq!(parsed.telegram.bot_token_env, "TELEGRAM_BOT_TOKEN");
    }

    #[test]
    fn test_delivery_overrides_merge_with_defaults() {
        let section = DeliverySection {
            accept_ack: Some("Готово".to_string()),
            ..Default::default()
        };

        let config = section.delivery_config();
        assert_eq!(config.accept_ack, "Готово");
        assert_eq!(config.header, DeliveryConfig::default().header);
    }

    #[test]
    fn test_engine_config_clamps_zero() {
        let polling = PollingConfig {
            interval_secs: 0,
            error_backoff_secs: 0,
            batch_limit: 0,
        };

        let engine = polling.engine_config();
        assert_eq!(engine.poll_interval, Duration::from_secs(1));
        assert_eq!(engine.batch_limit, 1);
    }
}
