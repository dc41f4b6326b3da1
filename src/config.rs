use crate::error::{Error, Result};
use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

const DEFAULT_THROTTLE_MINUTES: u64 = 5;
const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved settings for throttling and every notification channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Application identifier, used for the default store directory and in card text
    pub app_name: String,

    #[validate(nested)]
    pub throttle: ThrottleConfig,

    /// Error messages that never alert
    pub ignore_errors: Vec<String>,

    #[validate(nested)]
    pub email: EmailConfig,

    #[validate(nested)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ThrottleConfig {
    /// When false every alert is allowed and the store is never touched
    pub enabled: bool,

    /// Minimum interval between two alerts for the same error
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Delay after first detection before the first alert may go out
    #[serde(with = "humantime_serde")]
    pub grace: Duration,

    /// Directory holding the throttle records; derived from the app name when unset
    pub store_dir: Option<PathBuf>,

    /// Keep records in Redis instead of `store_dir`
    #[validate(url)]
    pub redis_url: Option<String>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(DEFAULT_THROTTLE_MINUTES * 60),
            grace: Duration::ZERO,
            store_dir: None,
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    /// Empty username means unauthenticated delivery
    pub username: String,
    pub password: String,
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub sender: String,
    /// Envelope sender; the `sender` is used when blank
    pub envelope_from: String,
    pub receivers: Vec<String>,
    pub subject: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: String::new(),
            password: String::new(),
            host: "localhost".to_string(),
            port: 25,
            sender: String::new(),
            envelope_from: String::new(),
            receivers: Vec::new(),
            subject: String::new(),
        }
    }
}

impl EmailConfig {
    pub fn envelope_sender(&self) -> &str {
        if self.envelope_from.trim().is_empty() {
            &self.sender
        } else {
            &self.envelope_from
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.username.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    #[validate(url)]
    pub url: Option<String>,
    #[validate(url)]
    pub proxy_url: Option<String>,
    /// Card title
    pub card_title: String,
    /// Card summary line
    pub card_summary: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            proxy_url: None,
            card_title: String::new(),
            card_summary: String::new(),
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

/// Flat view of the recognised environment variables
#[derive(Debug, Envconfig)]
pub struct EnvSettings {
    #[envconfig(from = "APP_NAME", default = "")]
    pub app_name: String,

    #[envconfig(from = "THROTTLE_ENABLED", default = "true")]
    pub throttle_enabled: String,

    /// Throttle window in minutes
    #[envconfig(from = "THROTTLE_DURATION", default = "5")]
    pub throttle_minutes: u64,

    /// Grace window in seconds
    #[envconfig(from = "THROTTLE_GRACE_SECONDS", default = "0")]
    pub grace_seconds: u64,

    #[envconfig(from = "THROTTLE_DISKCACHE_DIR")]
    pub store_dir: Option<String>,

    #[envconfig(from = "THROTTLE_REDIS_URL")]
    pub redis_url: Option<String>,

    /// `|`-separated error messages that never alert
    #[envconfig(from = "THROTTLE_IGNORE_ERRORS", default = "")]
    pub ignore_errors: String,

    #[envconfig(from = "EMAIL_ALERT_ENABLED", default = "false")]
    pub email_enabled: String,

    #[envconfig(from = "EMAIL_USERNAME", default = "")]
    pub email_username: String,

    #[envconfig(from = "EMAIL_PASSWORD", default = "")]
    pub email_password: String,

    #[envconfig(from = "SMTP_HOST", default = "localhost")]
    pub smtp_host: String,

    #[envconfig(from = "SMTP_PORT", default = "25")]
    pub smtp_port: u16,

    #[envconfig(from = "EMAIL_SENDER", default = "")]
    pub email_sender: String,

    #[envconfig(from = "EMAIL_ENVELOPE_FROM", default = "")]
    pub email_envelope_from: String,

    /// Comma-separated recipients
    #[envconfig(from = "EMAIL_RECEIVERS", default = "")]
    pub email_receivers: String,

    #[envconfig(from = "EMAIL_SUBJECT", default = "")]
    pub email_subject: String,

    #[envconfig(from = "MS_TEAMS_ALERT_ENABLED", default = "false")]
    pub webhook_enabled: String,

    #[envconfig(from = "MS_TEAMS_WEBHOOK")]
    pub webhook_url: Option<String>,

    #[envconfig(from = "MS_TEAMS_PROXY_URL")]
    pub webhook_proxy_url: Option<String>,

    #[envconfig(from = "ALERT_CARD_SUBJECT", default = "")]
    pub card_title: String,

    #[envconfig(from = "MS_TEAMS_CARD_SUBJECT", default = "")]
    pub card_summary: String,
}

impl From<EnvSettings> for Config {
    fn from(env: EnvSettings) -> Self {
        Config {
            throttle: ThrottleConfig {
                // Anything but an explicit "false" keeps throttling on.
                enabled: !env.throttle_enabled.trim().eq_ignore_ascii_case("false"),
                window: Duration::from_secs(env.throttle_minutes.saturating_mul(60)),
                grace: Duration::from_secs(env.grace_seconds),
                store_dir: non_empty(env.store_dir).map(PathBuf::from),
                redis_url: non_empty(env.redis_url),
            },
            ignore_errors: split_list(&env.ignore_errors, '|'),
            email: EmailConfig {
                enabled: is_true(&env.email_enabled),
                username: env.email_username,
                password: env.email_password,
                host: env.smtp_host,
                port: env.smtp_port,
                sender: env.email_sender,
                envelope_from: env.email_envelope_from,
                receivers: split_list(&env.email_receivers, ','),
                subject: env.email_subject,
            },
            webhook: WebhookConfig {
                enabled: is_true(&env.webhook_enabled),
                url: non_empty(env.webhook_url),
                proxy_url: non_empty(env.webhook_proxy_url),
                card_title: env.card_title,
                card_summary: env.card_summary,
                timeout: DEFAULT_WEBHOOK_TIMEOUT,
            },
            app_name: env.app_name,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(EnvSettings::init_from_env()?.into())
    }

    /// Load configuration from an explicit variable map
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        Ok(EnvSettings::init_from_hashmap(vars)?.into())
    }

    /// Parse a JSON document; durations use humantime notation ("5m", "30s")
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Config(format!("Invalid JSON configuration: {}", e)))
    }

    /// The store directory, falling back to one derived from `app_name`
    pub fn store_dir(&self) -> PathBuf {
        self.throttle
            .store_dir
            .clone()
            .unwrap_or_else(|| default_store_dir(&self.app_name))
    }

    /// Whether `message` is on the configured ignore list
    pub fn is_ignored(&self, message: &str) -> bool {
        self.ignore_errors.iter().any(|ignored| ignored == message)
    }
}

/// `/tmp/cache/{app_name}_throttler_disk_cache`
pub fn default_store_dir(app_name: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/cache/{}_throttler_disk_cache", app_name))
}

fn is_true(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn split_list(raw: &str, delimiter: char) -> Vec<String> {
    raw.split(delimiter)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert!(config.throttle.enabled);
        assert_eq!(config.throttle.window, Duration::from_secs(300));
        assert_eq!(config.throttle.grace, Duration::ZERO);
        assert_eq!(config.store_dir(), PathBuf::from("/tmp/cache/_throttler_disk_cache"));
        assert!(!config.email.enabled);
        assert!(!config.webhook.enabled);
        assert_eq!(config.webhook.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_changed_durations() {
        let config = Config::from_vars(&vars(&[
            ("APP_NAME", "billing"),
            ("THROTTLE_DURATION", "7"),
            ("THROTTLE_GRACE_SECONDS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.throttle.window, Duration::from_secs(7 * 60));
        assert_eq!(config.throttle.grace, Duration::from_secs(5));
        assert_eq!(
            config.store_dir(),
            PathBuf::from("/tmp/cache/billing_throttler_disk_cache")
        );
    }

    #[test]
    fn test_explicit_store_dir() {
        let config = Config::from_vars(&vars(&[("THROTTLE_DISKCACHE_DIR", "new_cache_dir")])).unwrap();
        assert_eq!(config.store_dir(), PathBuf::from("new_cache_dir"));
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let result = Config::from_vars(&vars(&[("THROTTLE_DURATION", "five")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_flags_and_lists() {
        let config = Config::from_vars(&vars(&[
            ("THROTTLE_ENABLED", "false"),
            ("EMAIL_ALERT_ENABLED", "true"),
            ("EMAIL_RECEIVERS", "ops@example.com, dev@example.com"),
            ("MS_TEAMS_ALERT_ENABLED", "TRUE"),
            ("MS_TEAMS_WEBHOOK", "https://example.com/hook"),
            ("THROTTLE_IGNORE_ERRORS", "context canceled|EOF"),
        ]))
        .unwrap();

        assert!(!config.throttle.enabled);
        assert!(config.email.enabled);
        assert_eq!(config.email.receivers, vec!["ops@example.com", "dev@example.com"]);
        assert!(config.webhook.enabled);
        assert_eq!(config.webhook.url.as_deref(), Some("https://example.com/hook"));
        assert!(config.is_ignored("EOF"));
        assert!(!config.is_ignored("eof"));
    }

    #[test]
    fn test_envelope_sender_falls_back_to_sender() {
        let mut email = EmailConfig {
            sender: "alerts@example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(email.envelope_sender(), "alerts@example.com");

        email.envelope_from = "bounces@example.com".to_string();
        assert_eq!(email.envelope_sender(), "bounces@example.com");
    }

    #[test]
    fn test_from_json_with_humantime_durations() {
        let config = Config::from_json_str(
            r#"{"app_name": "billing", "throttle": {"window": "10m", "grace": "30s"}}"#,
        )
        .unwrap();

        assert_eq!(config.app_name, "billing");
        assert_eq!(config.throttle.window, Duration::from_secs(600));
        assert_eq!(config.throttle.grace, Duration::from_secs(30));
        assert!(config.throttle.enabled);
    }

    #[test]
    fn test_json_store_dir_follows_app_name() {
        let billing = Config::from_json_str(r#"{"app_name": "billing"}"#).unwrap();
        let orders = Config::from_json_str(r#"{"app_name": "orders"}"#).unwrap();

        assert_eq!(
            billing.store_dir(),
            PathBuf::from("/tmp/cache/billing_throttler_disk_cache")
        );
        assert_ne!(billing.store_dir(), orders.store_dir());

        let explicit =
            Config::from_json_str(r#"{"app_name": "billing", "throttle": {"store_dir": "/var/lib/alerts"}}"#)
                .unwrap();
        assert_eq!(explicit.store_dir(), PathBuf::from("/var/lib/alerts"));
    }
}
