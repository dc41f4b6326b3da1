use crate::config::{Config, EmailConfig, WebhookConfig};
use crate::error::Error;
use validator::Validate;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Runs the derived field rules and the cross-field checks below
    pub fn validate_config(config: &Config) -> Result<(), Error> {
        config.validate()?;

        if let Some(url) = config.throttle.redis_url.as_deref() {
            Self::validate_redis_url(url)?;
        }
        if config.email.enabled {
            Self::validate_email(&config.email)?;
        }
        if config.webhook.enabled {
            Self::validate_webhook(&config.webhook)?;
        }

        Ok(())
    }

    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), Error> {
        if url.is_empty() {
            return Err(Error::Validation("Redis URL cannot be empty".to_string()));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(Error::Validation(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// An enabled email channel needs somewhere to send from and to
    pub fn validate_email(email: &EmailConfig) -> Result<(), Error> {
        if email.receivers.is_empty() {
            return Err(Error::Validation(
                "Email alerts are enabled but EMAIL_RECEIVERS is empty".to_string(),
            ));
        }

        if email.sender.trim().is_empty() {
            return Err(Error::Validation(
                "Email alerts are enabled but EMAIL_SENDER is empty".to_string(),
            ));
        }

        for receiver in &email.receivers {
            if !receiver.contains('@') {
                return Err(Error::Validation(format!(
                    "Invalid email receiver '{}'",
                    receiver
                )));
            }
        }

        Ok(())
    }

    /// An enabled webhook channel needs an http(s) endpoint
    pub fn validate_webhook(webhook: &WebhookConfig) -> Result<(), Error> {
        let url = webhook.url.as_deref().unwrap_or_default();
        if url.is_empty() {
            return Err(Error::Validation(
                "Webhook alerts are enabled but MS_TEAMS_WEBHOOK is empty".to_string(),
            ));
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Validation(
                "Webhook URL must start with 'http://' or 'https://'".to_string(),
            ));
        }

        if webhook.timeout.is_zero() {
            return Err(Error::Validation(
                "Webhook timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
