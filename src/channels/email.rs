use super::NotificationChannel;
use crate::alert::Alert;
use crate::config::EmailConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

const CHANNEL: &str = "email";
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers alerts as HTML mail over SMTP.
///
/// With a username configured the transport uses STARTTLS and credentials,
/// otherwise it talks plain SMTP to the configured relay.
pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Build the message for `alert`, applying any email overrides.
    pub fn build_message(&self, alert: &Alert) -> Result<Message> {
        if self.config.receivers.is_empty() {
            return Err(Error::misconfigured(CHANNEL, "notification receivers are empty"));
        }

        let overrides = alert.overrides();
        let subject = overrides
            .and_then(|o| o.email_subject())
            .unwrap_or(&self.config.subject);
        let body = overrides
            .and_then(|o| o.email_body())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Error: \r\n{}", alert.detail()));

        let from: Mailbox = strip_line_breaks(&self.config.sender)
            .parse()
            .map_err(|e| Error::misconfigured(CHANNEL, format!("invalid sender: {}", e)))?;
        let envelope_from: Address = strip_line_breaks(self.config.envelope_sender())
            .parse()
            .map_err(|e| Error::misconfigured(CHANNEL, format!("invalid envelope sender: {}", e)))?;

        let mut recipients = Vec::with_capacity(self.config.receivers.len());
        let mut builder = Message::builder()
            .from(from)
            .subject(strip_line_breaks(subject))
            .header(ContentType::TEXT_HTML);

        for receiver in &self.config.receivers {
            let mailbox: Mailbox = strip_line_breaks(receiver).parse().map_err(|e| {
                Error::misconfigured(CHANNEL, format!("invalid receiver '{}': {}", receiver, e))
            })?;
            recipients.push(mailbox.email.clone());
            builder = builder.to(mailbox);
        }

        let envelope = Envelope::new(Some(envelope_from), recipients)
            .map_err(|e| Error::misconfigured(CHANNEL, e.to_string()))?;

        builder
            .envelope(envelope)
            .body(body)
            .map_err(|e| Error::delivery(CHANNEL, format!("failed to build email: {}", e)))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = self.config.host.as_str();

        let transport = if self.config.is_authenticated() {
            let credentials =
                Credentials::new(self.config.username.clone(), self.config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| {
                    Error::misconfigured(CHANNEL, format!("failed to create SMTP transport: {}", e))
                })?
                .port(self.config.port)
                .credentials(credentials)
                .timeout(Some(SMTP_TIMEOUT))
                .build()
        } else {
            debug!(host = %host, "Sending through unauthenticated SMTP relay");
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(self.config.port)
                .timeout(Some(SMTP_TIMEOUT))
                .build()
        };

        Ok(transport)
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let message = self.build_message(alert)?;
        let transport = self.transport()?;

        transport
            .send(message)
            .await
            .map_err(|e| Error::delivery(CHANNEL, e.to_string()))?;

        info!(
            identity = %alert.identity(),
            receivers = self.config.receivers.len(),
            "Alert email sent"
        );
        Ok(())
    }
}

/// Removes CR/LF, raw or percent-encoded, so values cannot inject headers.
fn strip_line_breaks(raw: &str) -> String {
    static LINE_BREAKS: OnceLock<Regex> = OnceLock::new();
    let pattern = LINE_BREAKS.get_or_init(|| {
        Regex::new(r"(?i)\r\n|\r|\n|%0a|%0d").expect("line break pattern is valid")
    });
    pattern.replace_all(raw, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ContentOverrides;

    fn config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            sender: "alerts@example.com".to_string(),
            receivers: vec!["ops@example.com".to_string(), "dev@example.com".to_string()],
            subject: "Service error".to_string(),
            ..Default::default()
        }
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8_lossy(&message.formatted()).into_owned()
    }

    #[test]
    fn test_strip_line_breaks() {
        assert_eq!(strip_line_breaks("ops@example.com\r\nBcc: x"), "ops@example.comBcc: x");
        assert_eq!(strip_line_breaks("a%0Ab%0dc\nd\re"), "abcde");
    }

    #[test]
    fn test_default_subject_and_recipients() {
        let channel = EmailChannel::new(config());
        let message = channel.build_message(&Alert::from_message("db timeout")).unwrap();

        let text = formatted(&message);
        assert!(text.contains("Subject: Service error"));
        assert!(text.contains("ops@example.com"));
        assert!(text.contains("dev@example.com"));
        assert!(text.contains("text/html"));
        assert_eq!(message.envelope().to().len(), 2);
    }

    #[test]
    fn test_envelope_from_falls_back_to_sender() {
        let channel = EmailChannel::new(config());
        let message = channel.build_message(&Alert::from_message("db timeout")).unwrap();
        assert_eq!(
            message.envelope().from().map(|a| a.to_string()),
            Some("alerts@example.com".to_string())
        );

        let mut with_envelope = config();
        with_envelope.envelope_from = "bounces@example.com".to_string();
        let message = EmailChannel::new(with_envelope)
            .build_message(&Alert::from_message("db timeout"))
            .unwrap();
        assert_eq!(
            message.envelope().from().map(|a| a.to_string()),
            Some("bounces@example.com".to_string())
        );
    }

    #[test]
    fn test_subject_override() {
        let channel = EmailChannel::new(config());
        let alert = Alert::from_message("db timeout").with_overrides(ContentOverrides {
            email_subject: "Billing is down".to_string(),
            ..Default::default()
        });

        let text = formatted(&channel.build_message(&alert).unwrap());
        assert!(text.contains("Subject: Billing is down"));
    }

    #[test]
    fn test_missing_receivers_is_misconfiguration() {
        let mut config = config();
        config.receivers.clear();

        let result = EmailChannel::new(config).build_message(&Alert::from_message("db timeout"));
        assert!(matches!(result, Err(Error::MisconfiguredChannel { .. })));
    }

    #[tokio::test]
    async fn test_send_without_receivers_fails_before_connecting() {
        let mut config = config();
        config.receivers.clear();
        config.host = "smtp.invalid".to_string();

        let result = EmailChannel::new(config).send(&Alert::from_message("db timeout")).await;
        assert!(matches!(result, Err(Error::MisconfiguredChannel { .. })));
    }
}
