use super::NotificationChannel;
use crate::alert::Alert;
use crate::config::WebhookConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use serde::Serialize;
use tracing::info;

const CHANNEL: &str = "webhook";
const CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
const CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
const UNKNOWN_HOST: &str = "hostname_unknown";

/// Chat message wrapping a single adaptive card.
#[derive(Debug, Serialize)]
pub struct CardMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    attachments: Vec<CardAttachment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardAttachment {
    content_type: &'static str,
    content_url: Option<String>,
    content: CardContent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardContent {
    #[serde(rename = "$schema")]
    schema: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    version: &'static str,
    accent_color: &'static str,
    body: Vec<CardElement>,
    #[serde(rename = "msteams")]
    ms_teams: CardWidth,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum CardElement {
    TextBlock {
        text: String,
        id: &'static str,
        size: &'static str,
        weight: &'static str,
        color: &'static str,
    },
    FactSet {
        facts: Vec<Fact>,
        id: &'static str,
    },
    CodeBlock {
        #[serde(rename = "codeSnippet")]
        code_snippet: String,
        #[serde(rename = "fontType")]
        font_type: &'static str,
        wrap: bool,
    },
}

#[derive(Debug, Serialize)]
struct Fact {
    title: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct CardWidth {
    width: &'static str,
}

/// Posts alerts as adaptive cards to a chat webhook.
pub struct WebhookChannel {
    config: WebhookConfig,
    app_name: String,
    client: Client,
}

impl WebhookChannel {
    /// Build the channel and its HTTP client; requests time out after `config.timeout`.
    pub fn new(config: WebhookConfig, app_name: impl Into<String>) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(proxy_url) = config.proxy_url.as_deref() {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| Error::misconfigured(CHANNEL, format!("invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::misconfigured(CHANNEL, format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            app_name: app_name.into(),
            client,
        })
    }

    /// Render the card for `alert`, applying any card overrides.
    pub fn build_card(&self, alert: &Alert) -> CardMessage {
        let overrides = alert.overrides();
        let title = overrides
            .and_then(|o| o.card_title())
            .unwrap_or(&self.config.card_title)
            .to_string();
        let summary = overrides
            .and_then(|o| o.card_summary())
            .unwrap_or(&self.config.card_summary)
            .to_string();
        let error_text = overrides
            .and_then(|o| o.card_error())
            .unwrap_or(alert.detail())
            .to_string();
        let host = format!("{} {}", hostname(), self.app_name);

        CardMessage {
            kind: "message",
            attachments: vec![CardAttachment {
                content_type: CARD_CONTENT_TYPE,
                content_url: None,
                content: CardContent {
                    schema: CARD_SCHEMA,
                    kind: "AdaptiveCard",
                    version: "1.4",
                    accent_color: "bf0000",
                    body: vec![
                        CardElement::TextBlock {
                            text: title.clone(),
                            id: "title",
                            size: "large",
                            weight: "bolder",
                            color: "accent",
                        },
                        CardElement::FactSet {
                            facts: vec![
                                Fact { title: "Title:", value: title },
                                Fact { title: "Summary:", value: summary },
                                Fact { title: "Hostname:", value: host },
                            ],
                            id: "acFactSet",
                        },
                        CardElement::CodeBlock {
                            code_snippet: error_text,
                            font_type: "monospace",
                            wrap: true,
                        },
                    ],
                    ms_teams: CardWidth { width: "Full" },
                },
            }],
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let url = self
            .config
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::misconfigured(CHANNEL, "MS_TEAMS_WEBHOOK is not set"))?;

        let card = self.build_card(alert);
        let response = self
            .client
            .post(url)
            .json(&card)
            .send()
            .await
            .map_err(|e| Error::delivery(CHANNEL, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::delivery(
                CHANNEL,
                format!("endpoint responded with {}: {}", status, body.trim()),
            ));
        }

        info!(identity = %alert.identity(), status = %status, "Alert card posted");
        Ok(())
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}
