use crate::key_generator::ErrorIdentity;
use serde::{Deserialize, Serialize};

/// Per-alert replacements for the content each channel would render by default.
///
/// Empty fields leave the channel's default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentOverrides {
    pub email_subject: String,
    pub email_body: String,
    pub card_title: String,
    pub card_summary: String,
    pub card_error: String,
}

impl ContentOverrides {
    pub fn email_subject(&self) -> Option<&str> {
        non_empty(&self.email_subject)
    }

    pub fn email_body(&self) -> Option<&str> {
        non_empty(&self.email_body)
    }

    pub fn card_title(&self) -> Option<&str> {
        non_empty(&self.card_title)
    }

    pub fn card_summary(&self) -> Option<&str> {
        non_empty(&self.card_summary)
    }

    pub fn card_error(&self) -> Option<&str> {
        non_empty(&self.card_error)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// One error occurrence to report.
#[derive(Debug, Clone)]
pub struct Alert {
    message: String,
    detail: String,
    identity: ErrorIdentity,
    ignore: Vec<String>,
    overrides: Option<ContentOverrides>,
}

impl Alert {
    /// Alert for `err`, identified by its message.
    ///
    /// `ignore` lists messages that must never alert.
    pub fn new<E>(err: &E, ignore: &[&dyn std::error::Error]) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let message = err.to_string();
        Self {
            detail: format!("{:?}", err),
            identity: ErrorIdentity::new(message.clone()),
            message,
            ignore: ignore.iter().map(|e| e.to_string()).collect(),
            overrides: None,
        }
    }

    /// Alert built straight from message text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            detail: message.clone(),
            identity: ErrorIdentity::new(message.clone()),
            message,
            ignore: Vec::new(),
            overrides: None,
        }
    }

    /// Track throttle state under `identity` instead of the message text.
    pub fn with_identity(mut self, identity: impl Into<ErrorIdentity>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_ignored<I, S>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(messages.into_iter().map(Into::into));
        self
    }

    pub fn with_overrides(mut self, overrides: ContentOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Debug rendering of the error, used as the default body text.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn identity(&self) -> &ErrorIdentity {
        &self.identity
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignore
    }

    pub fn overrides(&self) -> Option<&ContentOverrides> {
        self.overrides.as_ref()
    }

    /// Exact message match against the alert's own ignore list.
    pub fn is_ignored(&self) -> bool {
        self.ignore.iter().any(|ignored| ignored == &self.message)
    }
}
