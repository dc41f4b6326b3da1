//! Notification channels.
//!
//! A channel turns an [`Alert`] into its own payload and delivers it. The
//! dispatcher only sees the [`NotificationChannel`] trait.

pub mod email;
pub mod webhook;

use crate::alert::Alert;
use crate::error::Result;
use async_trait::async_trait;

pub use email::EmailChannel;
pub use webhook::WebhookChannel;

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Render and deliver `alert`.
    ///
    /// Fails with `Error::MisconfiguredChannel` when no destination is set and
    /// `Error::Delivery` when the transport or the remote end rejects the message.
    async fn send(&self, alert: &Alert) -> Result<()>;
}
