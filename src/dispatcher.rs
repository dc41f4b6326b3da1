//! Fans an alert out to the configured channels, unless it is ignored or throttled.

use crate::alert::Alert;
use crate::channels::{EmailChannel, NotificationChannel, WebhookChannel};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::{DispatchOutcome, MetricsCollector};
use crate::store::{FileStore, KeyValueStore, RedisStore};
use crate::throttler::{Decision, ThrottleEngine};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct AlertDispatcher {
    config: Config,
    engine: ThrottleEngine,
    channels: Vec<Box<dyn NotificationChannel>>,
    metrics: MetricsCollector,
}

impl AlertDispatcher {
    /// Dispatcher over `store` with no channels registered.
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>) -> Self {
        let engine = ThrottleEngine::new(store, &config.throttle);
        Self {
            config,
            engine,
            channels: Vec::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Build the store and the enabled channels described by `config`.
    ///
    /// Channels are attempted in a fixed order: email, then webhook.
    pub async fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = match config.throttle.redis_url.as_deref() {
            Some(url) => {
                let namespace = format!("{}_throttler", config.app_name);
                Arc::new(RedisStore::connect(url, namespace).await?)
            }
            None => Arc::new(FileStore::new(config.store_dir())),
        };

        let email = config.email.enabled.then(|| EmailChannel::new(config.email.clone()));
        let webhook = if config.webhook.enabled {
            Some(WebhookChannel::new(config.webhook.clone(), config.app_name.clone())?)
        } else {
            None
        };

        let mut dispatcher = Self::new(config, store);
        if let Some(channel) = email {
            dispatcher.add_channel(Box::new(channel));
        }
        if let Some(channel) = webhook {
            dispatcher.add_channel(Box::new(channel));
        }

        info!(
            channels = ?dispatcher.channel_names(),
            throttling = dispatcher.config.throttle.enabled,
            "Alert dispatcher ready"
        );
        Ok(dispatcher)
    }

    pub fn with_channel<C>(mut self, channel: C) -> Self
    where
        C: NotificationChannel + 'static,
    {
        self.add_channel(Box::new(channel));
        self
    }

    /// Append a channel; it is attempted after every channel already registered.
    pub fn add_channel(&mut self, channel: Box<dyn NotificationChannel>) {
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &ThrottleEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Send `alert` through every channel unless it is ignored or throttled.
    ///
    /// Returns `Ok(())` when the alert was suppressed or fully delivered, and
    /// the first channel error otherwise; channels after a failing one are
    /// not attempted.
    pub async fn notify(&self, alert: &Alert) -> Result<()> {
        self.notify_at(alert, Utc::now()).await
    }

    #[tracing::instrument(skip(self, alert), fields(identity = %alert.identity()))]
    pub async fn notify_at(&self, alert: &Alert, now: DateTime<Utc>) -> Result<()> {
        let identity = alert.identity().as_str();

        if self.is_ignored(alert) {
            debug!("Alert matches the ignore list");
            self.metrics.record(identity, DispatchOutcome::Ignored).await;
            return Ok(());
        }

        if self.decide(alert, now).await == Decision::Suppress {
            self.metrics.record(identity, DispatchOutcome::Suppressed).await;
            return Ok(());
        }

        for channel in &self.channels {
            if let Err(e) = channel.send(alert).await {
                error!(channel = channel.name(), error = %e, "Alert delivery failed");
                self.metrics.record(identity, DispatchOutcome::Failed).await;
                return Err(e);
            }
            debug!(channel = channel.name(), "Alert delivered");
        }

        info!(channels = self.channels.len(), "Alert dispatched");
        self.metrics.record(identity, DispatchOutcome::Delivered).await;
        Ok(())
    }

    /// The throttle decision `notify_at` would act on, including ignore-list
    /// handling. Updates the store exactly like a real dispatch.
    pub async fn should_alert_at(&self, alert: &Alert, now: DateTime<Utc>) -> Decision {
        if self.is_ignored(alert) {
            return Decision::Suppress;
        }
        self.decide(alert, now).await
    }

    /// Forget every recorded throttle and grace window.
    pub async fn clear_throttling(&self) -> Result<()> {
        info!("Clearing throttle records");
        self.engine.clear_all().await
    }

    fn is_ignored(&self, alert: &Alert) -> bool {
        alert.is_ignored() || self.config.is_ignored(alert.message())
    }

    async fn decide(&self, alert: &Alert, now: DateTime<Utc>) -> Decision {
        if !self.config.throttle.enabled {
            return Decision::Allow;
        }

        match self.engine.decide_at(alert.identity(), now).await {
            Ok(decision) => decision,
            Err(e) => {
                // Without a throttle record every retry would alert again.
                warn!(error = %e, "Could not record alert attempt, suppressing");
                Decision::Suppress
            }
        }
    }
}
