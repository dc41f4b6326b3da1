use alert_throttler::config_validator::ConfigValidator;
use alert_throttler::{Alert, AlertDispatcher, Config, ContentOverrides, Decision};
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "alert-throttler", version, about = "Throttled error alerting over email and chat webhooks")]
struct Cli {
    /// Log level for this crate when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report an error through every enabled channel
    Notify {
        /// Error message; also the throttle identity unless --identity is given
        #[arg(short, long)]
        message: String,

        /// Explicit throttle identity
        #[arg(long)]
        identity: Option<String>,

        /// Messages that must never alert (repeatable)
        #[arg(long = "ignore")]
        ignore: Vec<String>,

        #[arg(long)]
        email_subject: Option<String>,

        #[arg(long)]
        email_body: Option<String>,

        #[arg(long)]
        card_title: Option<String>,

        #[arg(long)]
        card_summary: Option<String>,

        #[arg(long)]
        card_error: Option<String>,
    },
    /// Print whether an alert would go out now; records the attempt like a dispatch
    Check {
        #[arg(short, long)]
        message: String,

        #[arg(long)]
        identity: Option<String>,
    },
    /// Remove every throttle and grace record
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("alert_throttler={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    ConfigValidator::validate_config(&config)
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing::debug!(
        store_dir = %config.store_dir().display(),
        throttling = config.throttle.enabled,
        "Configuration loaded"
    );

    let dispatcher = AlertDispatcher::from_config(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create dispatcher: {}", e))?;

    match cli.command {
        Command::Notify {
            message,
            identity,
            ignore,
            email_subject,
            email_body,
            card_title,
            card_summary,
            card_error,
        } => {
            let overrides = ContentOverrides {
                email_subject: email_subject.unwrap_or_default(),
                email_body: email_body.unwrap_or_default(),
                card_title: card_title.unwrap_or_default(),
                card_summary: card_summary.unwrap_or_default(),
                card_error: card_error.unwrap_or_default(),
            };
            let alert = build_alert(message, identity)
                .with_ignored(ignore)
                .with_overrides(overrides);

            dispatcher
                .notify(&alert)
                .await
                .map_err(|e| anyhow::anyhow!("Alert failed: {}", e))?;
        }
        Command::Check { message, identity } => {
            let alert = build_alert(message, identity);
            match dispatcher.should_alert_at(&alert, Utc::now()).await {
                Decision::Allow => println!("allow"),
                Decision::Suppress => println!("suppress"),
            }
        }
        Command::Clear => {
            dispatcher
                .clear_throttling()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to clear throttle records: {}", e))?;
            tracing::info!("Throttle records cleared");
        }
    }

    Ok(())
}

fn build_alert(message: String, identity: Option<String>) -> Alert {
    let alert = Alert::from_message(message);
    match identity {
        Some(identity) => alert.with_identity(identity),
        None => alert,
    }
}
