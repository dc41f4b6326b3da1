pub mod alert;
pub mod channels;
pub mod config;
pub mod config_validator;
pub mod dispatcher;
pub mod error;
pub mod key_generator;
pub mod metrics;
pub mod store;
pub mod throttler;

pub use alert::{Alert, ContentOverrides};
pub use channels::NotificationChannel;
pub use config::Config;
pub use dispatcher::AlertDispatcher;
pub use error::{Error, Result};
pub use key_generator::ErrorIdentity;
pub use store::KeyValueStore;
pub use throttler::{Decision, ThrottleEngine};
