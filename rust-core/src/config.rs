//! Runtime configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! file, then `SOS_`-prefixed environment variables. Nested keys use a
//! double underscore, e.g. `SOS_COUNTDOWN__DURATION_SECS=3`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;
use crate::countdown::CountdownConfig;
use crate::error::SosResult;
use crate::shake_detection::ShakeDetectorConfig;
use crate::types::MessageFormat;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SosConfig {
    pub shake: ShakeDetectorConfig,
    pub countdown: CountdownConfig,
    pub alert: AlertConfig,
    pub logging: LoggingConfig,
}

/// Alert channel and dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Transport used for alerts.
    pub channel: ChannelKind,
    /// Message layout. Derived from the channel when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<MessageFormat>,
    /// Upper bound on a single send, in seconds.
    pub dispatch_timeout_secs: u64,
}

impl AlertConfig {
    /// The layout to compose with for `kind`.
    pub fn format_for(&self, kind: ChannelKind) -> MessageFormat {
        self.format.unwrap_or_else(|| kind.default_format())
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs.max(1))
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::Sms,
            format: None,
            dispatch_timeout_secs: 30,
        }
    }
}

/// Log output settings for binaries embedding the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Apply command-line overrides. A flag can only switch JSON on.
    pub fn overridden(&self, level: Option<&str>, json: bool) -> Self {
        Self {
            level: level.map_or_else(|| self.level.clone(), str::to_string),
            json: self.json || json,
        }
    }
}

impl SosConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&str>) -> SosResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&SosConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SOS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: SosConfig = builder.build()?.try_deserialize()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }
}
