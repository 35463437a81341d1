//! Alert channel capability.
//!
//! The core never speaks SMS or SMTP itself. It hands a composed alert to
//! an [`AlertChannel`] and gets back a single result. Realizations live with
//! the host; this module ships the trait, the channel kinds, and an
//! in-process [`LoggingChannel`] used by the demo binary and tests.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::sms::SmsPlan;
use crate::types::MessageFormat;

/// Which transport alerts go out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Radio SMS to a phone number. Split into parts when long.
    Sms,
    /// Authenticated SMTP email (STARTTLS on port 587).
    Email,
}

impl ChannelKind {
    /// Layout used when the configuration does not override it.
    pub fn default_format(&self) -> MessageFormat {
        match self {
            ChannelKind::Sms => MessageFormat::Terse,
            ChannelKind::Email => MessageFormat::Rich,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Sms => "sms",
            ChannelKind::Email => "email",
        }
    }
}

impl Default for ChannelKind {
    fn default() -> Self {
        ChannelKind::Sms
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(ChannelKind::Sms),
            "email" => Ok(ChannelKind::Email),
            other => Err(format!("unknown channel kind `{other}`")),
        }
    }
}

/// One-shot delivery of an alert.
///
/// Implementations perform exactly one attempt per call. They may block on
/// I/O inside the future but must not block the calling thread.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Transport kind, used for validation rules and the permission gate.
    fn kind(&self) -> ChannelKind;

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ChannelError>;
}

/// A send captured by [`LoggingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Number of SMS parts the body would need. 1 for email.
    pub parts: usize,
}

/// Channel that logs and records each send instead of transmitting.
///
/// Can be told to fail every send, or to take a fixed time per send, for
/// exercising the failure and in-flight paths.
#[derive(Debug)]
pub struct LoggingChannel {
    kind: ChannelKind,
    failure: Option<ChannelError>,
    latency: Duration,
    sent: Mutex<Vec<SentAlert>>,
    attempts: Mutex<u64>,
}

impl LoggingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            failure: None,
            latency: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
        }
    }

    /// Every send fails with `error`.
    pub fn failing_with(mut self, error: ChannelError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Every send takes `latency` before completing.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Successful sends so far.
    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().clone()
    }

    /// Calls to `send`, successful or not.
    pub fn attempts(&self) -> u64 {
        *self.attempts.lock()
    }
}

#[async_trait]
impl AlertChannel for LoggingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
        *self.attempts.lock() += 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(err) = &self.failure {
            tracing::warn!(channel = %self.kind, recipient, error = %err, "simulated send failure");
            return Err(err.clone());
        }

        let parts = match self.kind {
            ChannelKind::Sms => {
                let plan = SmsPlan::for_text(body);
                for (index, part) in plan.parts().iter().enumerate() {
                    tracing::debug!(index, chars = part.chars().count(), "sms part");
                }
                plan.part_count()
            }
            ChannelKind::Email => 1,
        };
        tracing::info!(channel = %self.kind, recipient, subject, parts, "alert sent");
        self.sent.lock().push(SentAlert {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            parts,
        });
        Ok(())
    }
}
