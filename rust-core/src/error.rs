//! Error taxonomy.
//!
//! Every failure the core can observe maps onto one of these variants, and
//! every one of them leaves the escalation machine in `Idle` (through
//! `Failed` when a send was already attempted).

use thiserror::Error;

use crate::permissions::Capability;
use crate::types::SosState;

/// Result alias used across the crate.
pub type SosResult<T> = Result<T, SosError>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum SosError {
    /// Settings are missing or malformed. Blocks arming; fixed by editing settings.
    #[error("invalid settings: {0}")]
    Validation(#[from] ValidationError),

    /// A required OS capability has not been granted.
    #[error("permission not granted: {0}")]
    Permission(Capability),

    /// Transport-level send failure.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// No accelerometer available. Detection is disabled; manual triggers still work.
    #[error("accelerometer unavailable")]
    SensorUnavailable,

    /// The settings store could not be read or written.
    #[error("settings store error: {0}")]
    Settings(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A state transition was refused.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The orchestrator task is no longer running.
    #[error("orchestrator has shut down")]
    Shutdown,

    /// The orchestrator task panicked or was aborted.
    #[error("orchestrator task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SosError {
    /// Short reason string shown to the user when arming is rejected.
    pub fn user_reason(&self) -> String {
        match self {
            SosError::Validation(e) => e.to_string(),
            SosError::Permission(cap) => format!("{} permission is required", cap.label()),
            other => other.to_string(),
        }
    }
}

/// A single failed settings rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("display name is empty")]
    EmptyName,

    #[error("emergency contact is empty")]
    EmptyContact,

    #[error("phone number `{0}` is too short")]
    InvalidPhone(String),

    #[error("`{0}` is not an email address")]
    InvalidEmail(String),

    #[error("sender email is empty")]
    MissingSender,

    #[error("sender credential is empty")]
    MissingCredential,
}

/// Failure reported by an alert channel.
///
/// The `Display` form becomes the `Failed { reason }` text, so variants
/// render the bare transport detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The transport could not deliver (radio off, network down, SMTP refused).
    #[error("{0}")]
    Transport(String),

    /// The transport authenticated but rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The recipient was refused by the transport.
    #[error("recipient rejected: {0}")]
    Recipient(String),

    /// The send did not complete in time.
    #[error("send timed out after {after_ms} ms")]
    TimedOut { after_ms: u64 },
}

/// A refused compare-and-set on the escalation state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The edge is not part of the state machine.
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: SosState, to: SosState },

    /// The caller's view of the state is out of date.
    #[error("stale transition: expected {expected}, found {actual}")]
    Stale { expected: SosState, actual: SosState },
}
