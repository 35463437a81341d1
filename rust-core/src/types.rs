//! Core data types for the shake-to-SOS engine.
//!
//! This module defines the values that flow between the detection,
//! countdown, composition and dispatch stages. Everything here is a plain
//! value type: samples and events are `Copy`, snapshots are cloned out of
//! their shared owners and never mutated after capture.
//!
//! Design principle: if a concept exists, it gets a type. The escalation
//! lifecycle in particular is a single tagged enum ([`SosState`]) rather
//! than a set of independent flags, so every combination the program can
//! be in is spelled out and matched exhaustively.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Standard gravity in m/s². Used to express acceleration thresholds in g.
pub const STANDARD_GRAVITY: f64 = 9.80665;

// ============================================================================
// SENSOR INPUT
// ============================================================================

/// A single raw accelerometer sample.
///
/// Produced by the sensor collaborator at its own rate and consumed
/// immediately by the shake detector. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSample {
    /// Sensor timestamp in milliseconds. Expected to be monotonic.
    pub timestamp_ms: i64,
    /// Acceleration along x in m/s².
    pub x: f64,
    /// Acceleration along y in m/s².
    pub y: f64,
    /// Acceleration along z in m/s².
    pub z: f64,
}

impl AccelSample {
    pub fn new(timestamp_ms: i64, x: f64, y: f64, z: f64) -> Self {
        Self { timestamp_ms, x, y, z }
    }

    /// Euclidean magnitude of the acceleration vector in m/s².
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Magnitude expressed in multiples of standard gravity.
    pub fn magnitude_g(&self) -> f64 {
        self.magnitude() / STANDARD_GRAVITY
    }

    /// True when every axis is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A debounced shake gesture.
///
/// Immutable once emitted. Consumed by exactly one countdown activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShakeEvent {
    /// Number of distinct peaks that made up the gesture.
    pub shake_count: u32,
    /// Sensor timestamp of the peak that completed the gesture.
    pub detected_at_ms: i64,
}

impl ShakeEvent {
    pub fn new(shake_count: u32, detected_at_ms: i64) -> Self {
        Self {
            shake_count,
            detected_at_ms,
        }
    }
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Last known location, as a point-in-time copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// False until the location collaborator has delivered a usable fix.
    pub valid: bool,
}

impl LocationFix {
    /// A valid fix. Callers are expected to have range-checked the values.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            valid: true,
        }
    }

    /// The "no fix yet" value.
    pub fn unavailable() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            valid: false,
        }
    }

    /// True if the coordinates are finite and inside WGS84 bounds.
    pub fn in_range(latitude: f64, longitude: f64) -> bool {
        latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude)
    }

    /// A fix is usable only if it is flagged valid and its numbers are sane.
    pub fn is_usable(&self) -> bool {
        self.valid && Self::in_range(self.latitude, self.longitude)
    }
}

impl Default for LocationFix {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Credentials an authenticated channel sends with.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderCredential {
    /// Address the alert is sent from.
    pub address: String,
    /// App password or token. Never logged.
    pub secret: String,
}

impl fmt::Debug for SenderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderCredential")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Validated user identity used for one SOS cycle.
///
/// Built from the settings record when arming succeeds and held unchanged
/// until the cycle ends, so edits made during a countdown only apply to
/// the next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub display_name: String,
    /// Phone number or email address of the single emergency contact.
    pub emergency_contact: String,
    /// Present only for channels that authenticate (email).
    pub sender: Option<SenderCredential>,
}

// ============================================================================
// ALERT OUTPUT
// ============================================================================

/// Layout of the composed alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Single line, short enough for one or two SMS parts.
    Terse,
    /// Multi-line body with instructions for the recipient.
    Rich,
}

/// A composed alert, ready for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
    pub format: MessageFormat,
}

/// Outcome of one dispatch attempt. Reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchResult {
    Success,
    Failure { error_detail: String },
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchResult::Success)
    }
}

// ============================================================================
// ESCALATION STATE
// ============================================================================

/// Snapshot of the SOS escalation lifecycle.
///
/// Exactly one authoritative instance exists per process, owned by the
/// countdown controller. Legal edges are listed in
/// [`SosState::can_transition_to`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SosState {
    /// Waiting for a shake or a manual trigger.
    Idle,
    /// Trigger accepted, inputs being validated.
    Arming,
    /// Counting down; the alert fires when this reaches zero.
    Countdown { seconds_remaining: u32 },
    /// The alert has been handed to the channel. No longer cancellable.
    Dispatching,
    /// Channel accepted the alert.
    Sent,
    /// User aborted the countdown.
    Cancelled,
    /// Channel rejected the alert.
    Failed { reason: String },
}

impl SosState {
    /// Short machine-friendly name, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            SosState::Idle => "idle",
            SosState::Arming => "arming",
            SosState::Countdown { .. } => "countdown",
            SosState::Dispatching => "dispatching",
            SosState::Sent => "sent",
            SosState::Cancelled => "cancelled",
            SosState::Failed { .. } => "failed",
        }
    }

    /// True while a cycle is in flight (new triggers are ignored).
    pub fn is_active(&self) -> bool {
        !matches!(self, SosState::Idle)
    }

    /// True while the user can still abort.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, SosState::Countdown { .. })
    }

    /// True for the outcome states that settle back to `Idle`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SosState::Sent | SosState::Cancelled | SosState::Failed { .. }
        )
    }

    /// The edge table of the escalation machine.
    pub fn can_transition_to(&self, next: &SosState) -> bool {
        match (self, next) {
            (SosState::Idle, SosState::Arming) => true,
            (SosState::Arming, SosState::Countdown { seconds_remaining }) => {
                *seconds_remaining > 0
            }
            (SosState::Arming, SosState::Idle) => true,
            (
                SosState::Countdown { seconds_remaining: k },
                SosState::Countdown {
                    seconds_remaining: next_k,
                },
            ) => *k > 1 && *next_k == k - 1,
            (SosState::Countdown { .. }, SosState::Dispatching) => true,
            (SosState::Countdown { .. }, SosState::Cancelled) => true,
            (SosState::Dispatching, SosState::Sent) => true,
            (SosState::Dispatching, SosState::Failed { .. }) => true,
            (SosState::Sent, SosState::Idle) => true,
            (SosState::Cancelled, SosState::Idle) => true,
            (SosState::Failed { .. }, SosState::Idle) => true,
            _ => false,
        }
    }
}

impl Default for SosState {
    fn default() -> Self {
        SosState::Idle
    }
}

impl fmt::Display for SosState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SosState::Countdown { seconds_remaining } => {
                write!(f, "countdown({seconds_remaining})")
            }
            SosState::Failed { reason } => write!(f, "failed({reason})"),
            other => f.write_str(other.name()),
        }
    }
}
