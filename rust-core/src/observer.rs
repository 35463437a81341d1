//! Observable outputs: state notifications, haptic requests, and the
//! notification projection a UI layer renders from.
//!
//! Observers are called on the orchestrator task, in event order. They must
//! return quickly; anything slow belongs on the observer's own executor.

use serde::{Deserialize, Serialize};

use crate::countdown::ControllerEvent;
use crate::types::{DispatchResult, SosState};

// ============================================================================
// HAPTICS
// ============================================================================

/// Vibration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HapticPulse {
    /// A single buzz.
    OneShot { duration_ms: u64 },
    /// Alternating off/on timings in ms, starting with an off delay.
    Waveform { timings_ms: Vec<u64> },
}

impl HapticPulse {
    /// Countdown started.
    pub fn armed() -> Self {
        HapticPulse::Waveform {
            timings_ms: vec![0, 300, 200, 300, 200, 300],
        }
    }

    /// One countdown second elapsed.
    pub fn tick() -> Self {
        HapticPulse::OneShot { duration_ms: 150 }
    }

    /// Alert delivered.
    pub fn success() -> Self {
        HapticPulse::Waveform {
            timings_ms: vec![0, 100, 100, 100, 100, 100],
        }
    }

    /// Alert failed.
    pub fn failure() -> Self {
        HapticPulse::OneShot { duration_ms: 500 }
    }

    /// The pulse that accompanies `event`, if any.
    pub fn for_event(event: &ControllerEvent) -> Option<Self> {
        match event {
            ControllerEvent::StateChanged {
                from: SosState::Arming,
                to: SosState::Countdown { .. },
            } => Some(Self::armed()),
            ControllerEvent::Tick { .. } => Some(Self::tick()),
            ControllerEvent::Outcome(DispatchResult::Success) => Some(Self::success()),
            ControllerEvent::Outcome(DispatchResult::Failure { .. }) => Some(Self::failure()),
            _ => None,
        }
    }

    /// Total length of the pattern.
    pub fn total_ms(&self) -> u64 {
        match self {
            HapticPulse::OneShot { duration_ms } => *duration_ms,
            HapticPulse::Waveform { timings_ms } => timings_ms.iter().sum(),
        }
    }
}

// ============================================================================
// OBSERVER
// ============================================================================

/// Receives everything the orchestrator publishes.
pub trait SosObserver: Send + Sync {
    fn on_event(&self, _event: &ControllerEvent) {}

    fn on_haptic(&self, _pulse: &HapticPulse) {}
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl SosObserver for LoggingObserver {
    fn on_event(&self, event: &ControllerEvent) {
        match event {
            ControllerEvent::StateChanged { from, to } => {
                let projection = Projection::from_state(to);
                tracing::info!(from = %from, to = %to, title = %projection.title, "sos state");
            }
            ControllerEvent::Tick { seconds_remaining } => {
                tracing::info!(seconds_remaining, "countdown tick");
            }
            ControllerEvent::ArmingRejected { reason } => {
                tracing::warn!(%reason, "sos not armed");
            }
            ControllerEvent::Cancelled => tracing::info!("sos cancelled by user"),
            ControllerEvent::DispatchRequested { cycle } => {
                tracing::info!(cycle, "sending alert");
            }
            ControllerEvent::Outcome(result) => tracing::info!(?result, "sos outcome"),
        }
    }

    fn on_haptic(&self, pulse: &HapticPulse) {
        tracing::debug!(?pulse, "haptic");
    }
}

// ============================================================================
// NOTIFICATION PROJECTION
// ============================================================================

/// Buttons shown on the countdown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    SendNow,
    Cancel,
}

impl NotificationAction {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::SendNow => "SEND NOW",
            NotificationAction::Cancel => "CANCEL",
        }
    }
}

/// What a notification or status line should show for a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub title: String,
    pub text: String,
    pub actions: Vec<NotificationAction>,
    /// Whether the notification should demand attention (sound, heads-up).
    pub urgent: bool,
}

impl Projection {
    pub fn from_state(state: &SosState) -> Self {
        let (title, text) = match state {
            SosState::Idle => (
                "SOS Protection Active".to_string(),
                "Protection is running. Shake to send SOS.".to_string(),
            ),
            SosState::Arming => (
                "Preparing SOS".to_string(),
                "Checking your emergency settings".to_string(),
            ),
            SosState::Countdown { seconds_remaining } => (
                format!("SOS ALERT - {seconds_remaining} seconds"),
                "Emergency alert will be sent automatically".to_string(),
            ),
            SosState::Dispatching => (
                "Sending SOS".to_string(),
                "Sending your emergency alert".to_string(),
            ),
            SosState::Sent => (
                "SOS Sent!".to_string(),
                "Emergency alert sent successfully".to_string(),
            ),
            SosState::Cancelled => (
                "SOS Cancelled".to_string(),
                "Emergency alert was not sent".to_string(),
            ),
            SosState::Failed { reason } => ("SOS Failed".to_string(), reason.clone()),
        };

        let actions = if state.is_cancellable() {
            vec![NotificationAction::SendNow, NotificationAction::Cancel]
        } else {
            Vec::new()
        };

        Self {
            title,
            text,
            actions,
            urgent: matches!(
                state,
                SosState::Countdown { .. } | SosState::Dispatching | SosState::Failed { .. }
            ),
        }
    }
}
