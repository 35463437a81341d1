//! Shake-to-SOS Engine Library
//!
//! A personal-safety trigger core: watches a 3-axis accelerometer stream
//! for a deliberate shake gesture, arms a cancellable countdown, and on
//! expiry sends an emergency alert carrying the user's name and last known
//! location through an abstract alert channel.
//!
//! # Design Philosophy
//!
//! - **One owner for the lifecycle**: the escalation state is a single
//!   tagged enum owned by one actor task. Ticks, cancels and dispatch
//!   results are serialized through it.
//! - **O(1) on the sensor path**: the detector keeps a fixed ring of
//!   magnitudes and a handful of counters, and never allocates per sample.
//! - **Snapshots, not references**: profile and location are copied when a
//!   cycle arms and are never mutated afterwards.
//! - **Collaborators at the edges**: sensor, location, settings, channel
//!   and permissions are traits; the core contains no platform code.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sos_trigger::{
//!     ChannelKind, Collaborators, LoggingChannel, LoopbackSensor, MemorySettings,
//!     SettingsRecord, SosConfig, SosOrchestrator,
//! };
//!
//! # async fn run() -> sos_trigger::SosResult<()> {
//! let settings = Arc::new(MemorySettings::new(SettingsRecord {
//!     display_name: "Asha".into(),
//!     emergency_contact: "+919876543210".into(),
//!     ..SettingsRecord::default()
//! }));
//! let sensor = LoopbackSensor::new();
//! let collaborators = Collaborators::new(Arc::new(LoggingChannel::new(ChannelKind::Sms)), settings)
//!     .with_sensor(Arc::new(sensor.clone()));
//!
//! let sos = SosOrchestrator::spawn(&SosConfig::default(), collaborators);
//! sos.enable(true)?;
//! // Platform callback: sensor.push(sample);
//! sos.shutdown().await
//! # }
//! ```

pub mod channel;
pub mod compose;
pub mod config;
pub mod countdown;
pub mod dispatch;
pub mod error;
pub mod location;
pub mod observer;
pub mod orchestrator;
pub mod permissions;
pub mod sensor;
pub mod settings;
pub mod shake_detection;
pub mod signal;
pub mod sms;
pub mod types;

#[cfg(test)]
mod integration_tests;

// Re-export commonly used types
pub use channel::{AlertChannel, ChannelKind, LoggingChannel, SentAlert};
pub use compose::{compose, AlertComposer, LOCATION_UNAVAILABLE};
pub use crate::config::{AlertConfig, LoggingConfig, SosConfig};
pub use countdown::{ControllerEvent, CountdownConfig, CountdownController, Trigger};
pub use dispatch::AlertDispatcher;
pub use error::{ChannelError, SosError, SosResult, TransitionError, ValidationError};
pub use location::LocationCache;
pub use observer::{HapticPulse, LoggingObserver, NotificationAction, Projection, SosObserver};
pub use orchestrator::{
    Collaborators, FixedClock, LifecycleEvent, SosOrchestrator, SystemClock, WallClock,
};
pub use permissions::{Capability, GrantAll, GrantedSet, PermissionGate};
pub use sensor::{LoopbackSensor, SampleSink, SensorFeed, SensorSubscription};
pub use settings::{JsonFileSettings, MemorySettings, SettingsRecord, SettingsStore};
pub use shake_detection::{ShakeDetector, ShakeDetectorConfig};
pub use signal::SignalWindow;
pub use sms::{divide_message, SmsEncoding, SmsPlan};
pub use types::{
    AccelSample, AlertMessage, DispatchResult, LocationFix, MessageFormat, SenderCredential,
    ShakeEvent, SosState, UserProfile, STANDARD_GRAVITY,
};
