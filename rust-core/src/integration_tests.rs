//! End-to-end tests for the complete SOS cycle.
//!
//! Every scenario runs on Tokio's paused clock, so the instants recorded by
//! the observer are exact virtual milliseconds since the test started.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::channel::{ChannelKind, LoggingChannel};
use crate::config::SosConfig;
use crate::countdown::ControllerEvent;
use crate::error::{ChannelError, SosError};
use crate::location::LocationCache;
use crate::observer::{HapticPulse, SosObserver};
use crate::orchestrator::{Collaborators, FixedClock, LifecycleEvent, SosOrchestrator};
use crate::permissions::{Capability, GrantAll, GrantedSet, PermissionGate};
use crate::sensor::LoopbackSensor;
use crate::settings::{MemorySettings, SettingsRecord, SettingsStore};
use crate::types::{AccelSample, DispatchResult, SosState, STANDARD_GRAVITY};

const HIT: f64 = 3.5 * STANDARD_GRAVITY;
const REST: f64 = STANDARD_GRAVITY;

// ============================================================================
// HELPERS
// ============================================================================

/// Observer that stamps everything with virtual ms since `t0`.
struct Recorder {
    t0: Instant,
    events: Mutex<Vec<(u64, ControllerEvent)>>,
    haptics: Mutex<Vec<(u64, HapticPulse)>>,
}

impl Recorder {
    fn new(t0: Instant) -> Self {
        Self {
            t0,
            events: Mutex::new(Vec::new()),
            haptics: Mutex::new(Vec::new()),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        Instant::now().duration_since(self.t0).as_millis() as u64
    }

    /// `(ms, new state)` for every transition.
    fn states(&self) -> Vec<(u64, SosState)> {
        self.events
            .lock()
            .iter()
            .filter_map(|(at, event)| match event {
                ControllerEvent::StateChanged { to, .. } => Some((*at, to.clone())),
                _ => None,
            })
            .collect()
    }

    fn ticks(&self) -> Vec<(u64, u32)> {
        self.events
            .lock()
            .iter()
            .filter_map(|(at, event)| match event {
                ControllerEvent::Tick { seconds_remaining } => Some((*at, *seconds_remaining)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&ControllerEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|(_, e)| predicate(e)).count()
    }

    fn rejections(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|(_, event)| match event {
                ControllerEvent::ArmingRejected { reason } => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    fn haptics(&self) -> Vec<(u64, HapticPulse)> {
        self.haptics.lock().clone()
    }
}

impl SosObserver for Recorder {
    fn on_event(&self, event: &ControllerEvent) {
        let at = self.elapsed_ms();
        self.events.lock().push((at, event.clone()));
    }

    fn on_haptic(&self, pulse: &HapticPulse) {
        let at = self.elapsed_ms();
        self.haptics.lock().push((at, pulse.clone()));
    }
}

struct Harness {
    sos: SosOrchestrator,
    sensor: LoopbackSensor,
    channel: Arc<LoggingChannel>,
    recorder: Arc<Recorder>,
    location: LocationCache,
    settings: Arc<MemorySettings>,
    t0: Instant,
}

impl Harness {
    /// Sleep until `ms` virtual milliseconds after the start.
    async fn at(&self, ms: u64) {
        tokio::time::sleep_until(self.t0 + Duration::from_millis(ms)).await;
    }

    /// One peak: a rest sample followed by a hit, both delivered at `ms`.
    fn peak(&self, ms: u64) {
        let ts = ms as i64;
        self.sensor.push(AccelSample::new(ts - 5, 0.0, 0.0, REST));
        self.sensor.push(AccelSample::new(ts, 0.0, HIT, 0.0));
    }

    /// Two peaks 150 ms apart; the gesture completes at `start_ms + 150`.
    async fn shake_at(&self, start_ms: u64) {
        self.at(start_ms).await;
        self.peak(start_ms);
        self.at(start_ms + 150).await;
        self.peak(start_ms + 150);
    }
}

fn sms_record() -> SettingsRecord {
    SettingsRecord {
        display_name: "Asha".into(),
        emergency_contact: "+919876543210".into(),
        ..SettingsRecord::default()
    }
}

fn email_record() -> SettingsRecord {
    SettingsRecord {
        display_name: "Asha".into(),
        emergency_contact: "brother@example.com".into(),
        sender_email: "asha@example.com".into(),
        sender_credential: "app-password".into(),
        service_enabled: false,
    }
}

fn build(
    countdown_secs: u32,
    channel: LoggingChannel,
    record: SettingsRecord,
    sensor: LoopbackSensor,
    permissions: Arc<dyn PermissionGate>,
) -> Harness {
    let t0 = Instant::now();
    let mut config = SosConfig::default();
    config.countdown.duration_secs = countdown_secs;

    let channel = Arc::new(channel);
    let settings = Arc::new(MemorySettings::new(record));
    let recorder = Arc::new(Recorder::new(t0));
    let location = LocationCache::new();
    let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap());

    let collaborators = Collaborators::new(channel.clone(), settings.clone())
        .with_sensor(Arc::new(sensor.clone()))
        .with_location(location.clone())
        .with_permissions(permissions)
        .with_observer(recorder.clone())
        .with_clock(Arc::new(clock));

    Harness {
        sos: SosOrchestrator::spawn(&config, collaborators),
        sensor,
        channel,
        recorder,
        location,
        settings,
        t0,
    }
}

fn harness(countdown_secs: u32) -> Harness {
    build(
        countdown_secs,
        LoggingChannel::new(ChannelKind::Sms),
        sms_record(),
        LoopbackSensor::new(),
        Arc::new(GrantAll),
    )
}

fn countdown(k: u32) -> SosState {
    SosState::Countdown { seconds_remaining: k }
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shake_to_sent_timeline() {
    let h = harness(3);
    h.sos.enable(true).unwrap();
    h.location.update(12.9716, 77.5946);

    h.shake_at(0).await;
    h.at(5_000).await;

    assert_eq!(
        h.recorder.states(),
        vec![
            (150, SosState::Arming),
            (150, countdown(3)),
            (1_150, countdown(2)),
            (2_150, countdown(1)),
            (3_150, SosState::Dispatching),
            (3_150, SosState::Sent),
            (3_150, SosState::Idle),
        ]
    );
    assert_eq!(h.recorder.ticks(), vec![(1_150, 2), (2_150, 1), (3_150, 0)]);
    assert_eq!(
        h.recorder.count(|e| matches!(e, ControllerEvent::DispatchRequested { .. })),
        1
    );

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(h.channel.attempts(), 1);
    assert_eq!(sent[0].recipient, "+919876543210");
    assert_eq!(
        sent[0].body,
        "SOS ALERT! I'm Asha, I need HELP! https://maps.google.com/?q=12.971600,77.594600 (14:05 UTC)"
    );
    assert_eq!(sent[0].parts, 1);
    assert_eq!(h.sos.state(), SosState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_haptics_follow_the_cycle() {
    let h = harness(3);
    h.sos.enable(true).unwrap();
    h.shake_at(0).await;
    h.at(5_000).await;

    assert_eq!(
        h.recorder.haptics(),
        vec![
            (150, HapticPulse::armed()),
            (1_150, HapticPulse::tick()),
            (2_150, HapticPulse::tick()),
            (3_150, HapticPulse::tick()),
            (3_150, HapticPulse::success()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_countdown_without_sending() {
    let h = harness(3);
    h.sos.enable(true).unwrap();
    h.shake_at(0).await;

    h.at(2_000).await;
    h.sos.request_cancel().unwrap();
    h.at(6_000).await;

    let states = h.recorder.states();
    assert_eq!(
        &states[states.len() - 2..],
        &[(2_000, SosState::Cancelled), (2_000, SosState::Idle)]
    );
    assert!(h.recorder.ticks().iter().all(|(at, _)| *at < 2_000));
    assert_eq!(h.recorder.ticks().len(), 1);
    assert_eq!(h.recorder.count(|e| matches!(e, ControllerEvent::Cancelled)), 1);
    assert_eq!(h.channel.attempts(), 0);
    assert_eq!(h.sos.state(), SosState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_send_now_skips_remaining_ticks() {
    let h = harness(5);
    h.sos.enable(true).unwrap();
    h.shake_at(0).await;

    h.at(1_500).await;
    h.sos.request_send_now().unwrap();
    h.at(8_000).await;

    assert_eq!(h.recorder.ticks(), vec![(1_150, 4)]);
    assert!(h.recorder.states().contains(&(1_500, SosState::Dispatching)));
    assert!(h.recorder.states().contains(&(1_500, SosState::Sent)));
    assert_eq!(h.channel.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_channel_failure_reports_reason_then_rearms() {
    let h = build(
        3,
        LoggingChannel::new(ChannelKind::Sms)
            .failing_with(ChannelError::Transport("network unreachable".into())),
        sms_record(),
        LoopbackSensor::new(),
        Arc::new(GrantAll),
    );
    h.sos.enable(true).unwrap();
    h.shake_at(0).await;
    h.at(4_000).await;

    let states = h.recorder.states();
    assert_eq!(
        &states[states.len() - 3..],
        &[
            (3_150, SosState::Dispatching),
            (
                3_150,
                SosState::Failed {
                    reason: "network unreachable".into()
                }
            ),
            (3_150, SosState::Idle),
        ]
    );
    assert_eq!(
        h.recorder.haptics().last(),
        Some(&(3_150, HapticPulse::failure()))
    );
    assert_eq!(h.channel.attempts(), 1);

    // A later shake starts a fresh cycle.
    h.shake_at(10_000).await;
    h.at(10_200).await;
    assert!(h.recorder.states().contains(&(10_150, countdown(3))));
    assert_eq!(h.sos.state(), countdown(3));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_settings_block_arming() {
    let record = SettingsRecord {
        display_name: String::new(),
        ..sms_record()
    };
    let h = build(
        3,
        LoggingChannel::new(ChannelKind::Sms),
        record,
        LoopbackSensor::new(),
        Arc::new(GrantAll),
    );
    h.sos.enable(true).unwrap();
    h.shake_at(0).await;
    h.at(5_000).await;

    assert_eq!(
        h.recorder.states(),
        vec![(150, SosState::Arming), (150, SosState::Idle)]
    );
    assert_eq!(h.recorder.rejections(), vec!["display name is empty".to_string()]);
    assert!(h.recorder.haptics().is_empty());
    assert_eq!(h.channel.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_sms_permission_blocks_arming() {
    let h = build(
        3,
        LoggingChannel::new(ChannelKind::Sms),
        sms_record(),
        LoopbackSensor::new(),
        Arc::new(GrantedSet::new([Capability::Location, Capability::Notifications])),
    );
    h.sos.trigger_manual().unwrap();
    h.at(5_000).await;

    assert_eq!(
        h.recorder.rejections(),
        vec!["SMS permission is required".to_string()]
    );
    assert_eq!(h.sos.state(), SosState::Idle);
    assert_eq!(h.channel.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sms_permission_revoked_during_countdown_blocks_send() {
    let grants = Arc::new(GrantedSet::new([
        Capability::SendSms,
        Capability::Location,
        Capability::Notifications,
    ]));
    let h = build(
        3,
        LoggingChannel::new(ChannelKind::Sms),
        sms_record(),
        LoopbackSensor::new(),
        grants.clone(),
    );
    h.sos.trigger_manual().unwrap();
    h.at(500).await;
    assert_eq!(h.sos.state(), countdown(3));
    grants.revoke(Capability::SendSms);
    h.at(4_000).await;

    let states = h.recorder.states();
    assert_eq!(
        &states[states.len() - 3..],
        &[
            (3_000, SosState::Dispatching),
            (
                3_000,
                SosState::Failed {
                    reason: "SMS permission is required".into()
                }
            ),
            (3_000, SosState::Idle),
        ]
    );
    assert_eq!(h.channel.attempts(), 0);
    assert_eq!(h.recorder.count(|e| matches!(e, ControllerEvent::Outcome(_))), 1);
    assert_eq!(h.recorder.haptics().last(), Some(&(3_000, HapticPulse::failure())));
}

#[tokio::test(start_paused = true)]
async fn test_missing_location_permission_degrades_to_marker() {
    let h = build(
        1,
        LoggingChannel::new(ChannelKind::Sms),
        sms_record(),
        LoopbackSensor::new(),
        Arc::new(GrantedSet::new([Capability::SendSms])),
    );
    h.location.update(12.9716, 77.5946);
    h.sos.trigger_manual().unwrap();
    h.at(3_000).await;

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("Location unavailable"));
    assert!(!sent[0].body.contains("maps.google.com"));
}

#[tokio::test(start_paused = true)]
async fn test_sensor_unavailable_leaves_manual_trigger() {
    let h = build(
        2,
        LoggingChannel::new(ChannelKind::Sms),
        sms_record(),
        LoopbackSensor::unavailable(),
        Arc::new(GrantAll),
    );
    assert!(matches!(h.sos.enable(true), Err(SosError::SensorUnavailable)));
    assert!(!h.sos.is_detecting());
    assert!(!h.settings.load().unwrap().service_enabled);

    h.sos.trigger_manual().unwrap();
    h.at(3_000).await;
    assert_eq!(h.recorder.ticks(), vec![(1_000, 1), (2_000, 0)]);
    assert_eq!(h.channel.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_triggers_during_active_cycle_are_ignored() {
    let h = harness(3);
    h.sos.enable(true).unwrap();
    h.shake_at(0).await;

    h.shake_at(1_000).await;
    h.sos.trigger_manual().unwrap();
    h.at(6_000).await;

    assert_eq!(
        h.recorder
            .count(|e| matches!(e, ControllerEvent::StateChanged { to: SosState::Arming, .. })),
        1
    );
    assert_eq!(h.recorder.ticks().len(), 3);
    assert_eq!(h.channel.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_dispatch_began_is_ignored() {
    let h = build(
        5,
        LoggingChannel::new(ChannelKind::Sms).with_latency(Duration::from_secs(2)),
        sms_record(),
        LoopbackSensor::new(),
        Arc::new(GrantAll),
    );
    h.sos.trigger_manual().unwrap();
    h.at(500).await;
    h.sos.request_send_now().unwrap();
    h.at(1_000).await;
    assert_eq!(h.sos.state(), SosState::Dispatching);
    h.sos.request_cancel().unwrap();
    h.at(4_000).await;

    assert_eq!(h.recorder.count(|e| matches!(e, ControllerEvent::Cancelled)), 0);
    assert!(h.recorder.states().contains(&(2_500, SosState::Sent)));
    assert_eq!(h.channel.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_profile_is_snapshotted_at_arming() {
    let h = harness(3);
    h.sos.trigger_manual().unwrap();
    h.at(500).await;

    let mut edited = sms_record();
    edited.display_name = "Someone Else".into();
    h.settings.save(&edited).unwrap();
    h.at(4_000).await;

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("I'm Asha,"));
}

#[tokio::test(start_paused = true)]
async fn test_location_prefers_fresh_fix_and_falls_back_to_arm_time() {
    let h = harness(2);
    h.location.update(1.0, 2.0);
    h.sos.trigger_manual().unwrap();
    h.at(500).await;
    h.location.update(3.0, 4.0);
    h.at(3_000).await;
    assert!(h.channel.sent()[0].body.contains("?q=3.000000,4.000000"));

    h.sos.trigger_manual().unwrap();
    h.at(3_500).await;
    h.location.clear();
    h.at(6_000).await;
    let sent = h.channel.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].body.contains("?q=3.000000,4.000000"));
}

#[tokio::test(start_paused = true)]
async fn test_no_fix_uses_unavailable_marker() {
    let h = harness(1);
    h.sos.trigger_manual().unwrap();
    h.at(2_000).await;
    let sent = h.channel.sent();
    assert!(sent[0].body.contains("I need HELP! Location unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_email_channel_sends_rich_alert() {
    let h = build(
        1,
        LoggingChannel::new(ChannelKind::Email),
        email_record(),
        LoopbackSensor::new(),
        Arc::new(GrantedSet::new([Capability::Location])),
    );
    h.location.update(-33.8688, 151.2093);
    h.sos.trigger_manual().unwrap();
    h.at(2_000).await;

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "brother@example.com");
    assert_eq!(sent[0].subject, "EMERGENCY SOS from Asha - URGENT HELP NEEDED!");
    assert!(sent[0].body.contains("Coordinates: -33.868800, 151.209300"));
    assert!(sent[0].body.contains("Time of Alert: 09 Mar 2024, 02:05 PM UTC"));
}

#[tokio::test(start_paused = true)]
async fn test_disable_keeps_running_cycle_and_persists() {
    let h = harness(3);
    h.sos.enable(true).unwrap();
    assert!(h.settings.load().unwrap().service_enabled);
    h.shake_at(0).await;

    h.at(1_000).await;
    h.sos.enable(false).unwrap();
    assert!(!h.sos.is_detecting());
    assert_eq!(h.sensor.subscriber_count(), 0);
    assert!(!h.settings.load().unwrap().service_enabled);

    h.at(5_000).await;
    assert_eq!(h.channel.sent().len(), 1);

    // No longer listening.
    h.shake_at(6_000).await;
    h.at(7_000).await;
    assert_eq!(
        h.recorder
            .count(|e| matches!(e, ControllerEvent::StateChanged { to: SosState::Arming, .. })),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_restores_detection_and_stopping_cancels() {
    let record = SettingsRecord {
        service_enabled: true,
        ..sms_record()
    };
    let h = build(
        5,
        LoggingChannel::new(ChannelKind::Sms),
        record,
        LoopbackSensor::new(),
        Arc::new(GrantAll),
    );
    h.sos.on_lifecycle(LifecycleEvent::Started).unwrap();
    assert!(h.sos.is_detecting());
    assert_eq!(h.sensor.subscriber_count(), 1);

    h.sos.on_lifecycle(LifecycleEvent::Background).unwrap();
    h.shake_at(0).await;
    h.at(1_500).await;
    assert_eq!(h.sos.state(), countdown(4));

    h.sos.on_lifecycle(LifecycleEvent::Stopping).unwrap();
    h.at(8_000).await;
    assert_eq!(h.sos.state(), SosState::Idle);
    assert_eq!(h.sensor.subscriber_count(), 0);
    assert_eq!(h.channel.attempts(), 0);
    // Stopping is not a user choice; the persisted flag is untouched.
    assert!(h.settings.load().unwrap().service_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_state_watch_sees_outcome() {
    let h = harness(1);
    let mut rx = h.sos.subscribe_state();
    h.sos.trigger_manual().unwrap();

    let counting = rx
        .wait_for(|s| matches!(s, SosState::Countdown { .. }))
        .await
        .unwrap()
        .clone();
    assert_eq!(counting, countdown(1));

    rx.wait_for(|s| *s == SosState::Idle).await.unwrap();
    assert_eq!(Instant::now().duration_since(h.t0), Duration::from_millis(1_000));
    assert_eq!(
        h.recorder.count(|e| matches!(e, ControllerEvent::Outcome(DispatchResult::Success))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_actor() {
    let h = harness(3);
    h.sos.enable(true).unwrap();
    let sensor = h.sensor.clone();
    h.sos.shutdown().await.unwrap();
    assert_eq!(sensor.subscriber_count(), 0);
}
