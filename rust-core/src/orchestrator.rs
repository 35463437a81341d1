//! Top-level SOS coordinator.
//!
//! Wires the stages together:
//!
//! ```text
//! sensor ─► ShakeDetector ─► CountdownController ─► AlertComposer ─► AlertDispatcher
//!  (sink)      (callback)        (actor task)          (pure)           (own task)
//! ```
//!
//! # Architecture
//!
//! - The sensor callback runs the detector under a short lock and forwards
//!   gestures as commands. It never blocks on the rest of the system.
//! - One actor task owns the [`CountdownController`]. Commands, the tick
//!   deadline and the dispatch result are all consumed by a single
//!   `select!`, so a tick and a cancel can never both see the same state.
//! - Dispatch runs on its own task and reports back through a oneshot.
//! - Observers and the `watch` state channel see every transition in order.
//!
//! The handle is cheap to share behind an `Arc`; every user action is a
//! non-blocking message send and works the same in foreground and background.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::{AlertChannel, ChannelKind};
use crate::compose::AlertComposer;
use crate::config::SosConfig;
use crate::countdown::{ControllerEvent, CountdownController};
use crate::dispatch::AlertDispatcher;
use crate::error::{SosError, SosResult};
use crate::location::LocationCache;
use crate::observer::{HapticPulse, SosObserver};
use crate::permissions::{Capability, GrantAll, PermissionGate};
use crate::sensor::{SampleSink, SensorFeed, SensorSubscription};
use crate::settings::SettingsStore;
use crate::shake_detection::ShakeDetector;
use crate::types::{AccelSample, DispatchResult, LocationFix, ShakeEvent, SosState, UserProfile};

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Source of wall-clock time for alert timestamps.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reads the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl WallClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Everything the orchestrator talks to outside the core.
pub struct Collaborators {
    pub channel: Arc<dyn AlertChannel>,
    pub settings: Arc<dyn SettingsStore>,
    /// `None` on devices without an accelerometer.
    pub sensor: Option<Arc<dyn SensorFeed>>,
    pub location: LocationCache,
    pub permissions: Arc<dyn PermissionGate>,
    pub observers: Vec<Arc<dyn SosObserver>>,
    pub clock: Arc<dyn WallClock>,
}

impl Collaborators {
    pub fn new(channel: Arc<dyn AlertChannel>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            channel,
            settings,
            sensor: None,
            location: LocationCache::new(),
            permissions: Arc::new(GrantAll),
            observers: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_sensor(mut self, sensor: Arc<dyn SensorFeed>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_location(mut self, location: LocationCache) -> Self {
        self.location = location;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionGate>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SosObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Host lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Host started; restores detection if it was left enabled.
    Started,
    Foreground,
    Background,
    /// Host is going away; detection stops and a running countdown is cancelled.
    Stopping,
}

// ============================================================================
// HANDLE
// ============================================================================

#[derive(Debug)]
enum Command {
    Shake(ShakeEvent),
    Manual,
    SendNow,
    Cancel,
    Shutdown,
}

/// Sensor-side sink: runs the detector and forwards gestures.
struct ShakeSink {
    detector: Mutex<ShakeDetector>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SampleSink for ShakeSink {
    fn on_sample(&self, sample: AccelSample) {
        let event = self.detector.lock().ingest(&sample);
        if let Some(event) = event {
            if self.commands.send(Command::Shake(event)).is_err() {
                tracing::debug!("shake detected after shutdown");
            }
        }
    }
}

/// Handle to a running SOS orchestrator.
pub struct SosOrchestrator {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SosState>,
    sink: Arc<ShakeSink>,
    sensor: Option<Arc<dyn SensorFeed>>,
    settings: Arc<dyn SettingsStore>,
    subscription: Mutex<Option<SensorSubscription>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SosOrchestrator {
    /// Start the actor task. Must be called inside a Tokio runtime.
    ///
    /// Detection starts disabled; call [`enable`](Self::enable) or deliver
    /// [`LifecycleEvent::Started`] to subscribe to the sensor.
    pub fn spawn(config: &SosConfig, collaborators: Collaborators) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SosState::Idle);

        let kind = collaborators.channel.kind();
        if kind != config.alert.channel {
            tracing::warn!(
                configured = %config.alert.channel,
                actual = %kind,
                "alert channel differs from configuration, using the supplied channel"
            );
        }
        let format = config.alert.format_for(kind);
        let dispatcher = AlertDispatcher::new(
            Arc::clone(&collaborators.channel),
            config.alert.dispatch_timeout(),
        );

        let actor = Actor {
            controller: CountdownController::new(config.countdown.clone()),
            composer: AlertComposer::new(format),
            dispatcher,
            kind,
            settings: Arc::clone(&collaborators.settings),
            location: collaborators.location,
            permissions: collaborators.permissions,
            observers: collaborators.observers,
            clock: collaborators.clock,
            state_tx,
            commands: command_rx,
            snapshot: None,
            pending: None,
        };
        tracing::info!(
            channel = %kind,
            ?format,
            countdown_secs = config.countdown.duration_secs,
            "sos orchestrator started"
        );
        let task = tokio::spawn(actor.run());

        let sink = Arc::new(ShakeSink {
            detector: Mutex::new(ShakeDetector::new(config.shake.clone())),
            commands: command_tx.clone(),
        });

        Self {
            commands: command_tx,
            state: state_rx,
            sink,
            sensor: collaborators.sensor,
            settings: collaborators.settings,
            subscription: Mutex::new(None),
            task: Mutex::new(Some(task)),
        }
    }

    /// Current state.
    pub fn state(&self) -> SosState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SosState> {
        self.state.clone()
    }

    /// True while subscribed to the sensor.
    pub fn is_detecting(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Turn shake detection on or off and persist the choice.
    ///
    /// Enabling without an accelerometer fails with
    /// [`SosError::SensorUnavailable`]; the manual trigger keeps working.
    /// Disabling does not affect a cycle already in flight.
    pub fn enable(&self, enabled: bool) -> SosResult<()> {
        if enabled {
            self.subscribe_sensor()?;
        } else {
            self.unsubscribe_sensor();
        }
        self.persist_enabled(enabled)
    }

    /// Start a cycle without a shake.
    pub fn trigger_manual(&self) -> SosResult<()> {
        self.send(Command::Manual)
    }

    /// Skip the rest of the countdown. Ignored outside a countdown.
    pub fn request_send_now(&self) -> SosResult<()> {
        self.send(Command::SendNow)
    }

    /// Abort the countdown. Ignored outside a countdown.
    pub fn request_cancel(&self) -> SosResult<()> {
        self.send(Command::Cancel)
    }

    /// Feed one sample directly, for hosts that do not use a [`SensorFeed`].
    pub fn ingest(&self, sample: AccelSample) {
        self.sink.on_sample(sample);
    }

    pub fn on_lifecycle(&self, event: LifecycleEvent) -> SosResult<()> {
        tracing::info!(?event, state = %self.state(), "lifecycle");
        match event {
            LifecycleEvent::Started => {
                let record = self.settings.load()?;
                if record.service_enabled && !self.is_detecting() {
                    self.subscribe_sensor()?;
                }
                Ok(())
            }
            LifecycleEvent::Foreground | LifecycleEvent::Background => Ok(()),
            LifecycleEvent::Stopping => {
                self.unsubscribe_sensor();
                self.send(Command::Cancel)
            }
        }
    }

    /// Stop detection and the actor task, waiting for it to finish.
    ///
    /// A dispatch already in flight completes on its own task but its
    /// result is no longer reported.
    pub async fn shutdown(self) -> SosResult<()> {
        self.unsubscribe_sensor();
        let _ = self.commands.send(Command::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await?;
        }
        Ok(())
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn send(&self, command: Command) -> SosResult<()> {
        self.commands.send(command).map_err(|_| SosError::Shutdown)
    }

    fn subscribe_sensor(&self) -> SosResult<()> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return Ok(());
        }
        let sensor = self.sensor.as_ref().ok_or(SosError::SensorUnavailable)?;
        let sink: Arc<dyn SampleSink> = self.sink.clone();
        match sensor.subscribe(sink) {
            Ok(sub) => {
                tracing::info!(subscription = sub.id(), "shake detection enabled");
                *subscription = Some(sub);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "shake detection unavailable, manual trigger only");
                Err(err)
            }
        }
    }

    fn unsubscribe_sensor(&self) {
        if self.subscription.lock().take().is_some() {
            self.sink.detector.lock().reset();
            tracing::info!("shake detection disabled");
        }
    }

    fn persist_enabled(&self, enabled: bool) -> SosResult<()> {
        let mut record = self.settings.load()?;
        if record.service_enabled != enabled {
            record.service_enabled = enabled;
            self.settings.save(&record)?;
        }
        Ok(())
    }
}

impl Drop for SosOrchestrator {
    fn drop(&mut self) {
        if self.task.lock().is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

impl std::fmt::Debug for SosOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SosOrchestrator")
            .field("state", &self.state())
            .field("detecting", &self.is_detecting())
            .finish()
    }
}

// ============================================================================
// ACTOR
// ============================================================================

/// Profile and location captured when arming succeeded.
#[derive(Debug, Clone)]
struct CycleSnapshot {
    profile: UserProfile,
    armed_location: LocationFix,
}

type PendingDispatch = Option<(u64, oneshot::Receiver<DispatchResult>)>;

struct Actor {
    controller: CountdownController,
    composer: AlertComposer,
    dispatcher: AlertDispatcher,
    kind: ChannelKind,

    settings: Arc<dyn SettingsStore>,
    location: LocationCache,
    permissions: Arc<dyn PermissionGate>,
    observers: Vec<Arc<dyn SosObserver>>,
    clock: Arc<dyn WallClock>,

    state_tx: watch::Sender<SosState>,
    commands: mpsc::UnboundedReceiver<Command>,

    snapshot: Option<CycleSnapshot>,
    pending: PendingDispatch,
}

impl Actor {
    async fn run(mut self) {
        loop {
            let deadline = self.controller.next_tick_at();
            tokio::select! {
                // User actions win ties with the timer.
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                (cycle, result) = recv_dispatch(&mut self.pending) => {
                    self.pending = None;
                    let events = self.controller.finish_dispatch(cycle, result);
                    self.publish(events);
                }
                _ = sleep_until(deadline) => {
                    let events = self.controller.tick(Instant::now());
                    self.publish(events);
                }
            }
        }

        if self.controller.state().is_active() {
            tracing::warn!(state = %self.controller.state(), "orchestrator stopped mid-cycle");
        }
        tracing::info!(
            cycles = self.controller.cycle(),
            dispatches = self.controller.dispatches_requested(),
            "sos orchestrator stopped"
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Shake(event) => {
                let events = self.controller.on_shake(event);
                self.arm(events);
            }
            Command::Manual => {
                let events = self.controller.on_manual_trigger();
                self.arm(events);
            }
            Command::SendNow => {
                let events = self.controller.send_now();
                self.publish(events);
            }
            Command::Cancel => {
                let events = self.controller.cancel();
                self.publish(events);
            }
            Command::Shutdown => {}
        }
    }

    /// Finish a trigger: validate, snapshot and start the countdown.
    fn arm(&mut self, trigger_events: Vec<ControllerEvent>) {
        if trigger_events.is_empty() {
            return;
        }
        self.publish(trigger_events);

        let outcome = self.prepare_cycle().map(|snapshot| {
            self.snapshot = Some(snapshot);
        });
        let events = self.controller.complete_arming(outcome, Instant::now());
        self.publish(events);
    }

    fn prepare_cycle(&self) -> SosResult<CycleSnapshot> {
        let record = self.settings.load()?;
        let profile = record.profile(self.kind)?;

        if self.kind == ChannelKind::Sms && !self.permissions.is_granted(Capability::SendSms) {
            return Err(SosError::Permission(Capability::SendSms));
        }
        if !self.permissions.is_granted(Capability::Notifications) {
            tracing::warn!("notification permission missing, countdown is visible in-app only");
        }

        Ok(CycleSnapshot {
            profile,
            armed_location: self.location_snapshot(),
        })
    }

    fn location_snapshot(&self) -> LocationFix {
        if self.permissions.is_granted(Capability::Location) {
            self.location.snapshot()
        } else {
            LocationFix::unavailable()
        }
    }

    fn publish(&mut self, events: Vec<ControllerEvent>) {
        for event in events {
            match &event {
                ControllerEvent::StateChanged { to, .. } => {
                    self.state_tx.send_replace(to.clone());
                }
                ControllerEvent::Cancelled | ControllerEvent::Outcome(_) => {
                    self.snapshot = None;
                }
                _ => {}
            }

            for observer in &self.observers {
                observer.on_event(&event);
            }
            if let Some(pulse) = HapticPulse::for_event(&event) {
                for observer in &self.observers {
                    observer.on_haptic(&pulse);
                }
            }

            if let ControllerEvent::DispatchRequested { cycle } = event {
                self.start_dispatch(cycle);
            }
        }
    }

    fn start_dispatch(&mut self, cycle: u64) {
        // The grant can be revoked while the countdown runs.
        if self.kind == ChannelKind::Sms && !self.permissions.is_granted(Capability::SendSms) {
            let error = SosError::Permission(Capability::SendSms);
            tracing::warn!(cycle, error = %error, "alert blocked at send time");
            let failure = DispatchResult::Failure {
                error_detail: error.user_reason(),
            };
            let events = self.controller.finish_dispatch(cycle, failure);
            self.publish(events);
            return;
        }

        let Some(snapshot) = self.snapshot.as_ref() else {
            tracing::error!(cycle, "dispatch requested without a cycle snapshot");
            let failure = DispatchResult::Failure {
                error_detail: "no profile captured for this cycle".to_string(),
            };
            let events = self.controller.finish_dispatch(cycle, failure);
            self.publish(events);
            return;
        };

        // Prefer a fix that arrived during the countdown.
        let current = self.location_snapshot();
        let location = if current.is_usable() {
            current
        } else {
            snapshot.armed_location
        };

        let message = self
            .composer
            .compose(&snapshot.profile, &location, self.clock.now());
        tracing::info!(
            cycle,
            location_valid = location.is_usable(),
            subject = %message.subject,
            "alert composed"
        );
        let rx = self
            .dispatcher
            .spawn(snapshot.profile.emergency_contact.clone(), message);
        self.pending = Some((cycle, rx));
    }
}

async fn recv_dispatch(pending: &mut PendingDispatch) -> (u64, DispatchResult) {
    match pending {
        Some((cycle, rx)) => {
            let result = rx.await.unwrap_or_else(|_| DispatchResult::Failure {
                error_detail: "dispatch task ended without a result".to_string(),
            });
            (*cycle, result)
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
