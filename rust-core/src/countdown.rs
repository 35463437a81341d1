//! SOS escalation state machine.
//!
//! The controller owns the single authoritative [`SosState`] and the
//! countdown timer. Every mutation goes through one compare-and-set
//! (`transition`), checked against the edge table in
//! [`SosState::can_transition_to`], so a tick and a user action can never
//! both apply to the same state.
//!
//! ```text
//!            shake / manual           arming ok
//!   Idle ──────────────────► Arming ─────────────► Countdown(N)
//!    ▲                         │ arming failed         │  tick (k>1)
//!    │◄────────────────────────┘                       ▼
//!    │                                             Countdown(k-1)
//!    │   cancel                                        │ tick (k==1) / send now
//!    │◄──────── Cancelled ◄────────── Countdown(k)     ▼
//!    │                                             Dispatching
//!    │◄──────── Sent ◄──────── success ───────────────┤
//!    │◄──────── Failed ◄────── failure ───────────────┘
//! ```
//!
//! The timer is just a deadline held next to the state. Whoever drives the
//! controller sleeps until [`CountdownController::next_tick_at`] and then
//! calls [`CountdownController::tick`]. Cancelling clears the deadline in
//! the same call that changes the state, so no tick can be observed after
//! a cancel is accepted.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{SosError, TransitionError};
use crate::types::{DispatchResult, ShakeEvent, SosState};

/// Spacing between countdown ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Whole seconds between arming and automatic dispatch. Minimum 1.
    pub duration_secs: u32,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self { duration_secs: 5 }
    }
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Shake(ShakeEvent),
    Manual,
}

/// Side effects the controller asks its owner to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The state moved along one edge.
    StateChanged { from: SosState, to: SosState },
    /// One countdown second elapsed. `seconds_remaining` is 0 on the final tick.
    Tick { seconds_remaining: u32 },
    /// Arming was refused; no countdown was started.
    ArmingRejected { reason: String },
    /// The user aborted the countdown.
    Cancelled,
    /// The owner must now compose and send the alert for this cycle.
    DispatchRequested { cycle: u64 },
    /// The dispatch attempt finished.
    Outcome(DispatchResult),
}

/// The escalation state machine.
#[derive(Debug)]
pub struct CountdownController {
    config: CountdownConfig,
    state: SosState,

    // Timer
    next_tick_at: Option<Instant>,

    // Cycle tracking
    cycle: u64,
    trigger: Option<Trigger>,

    // Statistics
    ticks_total: u64,
    dispatches_requested: u64,
}

impl CountdownController {
    pub fn new(config: CountdownConfig) -> Self {
        Self {
            config: CountdownConfig {
                duration_secs: config.duration_secs.max(1),
            },
            state: SosState::Idle,
            next_tick_at: None,
            cycle: 0,
            trigger: None,
            ticks_total: 0,
            dispatches_requested: 0,
        }
    }

    pub fn state(&self) -> &SosState {
        &self.state
    }

    /// Deadline of the next tick, if a countdown is running.
    pub fn next_tick_at(&self) -> Option<Instant> {
        self.next_tick_at
    }

    /// Identifier of the current (or last) cycle. Increments on each arming.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// What started the current cycle.
    pub fn trigger(&self) -> Option<Trigger> {
        self.trigger
    }

    pub fn duration_secs(&self) -> u32 {
        self.config.duration_secs
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total
    }

    pub fn dispatches_requested(&self) -> u64 {
        self.dispatches_requested
    }

    /// `Idle -> Arming` on a shake. A no-op in any other state.
    pub fn on_shake(&mut self, event: ShakeEvent) -> Vec<ControllerEvent> {
        self.begin_arming(Trigger::Shake(event))
    }

    /// `Idle -> Arming` from the manual trigger. A no-op in any other state.
    pub fn on_manual_trigger(&mut self) -> Vec<ControllerEvent> {
        self.begin_arming(Trigger::Manual)
    }

    /// Resolve `Arming` with the validation outcome.
    ///
    /// On success the countdown starts at `now` with the first tick one
    /// interval later.
    pub fn complete_arming(
        &mut self,
        outcome: Result<(), SosError>,
        now: Instant,
    ) -> Vec<ControllerEvent> {
        if self.state != SosState::Arming {
            return Vec::new();
        }
        let mut events = Vec::new();
        match outcome {
            Ok(()) => {
                let start = SosState::Countdown {
                    seconds_remaining: self.config.duration_secs,
                };
                self.apply(SosState::Arming, start, &mut events);
                self.next_tick_at = Some(now + TICK_INTERVAL);
            }
            Err(err) => {
                let reason = err.user_reason();
                tracing::warn!(cycle = self.cycle, %reason, "arming rejected");
                self.apply(SosState::Arming, SosState::Idle, &mut events);
                self.trigger = None;
                events.push(ControllerEvent::ArmingRejected { reason });
            }
        }
        events
    }

    /// Advance the countdown if its deadline has passed.
    ///
    /// Early or stray calls (no countdown, deadline not reached) are ignored.
    pub fn tick(&mut self, now: Instant) -> Vec<ControllerEvent> {
        let (k, deadline) = match (&self.state, self.next_tick_at) {
            (SosState::Countdown { seconds_remaining }, Some(deadline)) => {
                (*seconds_remaining, deadline)
            }
            _ => return Vec::new(),
        };
        if now < deadline {
            return Vec::new();
        }

        self.ticks_total += 1;
        let mut events = Vec::new();
        let current = SosState::Countdown { seconds_remaining: k };
        if k > 1 {
            self.apply(
                current,
                SosState::Countdown {
                    seconds_remaining: k - 1,
                },
                &mut events,
            );
            events.push(ControllerEvent::Tick {
                seconds_remaining: k - 1,
            });
            // Advance from the previous deadline so ticks stay on one grid.
            self.next_tick_at = Some(deadline + TICK_INTERVAL);
        } else {
            events.push(ControllerEvent::Tick {
                seconds_remaining: 0,
            });
            self.enter_dispatching(current, &mut events);
        }
        events
    }

    /// `Countdown -> Dispatching` immediately. Ignored outside a countdown.
    pub fn send_now(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        if let SosState::Countdown { .. } = self.state {
            tracing::info!(cycle = self.cycle, "send-now requested");
            let current = self.state.clone();
            self.enter_dispatching(current, &mut events);
        }
        events
    }

    /// `Countdown -> Cancelled -> Idle`. Ignored outside a countdown;
    /// in particular, once dispatch has begun it is too late.
    pub fn cancel(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        if let SosState::Countdown { seconds_remaining } = self.state {
            tracing::info!(cycle = self.cycle, seconds_remaining, "countdown cancelled");
            let current = self.state.clone();
            self.next_tick_at = None;
            self.apply(current, SosState::Cancelled, &mut events);
            events.push(ControllerEvent::Cancelled);
            self.apply(SosState::Cancelled, SosState::Idle, &mut events);
            self.trigger = None;
        }
        events
    }

    /// Resolve `Dispatching` with the channel's result for `cycle`.
    ///
    /// Results for any other cycle, or arriving in any other state, are
    /// dropped so each dispatch is reported at most once.
    pub fn finish_dispatch(&mut self, cycle: u64, result: DispatchResult) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        if self.state != SosState::Dispatching || cycle != self.cycle {
            tracing::warn!(cycle, current = self.cycle, state = %self.state, "late dispatch result dropped");
            return events;
        }
        let outcome = match &result {
            DispatchResult::Success => SosState::Sent,
            DispatchResult::Failure { error_detail } => SosState::Failed {
                reason: error_detail.clone(),
            },
        };
        self.apply(SosState::Dispatching, outcome.clone(), &mut events);
        events.push(ControllerEvent::Outcome(result));
        self.apply(outcome, SosState::Idle, &mut events);
        self.trigger = None;
        events
    }

    /// Compare-and-set on the state.
    ///
    /// Succeeds only if the current state equals `expected` and the edge
    /// `expected -> next` is legal.
    pub fn transition(
        &mut self,
        expected: &SosState,
        next: SosState,
    ) -> Result<ControllerEvent, TransitionError> {
        if &self.state != expected {
            return Err(TransitionError::Stale {
                expected: expected.clone(),
                actual: self.state.clone(),
            });
        }
        if !expected.can_transition_to(&next) {
            return Err(TransitionError::Illegal {
                from: expected.clone(),
                to: next,
            });
        }
        let from = std::mem::replace(&mut self.state, next.clone());
        tracing::debug!(cycle = self.cycle, from = %from, to = %next, "sos state transition");
        Ok(ControllerEvent::StateChanged { from, to: next })
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn begin_arming(&mut self, trigger: Trigger) -> Vec<ControllerEvent> {
        if self.state != SosState::Idle {
            tracing::debug!(state = %self.state, ?trigger, "trigger ignored, cycle in flight");
            return Vec::new();
        }
        self.cycle += 1;
        self.trigger = Some(trigger);
        tracing::info!(cycle = self.cycle, ?trigger, "arming");
        let mut events = Vec::new();
        self.apply(SosState::Idle, SosState::Arming, &mut events);
        events
    }

    fn enter_dispatching(&mut self, current: SosState, events: &mut Vec<ControllerEvent>) {
        self.next_tick_at = None;
        self.apply(current, SosState::Dispatching, events);
        self.dispatches_requested += 1;
        events.push(ControllerEvent::DispatchRequested { cycle: self.cycle });
    }

    /// Internal edges are chosen from the current state, so a refusal here
    /// means the edge table and the controller disagree.
    fn apply(&mut self, expected: SosState, next: SosState, events: &mut Vec<ControllerEvent>) {
        match self.transition(&expected, next) {
            Ok(event) => events.push(event),
            Err(err) => {
                debug_assert!(false, "{err}");
                tracing::error!(error = %err, "refused internal transition");
            }
        }
    }
}

impl Default for CountdownController {
    fn default() -> Self {
        Self::new(CountdownConfig::default())
    }
}
