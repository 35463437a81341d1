//! Accelerometer feed.
//!
//! The platform pushes samples; the core subscribes and unsubscribes but
//! never polls. A subscription is an owned value that detaches its sink
//! when dropped, so there is no separate "unregister" call to forget.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{SosError, SosResult};
use crate::types::AccelSample;

/// Receives samples on the sensor callback path. Must not block.
pub trait SampleSink: Send + Sync {
    fn on_sample(&self, sample: AccelSample);
}

/// A source of accelerometer samples.
pub trait SensorFeed: Send + Sync {
    /// Attach `sink`. Fails with [`SosError::SensorUnavailable`] when the
    /// device has no accelerometer.
    fn subscribe(&self, sink: Arc<dyn SampleSink>) -> SosResult<SensorSubscription>;
}

/// Live attachment of a sink to a feed. Dropping it detaches the sink.
pub struct SensorSubscription {
    id: u64,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl SensorSubscription {
    pub fn new(id: u64, detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            detach: Some(Box::new(detach)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SensorSubscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
            tracing::debug!(subscription = self.id, "sensor unsubscribed");
        }
    }
}

impl std::fmt::Debug for SensorSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSubscription").field("id", &self.id).finish()
    }
}

// ============================================================================
// LOOPBACK FEED
// ============================================================================

#[derive(Default)]
struct LoopbackInner {
    sinks: Mutex<Vec<(u64, Arc<dyn SampleSink>)>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
}

/// In-process feed that fans pushed samples out to its subscribers.
///
/// Hosts bridge their platform callback into [`LoopbackSensor::push`];
/// tests and the demo drive it directly.
#[derive(Clone, Default)]
pub struct LoopbackSensor {
    inner: Arc<LoopbackInner>,
}

impl LoopbackSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A feed that behaves like a device without an accelerometer.
    pub fn unavailable() -> Self {
        let sensor = Self::default();
        sensor.set_available(false);
        sensor
    }

    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Deliver a sample to every current subscriber.
    pub fn push(&self, sample: AccelSample) {
        // Snapshot so sinks run without the lock held.
        let sinks: Vec<Arc<dyn SampleSink>> = self
            .inner
            .sinks
            .lock()
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        for sink in sinks {
            sink.on_sample(sample);
        }
    }

    pub fn push_all(&self, samples: &[AccelSample]) {
        for sample in samples {
            self.push(*sample);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.sinks.lock().len()
    }
}

impl SensorFeed for LoopbackSensor {
    fn subscribe(&self, sink: Arc<dyn SampleSink>) -> SosResult<SensorSubscription> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(SosError::SensorUnavailable);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.sinks.lock().push((id, sink));
        tracing::debug!(subscription = id, "sensor subscribed");

        let weak: Weak<LoopbackInner> = Arc::downgrade(&self.inner);
        Ok(SensorSubscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.sinks.lock().retain(|(sink_id, _)| *sink_id != id);
            }
        }))
    }
}

impl std::fmt::Debug for LoopbackSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackSensor")
            .field("subscribers", &self.subscriber_count())
            .field("available", &!self.inner.unavailable.load(Ordering::SeqCst))
            .finish()
    }
}
