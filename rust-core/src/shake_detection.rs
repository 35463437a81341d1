//! Shake Gesture Detection Module.
//!
//! Turns a stream of raw accelerometer samples into debounced shake
//! gestures using:
//! - Magnitude thresholding on |a| = sqrt(x² + y² + z²)
//! - Rising-edge detection over a short [`SignalWindow`], so a signal that
//!   stays high counts once
//! - A debounce interval between counted peaks, so sensor chatter around
//!   the threshold does not count one physical shake twice
//! - Decay of the peak counter when no peak arrives within the gesture
//!   window, so slow unrelated motion never accumulates
//!
//! `ingest` is O(1) and allocation-free; it is safe to call from the
//! sensor delivery callback.

use serde::{Deserialize, Serialize};

use crate::signal::SignalWindow;
use crate::types::{AccelSample, ShakeEvent, STANDARD_GRAVITY};

/// Configuration for shake detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeDetectorConfig {
    /// Magnitude a sample must reach to count as a peak, in g.
    pub accel_threshold_g: f64,
    /// Minimum time between two counted peaks in milliseconds.
    pub debounce_ms: i64,
    /// Peaks further apart than this reset the count (milliseconds).
    pub window_ms: i64,
    /// Number of peaks that make up one gesture.
    pub shake_threshold: u32,
    /// Length of the magnitude ring used for edge detection.
    pub signal_window_size: usize,
}

impl Default for ShakeDetectorConfig {
    fn default() -> Self {
        Self {
            accel_threshold_g: 2.7,  // Well above walking/running impacts
            debounce_ms: 100,
            window_ms: 1500,
            shake_threshold: 2,
            signal_window_size: 3,
        }
    }
}

impl ShakeDetectorConfig {
    /// Peak threshold in m/s².
    pub fn accel_threshold(&self) -> f64 {
        self.accel_threshold_g * STANDARD_GRAVITY
    }
}

/// Streaming shake detector.
#[derive(Debug, Clone)]
pub struct ShakeDetector {
    config: ShakeDetectorConfig,
    threshold_mps2: f64,

    window: SignalWindow,

    // Gesture state
    peak_count: u32,
    last_peak_ms: Option<i64>,

    // Statistics
    samples_seen: u64,
    dropped_samples: u64,
    total_peaks: u64,
    gestures_emitted: u64,
}

impl ShakeDetector {
    pub fn new(config: ShakeDetectorConfig) -> Self {
        Self {
            threshold_mps2: config.accel_threshold(),
            window: SignalWindow::new(config.signal_window_size),
            config,
            peak_count: 0,
            last_peak_ms: None,
            samples_seen: 0,
            dropped_samples: 0,
            total_peaks: 0,
            gestures_emitted: 0,
        }
    }

    /// Feed one sample. Returns a [`ShakeEvent`] on the peak that completes
    /// a gesture, `None` otherwise.
    ///
    /// Samples with a non-finite axis are dropped and count as non-peaks.
    pub fn ingest(&mut self, sample: &AccelSample) -> Option<ShakeEvent> {
        if !sample.is_finite() {
            self.dropped_samples += 1;
            return None;
        }
        self.samples_seen += 1;

        let now = sample.timestamp_ms;
        self.window.push(sample.magnitude());
        self.decay(now);

        if !self.window.rising_edge(self.threshold_mps2) {
            return None;
        }

        // Debounce: too soon after the last counted peak
        if let Some(last) = self.last_peak_ms {
            if now.saturating_sub(last) < self.config.debounce_ms {
                return None;
            }
        }

        self.last_peak_ms = Some(now);
        self.peak_count += 1;
        self.total_peaks += 1;

        if self.peak_count < self.config.shake_threshold {
            tracing::trace!(peak_count = self.peak_count, at_ms = now, "shake peak");
            return None;
        }

        let event = ShakeEvent::new(self.peak_count, now);
        self.peak_count = 0;
        self.gestures_emitted += 1;
        tracing::debug!(
            shake_count = event.shake_count,
            at_ms = now,
            "shake gesture detected"
        );
        Some(event)
    }

    /// Feed a batch and collect every gesture it completes.
    pub fn ingest_batch(&mut self, samples: &[AccelSample]) -> Vec<ShakeEvent> {
        samples.iter().filter_map(|s| self.ingest(s)).collect()
    }

    /// Peaks counted toward the current gesture.
    pub fn peak_count(&self) -> u32 {
        self.peak_count
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    pub fn total_peaks(&self) -> u64 {
        self.total_peaks
    }

    pub fn gestures_emitted(&self) -> u64 {
        self.gestures_emitted
    }

    pub fn config(&self) -> &ShakeDetectorConfig {
        &self.config
    }

    /// Forget all gesture state (called when detection is disabled).
    pub fn reset(&mut self) {
        self.window.clear();
        self.peak_count = 0;
        self.last_peak_ms = None;
    }

    // =========================================================================
    // PRIVATE METHODS
    // =========================================================================

    fn decay(&mut self, now: i64) {
        if self.peak_count == 0 {
            return;
        }
        if let Some(last) = self.last_peak_ms {
            if now.saturating_sub(last) > self.config.window_ms {
                self.peak_count = 0;
            }
        }
    }
}

impl Default for ShakeDetector {
    fn default() -> Self {
        Self::new(ShakeDetectorConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
