//! Rolling acceleration-magnitude window.
//!
//! The shake detector keeps the last few magnitudes in a fixed ring so it
//! can tell a fresh threshold crossing (rising edge) apart from a signal
//! that simply stays high. The buffer is allocated once and overwritten in
//! place: O(1) per sample, no allocation on the hot path.

/// Fixed-size ring of the most recent magnitude values (m/s²).
#[derive(Debug, Clone)]
pub struct SignalWindow {
    buffer: Vec<f64>,
    /// Index the next value will be written to.
    next: usize,
    /// Number of valid values, saturating at the capacity.
    len: usize,
}

impl SignalWindow {
    /// Create a window holding `capacity` values. A capacity below 2 is
    /// raised to 2, since edge detection needs the previous value.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            buffer: vec![0.0; capacity],
            next: 0,
            len: 0,
        }
    }

    /// Append a value, overwriting the oldest once full.
    pub fn push(&mut self, magnitude: f64) {
        self.buffer[self.next] = magnitude;
        self.next = (self.next + 1) % self.buffer.len();
        self.len = (self.len + 1).min(self.buffer.len());
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buffer.len()
    }

    /// The value `age` samples back (0 = newest).
    pub fn get(&self, age: usize) -> Option<f64> {
        if age >= self.len {
            return None;
        }
        let cap = self.buffer.len();
        let idx = (self.next + cap - 1 - age) % cap;
        Some(self.buffer[idx])
    }

    pub fn latest(&self) -> Option<f64> {
        self.get(0)
    }

    pub fn previous(&self) -> Option<f64> {
        self.get(1)
    }

    /// True when the newest value is at or above `threshold` and the one
    /// before it was below. The first value ever pushed counts as an edge
    /// from rest.
    pub fn rising_edge(&self, threshold: f64) -> bool {
        match (self.latest(), self.previous()) {
            (Some(now), Some(before)) => now >= threshold && before < threshold,
            (Some(now), None) => now >= threshold,
            _ => false,
        }
    }

    /// Largest value currently held.
    pub fn peak(&self) -> Option<f64> {
        self.iter().fold(None, |acc, v| match acc {
            Some(m) if m >= v => Some(m),
            _ => Some(v),
        })
    }

    /// Mean of the values currently held.
    pub fn mean(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        Some(self.iter().sum::<f64>() / self.len as f64)
    }

    /// Values from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).filter_map(move |age| self.get(age))
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.next = 0;
        self.len = 0;
    }
}
