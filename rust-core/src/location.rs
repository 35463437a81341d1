//! Last-known location.
//!
//! The location collaborator pushes fixes at its own pace (about every
//! 10 s, never closer than 5 s). The core only ever reads the latest one as
//! a copy and never waits for a fresh fix.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::LocationFix;

/// Shared holder of the latest fix. Cheap to clone; clones share the value.
#[derive(Debug, Clone, Default)]
pub struct LocationCache {
    latest: Arc<RwLock<Option<LocationFix>>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pushed fix. Non-finite or out-of-range coordinates are
    /// rejected and leave the previous fix in place.
    pub fn update(&self, latitude: f64, longitude: f64) -> bool {
        if !LocationFix::in_range(latitude, longitude) {
            tracing::debug!(latitude, longitude, "rejected location fix");
            return false;
        }
        *self.latest.write() = Some(LocationFix::new(latitude, longitude));
        true
    }

    /// Copy of the latest fix, or an invalid fix if none has arrived.
    pub fn snapshot(&self) -> LocationFix {
        let latest = *self.latest.read();
        latest.unwrap_or_else(LocationFix::unavailable)
    }

    pub fn has_fix(&self) -> bool {
        self.latest.read().is_some()
    }

    /// Forget the stored fix (permission revoked, provider lost).
    pub fn clear(&self) {
        *self.latest.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_is_unavailable() {
        let cache = LocationCache::new();
        assert!(!cache.has_fix());
        assert!(!cache.snapshot().valid);
    }

    #[test]
    fn test_update_and_snapshot() {
        let cache = LocationCache::new();
        assert!(cache.update(12.9716, 77.5946));
        let fix = cache.snapshot();
        assert!(fix.valid);
        assert_eq!(fix.latitude, 12.9716);
    }

    #[test]
    fn test_bad_fix_keeps_previous() {
        let cache = LocationCache::new();
        cache.update(1.0, 2.0);
        assert!(!cache.update(f64::NAN, 2.0));
        assert!(!cache.update(95.0, 2.0));
        assert!(!cache.update(1.0, -181.0));
        assert_eq!(cache.snapshot(), LocationFix::new(1.0, 2.0));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let cache = LocationCache::new();
        cache.update(1.0, 2.0);
        let taken = cache.snapshot();
        cache.update(3.0, 4.0);
        assert_eq!(taken, LocationFix::new(1.0, 2.0));
    }

    #[test]
    fn test_clones_share_state_and_clear() {
        let cache = LocationCache::new();
        let feed = cache.clone();
        feed.update(1.0, 2.0);
        assert!(cache.has_fix());
        cache.clear();
        assert!(!feed.snapshot().valid);
    }
}
