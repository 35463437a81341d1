//! OS capability checks consulted at arm time and again at send time.

use std::collections::HashSet;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Capabilities the SOS cycle depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Sending SMS through the radio. Required by the SMS channel.
    SendSms,
    /// Fine location. Without it alerts carry the "location unavailable" marker.
    Location,
    /// Posting notifications. Without it the countdown is only visible in-app.
    Notifications,
}

impl Capability {
    pub fn label(&self) -> &'static str {
        match self {
            Capability::SendSms => "SMS",
            Capability::Location => "Location",
            Capability::Notifications => "Notification",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Answers whether a capability is currently granted.
pub trait PermissionGate: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

/// Grants everything. Default for hosts without a permission model.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantAll;

impl PermissionGate for GrantAll {
    fn is_granted(&self, _capability: Capability) -> bool {
        true
    }
}

/// A mutable grant set, updated by the host when the user answers a prompt.
#[derive(Debug, Default)]
pub struct GrantedSet {
    granted: RwLock<HashSet<Capability>>,
}

impl GrantedSet {
    pub fn new(granted: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            granted: RwLock::new(granted.into_iter().collect()),
        }
    }

    pub fn grant(&self, capability: Capability) {
        self.granted.write().insert(capability);
    }

    pub fn revoke(&self, capability: Capability) {
        self.granted.write().remove(&capability);
    }
}

impl PermissionGate for GrantedSet {
    fn is_granted(&self, capability: Capability) -> bool {
        self.granted.read().contains(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_all() {
        assert!(GrantAll.is_granted(Capability::SendSms));
        assert!(GrantAll.is_granted(Capability::Location));
    }

    #[test]
    fn test_granted_set_grant_and_revoke() {
        let gate = GrantedSet::new([Capability::Location]);
        assert!(gate.is_granted(Capability::Location));
        assert!(!gate.is_granted(Capability::SendSms));

        gate.grant(Capability::SendSms);
        assert!(gate.is_granted(Capability::SendSms));

        gate.revoke(Capability::Location);
        assert!(!gate.is_granted(Capability::Location));
    }
}
