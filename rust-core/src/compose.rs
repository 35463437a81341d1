//! Alert text composition.
//!
//! A pure mapping from (profile, location, time) to an [`AlertMessage`].
//! Nothing here reads a clock or shared state; the orchestrator passes in
//! the snapshots it took, so the same inputs always give the same text.
//!
//! Two layouts are supported:
//! - **Terse**: one line sized for SMS, with the map link or the
//!   unavailable marker and a short UTC time.
//! - **Rich**: subject plus multi-line body with coordinates, map link,
//!   time of alert and instructions for the recipient.

use chrono::{DateTime, Utc};

use crate::types::{AlertMessage, LocationFix, MessageFormat, UserProfile};

/// Marker used in place of coordinates and map link when no fix is usable.
pub const LOCATION_UNAVAILABLE: &str = "Location unavailable";

const MAPS_BASE: &str = "https://maps.google.com/?q=";

/// Composes alerts in a fixed format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertComposer {
    format: MessageFormat,
}

impl AlertComposer {
    pub fn new(format: MessageFormat) -> Self {
        Self { format }
    }

    pub fn compose(
        &self,
        profile: &UserProfile,
        location: &LocationFix,
        now: DateTime<Utc>,
    ) -> AlertMessage {
        compose(profile, location, now, self.format)
    }
}

/// Map link for a usable fix, with six decimals, or the unavailable marker.
pub fn map_link(location: &LocationFix) -> String {
    if location.is_usable() {
        format!(
            "{MAPS_BASE}{:.6},{:.6}",
            location.latitude, location.longitude
        )
    } else {
        LOCATION_UNAVAILABLE.to_string()
    }
}

/// Coordinate pair for display, or the unavailable marker.
pub fn coordinates(location: &LocationFix) -> String {
    if location.is_usable() {
        format!("{:.6}, {:.6}", location.latitude, location.longitude)
    } else {
        LOCATION_UNAVAILABLE.to_string()
    }
}

/// Build the alert text. Deterministic in all of its inputs.
pub fn compose(
    profile: &UserProfile,
    location: &LocationFix,
    now: DateTime<Utc>,
    format: MessageFormat,
) -> AlertMessage {
    let name = profile.display_name.trim();
    match format {
        MessageFormat::Terse => AlertMessage {
            subject: format!("SOS ALERT from {name}"),
            body: format!(
                "SOS ALERT! I'm {name}, I need HELP! {} ({})",
                map_link(location),
                now.format("%H:%M UTC")
            ),
            format,
        },
        MessageFormat::Rich => AlertMessage {
            subject: format!("EMERGENCY SOS from {name} - URGENT HELP NEEDED!"),
            body: rich_body(name, location, now),
            format,
        },
    }
}

fn rich_body(name: &str, location: &LocationFix, now: DateTime<Utc>) -> String {
    let rule = "-".repeat(32);
    let mut body = String::with_capacity(640);
    body.push_str("EMERGENCY SOS ALERT\n\n");
    body.push_str(&format!("This is {name}.\n"));
    body.push_str("I am in DANGER and need IMMEDIATE HELP!\n\n");
    body.push_str("MY CURRENT LOCATION:\n");
    body.push_str(&rule);
    body.push('\n');
    body.push_str(&format!("Coordinates: {}\n", coordinates(location)));
    body.push_str(&format!("Google Maps: {}\n\n", map_link(location)));
    body.push_str(&format!(
        "Time of Alert: {}\n\n",
        now.format("%d %b %Y, %I:%M %p UTC")
    ));
    body.push_str("WHAT TO DO:\n");
    body.push_str(&rule);
    body.push('\n');
    body.push_str("1. Call your local emergency services\n");
    body.push_str("2. Try to contact me immediately\n");
    body.push_str("3. Share my location with the authorities\n\n");
    body.push_str("This is an automated SOS alert.");
    body
}
