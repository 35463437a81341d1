/// SOS cycle example: shake, count down, send, then a cancelled second cycle
use std::sync::Arc;
use std::time::Duration;

use sos_trigger::{
    AccelSample, ChannelKind, Collaborators, ControllerEvent, HapticPulse, LocationCache,
    LoggingChannel, LoopbackSensor, MemorySettings, Projection, SettingsRecord, SosConfig,
    SosObserver, SosOrchestrator, STANDARD_GRAVITY,
};

/// Prints what a notification UI would show, plus haptic requests.
struct ConsoleUi;

impl SosObserver for ConsoleUi {
    fn on_event(&self, event: &ControllerEvent) {
        if let ControllerEvent::StateChanged { to, .. } = event {
            let projection = Projection::from_state(to);
            let actions: Vec<&str> = projection.actions.iter().map(|a| a.label()).collect();
            println!("[{}] {} | {}  {:?}", to, projection.title, projection.text, actions);
        }
    }

    fn on_haptic(&self, pulse: &HapticPulse) {
        println!("    (vibrate {:?})", pulse);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Shake-to-SOS: Full Cycle Example ===\n");

    let mut config = SosConfig::default();
    config.countdown.duration_secs = 3;

    let settings = Arc::new(MemorySettings::new(SettingsRecord {
        display_name: "Demo User".into(),
        emergency_contact: "+15555550123".into(),
        ..SettingsRecord::default()
    }));
    let channel = Arc::new(LoggingChannel::new(ChannelKind::Sms));
    let sensor = LoopbackSensor::new();
    let location = LocationCache::new();
    location.update(12.9716, 77.5946);

    let collaborators = Collaborators::new(channel.clone(), settings)
        .with_sensor(Arc::new(sensor.clone()))
        .with_location(location)
        .with_observer(Arc::new(ConsoleUi));
    let sos = SosOrchestrator::spawn(&config, collaborators);
    sos.enable(true)?;

    // Cycle 1: shake and let the countdown run out
    println!("--- Cycle 1: shake, let it send ---");
    shake(&sensor, 0).await;
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    // Cycle 2: shake, then change our mind
    println!("\n--- Cycle 2: shake, cancel after 1.5 s ---");
    shake(&sensor, 10_000).await;
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    sos.request_cancel()?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("\n=== Summary ===");
    println!("Alerts sent: {}", channel.sent().len());
    for alert in channel.sent() {
        println!("  -> {}: {}", alert.recipient, alert.body);
    }

    sos.shutdown().await?;
    Ok(())
}

/// Two peaks 150 ms apart, starting at sensor time `start_ms`.
async fn shake(sensor: &LoopbackSensor, start_ms: i64) {
    let rest = STANDARD_GRAVITY;
    let hit = 3.5 * STANDARD_GRAVITY;
    sensor.push(AccelSample::new(start_ms, 0.0, 0.0, rest));
    sensor.push(AccelSample::new(start_ms + 10, hit, 0.0, 0.0));
    tokio::time::sleep(Duration::from_millis(150)).await;
    sensor.push(AccelSample::new(start_ms + 80, 0.0, 0.0, rest));
    sensor.push(AccelSample::new(start_ms + 160, hit, 0.0, 0.0));
}
