//! sos-sim: scripted shake-to-SOS scenario runner.
//!
//! Replays a two-peak shake gesture into a loopback sensor and lets the
//! full cycle run against a logging channel:
//! - optional cancel or send-now at a chosen time
//! - optional simulated channel failure
//! - SMS or email channel, configurable countdown

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sos_trigger::{
    AccelSample, ChannelError, ChannelKind, Collaborators, ControllerEvent, LocationCache,
    LoggingChannel, LoggingObserver, LoopbackSensor, MemorySettings, SettingsRecord, SosConfig,
    SosObserver, SosOrchestrator, STANDARD_GRAVITY,
};

/// Shake-to-SOS simulator
#[derive(Parser, Debug)]
#[command(name = "sos-sim")]
#[command(about = "Replay a shake gesture through the SOS cycle", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SOS_CONFIG")]
    config: Option<String>,

    /// Countdown length in seconds (overrides config)
    #[arg(long)]
    countdown: Option<u32>,

    /// Alert channel: sms or email (overrides config)
    #[arg(long)]
    channel: Option<ChannelKind>,

    /// Display name placed in the alert
    #[arg(long, default_value = "Demo User")]
    name: String,

    /// Emergency contact (phone for sms, address for email)
    #[arg(long)]
    contact: Option<String>,

    /// Sender address for the email channel
    #[arg(long, default_value = "sender@example.com")]
    sender: String,

    /// Sender app password for the email channel
    #[arg(long, env = "SOS_SENDER_CREDENTIAL", default_value = "demo-app-password")]
    credential: String,

    /// Last known latitude
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    lat: Option<f64>,

    /// Last known longitude
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<f64>,

    /// Cancel the countdown this many ms after the gesture
    #[arg(long, conflicts_with = "send_now_at_ms")]
    cancel_at_ms: Option<u64>,

    /// Skip the countdown this many ms after the gesture
    #[arg(long)]
    send_now_at_ms: Option<u64>,

    /// Make the channel fail with this transport error
    #[arg(long)]
    fail: Option<String>,

    /// Log level (overrides config)
    #[arg(long, env = "SOS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging (overrides config)
    #[arg(long, env = "SOS_LOG_JSON")]
    json: bool,
}

/// Wakes the scenario when a cycle ends, however it ends.
#[derive(Default)]
struct CycleEnd {
    notify: Notify,
}

impl SosObserver for CycleEnd {
    fn on_event(&self, event: &ControllerEvent) {
        if matches!(
            event,
            ControllerEvent::Outcome(_)
                | ControllerEvent::Cancelled
                | ControllerEvent::ArmingRejected { .. }
        ) {
            self.notify.notify_one();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = SosConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let logging = config.logging.overridden(cli.log_level.as_deref(), cli.json);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Some(secs) = cli.countdown {
        config.countdown.duration_secs = secs;
    }
    if let Some(kind) = cli.channel {
        config.alert.channel = kind;
    }
    let kind = config.alert.channel;

    let contact = cli.contact.clone().unwrap_or_else(|| match kind {
        ChannelKind::Sms => "+15555550123".to_string(),
        ChannelKind::Email => "contact@example.com".to_string(),
    });
    let settings = Arc::new(MemorySettings::new(SettingsRecord {
        display_name: cli.name.clone(),
        emergency_contact: contact,
        sender_email: cli.sender.clone(),
        sender_credential: cli.credential.clone(),
        service_enabled: false,
    }));

    let mut channel = LoggingChannel::new(kind);
    if let Some(reason) = &cli.fail {
        channel = channel.failing_with(ChannelError::Transport(reason.clone()));
    }
    let channel = Arc::new(channel);

    let location = LocationCache::new();
    if let (Some(lat), Some(lon)) = (cli.lat, cli.lon) {
        if !location.update(lat, lon) {
            bail!("location {lat},{lon} is out of range");
        }
    }

    let sensor = LoopbackSensor::new();
    let cycle_end = Arc::new(CycleEnd::default());
    let collaborators = Collaborators::new(channel.clone(), settings)
        .with_sensor(Arc::new(sensor.clone()))
        .with_location(location)
        .with_observer(Arc::new(LoggingObserver))
        .with_observer(cycle_end.clone());

    let sos = Arc::new(SosOrchestrator::spawn(&config, collaborators));
    sos.enable(true).context("enabling shake detection")?;

    tracing::info!(channel = %kind, countdown_secs = config.countdown.duration_secs, "replaying shake gesture");
    replay_gesture(&sensor).await;

    let action = if let Some(at) = cli.cancel_at_ms {
        Some((at, false))
    } else {
        cli.send_now_at_ms.map(|at| (at, true))
    };
    if let Some((at, send_now)) = action {
        let sos = Arc::clone(&sos);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(at)).await;
            let result = if send_now {
                sos.request_send_now()
            } else {
                sos.request_cancel()
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "user action failed");
            }
        });
    }

    let limit = Duration::from_secs(
        config.countdown.duration_secs as u64 + config.alert.dispatch_timeout_secs + 5,
    );
    tokio::time::timeout(limit, cycle_end.notify.notified())
        .await
        .context("cycle did not finish in time")?;

    let sent = channel.sent();
    println!("\n=== Summary ===");
    println!("Channel attempts: {}", channel.attempts());
    println!("Alerts delivered: {}", sent.len());
    for alert in &sent {
        println!("\nTo: {} ({} part(s))", alert.recipient, alert.parts);
        println!("Subject: {}", alert.subject);
        println!("{}", alert.body);
    }

    match Arc::try_unwrap(sos) {
        Ok(sos) => sos.shutdown().await?,
        Err(_) => tracing::debug!("orchestrator still shared at exit"),
    }
    Ok(())
}

/// Two sharp peaks 150 ms apart on a resting device.
async fn replay_gesture(sensor: &LoopbackSensor) {
    let rest = STANDARD_GRAVITY;
    let hit = 3.5 * STANDARD_GRAVITY;
    let script = [(0, rest), (10, hit), (80, rest), (160, hit), (240, rest)];

    let mut elapsed = 0;
    for (ts, magnitude) in script {
        tokio::time::sleep(Duration::from_millis((ts - elapsed) as u64)).await;
        elapsed = ts;
        sensor.push(AccelSample::new(ts, 0.0, magnitude, 0.0));
    }
}
