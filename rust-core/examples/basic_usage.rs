/// Basic usage example: feed accelerometer samples, get shake gestures
use sos_trigger::{AccelSample, ShakeDetector, ShakeDetectorConfig, STANDARD_GRAVITY};

fn main() {
    println!("=== Shake-to-SOS: Detector Example ===\n");

    // Default config: 2 peaks above 2.7 g, 100 ms debounce, 1.5 s window
    let config = ShakeDetectorConfig::default();
    let mut detector = ShakeDetector::new(config.clone());

    let g = STANDARD_GRAVITY;
    let samples = vec![
        // Phone resting on a table (0-200 ms)
        (0, [0.0, 0.1, g]),
        (50, [0.0, 0.1, g]),
        (100, [0.1, 0.0, g]),
        (150, [0.0, 0.0, g]),

        // Walking: bumps well under the threshold (200-600 ms)
        (200, [1.5, 0.5, 1.4 * g]),
        (300, [0.8, 0.2, 0.9 * g]),
        (400, [1.6, 0.4, 1.5 * g]),
        (500, [0.5, 0.3, 0.8 * g]),

        // Chatter: two spikes 40 ms apart count once (1000-1080 ms)
        (1000, [30.0, 5.0, g]),
        (1020, [2.0, 0.0, g]),
        (1040, [31.0, 4.0, g]),
        (1080, [1.0, 0.0, g]),

        // A second, distinct shake completes the gesture (1250 ms)
        (1250, [-32.0, 6.0, g]),
        (1300, [0.5, 0.0, g]),
    ];

    println!(
        "Threshold: {:.1} g ({:.1} m/s²), debounce {} ms, window {} ms\n",
        config.accel_threshold_g,
        config.accel_threshold(),
        config.debounce_ms,
        config.window_ms
    );

    for (timestamp, [x, y, z]) in samples {
        let sample = AccelSample::new(timestamp, x, y, z);
        match detector.ingest(&sample) {
            Some(event) => println!(
                "{:>5} ms  |a| = {:5.2} g  -> SHAKE detected ({} peaks)",
                timestamp,
                sample.magnitude_g(),
                event.shake_count
            ),
            None => println!(
                "{:>5} ms  |a| = {:5.2} g     peaks so far: {}",
                timestamp,
                sample.magnitude_g(),
                detector.peak_count()
            ),
        }
    }

    println!("\n=== Summary ===");
    println!("Samples processed: {}", detector.samples_seen());
    println!("Peaks counted: {}", detector.total_peaks());
    println!("Gestures emitted: {}", detector.gestures_emitted());
}
