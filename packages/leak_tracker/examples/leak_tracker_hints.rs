//! Demonstrates structured trail hints and call-site exclusions.

use leak_tracker::{LeakDetector, Level, TrailHint};

/// A hint type that controls its own rendering in leak reports.
struct ChannelHint {
    id: u64,
    remote: &'static str,
}

impl TrailHint for ChannelHint {
    fn to_hint_string(&self) -> String {
        format!("channel 0x{:016x} (remote: {})", self.id, self.remote)
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    LeakDetector::set_level(Level::Paranoid);

    // Frames of generated delegation layers would only add noise to every
    // trail, so elide them up front.
    leak_tracker::add_exclusions("InstrumentedChannel", &["touch", "forward"]);

    let detector = LeakDetector::new("Channel");

    {
        let connection = String::from("connection state");
        let tracker = detector.track(&connection).expect("paranoid always tracks");

        tracker.record_with("handshake");
        tracker.record_with(format_args!("negotiated frame size {}", 16_384));
        tracker.record_with(ChannelHint {
            id: 0xdead_beef,
            remote: "203.0.113.7:443",
        });

        // Dropped without close: this is the leak being demonstrated.
    }

    // Trigger the drain; the report carries all three hints.
    let probe = 0_u8;
    if let Some(tracker) = detector.track(&probe) {
        tracker.close_for(&probe);
    }
}
