//! Long-lived workers - sensor count, tag read, plate recognition
//!
//! Each worker polls its own collaborator with a bounded sleep between
//! samples and runs until the process-wide shutdown signal flips. Workers
//! share nothing but the display, the registry, and the gates, all of which
//! are guarded by the services that own them.

use crate::domain::types::{Channel, RecognitionEvent, Source};
use crate::infra::metrics::Metrics;
use crate::io::drivers::{CameraFrameSource, PlateRecognizer, SensorArray, TagReader};
use crate::services::access::AccessController;
use crate::services::display::DisplayCoordinator;
use crate::services::gate::GateController;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Sleep for `interval` unless shutdown arrives first; returns true on shutdown
async fn pause(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Publish the active sensor count to the display whenever it is sampled
pub async fn run_sensor_loop(
    sensors: Arc<dyn SensorArray>,
    display: Arc<DisplayCoordinator>,
    metrics: Arc<Metrics>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_ms = %interval.as_millis(), "sensor_loop_started");
    let mut last_count: Option<u32> = None;

    loop {
        let count = sensors.sample_all();
        if last_count != Some(count) {
            debug!(count = count, "sensor_count_changed");
            metrics.set_free_slots(u64::from(count));
            last_count = Some(count);
        }
        // The coordinator skips unchanged content; a held message is retried next sample
        if let Err(e) = display.show_count(count).await {
            warn!(error = %e, "display_count_failed");
        }

        if pause(interval, &mut shutdown).await {
            break;
        }
    }

    info!("sensor_loop_stopped");
}

/// Poll the tag reader and feed each read to the access controller
pub async fn run_tag_loop(
    reader: Arc<dyn TagReader>,
    access: Arc<AccessController>,
    channel: Channel,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(channel = %channel.as_str(), interval_ms = %interval.as_millis(), "tag_loop_started");

    loop {
        if let Some(tag) = reader.read_non_blocking() {
            let event = RecognitionEvent::new(Source::TagReader, tag);
            // Outcome already logged and audited by the controller
            let _ = access.handle(event, channel).await;
            continue;
        }

        if pause(interval, &mut shutdown).await {
            break;
        }
    }

    info!("tag_loop_stopped");
}

/// Capture frames, extract plate text, and feed it to the access controller
pub async fn run_plate_loop(
    camera: Arc<dyn CameraFrameSource>,
    recognizer: Arc<dyn PlateRecognizer>,
    access: Arc<AccessController>,
    channel: Channel,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(channel = %channel.as_str(), interval_ms = %interval.as_millis(), "plate_loop_started");

    loop {
        let frame = tokio::select! {
            frame = camera.capture() => frame,
            _ = shutdown.changed() => break,
        };

        match frame {
            Some(frame) => {
                let text = recognizer.extract_text(&frame).await;
                let event = RecognitionEvent::new(Source::Camera, text);
                let _ = access.handle(event, channel).await;
            }
            None => debug!("camera_frame_unavailable"),
        }

        if pause(interval, &mut shutdown).await {
            break;
        }
    }

    info!("plate_loop_stopped");
}

/// Log a metrics summary every `interval` until shutdown
pub async fn run_metrics_reporter(
    metrics: Arc<Metrics>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => metrics.report().log(),
            _ = shutdown.changed() => break,
        }
    }

    metrics.report().log();
}

/// Close every gate and blank the display
///
/// Runs at startup and again after the workers have stopped.
pub async fn shutdown_safely(gates: &GateController, display: &DisplayCoordinator) {
    gates.close_all().await;
    if let Err(e) = display.clear().await {
        warn!(error = %e, "display_clear_failed");
    }
    info!("safe_state_applied");
}
