//! In-memory device drivers
//!
//! Used by the console simulator and by tests. Every driver records what it
//! was asked to do and logs it at debug level.

use crate::domain::error::{ActuatorError, DisplayError};
use crate::domain::types::GateId;
use crate::io::drivers::{
    ActuatorDriver, CameraFrameSource, DisplayDriver, Frame, PlateRecognizer, SensorArray,
    TagReader,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Camera fed from a channel of plate texts
///
/// Each text becomes one frame whose bytes are the text itself, so it pairs
/// with [`TextRecognizer`].
pub struct QueuedCamera {
    frames_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl QueuedCamera {
    pub fn new(buffer_size: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (tx, Self { frames_rx: tokio::sync::Mutex::new(rx) })
    }
}

#[async_trait]
impl CameraFrameSource for QueuedCamera {
    async fn capture(&self) -> Option<Frame> {
        let text = self.frames_rx.lock().await.recv().await?;
        Some(Frame { width: text.len() as u32, height: 1, data: text.into_bytes() })
    }
}

/// Recognizer that reads frame bytes back as text
pub struct TextRecognizer;

#[async_trait]
impl PlateRecognizer for TextRecognizer {
    async fn extract_text(&self, frame: &Frame) -> String {
        String::from_utf8_lossy(&frame.data).into_owned()
    }
}

/// Tag reader polled from a channel of tag identifiers
pub struct QueuedTagReader {
    tags_rx: Mutex<mpsc::Receiver<String>>,
}

impl QueuedTagReader {
    pub fn new(buffer_size: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (tx, Self { tags_rx: Mutex::new(rx) })
    }
}

impl TagReader for QueuedTagReader {
    fn read_non_blocking(&self) -> Option<String> {
        self.tags_rx.lock().try_recv().ok()
    }
}

/// Sensor array whose active count is set externally
#[derive(Default)]
pub struct SharedSensorArray {
    active: AtomicU32,
}

impl SharedSensorArray {
    pub fn new(active: u32) -> Self {
        Self { active: AtomicU32::new(active) }
    }

    pub fn set(&self, active: u32) {
        self.active.store(active, Ordering::Relaxed);
    }
}

impl SensorArray for SharedSensorArray {
    fn sample_all(&self) -> u32 {
        self.active.load(Ordering::Relaxed)
    }
}

/// One recorded actuator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub gate: GateId,
    pub position: u32,
    pub at: Instant,
}

/// Actuator that records commands and can be told to fail
#[derive(Default)]
pub struct RecordingActuator {
    commands: Mutex<Vec<ActuatorCommand>>,
    failing_position: Mutex<Option<u32>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail only commands to the given position
    pub fn fail_position(&self, position: Option<u32>) {
        *self.failing_position.lock() = position;
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.commands.lock().clone()
    }

    pub fn positions(&self) -> Vec<u32> {
        self.commands.lock().iter().map(|c| c.position).collect()
    }
}

#[async_trait]
impl ActuatorDriver for RecordingActuator {
    async fn set_position(&self, gate: &GateId, position: u32) -> Result<(), ActuatorError> {
        if *self.failing_position.lock() == Some(position) {
            return Err(ActuatorError {
                gate: gate.clone(),
                message: format!("driver rejected position {position}"),
            });
        }

        debug!(gate = %gate, position = position, "actuator_set_position");
        self.commands.lock().push(ActuatorCommand {
            gate: gate.clone(),
            position,
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Display that records every underlying write
#[derive(Default)]
pub struct RecordingDisplay {
    writes: Mutex<Vec<(usize, String)>>,
    clears: AtomicU32,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(usize, String)> {
        self.writes.lock().clone()
    }

    pub fn clears(&self) -> u32 {
        self.clears.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DisplayDriver for RecordingDisplay {
    async fn write_line(&self, row: usize, text: &str) -> Result<(), DisplayError> {
        debug!(row = row, text = %text.trim_end(), "display_write_line");
        self.writes.lock().push((row, text.to_string()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), DisplayError> {
        debug!("display_clear");
        self.clears.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_camera_round_trips_text() {
        let (tx, camera) = QueuedCamera::new(4);
        tx.send("p 1-2-3".to_string()).await.unwrap();
        let frame = camera.capture().await.unwrap();
        assert_eq!(TextRecognizer.extract_text(&frame).await, "p 1-2-3");

        drop(tx);
        assert!(camera.capture().await.is_none());
    }

    #[tokio::test]
    async fn test_tag_reader_is_non_blocking() {
        let (tx, reader) = QueuedTagReader::new(4);
        assert_eq!(reader.read_non_blocking(), None);
        tx.send("584190".to_string()).await.unwrap();
        assert_eq!(reader.read_non_blocking(), Some("584190".to_string()));
    }

    #[tokio::test]
    async fn test_actuator_failure_modes() {
        let actuator = RecordingActuator::new();
        let gate = GateId::new("entry");
        actuator.fail_position(Some(1750));
        assert!(actuator.set_position(&gate, 1750).await.is_err());
        assert!(actuator.set_position(&gate, 750).await.is_ok());
        assert_eq!(actuator.positions(), vec![750]);
    }
}
