//! Collaborator interfaces for the physical devices around the core
//!
//! Optical character extraction, RFID decoding, servo pulse generation,
//! GPIO sampling and the character LCD are all external; the core only talks
//! to them through these traits.

use crate::domain::error::{ActuatorError, DisplayError};
use crate::domain::types::GateId;
use async_trait::async_trait;

/// One captured camera frame
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait CameraFrameSource: Send + Sync {
    /// Block until the next frame is available; `None` if the camera failed
    async fn capture(&self) -> Option<Frame>;
}

#[async_trait]
pub trait PlateRecognizer: Send + Sync {
    /// Raw text read from a frame (may be empty or noisy)
    async fn extract_text(&self, frame: &Frame) -> String;
}

pub trait TagReader: Send + Sync {
    /// Decoded tag identifier if a tag is in range, without blocking
    fn read_non_blocking(&self) -> Option<String>;
}

pub trait SensorArray: Send + Sync {
    /// Number of active occupancy sensors (free slots)
    fn sample_all(&self) -> u32;
}

#[async_trait]
pub trait ActuatorDriver: Send + Sync {
    async fn set_position(&self, gate: &GateId, position: u32) -> Result<(), ActuatorError>;
}

#[async_trait]
pub trait DisplayDriver: Send + Sync {
    async fn write_line(&self, row: usize, text: &str) -> Result<(), DisplayError>;

    async fn clear(&self) -> Result<(), DisplayError>;
}
