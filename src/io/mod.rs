//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `drivers` - Collaborator traits for camera, tag reader, sensors, actuators, display
//! - `sqlite_store` - SQLite backing store for the occupancy registry
//! - `audit` - Access audit trail to file (JSONL format)
//! - `sim` - In-memory drivers for the simulator and tests
//! - `console` - Stdin command feed driving the simulator drivers

pub mod audit;
pub mod console;
pub mod drivers;
pub mod sim;
pub mod sqlite_store;

// Re-export commonly used types
pub use audit::{AccessAudit, AccessRecord};
pub use drivers::{
    ActuatorDriver, CameraFrameSource, DisplayDriver, Frame, PlateRecognizer, SensorArray,
    TagReader,
};
pub use sqlite_store::SqliteStore;
