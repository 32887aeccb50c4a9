//! Services - business logic and shared state
//!
//! This module contains the core access-control services:
//! - `normalizer` - Raw recognizer output to canonical identity
//! - `registry` - Occupancy registry with atomic per-identity read-modify-write
//! - `gate` - Per-gate open/dwell/close cycles with busy-fail
//! - `display` - Serialized display writes (counts and transient messages)
//! - `access` - Orchestrates one recognition event end to end
//! - `workers` - Long-lived sensor, tag, and plate loops

pub mod access;
pub mod display;
pub mod gate;
pub mod normalizer;
pub mod registry;
pub mod workers;

// Re-export commonly used types
pub use access::{AccessController, Granted};
pub use display::{DisplayCoordinator, DisplaySource, DisplayState};
pub use gate::{GateController, GateCycle, GateState};
pub use normalizer::Normalizer;
pub use registry::{MemoryStore, OccupancyRegistry, OccupancyStore, Resolution};
