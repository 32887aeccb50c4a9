//! Domain models - core access-control types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Identity` - normalized plate or tag key for a vehicle
//! - `RecognitionEvent` - raw camera/tag-reader output awaiting normalization
//! - `VehicleRecord` - registered vehicle and its occupancy status
//! - `Decision` - outcome of the pure access policy
//! - `AccessError` - outcome taxonomy for denied or faulted events

pub mod error;
pub mod policy;
pub mod types;

pub use error::{AccessError, ActuatorError, DisplayError, GateError, GatePhase, RegistryError, Rejected};
pub use policy::{decide, Decision};
pub use types::{Channel, GateId, GatePosition, Identity, RecognitionEvent, Source, VehicleRecord};
