//! Shared types for the parking access core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Canonical vehicle identity used as the registry key
///
/// A vehicle is registered under its plate and, optionally, an RFID tag.
/// Both keys resolve to the same occupancy record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Identity {
    Plate(String),
    Tag(String),
}

impl Identity {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            Identity::Plate(s) | Identity::Tag(s) => s,
        }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Identity::Plate(_) => "plate",
            Identity::Tag(_) => "tag",
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Newtype wrapper for gate IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateId(pub String);

impl GateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for GateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a recognition event, each tied to one physical gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Entry,
    Exit,
}

impl Channel {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Entry => "entry",
            Channel::Exit => "exit",
        }
    }
}

/// Producer of a recognition event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Camera,
    TagReader,
}

impl Source {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Camera => "camera",
            Source::TagReader => "tag_reader",
        }
    }
}

/// Raw recognition output, consumed once by the normalizer
#[derive(Debug, Clone)]
pub struct RecognitionEvent {
    /// Correlates log lines and the audit record for this event
    pub event_id: String,
    pub source: Source,
    pub payload: String,
    /// Receive instant on the tokio clock, so paused-time tests see it
    pub received_at: Instant,
    pub received_at_ms: u64,
}

impl RecognitionEvent {
    pub fn new(source: Source, payload: impl Into<String>) -> Self {
        Self {
            event_id: new_uuid_v7(),
            source,
            payload: payload.into(),
            received_at: Instant::now(),
            received_at_ms: epoch_ms(),
        }
    }
}

/// Registered vehicle as stored in the registry backing store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub plate: String,
    pub tag: Option<String>,
    pub present: bool,
    pub updated_at: DateTime<Utc>,
}

impl VehicleRecord {
    /// New administrative record; vehicles are always registered absent
    pub fn new(plate: impl Into<String>, tag: Option<String>) -> Self {
        Self { plate: plate.into(), tag, present: false, updated_at: Utc::now() }
    }

    /// Whether this record is addressed by the given identity
    pub fn matches(&self, identity: &Identity) -> bool {
        match identity {
            Identity::Plate(p) => self.plate == *p,
            Identity::Tag(t) => self.tag.as_deref() == Some(t.as_str()),
        }
    }
}

/// Physical gate position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePosition {
    Open,
    Closed,
}

impl GatePosition {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            GatePosition::Open => "open",
            GatePosition::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::Plate("P123".to_string()).to_string(), "P123");
        assert_eq!(Identity::Tag("584190".to_string()).kind(), "tag");
    }

    #[test]
    fn test_vehicle_record_matches_both_keys() {
        let record = VehicleRecord::new("P123", Some("584190".to_string()));
        assert!(!record.present);
        assert!(record.matches(&Identity::Plate("P123".to_string())));
        assert!(record.matches(&Identity::Tag("584190".to_string())));
        assert!(!record.matches(&Identity::Tag("P123".to_string())));
    }

    #[test]
    fn test_uuid_v7_generation() {
        let a = RecognitionEvent::new(Source::Camera, "P123");
        let b = RecognitionEvent::new(Source::Camera, "P123");
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.event_id.len(), 36);
    }
}
