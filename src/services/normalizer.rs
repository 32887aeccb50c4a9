//! Recognition normalizer - raw recognizer output to canonical identity
//!
//! Plates are uppercased, stripped of everything but ASCII letters and digits,
//! and validated against the configured identity pattern. Tags pass through
//! unchanged unless the payload is empty or malformed.

use crate::domain::error::Rejected;
use crate::domain::types::{Identity, Source};
use regex::Regex;

pub struct Normalizer {
    plate_pattern: Regex,
}

impl Normalizer {
    pub fn new(plate_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { plate_pattern: Regex::new(plate_pattern)? })
    }

    pub fn normalize(&self, raw: &str, source: Source) -> Result<Identity, Rejected> {
        match source {
            Source::Camera => self.normalize_plate(raw),
            Source::TagReader => normalize_tag(raw),
        }
    }

    fn normalize_plate(&self, raw: &str) -> Result<Identity, Rejected> {
        let normalized: String = raw
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.is_empty() {
            return Err(Rejected::Empty);
        }
        if !self.plate_pattern.is_match(&normalized) {
            return Err(Rejected::Format { normalized });
        }
        Ok(Identity::Plate(normalized))
    }
}

fn normalize_tag(raw: &str) -> Result<Identity, Rejected> {
    if raw.trim().is_empty() {
        return Err(Rejected::Empty);
    }
    if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(Rejected::MalformedTag);
    }
    Ok(Identity::Tag(raw.to_string()))
}
