//! Occupancy registry - authoritative vehicle presence
//!
//! Wraps a backing store that offers lookup and compare-and-set, and makes the
//! lookup → decide → update sequence for one identity atomic:
//! - a per-identity lock serializes events carrying the same key
//! - compare-and-set at the store closes the race between the plate key and
//!   the tag key of the same vehicle, which hold different locks
//!
//! Different identities never contend on the same lock.

use crate::domain::error::RegistryError;
use crate::domain::policy::Decision;
use crate::domain::types::{Identity, VehicleRecord};
use chrono::Utc;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on lookup/compare-and-set rounds for a single decision
const MAX_CAS_ATTEMPTS: usize = 3;

/// Persistence backing the registry, keyed by identity
pub trait OccupancyStore: Send + Sync {
    /// Current presence for an identity, `None` if it is not registered
    fn lookup(&self, identity: &Identity) -> Result<Option<bool>, RegistryError>;

    /// Set presence to `new` only if it currently equals `expected`
    ///
    /// Returns `Ok(false)` when the stored value differs (or the identity is
    /// not registered).
    fn compare_and_set(
        &self,
        identity: &Identity,
        expected: bool,
        new: bool,
    ) -> Result<bool, RegistryError>;
}

/// Decision produced under the registry lock, with the status it was based on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub decision: Decision,
    pub previous: Option<bool>,
}

pub struct OccupancyRegistry {
    store: Arc<dyn OccupancyStore>,
    key_locks: Mutex<FxHashMap<Identity, Arc<Mutex<()>>>>,
}

impl OccupancyRegistry {
    pub fn new(store: Arc<dyn OccupancyStore>) -> Self {
        Self { store, key_locks: Mutex::new(FxHashMap::default()) }
    }

    pub fn lookup(&self, identity: &Identity) -> Result<Option<bool>, RegistryError> {
        self.store.lookup(identity)
    }

    /// Compare-and-set presence for an identity
    ///
    /// `expected == None` never succeeds: the core does not create identities.
    pub fn compare_and_set(
        &self,
        identity: &Identity,
        expected: Option<bool>,
        new: bool,
    ) -> Result<bool, RegistryError> {
        match expected {
            Some(expected) => self.store.compare_and_set(identity, expected, new),
            None => Ok(false),
        }
    }

    /// Decide and apply a transition for one identity atomically
    ///
    /// `decide` sees the current status; a grant is committed by
    /// compare-and-set. If the record moved underneath (the other key of the
    /// same vehicle), the status is re-read and `decide` runs again.
    pub fn resolve<F>(&self, identity: &Identity, decide: F) -> Result<Resolution, RegistryError>
    where
        F: Fn(Option<bool>) -> Decision,
    {
        let key_lock = self.key_lock(identity);
        let result = {
            let _guard = key_lock.lock();
            self.resolve_locked(identity, &decide)
        };
        drop(key_lock);
        self.release_key_lock(identity);
        result
    }

    fn resolve_locked<F>(&self, identity: &Identity, decide: &F) -> Result<Resolution, RegistryError>
    where
        F: Fn(Option<bool>) -> Decision,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let previous = self.store.lookup(identity)?;
            let decision = decide(previous);

            let Some(target) = decision.target_status() else {
                return Ok(Resolution { decision, previous });
            };

            if self.compare_and_set(identity, previous, target)? {
                return Ok(Resolution { decision, previous });
            }

            debug!(
                identity = %identity,
                attempt = attempt,
                decision = %decision.as_str(),
                "registry_cas_conflict"
            );
        }

        warn!(identity = %identity, attempts = MAX_CAS_ATTEMPTS, "registry_cas_exhausted");
        Err(RegistryError::Contended { identity: identity.to_string() })
    }

    fn key_lock(&self, identity: &Identity) -> Arc<Mutex<()>> {
        self.key_locks.lock().entry(identity.clone()).or_default().clone()
    }

    /// Drop the per-identity lock entry once no other caller holds it
    fn release_key_lock(&self, identity: &Identity) {
        let mut locks = self.key_locks.lock();
        if locks.get(identity).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(identity);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.key_locks.lock().len()
    }
}

/// In-memory backing store
///
/// Availability can be toggled to exercise the fail-closed path.
pub struct MemoryStore {
    records: Mutex<Vec<VehicleRecord>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { records: Mutex::new(Vec::new()), available: AtomicBool::new(true) }
    }

    pub fn with_vehicle(self, record: VehicleRecord) -> Self {
        self.records.lock().push(record);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<VehicleRecord> {
        self.records.lock().clone()
    }

    fn check_available(&self) -> Result<(), RegistryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::StorageUnavailable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OccupancyStore for MemoryStore {
    fn lookup(&self, identity: &Identity) -> Result<Option<bool>, RegistryError> {
        self.check_available()?;
        Ok(self.records.lock().iter().find(|r| r.matches(identity)).map(|r| r.present))
    }

    fn compare_and_set(
        &self,
        identity: &Identity,
        expected: bool,
        new: bool,
    ) -> Result<bool, RegistryError> {
        self.check_available()?;
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.matches(identity)) {
            Some(record) if record.present == expected => {
                record.present = new;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
