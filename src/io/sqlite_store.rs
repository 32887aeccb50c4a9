//! SQLite backing store for the occupancy registry
//!
//! Schema: one `parking_records` row per vehicle, primary key `plate_number`,
//! optional unique `rfid_uid`, `parking_status` (0 absent / 1 present) and
//! `updated_at` (RFC 3339). A lookup by either key column hits the same row.
//!
//! All values are bound as statement parameters; only the key column name is
//! chosen from a fixed set.

use crate::domain::error::RegistryError;
use crate::domain::types::{Identity, VehicleRecord};
use crate::services::registry::OccupancyStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS parking_records (
    plate_number   TEXT PRIMARY KEY NOT NULL,
    rfid_uid       TEXT UNIQUE,
    parking_status INTEGER NOT NULL DEFAULT 0,
    updated_at     TEXT NOT NULL
)";

const LOOKUP_BY_PLATE: &str =
    "SELECT parking_status FROM parking_records WHERE plate_number = ?1";
const LOOKUP_BY_TAG: &str = "SELECT parking_status FROM parking_records WHERE rfid_uid = ?1";
const CAS_BY_PLATE: &str = "UPDATE parking_records SET parking_status = ?1, updated_at = ?2
     WHERE plate_number = ?3 AND parking_status = ?4";
const CAS_BY_TAG: &str = "UPDATE parking_records SET parking_status = ?1, updated_at = ?2
     WHERE rfid_uid = ?3 AND parking_status = ?4";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn unavailable(e: rusqlite::Error) -> RegistryError {
    RegistryError::StorageUnavailable(e.to_string())
}

impl SqliteStore {
    /// Open (creating if needed) the registry database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "registry_store_opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Administratively register a vehicle (always absent)
    pub fn register(&self, record: &VehicleRecord) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO parking_records (plate_number, rfid_uid, parking_status, updated_at)
             VALUES (?1, ?2, 0, ?3)",
            params![record.plate, record.tag, record.updated_at.to_rfc3339()],
        )?;
        info!(plate = %record.plate, tag = ?record.tag, "vehicle_registered");
        Ok(())
    }

    /// Remove a vehicle by plate; returns whether a row was deleted
    pub fn remove(&self, plate: &str) -> rusqlite::Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM parking_records WHERE plate_number = ?1", params![plate])?;
        Ok(deleted > 0)
    }

    pub fn list(&self) -> rusqlite::Result<Vec<VehicleRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT plate_number, rfid_uid, parking_status, updated_at
             FROM parking_records ORDER BY plate_number",
        )?;
        let rows = stmt.query_map([], |row| {
            let updated_at: String = row.get(3)?;
            let updated_at = updated_at.parse::<DateTime<Utc>>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
            })?;
            Ok(VehicleRecord {
                plate: row.get(0)?,
                tag: row.get(1)?,
                present: row.get(2)?,
                updated_at,
            })
        })?;
        rows.collect()
    }
}

impl OccupancyStore for SqliteStore {
    fn lookup(&self, identity: &Identity) -> Result<Option<bool>, RegistryError> {
        let sql = match identity {
            Identity::Plate(_) => LOOKUP_BY_PLATE,
            Identity::Tag(_) => LOOKUP_BY_TAG,
        };
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql).map_err(unavailable)?;
        stmt.query_row(params![identity.as_str()], |row| row.get::<_, bool>(0))
            .optional()
            .map_err(unavailable)
    }

    fn compare_and_set(
        &self,
        identity: &Identity,
        expected: bool,
        new: bool,
    ) -> Result<bool, RegistryError> {
        let sql = match identity {
            Identity::Plate(_) => CAS_BY_PLATE,
            Identity::Tag(_) => CAS_BY_TAG,
        };
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql).map_err(unavailable)?;
        let updated = stmt
            .execute(params![new, Utc::now().to_rfc3339(), identity.as_str(), expected])
            .map_err(unavailable)?;

        debug!(
            identity = %identity,
            kind = identity.kind(),
            expected = expected,
            new = new,
            updated = updated,
            "registry_compare_and_set"
        );
        Ok(updated == 1)
    }
}
