//! SQLite-backed dispatch store implementation.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::ledger::{Ledger, NewBatch, NewParcel};
use super::{
    allocator, lifecycle, AllocatorConfig, Allocation, Batch, BatchChange, BatchFilter,
    BatchStatus, ConfirmParcelRequest, CreateBatchRequest, DeletedBatch, DispatchError,
    DispatchStats, DispatchStore, EditBatchRequest, Parcel, ParcelFilter, SizeClass,
    StatusCount, UnknownVariant, Vehicle, VehicleFilter, VehicleSpec, VehicleStatus,
};

const BATCH_COLUMNS: &str = "id, name, size_class, current_volume, max_volume, \
     full_threshold_percent, status, vehicle_id, created_at, completed_at";

const PARCEL_COLUMNS: &str = "id, external_id, dimensions, weight, volume, image_name, \
     delivery_address, created_by, batch_id, created_at";

const VEHICLE_COLUMNS: &str = "id, vehicle_uid, vehicle_type, plate_number, driver_name, \
     color, capacity, status, created_at";

/// SQLite-backed store for parcels, batches and vehicles.
///
/// A single connection behind a mutex serializes every operation; mutations
/// additionally run in an immediate transaction so other processes sharing
/// the file cannot interleave.
pub struct SqliteDispatchStore {
    conn: Mutex<Connection>,
}

impl SqliteDispatchStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, DispatchError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, DispatchError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DispatchError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), DispatchError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vehicles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vehicle_uid TEXT NOT NULL UNIQUE,
                vehicle_type TEXT NOT NULL,
                plate_number TEXT NOT NULL UNIQUE,
                driver_name TEXT,
                color TEXT,
                capacity REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'available',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS batches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                size_class TEXT NOT NULL,
                current_volume REAL NOT NULL DEFAULT 0,
                max_volume REAL NOT NULL,
                full_threshold_percent REAL NOT NULL,
                status TEXT NOT NULL,
                vehicle_id INTEGER REFERENCES vehicles(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS parcels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL,
                dimensions TEXT NOT NULL,
                weight REAL NOT NULL,
                volume REAL NOT NULL,
                image_name TEXT,
                delivery_address TEXT NOT NULL,
                created_by TEXT NOT NULL,
                batch_id INTEGER NOT NULL REFERENCES batches(id),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS open_batches (
                size_class TEXT PRIMARY KEY,
                batch_id INTEGER NOT NULL REFERENCES batches(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_batches_class_status ON batches(size_class, status);
            CREATE INDEX IF NOT EXISTS idx_parcels_batch ON parcels(batch_id);
            CREATE INDEX IF NOT EXISTS idx_parcels_created_at ON parcels(created_at);

            -- A vehicle serves at most one batch that is not completed.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_batches_active_vehicle
                ON batches(vehicle_id)
                WHERE vehicle_id IS NOT NULL AND status != 'completed';
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DispatchError> {
        self.conn
            .lock()
            .map_err(|_| DispatchError::Database("connection mutex poisoned".to_string()))
    }

    /// Run `f` in one immediate transaction; any error rolls everything back.
    fn in_transaction<T, F>(&self, f: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&mut SqliteLedger<'_>) -> Result<T, DispatchError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&mut SqliteLedger { conn: &*tx })?;
        tx.commit()?;
        Ok(value)
    }

    fn batch_where_clause(filter: &BatchFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref search) = filter.search {
            conditions.push("name LIKE ?".to_string());
            params.push(Box::new(format!("%{}%", search.trim())));
        }

        if !filter.statuses.is_empty() {
            conditions.push(format!(
                "status IN ({})",
                placeholders(filter.statuses.len())
            ));
            for status in &filter.statuses {
                params.push(Box::new(status.as_str()));
            }
        }

        if let Some(size_class) = filter.size_class {
            conditions.push("size_class = ?".to_string());
            params.push(Box::new(size_class.as_str()));
        }

        if let Some(ref vehicle_ids) = filter.vehicle_ids {
            if vehicle_ids.is_empty() {
                conditions.push("0".to_string());
            } else {
                conditions.push(format!(
                    "vehicle_id IN ({})",
                    placeholders(vehicle_ids.len())
                ));
                for id in vehicle_ids {
                    params.push(Box::new(*id));
                }
            }
        }

        (where_clause(&conditions), params)
    }

    fn parcel_where_clause(filter: &ParcelFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref search) = filter.search {
            let pattern = format!("%{}%", search.trim());
            conditions.push("(external_id LIKE ? OR delivery_address LIKE ?)".to_string());
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }

        if let Some(batch_id) = filter.batch_id {
            conditions.push("batch_id = ?".to_string());
            params.push(Box::new(batch_id));
        }

        (where_clause(&conditions), params)
    }

    fn vehicle_where_clause(filter: &VehicleFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref search) = filter.search {
            let pattern = format!("%{}%", search.trim());
            conditions.push(
                "(vehicle_uid LIKE ? OR plate_number LIKE ? OR vehicle_type LIKE ? OR driver_name LIKE ?)"
                    .to_string(),
            );
            for _ in 0..4 {
                params.push(Box::new(pattern.clone()));
            }
        }

        if let Some(ref driver) = filter.driver {
            conditions.push("LOWER(TRIM(driver_name)) = LOWER(TRIM(?))".to_string());
            params.push(Box::new(driver.clone()));
        }

        (where_clause(&conditions), params)
    }

    fn query_batches(conn: &Connection, filter: &BatchFilter) -> Result<Vec<Batch>, DispatchError> {
        let (where_clause, params) = Self::batch_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM batches {} ORDER BY id DESC LIMIT ? OFFSET ?",
            BATCH_COLUMNS, where_clause
        );
        query_paged(conn, &sql, params, filter.limit, filter.offset, row_to_batch)
    }

    fn query_vehicles(
        conn: &Connection,
        filter: &VehicleFilter,
    ) -> Result<Vec<Vehicle>, DispatchError> {
        let (where_clause, params) = Self::vehicle_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM vehicles {} ORDER BY id DESC LIMIT ? OFFSET ?",
            VEHICLE_COLUMNS, where_clause
        );
        query_paged(conn, &sql, params, filter.limit, filter.offset, row_to_vehicle)
    }

    fn count(
        conn: &Connection,
        table: &str,
        where_clause: &str,
        params: Vec<Box<dyn rusqlite::ToSql>>,
    ) -> Result<i64, DispatchError> {
        let sql = format!("SELECT COUNT(*) FROM {} {}", table, where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn ensure_unique_vehicle(
        conn: &Connection,
        spec: &VehicleSpec,
        except: Option<i64>,
    ) -> Result<(), DispatchError> {
        let clash: Option<(String, String)> = conn
            .query_row(
                "SELECT vehicle_uid, plate_number FROM vehicles \
                 WHERE (vehicle_uid = ?1 OR plate_number = ?2) AND (?3 IS NULL OR id != ?3) \
                 LIMIT 1",
                params![spec.vehicle_uid, spec.plate_number, except],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match clash {
            Some((uid, _)) if uid == spec.vehicle_uid => Err(DispatchError::Conflict(format!(
                "vehicle uid already registered: {}",
                uid
            ))),
            Some((_, plate)) => Err(DispatchError::Conflict(format!(
                "plate number already registered: {}",
                plate
            ))),
            None => Ok(()),
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn query_paged<T>(
    conn: &Connection,
    sql: &str,
    mut params: Vec<Box<dyn rusqlite::ToSql>>,
    limit: i64,
    offset: i64,
    map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>, DispatchError> {
    params.push(Box::new(limit));
    params.push(Box::new(offset));
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), map)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    value.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_batch(row: &rusqlite::Row) -> rusqlite::Result<Batch> {
    let created_at: String = row.get(8)?;
    let completed_at: Option<String> = row.get(9)?;
    Ok(Batch {
        id: row.get(0)?,
        name: row.get(1)?,
        size_class: parse_column(2, row.get(2)?)?,
        current_volume: row.get(3)?,
        max_volume: row.get(4)?,
        full_threshold_percent: row.get(5)?,
        status: parse_column(6, row.get(6)?)?,
        vehicle_id: row.get(7)?,
        created_at: parse_timestamp(&created_at),
        completed_at: completed_at.as_deref().map(parse_timestamp),
    })
}

fn row_to_parcel(row: &rusqlite::Row) -> rusqlite::Result<Parcel> {
    let created_at: String = row.get(9)?;
    Ok(Parcel {
        id: row.get(0)?,
        external_id: row.get(1)?,
        dimensions: row.get(2)?,
        weight: row.get(3)?,
        volume: row.get(4)?,
        image_name: row.get(5)?,
        delivery_address: row.get(6)?,
        created_by: row.get(7)?,
        batch_id: row.get(8)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn row_to_vehicle(row: &rusqlite::Row) -> rusqlite::Result<Vehicle> {
    let created_at: String = row.get(8)?;
    Ok(Vehicle {
        id: row.get(0)?,
        vehicle_uid: row.get(1)?,
        vehicle_type: row.get(2)?,
        plate_number: row.get(3)?,
        driver_name: row.get(4)?,
        color: row.get(5)?,
        capacity: row.get(6)?,
        status: parse_column(7, row.get(7)?)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trim and check a vehicle description.
fn normalize_vehicle(spec: VehicleSpec) -> Result<VehicleSpec, DispatchError> {
    let spec = VehicleSpec {
        vehicle_uid: spec.vehicle_uid.trim().to_string(),
        vehicle_type: spec.vehicle_type.trim().to_string(),
        plate_number: spec.plate_number.trim().to_string(),
        driver_name: non_blank(spec.driver_name),
        color: non_blank(spec.color),
        capacity: spec.capacity,
        status: spec.status,
    };
    for (field, value) in [
        ("vehicle_uid", &spec.vehicle_uid),
        ("vehicle_type", &spec.vehicle_type),
        ("plate_number", &spec.plate_number),
    ] {
        if value.is_empty() {
            return Err(DispatchError::Validation(format!(
                "{} cannot be empty",
                field
            )));
        }
    }
    if !(spec.capacity.is_finite() && spec.capacity > 0.0) {
        return Err(DispatchError::Validation(
            "capacity must be a positive number".to_string(),
        ));
    }
    Ok(spec)
}

/// [`Ledger`] over an open transaction.
struct SqliteLedger<'a> {
    conn: &'a Connection,
}

impl Ledger for SqliteLedger<'_> {
    fn batch(&self, id: i64) -> Result<Option<Batch>, DispatchError> {
        let sql = format!("SELECT {} FROM batches WHERE id = ?", BATCH_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_batch)
            .optional()?)
    }

    fn batch_name_exists(&self, name: &str) -> Result<bool, DispatchError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM batches WHERE name = ?",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch, DispatchError> {
        let status = BatchStatus::InProgress;
        self.conn.execute(
            "INSERT INTO batches (name, size_class, current_volume, max_volume, full_threshold_percent, status, created_at) VALUES (?, ?, 0, ?, ?, ?, ?)",
            params![
                batch.name,
                batch.size_class.as_str(),
                batch.max_volume,
                batch.full_threshold_percent,
                status.as_str(),
                batch.created_at.to_rfc3339(),
            ],
        )?;

        Ok(Batch {
            id: self.conn.last_insert_rowid(),
            name: batch.name,
            size_class: batch.size_class,
            current_volume: 0.0,
            max_volume: batch.max_volume,
            full_threshold_percent: batch.full_threshold_percent,
            status,
            vehicle_id: None,
            created_at: batch.created_at,
            completed_at: None,
        })
    }

    fn save_batch(&mut self, batch: &Batch) -> Result<(), DispatchError> {
        self.conn.execute(
            "UPDATE batches SET name = ?, current_volume = ?, max_volume = ?, status = ?, vehicle_id = ?, completed_at = ? WHERE id = ?",
            params![
                batch.name,
                batch.current_volume,
                batch.max_volume,
                batch.status.as_str(),
                batch.vehicle_id,
                batch.completed_at.map(|t| t.to_rfc3339()),
                batch.id,
            ],
        )?;
        Ok(())
    }

    fn delete_batch(&mut self, id: i64) -> Result<(), DispatchError> {
        self.conn
            .execute("DELETE FROM batches WHERE id = ?", params![id])?;
        Ok(())
    }

    fn oldest_in_progress(&self, class: SizeClass) -> Result<Option<Batch>, DispatchError> {
        let sql = format!(
            "SELECT {} FROM batches WHERE size_class = ? AND status = ? ORDER BY created_at ASC, id ASC LIMIT 1",
            BATCH_COLUMNS
        );
        Ok(self
            .conn
            .query_row(
                &sql,
                params![class.as_str(), BatchStatus::InProgress.as_str()],
                row_to_batch,
            )
            .optional()?)
    }

    fn open_batch(&self, class: SizeClass) -> Result<Option<i64>, DispatchError> {
        Ok(self
            .conn
            .query_row(
                "SELECT batch_id FROM open_batches WHERE size_class = ?",
                params![class.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_open_batch(&mut self, class: SizeClass, batch_id: i64) -> Result<(), DispatchError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO open_batches (size_class, batch_id) VALUES (?, ?)",
            params![class.as_str(), batch_id],
        )?;
        Ok(())
    }

    fn clear_open_batch(&mut self, batch_id: i64) -> Result<(), DispatchError> {
        self.conn.execute(
            "DELETE FROM open_batches WHERE batch_id = ?",
            params![batch_id],
        )?;
        Ok(())
    }

    fn vehicle(&self, id: i64) -> Result<Option<Vehicle>, DispatchError> {
        let sql = format!("SELECT {} FROM vehicles WHERE id = ?", VEHICLE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_vehicle)
            .optional()?)
    }

    fn save_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), DispatchError> {
        self.conn.execute(
            "UPDATE vehicles SET vehicle_uid = ?, vehicle_type = ?, plate_number = ?, driver_name = ?, color = ?, capacity = ?, status = ? WHERE id = ?",
            params![
                vehicle.vehicle_uid,
                vehicle.vehicle_type,
                vehicle.plate_number,
                vehicle.driver_name,
                vehicle.color,
                vehicle.capacity,
                vehicle.status.as_str(),
                vehicle.id,
            ],
        )?;
        Ok(())
    }

    fn active_batch_of_vehicle(
        &self,
        vehicle_id: i64,
        except: Option<i64>,
    ) -> Result<Option<i64>, DispatchError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM batches WHERE vehicle_id = ?1 AND status != ?2 AND (?3 IS NULL OR id != ?3) LIMIT 1",
                params![vehicle_id, BatchStatus::Completed.as_str(), except],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn parcel(&self, id: i64) -> Result<Option<Parcel>, DispatchError> {
        let sql = format!("SELECT {} FROM parcels WHERE id = ?", PARCEL_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_parcel)
            .optional()?)
    }

    fn insert_parcel(&mut self, parcel: NewParcel) -> Result<Parcel, DispatchError> {
        self.conn.execute(
            "INSERT INTO parcels (external_id, dimensions, weight, volume, image_name, delivery_address, created_by, batch_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                parcel.external_id,
                parcel.dimensions,
                parcel.weight,
                parcel.volume,
                parcel.image_name,
                parcel.delivery_address,
                parcel.created_by,
                parcel.batch_id,
                parcel.created_at.to_rfc3339(),
            ],
        )?;

        Ok(Parcel {
            id: self.conn.last_insert_rowid(),
            external_id: parcel.external_id,
            dimensions: parcel.dimensions,
            weight: parcel.weight,
            volume: parcel.volume,
            image_name: parcel.image_name,
            delivery_address: parcel.delivery_address,
            created_by: parcel.created_by,
            batch_id: parcel.batch_id,
            created_at: parcel.created_at,
        })
    }

    fn delete_parcel(&mut self, id: i64) -> Result<(), DispatchError> {
        self.conn
            .execute("DELETE FROM parcels WHERE id = ?", params![id])?;
        Ok(())
    }

    fn delete_parcels_of_batch(&mut self, batch_id: i64) -> Result<usize, DispatchError> {
        Ok(self
            .conn
            .execute("DELETE FROM parcels WHERE batch_id = ?", params![batch_id])?)
    }
}

impl DispatchStore for SqliteDispatchStore {
    fn allocate(
        &self,
        config: &AllocatorConfig,
        request: ConfirmParcelRequest,
    ) -> Result<Allocation, DispatchError> {
        self.in_transaction(|ledger| allocator::allocate(ledger, config, request, Utc::now()))
    }

    fn delete_parcels(&self, ids: &[i64]) -> Result<Vec<Parcel>, DispatchError> {
        self.in_transaction(|ledger| allocator::release_parcels(ledger, ids))
    }

    fn create_batch(
        &self,
        config: &AllocatorConfig,
        request: CreateBatchRequest,
    ) -> Result<BatchChange, DispatchError> {
        self.in_transaction(|ledger| lifecycle::create_batch(ledger, config, request, Utc::now()))
    }

    fn edit_batch(&self, id: i64, request: EditBatchRequest) -> Result<BatchChange, DispatchError> {
        self.in_transaction(|ledger| lifecycle::edit_batch(ledger, id, request))
    }

    fn assign_vehicle(&self, batch_id: i64, vehicle_id: i64) -> Result<BatchChange, DispatchError> {
        self.in_transaction(|ledger| lifecycle::assign_vehicle(ledger, batch_id, vehicle_id))
    }

    fn dispatch(
        &self,
        batch_id: i64,
        low_load_percent: f64,
    ) -> Result<BatchChange, DispatchError> {
        self.in_transaction(|ledger| lifecycle::dispatch(ledger, batch_id, low_load_percent))
    }

    fn start_mission(&self, batch_id: i64) -> Result<BatchChange, DispatchError> {
        self.in_transaction(|ledger| lifecycle::start_mission(ledger, batch_id))
    }

    fn complete_mission(&self, batch_id: i64) -> Result<BatchChange, DispatchError> {
        self.in_transaction(|ledger| lifecycle::complete_mission(ledger, batch_id, Utc::now()))
    }

    fn force_finalize(&self, batch_id: i64) -> Result<BatchChange, DispatchError> {
        self.in_transaction(|ledger| lifecycle::force_finalize(ledger, batch_id, Utc::now()))
    }

    fn finalize_full(&self, ids: &[i64]) -> Result<Vec<BatchChange>, DispatchError> {
        self.in_transaction(|ledger| lifecycle::finalize_full(ledger, ids, Utc::now()))
    }

    fn delete_batches(&self, ids: &[i64]) -> Result<Vec<DeletedBatch>, DispatchError> {
        self.in_transaction(|ledger| lifecycle::delete_batches(ledger, ids))
    }

    fn get_batch(&self, id: i64) -> Result<Option<Batch>, DispatchError> {
        let conn = self.lock()?;
        SqliteLedger { conn: &*conn }.batch(id)
    }

    fn list_batches(&self, filter: &BatchFilter) -> Result<Vec<Batch>, DispatchError> {
        let conn = self.lock()?;
        Self::query_batches(&conn, filter)
    }

    fn count_batches(&self, filter: &BatchFilter) -> Result<i64, DispatchError> {
        let conn = self.lock()?;
        let (where_clause, params) = Self::batch_where_clause(filter);
        Self::count(&conn, "batches", &where_clause, params)
    }

    fn get_parcel(&self, id: i64) -> Result<Option<Parcel>, DispatchError> {
        let conn = self.lock()?;
        SqliteLedger { conn: &*conn }.parcel(id)
    }

    fn list_parcels(&self, filter: &ParcelFilter) -> Result<Vec<Parcel>, DispatchError> {
        let conn = self.lock()?;
        let (where_clause, params) = Self::parcel_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM parcels {} ORDER BY id DESC LIMIT ? OFFSET ?",
            PARCEL_COLUMNS, where_clause
        );
        query_paged(&conn, &sql, params, filter.limit, filter.offset, row_to_parcel)
    }

    fn count_parcels(&self, filter: &ParcelFilter) -> Result<i64, DispatchError> {
        let conn = self.lock()?;
        let (where_clause, params) = Self::parcel_where_clause(filter);
        Self::count(&conn, "parcels", &where_clause, params)
    }

    fn stats(&self) -> Result<DispatchStats, DispatchError> {
        let conn = self.lock()?;

        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive).to_rfc3339())
            .unwrap_or_default();

        let parcels_total: i64 =
            conn.query_row("SELECT COUNT(*) FROM parcels", [], |row| row.get(0))?;
        let parcels_today: i64 = conn.query_row(
            "SELECT COUNT(*) FROM parcels WHERE created_at >= ?",
            params![midnight],
            |row| row.get(0),
        )?;

        let mut stats = DispatchStats {
            parcels_today,
            parcels_total,
            ..DispatchStats::default()
        };

        let mut stmt = conn.prepare("SELECT size_class, COUNT(*) FROM batches GROUP BY size_class")?;
        let rows = stmt.query_map([], |row| {
            Ok((parse_column::<SizeClass>(0, row.get(0)?)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (class, count) = row?;
            match class {
                SizeClass::Small => stats.small_batches = count,
                SizeClass::Medium => stats.medium_batches = count,
                SizeClass::Large => stats.large_batches = count,
            }
        }

        let mut by_status: Vec<StatusCount> = BatchStatus::ALL
            .into_iter()
            .map(|status| StatusCount { status, count: 0 })
            .collect();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM batches GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((parse_column::<BatchStatus>(0, row.get(0)?)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            if let Some(entry) = by_status.iter_mut().find(|e| e.status == status) {
                entry.count = count;
            }
        }
        stats.batches_by_status = by_status;

        stats.recent_batches = Self::query_batches(&conn, &BatchFilter::new().with_limit(3))?;

        stats.most_used_vehicle_type = conn
            .query_row(
                "SELECT v.vehicle_type, COUNT(*) AS uses FROM batches b \
                 JOIN vehicles v ON b.vehicle_id = v.id \
                 GROUP BY v.vehicle_type ORDER BY uses DESC, v.vehicle_type ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(stats)
    }

    fn create_vehicle(&self, spec: VehicleSpec) -> Result<Vehicle, DispatchError> {
        let spec = normalize_vehicle(spec)?;
        self.in_transaction(|ledger| {
            Self::ensure_unique_vehicle(ledger.conn, &spec, None)?;
            let now = Utc::now();
            ledger.conn.execute(
                "INSERT INTO vehicles (vehicle_uid, vehicle_type, plate_number, driver_name, color, capacity, status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    spec.vehicle_uid,
                    spec.vehicle_type,
                    spec.plate_number,
                    spec.driver_name,
                    spec.color,
                    spec.capacity,
                    spec.status.as_str(),
                    now.to_rfc3339(),
                ],
            )?;
            Ok(Vehicle {
                id: ledger.conn.last_insert_rowid(),
                vehicle_uid: spec.vehicle_uid,
                vehicle_type: spec.vehicle_type,
                plate_number: spec.plate_number,
                driver_name: spec.driver_name,
                color: spec.color,
                capacity: spec.capacity,
                status: spec.status,
                created_at: now,
            })
        })
    }

    fn update_vehicle(&self, id: i64, spec: VehicleSpec) -> Result<Vehicle, DispatchError> {
        let spec = normalize_vehicle(spec)?;
        self.in_transaction(|ledger| {
            let current = ledger.require_vehicle(id)?;
            Self::ensure_unique_vehicle(ledger.conn, &spec, Some(id))?;
            let updated = Vehicle {
                id,
                vehicle_uid: spec.vehicle_uid,
                vehicle_type: spec.vehicle_type,
                plate_number: spec.plate_number,
                driver_name: spec.driver_name,
                color: spec.color,
                capacity: spec.capacity,
                status: spec.status,
                created_at: current.created_at,
            };
            ledger.save_vehicle(&updated)?;
            Ok(updated)
        })
    }

    fn delete_vehicle(&self, id: i64) -> Result<Vehicle, DispatchError> {
        self.in_transaction(|ledger| {
            let vehicle = ledger.require_vehicle(id)?;
            if let Some(batch_id) = ledger.active_batch_of_vehicle(id, None)? {
                return Err(DispatchError::Conflict(format!(
                    "vehicle {} is assigned to active batch {}",
                    id, batch_id
                )));
            }
            ledger
                .conn
                .execute("DELETE FROM vehicles WHERE id = ?", params![id])?;
            Ok(vehicle)
        })
    }

    fn get_vehicle(&self, id: i64) -> Result<Option<Vehicle>, DispatchError> {
        let conn = self.lock()?;
        SqliteLedger { conn: &*conn }.vehicle(id)
    }

    fn list_vehicles(&self, filter: &VehicleFilter) -> Result<Vec<Vehicle>, DispatchError> {
        let conn = self.lock()?;
        Self::query_vehicles(&conn, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteDispatchStore {
        SqliteDispatchStore::in_memory().unwrap()
    }

    fn van(uid: &str, plate: &str, capacity: f64) -> VehicleSpec {
        VehicleSpec {
            vehicle_uid: uid.to_string(),
            vehicle_type: "van".to_string(),
            plate_number: plate.to_string(),
            driver_name: Some("bob".to_string()),
            color: None,
            capacity,
            status: VehicleStatus::Available,
        }
    }

    fn parcel(volume: f64) -> ConfirmParcelRequest {
        ConfirmParcelRequest {
            external_id: "SPX123".to_string(),
            dimensions: "20*20*20cm".to_string(),
            weight: 0.24,
            volume,
            delivery_address: "4 Mill Lane".to_string(),
            image_name: None,
            created_by: "admin".to_string(),
        }
    }

    #[test]
    fn test_create_and_get_vehicle() {
        let store = create_test_store();
        let vehicle = store.create_vehicle(van(" V-001 ", "AB-1", 2.0)).unwrap();

        assert!(vehicle.id > 0);
        assert_eq!(vehicle.vehicle_uid, "V-001");
        assert_eq!(vehicle.status, VehicleStatus::Available);

        let fetched = store.get_vehicle(vehicle.id).unwrap().unwrap();
        assert_eq!(fetched, vehicle);
        assert!(store.get_vehicle(999).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_vehicle_is_conflict() {
        let store = create_test_store();
        store.create_vehicle(van("V-001", "AB-1", 2.0)).unwrap();

        let by_uid = store.create_vehicle(van("V-001", "ZZ-9", 2.0));
        assert!(matches!(by_uid, Err(DispatchError::Conflict(_))));

        let by_plate = store.create_vehicle(van("V-002", "AB-1", 2.0));
        assert!(matches!(by_plate, Err(DispatchError::Conflict(_))));
    }

    #[test]
    fn test_vehicle_validation() {
        let store = create_test_store();
        let result = store.create_vehicle(van("V-001", "AB-1", 0.0));
        assert!(matches!(result, Err(DispatchError::Validation(_))));

        let result = store.create_vehicle(van("", "AB-1", 1.0));
        assert!(matches!(result, Err(DispatchError::Validation(_))));
    }

    #[test]
    fn test_update_vehicle_keeps_created_at() {
        let store = create_test_store();
        let vehicle = store.create_vehicle(van("V-001", "AB-1", 2.0)).unwrap();

        let mut spec = van("V-001", "AB-1", 3.5);
        spec.color = Some("white".to_string());
        let updated = store.update_vehicle(vehicle.id, spec).unwrap();

        assert_eq!(updated.capacity, 3.5);
        assert_eq!(updated.color.as_deref(), Some("white"));
        assert_eq!(updated.created_at, vehicle.created_at);

        let missing = store.update_vehicle(42, van("V-9", "P-9", 1.0));
        assert!(matches!(missing, Err(DispatchError::NotFound { .. })));
    }

    #[test]
    fn test_delete_vehicle_blocked_while_bound() {
        let store = create_test_store();
        let config = AllocatorConfig::default();
        let vehicle = store.create_vehicle(van("V-001", "AB-1", 2.0)).unwrap();
        let allocation = store.allocate(&config, parcel(0.02)).unwrap();
        store
            .assign_vehicle(allocation.batch.id, vehicle.id)
            .unwrap();

        let result = store.delete_vehicle(vehicle.id);
        assert!(matches!(result, Err(DispatchError::Conflict(_))));

        store.force_finalize(allocation.batch.id).unwrap();
        store.delete_vehicle(vehicle.id).unwrap();

        let batch = store.get_batch(allocation.batch.id).unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.vehicle_id, None);
    }

    #[test]
    fn test_failed_operation_rolls_back() {
        let store = create_test_store();
        let config = AllocatorConfig::default();
        let vehicle = store.create_vehicle(van("V-001", "AB-1", 2.0)).unwrap();
        let first = store
            .create_batch(
                &config,
                CreateBatchRequest {
                    name: "Morning".to_string(),
                    size_class: SizeClass::Medium,
                    vehicle_id: Some(vehicle.id),
                },
            )
            .unwrap();
        assert_eq!(first.batch.name, "Morning (medium)");

        // Vehicle already bound: the second batch must not be left behind.
        let result = store.create_batch(
            &config,
            CreateBatchRequest {
                name: "Evening".to_string(),
                size_class: SizeClass::Medium,
                vehicle_id: Some(vehicle.id),
            },
        );
        assert!(matches!(result, Err(DispatchError::Conflict(_))));
        assert_eq!(store.count_batches(&BatchFilter::new()).unwrap(), 1);
    }

    #[test]
    fn test_list_filters() {
        let store = create_test_store();
        let config = AllocatorConfig::default();
        store.allocate(&config, parcel(0.005)).unwrap();
        store.allocate(&config, parcel(0.02)).unwrap();
        let large = store.allocate(&config, parcel(0.3)).unwrap();

        let all = store.list_batches(&BatchFilter::new()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, large.batch.id);

        let medium = store
            .list_batches(&BatchFilter::new().with_size_class(SizeClass::Medium))
            .unwrap();
        assert_eq!(medium.len(), 1);
        assert!(medium[0].name.ends_with("(medium)"));

        let searched = store
            .list_batches(&BatchFilter::new().with_search("large"))
            .unwrap();
        assert_eq!(searched.len(), 1);

        let none_bound = store
            .list_batches(&BatchFilter::new().with_vehicles(vec![]))
            .unwrap();
        assert!(none_bound.is_empty());

        let in_large = store
            .list_parcels(&ParcelFilter::new().with_batch(large.batch.id))
            .unwrap();
        assert_eq!(in_large.len(), 1);
        assert_eq!(
            store
                .count_parcels(&ParcelFilter::new().with_search("mill"))
                .unwrap(),
            3
        );
    }

    #[test]
    fn test_vehicle_driver_filter_ignores_case() {
        let store = create_test_store();
        store.create_vehicle(van("V-001", "AB-1", 2.0)).unwrap();
        let mut other = van("V-002", "AB-2", 2.0);
        other.driver_name = Some("Alice".to_string());
        store.create_vehicle(other).unwrap();

        let bobs = store
            .list_vehicles(&VehicleFilter::new().with_driver("BOB"))
            .unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].vehicle_uid, "V-001");
    }

    #[test]
    fn test_stats() {
        let store = create_test_store();
        let config = AllocatorConfig::default();
        let vehicle = store.create_vehicle(van("V-001", "AB-1", 2.0)).unwrap();
        store.allocate(&config, parcel(0.005)).unwrap();
        let medium = store.allocate(&config, parcel(0.02)).unwrap();
        store.allocate(&config, parcel(0.02)).unwrap();
        store.assign_vehicle(medium.batch.id, vehicle.id).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.parcels_total, 3);
        assert_eq!(stats.parcels_today, 3);
        assert_eq!(stats.small_batches, 1);
        assert_eq!(stats.medium_batches, 1);
        assert_eq!(stats.large_batches, 0);
        assert_eq!(stats.recent_batches.len(), 2);
        assert_eq!(stats.most_used_vehicle_type.as_deref(), Some("van"));

        let in_progress = stats
            .batches_by_status
            .iter()
            .find(|c| c.status == BatchStatus::InProgress)
            .unwrap();
        assert_eq!(in_progress.count, 2);
        assert_eq!(stats.batches_by_status.len(), BatchStatus::ALL.len());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.db");
        let config = AllocatorConfig::default();

        let batch_id = {
            let store = SqliteDispatchStore::new(&path).unwrap();
            store.allocate(&config, parcel(0.02)).unwrap().batch.id
        };

        let store = SqliteDispatchStore::new(&path).unwrap();
        let next = store.allocate(&config, parcel(0.02)).unwrap();
        assert_eq!(next.batch.id, batch_id);
        assert!((next.batch.current_volume - 0.04).abs() < 1e-9);
    }
}
