//! Record-level access inside one dispatch transaction.

use chrono::{DateTime, Utc};

use super::{Batch, DispatchError, Parcel, SizeClass, Vehicle};

/// A batch about to be inserted; it starts empty and `InProgress`.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub name: String,
    pub size_class: SizeClass,
    pub max_volume: f64,
    pub full_threshold_percent: f64,
    pub created_at: DateTime<Utc>,
}

/// A parcel about to be inserted into `batch_id`.
#[derive(Debug, Clone)]
pub struct NewParcel {
    pub external_id: String,
    pub dimensions: String,
    pub weight: f64,
    pub volume: f64,
    pub image_name: Option<String>,
    pub delivery_address: String,
    pub created_by: String,
    pub batch_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Reads and writes made by the allocator and the lifecycle operations.
///
/// A ledger is only handed out for the span of one store transaction, so
/// everything written through it commits or rolls back together.
pub trait Ledger {
    fn batch(&self, id: i64) -> Result<Option<Batch>, DispatchError>;

    fn batch_name_exists(&self, name: &str) -> Result<bool, DispatchError>;

    fn insert_batch(&mut self, batch: NewBatch) -> Result<Batch, DispatchError>;

    /// Persist every mutable field of `batch`.
    fn save_batch(&mut self, batch: &Batch) -> Result<(), DispatchError>;

    fn delete_batch(&mut self, id: i64) -> Result<(), DispatchError>;

    /// Oldest `InProgress` batch of the class, if any.
    fn oldest_in_progress(&self, class: SizeClass) -> Result<Option<Batch>, DispatchError>;

    /// Batch currently registered as open for the class.
    fn open_batch(&self, class: SizeClass) -> Result<Option<i64>, DispatchError>;

    fn set_open_batch(&mut self, class: SizeClass, batch_id: i64) -> Result<(), DispatchError>;

    /// Drop any open-batch entry pointing at `batch_id`.
    fn clear_open_batch(&mut self, batch_id: i64) -> Result<(), DispatchError>;

    fn vehicle(&self, id: i64) -> Result<Option<Vehicle>, DispatchError>;

    fn save_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), DispatchError>;

    /// Non-completed batch bound to the vehicle, other than `except`.
    fn active_batch_of_vehicle(
        &self,
        vehicle_id: i64,
        except: Option<i64>,
    ) -> Result<Option<i64>, DispatchError>;

    fn parcel(&self, id: i64) -> Result<Option<Parcel>, DispatchError>;

    fn insert_parcel(&mut self, parcel: NewParcel) -> Result<Parcel, DispatchError>;

    fn delete_parcel(&mut self, id: i64) -> Result<(), DispatchError>;

    /// Delete every parcel of the batch, returning how many went.
    fn delete_parcels_of_batch(&mut self, batch_id: i64) -> Result<usize, DispatchError>;

    // Loaders that turn a missing row into `NotFound`.

    fn require_batch(&self, id: i64) -> Result<Batch, DispatchError> {
        self.batch(id)?
            .ok_or_else(|| DispatchError::batch_not_found(id))
    }

    fn require_vehicle(&self, id: i64) -> Result<Vehicle, DispatchError> {
        self.vehicle(id)?
            .ok_or_else(|| DispatchError::vehicle_not_found(id))
    }

    fn require_parcel(&self, id: i64) -> Result<Parcel, DispatchError> {
        self.parcel(id)?
            .ok_or_else(|| DispatchError::parcel_not_found(id))
    }
}
