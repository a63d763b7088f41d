//! Dispatch storage trait, requests and filters.

use serde::{Deserialize, Serialize};

use super::{
    AllocatorConfig, Allocation, Batch, BatchChange, BatchStatus, DeletedBatch, DispatchError,
    DispatchStats, Parcel, SizeClass, Vehicle, VehicleStatus,
};

/// A measured parcel confirmed by staff, ready to be allocated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmParcelRequest {
    pub external_id: String,
    #[serde(default)]
    pub dimensions: String,
    pub weight: f64,
    pub volume: f64,
    pub delivery_address: String,
    #[serde(default)]
    pub image_name: Option<String>,
    /// Staff user confirming the parcel.
    #[serde(default)]
    pub created_by: String,
}

/// Request to create a batch by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    /// Base name; the stored name is `"{name} ({size_class})"`.
    pub name: String,
    pub size_class: SizeClass,
    #[serde(default)]
    pub vehicle_id: Option<i64>,
}

/// What to do with a batch's vehicle binding during an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VehicleChange {
    #[default]
    Keep,
    Clear,
    Set(i64),
}

/// Admin edit of a batch. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct EditBatchRequest {
    pub name: Option<String>,
    /// Explicit capacity; wins over a newly assigned vehicle's capacity.
    pub max_volume: Option<f64>,
    pub vehicle: VehicleChange,
}

/// Full description of a vehicle, used for both create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSpec {
    pub vehicle_uid: String,
    pub vehicle_type: String,
    pub plate_number: String,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub capacity: f64,
    #[serde(default)]
    pub status: VehicleStatus,
}

/// Filter for querying parcels.
#[derive(Debug, Clone)]
pub struct ParcelFilter {
    /// Substring match on external id or delivery address.
    pub search: Option<String>,
    pub batch_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ParcelFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParcelFilter {
    pub fn new() -> Self {
        Self {
            search: None,
            batch_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_batch(mut self, batch_id: i64) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Filter for querying batches.
#[derive(Debug, Clone)]
pub struct BatchFilter {
    /// Substring match on batch name.
    pub search: Option<String>,
    /// Any of these statuses (empty = all).
    pub statuses: Vec<BatchStatus>,
    pub size_class: Option<SizeClass>,
    /// Only batches bound to one of these vehicles.
    pub vehicle_ids: Option<Vec<i64>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for BatchFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchFilter {
    pub fn new() -> Self {
        Self {
            search: None,
            statuses: Vec::new(),
            size_class: None,
            vehicle_ids: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_status(mut self, status: BatchStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_size_class(mut self, size_class: SizeClass) -> Self {
        self.size_class = Some(size_class);
        self
    }

    pub fn with_vehicles(mut self, vehicle_ids: Vec<i64>) -> Self {
        self.vehicle_ids = Some(vehicle_ids);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Filter for querying vehicles.
#[derive(Debug, Clone)]
pub struct VehicleFilter {
    /// Substring match on uid, plate, type or driver.
    pub search: Option<String>,
    /// Exact driver name, case-insensitive.
    pub driver: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for VehicleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleFilter {
    pub fn new() -> Self {
        Self {
            search: None,
            driver: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Storage backend for parcels, batches and vehicles.
///
/// Every mutating method is atomic: either all of its record changes are
/// applied or none are, and no other mutation interleaves with it.
pub trait DispatchStore: Send + Sync {
    // --- allocation ---

    /// Route a confirmed parcel into the open batch of its size class.
    fn allocate(
        &self,
        config: &AllocatorConfig,
        request: ConfirmParcelRequest,
    ) -> Result<Allocation, DispatchError>;

    /// Delete parcels, releasing their volume from non-completed batches.
    /// Unknown ids fail the whole call.
    fn delete_parcels(&self, ids: &[i64]) -> Result<Vec<Parcel>, DispatchError>;

    // --- batch lifecycle ---

    fn create_batch(
        &self,
        config: &AllocatorConfig,
        request: CreateBatchRequest,
    ) -> Result<BatchChange, DispatchError>;

    fn edit_batch(&self, id: i64, request: EditBatchRequest) -> Result<BatchChange, DispatchError>;

    fn assign_vehicle(&self, batch_id: i64, vehicle_id: i64) -> Result<BatchChange, DispatchError>;

    /// Mark a batch ready for departure. Warns below `low_load_percent`.
    fn dispatch(&self, batch_id: i64, low_load_percent: f64)
        -> Result<BatchChange, DispatchError>;

    fn start_mission(&self, batch_id: i64) -> Result<BatchChange, DispatchError>;

    fn complete_mission(&self, batch_id: i64) -> Result<BatchChange, DispatchError>;

    /// Close any non-completed batch immediately.
    fn force_finalize(&self, batch_id: i64) -> Result<BatchChange, DispatchError>;

    /// Complete every `Full` batch among `ids`; other statuses are skipped.
    fn finalize_full(&self, ids: &[i64]) -> Result<Vec<BatchChange>, DispatchError>;

    /// Delete batches together with their parcels.
    fn delete_batches(&self, ids: &[i64]) -> Result<Vec<DeletedBatch>, DispatchError>;

    // --- queries ---

    fn get_batch(&self, id: i64) -> Result<Option<Batch>, DispatchError>;

    fn list_batches(&self, filter: &BatchFilter) -> Result<Vec<Batch>, DispatchError>;

    fn count_batches(&self, filter: &BatchFilter) -> Result<i64, DispatchError>;

    fn get_parcel(&self, id: i64) -> Result<Option<Parcel>, DispatchError>;

    fn list_parcels(&self, filter: &ParcelFilter) -> Result<Vec<Parcel>, DispatchError>;

    fn count_parcels(&self, filter: &ParcelFilter) -> Result<i64, DispatchError>;

    fn stats(&self) -> Result<DispatchStats, DispatchError>;

    // --- vehicle registry ---

    fn create_vehicle(&self, spec: VehicleSpec) -> Result<Vehicle, DispatchError>;

    /// Replace a vehicle's descriptive fields and status.
    fn update_vehicle(&self, id: i64, spec: VehicleSpec) -> Result<Vehicle, DispatchError>;

    /// Delete a vehicle that is not bound to an active batch.
    fn delete_vehicle(&self, id: i64) -> Result<Vehicle, DispatchError>;

    fn get_vehicle(&self, id: i64) -> Result<Option<Vehicle>, DispatchError>;

    fn list_vehicles(&self, filter: &VehicleFilter) -> Result<Vec<Vehicle>, DispatchError>;
}
