//! Core dispatch data types: parcels, batches, vehicles and their statuses.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored string did not name any known variant.
#[derive(Debug, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// Size class
// ============================================================================

/// Volume bucket a parcel falls in; decides which batch family it joins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Small => "small",
            SizeClass::Medium => "medium",
            SizeClass::Large => "large",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeClass {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(SizeClass::Small),
            "medium" => Ok(SizeClass::Medium),
            "large" => Ok(SizeClass::Large),
            other => Err(UnknownVariant {
                kind: "size class",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Batch status
// ============================================================================

/// Current status of a batch.
///
/// ```text
/// InProgress -> Full -> Ready -> Transporting -> Completed
///      |          |        |           |
///      +----------+--------+-----------+--> Completed (force-finalize)
/// ```
///
/// `InProgress` batches may also be dispatched straight to `Ready` once a
/// vehicle is assigned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Accepting parcels.
    InProgress,
    /// Load crossed the full threshold; no longer receives parcels.
    Full,
    /// Dispatched by staff, waiting for the driver to leave.
    Ready,
    /// On the road.
    Transporting,
    /// Delivered or force-closed (terminal).
    Completed,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 5] = [
        BatchStatus::InProgress,
        BatchStatus::Full,
        BatchStatus::Ready,
        BatchStatus::Transporting,
        BatchStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Full => "full",
            BatchStatus::Ready => "ready",
            BatchStatus::Transporting => "transporting",
            BatchStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed)
    }

    /// Vehicles can be bound, swapped or cleared only before dispatch.
    pub fn accepts_vehicle_change(&self) -> bool {
        matches!(self, BatchStatus::InProgress | BatchStatus::Full)
    }

    pub fn can_dispatch(&self) -> bool {
        matches!(self, BatchStatus::InProgress | BatchStatus::Full)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "batch status",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Vehicle status
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    #[default]
    Available,
    /// Bound to a batch that has not left yet.
    Reserved,
    Transporting,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::Reserved => "reserved",
            VehicleStatus::Transporting => "transporting",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(VehicleStatus::Available),
            "reserved" => Ok(VehicleStatus::Reserved),
            "transporting" => Ok(VehicleStatus::Transporting),
            other => Err(UnknownVariant {
                kind: "vehicle status",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// A capacity-bounded group of parcels travelling on one vehicle trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    pub id: i64,
    /// Unique display name.
    pub name: String,
    pub size_class: SizeClass,
    /// Sum of member parcel volumes (frozen once completed).
    pub current_volume: f64,
    /// Capacity ceiling: size-class default or the assigned vehicle's capacity.
    pub max_volume: f64,
    /// Load percentage at which the allocator marks the batch full.
    pub full_threshold_percent: f64,
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// `current_volume / max_volume` as a percentage.
    pub fn load_percent(&self) -> f64 {
        load_percent(self.current_volume, self.max_volume)
    }

    pub fn is_over_threshold(&self) -> bool {
        self.load_percent() >= self.full_threshold_percent
    }
}

/// Load of `current` against `max`, in percent. A zero capacity counts as
/// empty when nothing is loaded and as overflowing otherwise.
pub fn load_percent(current: f64, max: f64) -> f64 {
    if max > 0.0 {
        current / max * 100.0
    } else if current > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// A measured parcel, owned by exactly one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parcel {
    pub id: i64,
    /// Identifier read from the label, or one of the measurement sentinels.
    pub external_id: String,
    /// Human readable dimensions (e.g. `"30*20*10cm"`).
    pub dimensions: String,
    pub weight: f64,
    pub volume: f64,
    /// Stored upload the measurement came from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    pub delivery_address: String,
    pub created_by: String,
    pub batch_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A delivery vehicle. Referenced by batches, never owned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: i64,
    pub vehicle_uid: String,
    pub vehicle_type: String,
    pub plate_number: String,
    /// Driver user operating this vehicle (matched case-insensitively).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub capacity: f64,
    pub status: VehicleStatus,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn is_driven_by(&self, driver: &str) -> bool {
        self.driver_name
            .as_deref()
            .is_some_and(|name| name.trim().eq_ignore_ascii_case(driver.trim()))
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// How a batch came into existence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchOrigin {
    /// Created on demand because no batch of the class was open.
    Auto,
    /// Pre-created when the previous batch of the class became full.
    Successor,
    /// Created by staff.
    Manual,
}

impl BatchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOrigin::Auto => "auto",
            BatchOrigin::Successor => "successor",
            BatchOrigin::Manual => "manual",
        }
    }
}

/// Non-fatal notice attached to a successful operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapacityWarning {
    /// The assigned vehicle is smaller than the load already in the batch.
    OverCapacity {
        vehicle_id: i64,
        current_volume: f64,
        capacity: f64,
    },
    /// The batch was dispatched below the low-load threshold.
    LowLoad {
        load_percent: f64,
        threshold_percent: f64,
    },
}

impl CapacityWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            CapacityWarning::OverCapacity { .. } => "over_capacity",
            CapacityWarning::LowLoad { .. } => "low_load",
        }
    }
}

/// Result of routing a confirmed parcel into a batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Allocation {
    pub parcel: Parcel,
    /// The batch the parcel landed in, after the volume update.
    pub batch: Batch,
    /// The batch was created by this allocation.
    pub created_batch: bool,
    /// The batch crossed its full threshold with this parcel.
    pub became_full: bool,
    /// Pre-created successor, when the batch became full.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successor: Option<Batch>,
}

/// Result of a lifecycle operation on one batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchChange {
    pub batch: Batch,
    pub previous_status: BatchStatus,
    /// The vehicle bound to the batch after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<Vehicle>,
    /// A vehicle that was unbound and returned to `Available`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_vehicle: Option<Vehicle>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CapacityWarning>,
}

impl BatchChange {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.batch.status
    }
}

/// Result of deleting one batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeletedBatch {
    pub batch: Batch,
    pub parcels_removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_vehicle: Option<Vehicle>,
}

/// Aggregates for the analysis view.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DispatchStats {
    pub parcels_today: i64,
    pub parcels_total: i64,
    pub small_batches: i64,
    pub medium_batches: i64,
    pub large_batches: i64,
    pub batches_by_status: Vec<StatusCount>,
    pub recent_batches: Vec<Batch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_used_vehicle_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusCount {
    pub status: BatchStatus,
    pub count: i64,
}
