//! Batch and vehicle state transitions.
//!
//! Each function loads what it needs through a [`Ledger`], checks the batch
//! status, then writes the batch and any affected vehicles. Callers run them
//! inside a store transaction so a rejected transition writes nothing.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::ledger::{Ledger, NewBatch};
use super::{
    AllocatorConfig, Batch, BatchChange, BatchStatus, CapacityWarning, CreateBatchRequest,
    DeletedBatch, DispatchError, EditBatchRequest, Vehicle, VehicleChange, VehicleStatus,
};

/// `ids` in first-seen order with repeats removed.
pub(crate) fn distinct_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn invalid(batch: &Batch, operation: &'static str) -> DispatchError {
    DispatchError::InvalidState {
        batch_id: batch.id,
        status: batch.status,
        operation,
    }
}

fn over_capacity(batch: &Batch, vehicle: &Vehicle) -> Option<CapacityWarning> {
    (vehicle.capacity < batch.current_volume).then(|| CapacityWarning::OverCapacity {
        vehicle_id: vehicle.id,
        current_volume: batch.current_volume,
        capacity: vehicle.capacity,
    })
}

/// Return the batch's current vehicle to `Available` and unbind it.
fn release_vehicle<L: Ledger + ?Sized>(
    ledger: &mut L,
    batch: &mut Batch,
) -> Result<Option<Vehicle>, DispatchError> {
    let Some(vehicle_id) = batch.vehicle_id.take() else {
        return Ok(None);
    };
    let Some(mut vehicle) = ledger.vehicle(vehicle_id)? else {
        return Ok(None);
    };
    vehicle.status = VehicleStatus::Available;
    ledger.save_vehicle(&vehicle)?;
    Ok(Some(vehicle))
}

/// Bind `vehicle_id` to the batch, replacing any previous vehicle.
///
/// Fails with `Conflict` when the vehicle already serves another active batch.
/// On success the vehicle is `Reserved` and the batch capacity becomes the
/// vehicle's capacity.
fn bind_vehicle<L: Ledger + ?Sized>(
    ledger: &mut L,
    batch: &mut Batch,
    vehicle_id: i64,
    change: &mut BatchChange,
) -> Result<(), DispatchError> {
    let mut vehicle = ledger.require_vehicle(vehicle_id)?;

    if batch.vehicle_id == Some(vehicle_id) {
        batch.max_volume = vehicle.capacity;
        change.warnings.extend(over_capacity(batch, &vehicle));
        change.vehicle = Some(vehicle);
        return Ok(());
    }

    if let Some(other) = ledger.active_batch_of_vehicle(vehicle_id, Some(batch.id))? {
        return Err(DispatchError::Conflict(format!(
            "vehicle {} is already assigned to batch {}",
            vehicle_id, other
        )));
    }

    change.released_vehicle = release_vehicle(ledger, batch)?;

    batch.vehicle_id = Some(vehicle.id);
    batch.max_volume = vehicle.capacity;
    vehicle.status = VehicleStatus::Reserved;
    ledger.save_vehicle(&vehicle)?;

    change.warnings.extend(over_capacity(batch, &vehicle));
    change.vehicle = Some(vehicle);
    Ok(())
}

fn change_for(batch: &Batch) -> BatchChange {
    BatchChange {
        batch: batch.clone(),
        previous_status: batch.status,
        vehicle: None,
        released_vehicle: None,
        warnings: Vec::new(),
    }
}

fn finish(mut change: BatchChange, batch: Batch) -> BatchChange {
    change.batch = batch;
    change
}

/// Assign a vehicle to an `InProgress` or `Full` batch.
pub fn assign_vehicle<L: Ledger + ?Sized>(
    ledger: &mut L,
    batch_id: i64,
    vehicle_id: i64,
) -> Result<BatchChange, DispatchError> {
    let mut batch = ledger.require_batch(batch_id)?;
    if !batch.status.accepts_vehicle_change() {
        return Err(invalid(&batch, "assign a vehicle to"));
    }

    let mut change = change_for(&batch);
    bind_vehicle(ledger, &mut batch, vehicle_id, &mut change)?;
    ledger.save_batch(&batch)?;
    Ok(finish(change, batch))
}

/// Mark a batch `Ready`. Requires a bound vehicle; warns when the load is
/// below `low_load_percent`.
pub fn dispatch<L: Ledger + ?Sized>(
    ledger: &mut L,
    batch_id: i64,
    low_load_percent: f64,
) -> Result<BatchChange, DispatchError> {
    let mut batch = ledger.require_batch(batch_id)?;
    if !batch.status.can_dispatch() {
        return Err(invalid(&batch, "dispatch"));
    }
    let Some(vehicle_id) = batch.vehicle_id else {
        return Err(DispatchError::Validation(format!(
            "batch {} has no vehicle assigned",
            batch_id
        )));
    };

    let mut change = change_for(&batch);
    change.vehicle = ledger.vehicle(vehicle_id)?;

    let load = batch.load_percent();
    if load < low_load_percent {
        change.warnings.push(CapacityWarning::LowLoad {
            load_percent: load,
            threshold_percent: low_load_percent,
        });
    }

    batch.status = BatchStatus::Ready;
    ledger.clear_open_batch(batch.id)?;
    ledger.save_batch(&batch)?;
    Ok(finish(change, batch))
}

/// `Ready` to `Transporting`; the vehicle goes out with it.
pub fn start_mission<L: Ledger + ?Sized>(
    ledger: &mut L,
    batch_id: i64,
) -> Result<BatchChange, DispatchError> {
    let mut batch = ledger.require_batch(batch_id)?;
    if batch.status != BatchStatus::Ready {
        return Err(invalid(&batch, "start"));
    }
    let vehicle_id = batch.vehicle_id.ok_or_else(|| {
        DispatchError::Validation(format!("batch {} has no vehicle assigned", batch_id))
    })?;

    let mut change = change_for(&batch);
    let mut vehicle = ledger.require_vehicle(vehicle_id)?;
    vehicle.status = VehicleStatus::Transporting;
    ledger.save_vehicle(&vehicle)?;
    change.vehicle = Some(vehicle);

    batch.status = BatchStatus::Transporting;
    ledger.save_batch(&batch)?;
    Ok(finish(change, batch))
}

/// Close `batch` now: `Completed`, timestamped, vehicle back to `Available`.
/// The vehicle reference stays on the batch as history.
fn complete<L: Ledger + ?Sized>(
    ledger: &mut L,
    mut batch: Batch,
    now: DateTime<Utc>,
) -> Result<BatchChange, DispatchError> {
    let mut change = change_for(&batch);
    if let Some(vehicle_id) = batch.vehicle_id {
        if let Some(mut vehicle) = ledger.vehicle(vehicle_id)? {
            vehicle.status = VehicleStatus::Available;
            ledger.save_vehicle(&vehicle)?;
            change.vehicle = Some(vehicle);
        }
    }
    batch.status = BatchStatus::Completed;
    batch.completed_at = Some(now);
    ledger.clear_open_batch(batch.id)?;
    ledger.save_batch(&batch)?;
    Ok(finish(change, batch))
}

/// `Transporting` to `Completed`.
pub fn complete_mission<L: Ledger + ?Sized>(
    ledger: &mut L,
    batch_id: i64,
    now: DateTime<Utc>,
) -> Result<BatchChange, DispatchError> {
    let batch = ledger.require_batch(batch_id)?;
    if batch.status != BatchStatus::Transporting {
        return Err(invalid(&batch, "complete"));
    }
    complete(ledger, batch, now)
}

/// Close a batch from any status. Already completed batches are returned
/// unchanged.
pub fn force_finalize<L: Ledger + ?Sized>(
    ledger: &mut L,
    batch_id: i64,
    now: DateTime<Utc>,
) -> Result<BatchChange, DispatchError> {
    let batch = ledger.require_batch(batch_id)?;
    if batch.status.is_terminal() {
        return Ok(change_for(&batch));
    }
    complete(ledger, batch, now)
}

/// Complete each `Full` batch among `ids`. Batches in any other status are
/// skipped; unknown ids fail the whole call.
pub fn finalize_full<L: Ledger + ?Sized>(
    ledger: &mut L,
    ids: &[i64],
    now: DateTime<Utc>,
) -> Result<Vec<BatchChange>, DispatchError> {
    let mut changes = Vec::new();
    for &id in ids {
        let batch = ledger.require_batch(id)?;
        if batch.status == BatchStatus::Full {
            changes.push(complete(ledger, batch, now)?);
        }
    }
    Ok(changes)
}

/// Create an empty batch named `"{name} ({class})"` with the class default
/// capacity, optionally binding a vehicle straight away.
pub fn create_batch<L: Ledger + ?Sized>(
    ledger: &mut L,
    config: &AllocatorConfig,
    request: CreateBatchRequest,
    now: DateTime<Utc>,
) -> Result<BatchChange, DispatchError> {
    let base = request.name.trim();
    if base.is_empty() {
        return Err(DispatchError::Validation(
            "batch name cannot be empty".to_string(),
        ));
    }
    let name = format!("{} ({})", base, request.size_class);
    if ledger.batch_name_exists(&name)? {
        return Err(DispatchError::Conflict(format!(
            "batch name already exists: {}",
            name
        )));
    }

    let mut batch = ledger.insert_batch(NewBatch {
        name,
        size_class: request.size_class,
        max_volume: config.default_capacity(request.size_class),
        full_threshold_percent: config.full_threshold_percent,
        created_at: now,
    })?;
    let mut change = change_for(&batch);

    if let Some(vehicle_id) = request.vehicle_id {
        bind_vehicle(ledger, &mut batch, vehicle_id, &mut change)?;
        ledger.save_batch(&batch)?;
    }
    if ledger.open_batch(batch.size_class)?.is_none() {
        ledger.set_open_batch(batch.size_class, batch.id)?;
    }

    Ok(finish(change, batch))
}

/// Rename a batch, override its capacity, or change its vehicle.
///
/// Vehicle changes follow the assignment rules and are only allowed before
/// dispatch. An explicit `max_volume` wins over the new vehicle's capacity;
/// completed batches can only be renamed.
pub fn edit_batch<L: Ledger + ?Sized>(
    ledger: &mut L,
    batch_id: i64,
    request: EditBatchRequest,
) -> Result<BatchChange, DispatchError> {
    let mut batch = ledger.require_batch(batch_id)?;
    let mut change = change_for(&batch);

    if let Some(name) = request.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(DispatchError::Validation(
                "batch name cannot be empty".to_string(),
            ));
        }
        if name != batch.name {
            if ledger.batch_name_exists(name)? {
                return Err(DispatchError::Conflict(format!(
                    "batch name already exists: {}",
                    name
                )));
            }
            batch.name = name.to_string();
        }
    }

    match request.vehicle {
        VehicleChange::Keep => {}
        VehicleChange::Set(vehicle_id) if batch.vehicle_id == Some(vehicle_id) => {}
        VehicleChange::Clear if batch.vehicle_id.is_none() => {}
        _ if !batch.status.accepts_vehicle_change() => {
            return Err(invalid(&batch, "change the vehicle of"));
        }
        VehicleChange::Clear => {
            change.released_vehicle = release_vehicle(ledger, &mut batch)?;
        }
        VehicleChange::Set(vehicle_id) => {
            bind_vehicle(ledger, &mut batch, vehicle_id, &mut change)?;
        }
    }

    if let Some(max_volume) = request.max_volume {
        if batch.status.is_terminal() {
            return Err(invalid(&batch, "resize"));
        }
        if !(max_volume.is_finite() && max_volume > 0.0) {
            return Err(DispatchError::Validation(
                "max_volume must be a positive number".to_string(),
            ));
        }
        batch.max_volume = max_volume;
    }

    if change.vehicle.is_none() {
        if let Some(vehicle_id) = batch.vehicle_id {
            change.vehicle = ledger.vehicle(vehicle_id)?;
        }
    }

    ledger.save_batch(&batch)?;
    Ok(finish(change, batch))
}

/// Delete batches and all their parcels. A non-completed batch gives its
/// vehicle back.
pub fn delete_batches<L: Ledger + ?Sized>(
    ledger: &mut L,
    ids: &[i64],
) -> Result<Vec<DeletedBatch>, DispatchError> {
    let ids = distinct_ids(ids);
    let mut deleted = Vec::with_capacity(ids.len());
    for id in ids {
        let mut batch = ledger.require_batch(id)?;
        let snapshot = batch.clone();
        let released_vehicle = if batch.status.is_terminal() {
            None
        } else {
            release_vehicle(ledger, &mut batch)?
        };
        let parcels_removed = ledger.delete_parcels_of_batch(id)?;
        ledger.clear_open_batch(id)?;
        ledger.delete_batch(id)?;
        deleted.push(DeletedBatch {
            batch: snapshot,
            parcels_removed,
            released_vehicle,
        });
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_ids_keeps_first_occurrence() {
        assert_eq!(distinct_ids(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(distinct_ids(&[]).is_empty());
    }
}
