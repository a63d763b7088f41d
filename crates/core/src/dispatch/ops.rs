//! Role-checked entry points over a [`DispatchStore`].
//!
//! [`Dispatcher::admin`] and [`Dispatcher::driver`] check the caller's role
//! once and hand back an operations object; every mutation made through it
//! is attributed to that caller in the audit log and counted in metrics.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::{
    AllocatorConfig, Allocation, Batch, BatchChange, BatchFilter, BatchOrigin, BatchStatus,
    ConfirmParcelRequest, CreateBatchRequest, DeletedBatch, DispatchError, DispatchStore,
    EditBatchRequest, Parcel, Vehicle, VehicleChange, VehicleFilter, VehicleSpec,
};
use crate::audit::{AuditEvent, AuditHandle};
use crate::auth::{Identity, Role};
use crate::metrics;

/// Shared dispatch service: store, allocator policy and audit sink.
pub struct Dispatcher {
    store: Arc<dyn DispatchStore>,
    config: AllocatorConfig,
    audit: Option<AuditHandle>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DispatchStore>, config: AllocatorConfig) -> Self {
        Self {
            store,
            config,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Read access for listings and lookups.
    pub fn store(&self) -> &dyn DispatchStore {
        self.store.as_ref()
    }

    /// Staff operations. Fails with `Forbidden` unless the caller is an admin.
    pub fn admin(&self, identity: &Identity) -> Result<AdminOps<'_>, DispatchError> {
        if !identity.is_admin() {
            return Err(DispatchError::Forbidden(format!(
                "user {} is not an admin",
                identity.user_id
            )));
        }
        Ok(AdminOps {
            dispatcher: self,
            actor: identity.user_id.clone(),
        })
    }

    /// Driver operations, scoped to vehicles whose driver name matches the
    /// caller. Fails with `Forbidden` unless the caller is a driver.
    pub fn driver(&self, identity: &Identity) -> Result<DriverOps<'_>, DispatchError> {
        if identity.role != Role::Driver {
            return Err(DispatchError::Forbidden(format!(
                "user {} is not a driver",
                identity.user_id
            )));
        }
        Ok(DriverOps {
            dispatcher: self,
            driver: identity.user_id.clone(),
        })
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.try_emit(event);
        }
    }

    /// Count status transitions and warnings carried by a change.
    fn record(&self, change: &BatchChange) {
        if change.status_changed() {
            metrics::BATCH_TRANSITIONS
                .with_label_values(&[change.previous_status.as_str(), change.batch.status.as_str()])
                .inc();
        }
        for warning in &change.warnings {
            metrics::CAPACITY_WARNINGS
                .with_label_values(&[warning.kind()])
                .inc();
            warn!(batch_id = change.batch.id, warning = ?warning, "Capacity warning");
        }
    }

    fn record_created(&self, batch: &Batch, origin: BatchOrigin, user_id: Option<&str>) {
        metrics::BATCHES_CREATED
            .with_label_values(&[origin.as_str()])
            .inc();
        self.emit(AuditEvent::BatchCreated {
            batch_id: batch.id,
            name: batch.name.clone(),
            size_class: batch.size_class.to_string(),
            max_volume: batch.max_volume,
            origin: origin.as_str().to_string(),
            user_id: user_id.map(String::from),
        });
    }
}

/// Operations available to staff.
pub struct AdminOps<'a> {
    dispatcher: &'a Dispatcher,
    actor: String,
}

impl AdminOps<'_> {
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Store a confirmed parcel in the open batch of its size class.
    pub fn confirm_parcel(
        &self,
        mut request: ConfirmParcelRequest,
    ) -> Result<Allocation, DispatchError> {
        let d = self.dispatcher;
        request.created_by = self.actor.clone();
        let allocation = d.store.allocate(&d.config, request)?;

        let class = allocation.batch.size_class.as_str();
        metrics::PARCELS_ALLOCATED.with_label_values(&[class]).inc();
        metrics::PARCEL_VOLUME
            .with_label_values(&[class])
            .observe(allocation.parcel.volume);

        if allocation.created_batch {
            d.record_created(&allocation.batch, BatchOrigin::Auto, None);
        }
        d.emit(AuditEvent::ParcelConfirmed {
            parcel_id: allocation.parcel.id,
            batch_id: allocation.batch.id,
            user_id: self.actor.clone(),
            external_id: allocation.parcel.external_id.clone(),
            volume: allocation.parcel.volume,
            size_class: class.to_string(),
        });

        if allocation.became_full {
            metrics::BATCH_TRANSITIONS
                .with_label_values(&[BatchStatus::InProgress.as_str(), BatchStatus::Full.as_str()])
                .inc();
            d.emit(AuditEvent::BatchFull {
                batch_id: allocation.batch.id,
                current_volume: allocation.batch.current_volume,
                max_volume: allocation.batch.max_volume,
                successor_batch_id: allocation.successor.as_ref().map(|b| b.id),
            });
            if let Some(ref successor) = allocation.successor {
                d.record_created(successor, BatchOrigin::Successor, None);
            }
            info!(
                batch_id = allocation.batch.id,
                successor = ?allocation.successor.as_ref().map(|b| b.id),
                "Batch full"
            );
        }

        info!(
            parcel_id = allocation.parcel.id,
            batch_id = allocation.batch.id,
            size_class = class,
            "Parcel allocated"
        );
        Ok(allocation)
    }

    /// Delete parcels and release their volume. All-or-nothing.
    pub fn delete_parcels(&self, ids: &[i64]) -> Result<Vec<Parcel>, DispatchError> {
        let removed = self.dispatcher.store.delete_parcels(ids)?;
        for parcel in &removed {
            self.dispatcher.emit(AuditEvent::ParcelDeleted {
                parcel_id: parcel.id,
                batch_id: parcel.batch_id,
                user_id: self.actor.clone(),
                volume: parcel.volume,
            });
        }
        info!(count = removed.len(), user = %self.actor, "Parcels deleted");
        Ok(removed)
    }

    pub fn create_batch(&self, request: CreateBatchRequest) -> Result<BatchChange, DispatchError> {
        let d = self.dispatcher;
        let change = d.store.create_batch(&d.config, request)?;
        d.record_created(&change.batch, BatchOrigin::Manual, Some(&self.actor));
        self.emit_assignment(&change);
        d.record(&change);
        info!(batch_id = change.batch.id, name = %change.batch.name, "Batch created");
        Ok(change)
    }

    pub fn edit_batch(
        &self,
        batch_id: i64,
        request: EditBatchRequest,
    ) -> Result<BatchChange, DispatchError> {
        let d = self.dispatcher;
        let vehicle_change = request.vehicle;
        let change = d.store.edit_batch(batch_id, request)?;

        d.emit(AuditEvent::BatchEdited {
            batch_id,
            user_id: self.actor.clone(),
            name: change.batch.name.clone(),
            max_volume: change.batch.max_volume,
        });
        match vehicle_change {
            VehicleChange::Set(_) => self.emit_assignment(&change),
            VehicleChange::Clear => {
                if let Some(ref released) = change.released_vehicle {
                    d.emit(AuditEvent::VehicleReleased {
                        batch_id,
                        vehicle_id: released.id,
                        user_id: self.actor.clone(),
                    });
                }
            }
            VehicleChange::Keep => {}
        }
        d.record(&change);
        Ok(change)
    }

    pub fn assign_vehicle(
        &self,
        batch_id: i64,
        vehicle_id: i64,
    ) -> Result<BatchChange, DispatchError> {
        let change = self.dispatcher.store.assign_vehicle(batch_id, vehicle_id)?;
        self.emit_assignment(&change);
        self.dispatcher.record(&change);
        info!(batch_id, vehicle_id, "Vehicle assigned");
        Ok(change)
    }

    pub fn dispatch(&self, batch_id: i64) -> Result<BatchChange, DispatchError> {
        let d = self.dispatcher;
        let change = d.store.dispatch(batch_id, d.config.low_load_percent)?;
        d.emit(AuditEvent::BatchDispatched {
            batch_id,
            user_id: self.actor.clone(),
            load_percent: change.batch.load_percent(),
            low_load: !change.warnings.is_empty(),
        });
        d.record(&change);
        info!(batch_id, load_percent = change.batch.load_percent(), "Batch dispatched");
        Ok(change)
    }

    /// Close a batch from any status. Completed batches are left as they are.
    pub fn force_finalize(&self, batch_id: i64) -> Result<BatchChange, DispatchError> {
        let change = self.dispatcher.store.force_finalize(batch_id)?;
        if change.status_changed() {
            self.emit_finalized(&change);
        }
        Ok(change)
    }

    /// Complete every `Full` batch among `ids`, skipping the rest.
    pub fn finalize_full(&self, ids: &[i64]) -> Result<Vec<BatchChange>, DispatchError> {
        let changes = self.dispatcher.store.finalize_full(ids)?;
        for change in &changes {
            self.emit_finalized(change);
        }
        info!(
            requested = ids.len(),
            finalized = changes.len(),
            "Bulk finalize"
        );
        Ok(changes)
    }

    pub fn delete_batches(&self, ids: &[i64]) -> Result<Vec<DeletedBatch>, DispatchError> {
        let deleted = self.dispatcher.store.delete_batches(ids)?;
        for entry in &deleted {
            self.dispatcher.emit(AuditEvent::BatchDeleted {
                batch_id: entry.batch.id,
                user_id: self.actor.clone(),
                previous_status: entry.batch.status.to_string(),
                parcels_removed: entry.parcels_removed,
            });
        }
        info!(count = deleted.len(), user = %self.actor, "Batches deleted");
        Ok(deleted)
    }

    pub fn create_vehicle(&self, spec: VehicleSpec) -> Result<Vehicle, DispatchError> {
        let vehicle = self.dispatcher.store.create_vehicle(spec)?;
        self.dispatcher.emit(AuditEvent::VehicleCreated {
            vehicle_id: vehicle.id,
            user_id: self.actor.clone(),
            vehicle_uid: vehicle.vehicle_uid.clone(),
            plate_number: vehicle.plate_number.clone(),
        });
        Ok(vehicle)
    }

    pub fn update_vehicle(&self, id: i64, spec: VehicleSpec) -> Result<Vehicle, DispatchError> {
        let vehicle = self.dispatcher.store.update_vehicle(id, spec)?;
        self.dispatcher.emit(AuditEvent::VehicleUpdated {
            vehicle_id: vehicle.id,
            user_id: self.actor.clone(),
            status: vehicle.status.to_string(),
        });
        Ok(vehicle)
    }

    pub fn delete_vehicle(&self, id: i64) -> Result<Vehicle, DispatchError> {
        let vehicle = self.dispatcher.store.delete_vehicle(id)?;
        self.dispatcher.emit(AuditEvent::VehicleDeleted {
            vehicle_id: vehicle.id,
            user_id: self.actor.clone(),
            plate_number: vehicle.plate_number.clone(),
        });
        Ok(vehicle)
    }

    fn emit_assignment(&self, change: &BatchChange) {
        if let Some(ref vehicle) = change.vehicle {
            self.dispatcher.emit(AuditEvent::VehicleAssigned {
                batch_id: change.batch.id,
                vehicle_id: vehicle.id,
                user_id: self.actor.clone(),
                released_vehicle_id: change.released_vehicle.as_ref().map(|v| v.id),
                over_capacity: !change.warnings.is_empty(),
            });
        }
    }

    fn emit_finalized(&self, change: &BatchChange) {
        self.dispatcher.emit(AuditEvent::BatchFinalized {
            batch_id: change.batch.id,
            user_id: self.actor.clone(),
            previous_status: change.previous_status.to_string(),
        });
        self.dispatcher.record(change);
        info!(batch_id = change.batch.id, from = %change.previous_status, "Batch finalized");
    }
}

/// A driver's vehicles and their pending trips.
#[derive(Debug, Clone, Serialize)]
pub struct Missions {
    pub vehicles: Vec<Vehicle>,
    /// Batches in `Ready` or `Transporting` bound to those vehicles.
    pub batches: Vec<Batch>,
}

/// Operations available to a driver on their own vehicles' batches.
pub struct DriverOps<'a> {
    dispatcher: &'a Dispatcher,
    driver: String,
}

impl DriverOps<'_> {
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn missions(&self) -> Result<Missions, DispatchError> {
        let store = &self.dispatcher.store;
        let vehicles = store.list_vehicles(&VehicleFilter::new().with_driver(self.driver.clone()))?;
        let batches = store.list_batches(
            &BatchFilter::new()
                .with_vehicles(vehicles.iter().map(|v| v.id).collect())
                .with_status(BatchStatus::Ready)
                .with_status(BatchStatus::Transporting),
        )?;
        Ok(Missions { vehicles, batches })
    }

    pub fn start_mission(&self, batch_id: i64) -> Result<BatchChange, DispatchError> {
        let vehicle = self.owned_vehicle(batch_id)?;
        let change = self.dispatcher.store.start_mission(batch_id)?;
        self.dispatcher.emit(AuditEvent::MissionStarted {
            batch_id,
            vehicle_id: vehicle.id,
            driver: self.driver.clone(),
        });
        self.dispatcher.record(&change);
        info!(batch_id, driver = %self.driver, "Mission started");
        Ok(change)
    }

    pub fn complete_mission(&self, batch_id: i64) -> Result<BatchChange, DispatchError> {
        let vehicle = self.owned_vehicle(batch_id)?;
        let change = self.dispatcher.store.complete_mission(batch_id)?;
        self.dispatcher.emit(AuditEvent::MissionCompleted {
            batch_id,
            vehicle_id: vehicle.id,
            driver: self.driver.clone(),
        });
        self.dispatcher.record(&change);
        info!(batch_id, driver = %self.driver, "Mission completed");
        Ok(change)
    }

    /// The batch's vehicle, if this driver operates it.
    fn owned_vehicle(&self, batch_id: i64) -> Result<Vehicle, DispatchError> {
        let store = &self.dispatcher.store;
        let batch = store
            .get_batch(batch_id)?
            .ok_or_else(|| DispatchError::batch_not_found(batch_id))?;
        let vehicle = match batch.vehicle_id {
            Some(id) => store.get_vehicle(id)?,
            None => None,
        };
        match vehicle {
            Some(vehicle) if vehicle.is_driven_by(&self.driver) => Ok(vehicle),
            _ => Err(DispatchError::Forbidden(format!(
                "batch {} is not assigned to driver {}",
                batch_id, self.driver
            ))),
        }
    }
}
