pub mod audit;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod measurement;
pub mod metrics;
pub mod testing;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, NoneAuthenticator,
    Role,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use dispatch::{
    AdminOps, AllocatorConfig, Allocation, Batch, BatchChange, BatchFilter, BatchStatus,
    CapacityWarning, ConfirmParcelRequest, CreateBatchRequest, DispatchError, DispatchStats,
    DispatchStore, Dispatcher, DriverOps, EditBatchRequest, Parcel, ParcelFilter, SizeClass,
    SqliteDispatchStore, Vehicle, VehicleChange, VehicleFilter, VehicleSpec, VehicleStatus,
};
pub use measurement::{
    create_measurement_provider, ImageUpload, Measurement, MeasurementConfig, MeasurementError,
    MeasurementProvider,
};
