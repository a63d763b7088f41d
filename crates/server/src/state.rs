use std::sync::Arc;

use parcelhub_core::{
    config::UploadsConfig, AuditHandle, AuditStore, Authenticator, Config, Dispatcher,
    MeasurementProvider, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    dispatcher: Arc<Dispatcher>,
    measurement: Option<Arc<dyn MeasurementProvider>>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        dispatcher: Arc<Dispatcher>,
        measurement: Option<Arc<dyn MeasurementProvider>>,
    ) -> Self {
        Self {
            config,
            authenticator,
            audit,
            audit_store,
            dispatcher,
            measurement,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher.as_ref()
    }

    /// The measurement backend, if one is configured.
    pub fn measurement(&self) -> Option<&Arc<dyn MeasurementProvider>> {
        self.measurement.as_ref()
    }

    pub fn uploads(&self) -> &UploadsConfig {
        &self.config.uploads
    }
}
