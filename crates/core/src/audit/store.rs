use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for AuditError {
    fn from(e: rusqlite::Error) -> Self {
        AuditError::Database(e.to_string())
    }
}

/// Filter over the dispatch audit trail.
///
/// Every criterion is optional and they combine with AND. `limit` and
/// `offset` only apply to [`AuditStore::query`]; [`AuditStore::count`]
/// ignores them so the two can share one filter for paginated listings.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub batch_id: Option<i64>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditFilter {
    /// Page size when the caller does not ask for one.
    pub const DEFAULT_LIMIT: i64 = 100;
    /// Largest page a single query may return.
    pub const MAX_LIMIT: i64 = 1000;

    pub fn new() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
            ..Default::default()
        }
    }

    /// Everything recorded against one batch, from creation to deletion.
    pub fn for_batch(batch_id: i64) -> Self {
        Self::new().with_batch_id(batch_id)
    }

    pub fn with_batch_id(mut self, batch_id: i64) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Events attributed to a staff member or driver.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Select a page. Missing values fall back to the defaults; the limit is
    /// kept within `1..=MAX_LIMIT` and the offset is never negative.
    pub fn with_page(mut self, limit: Option<i64>, offset: Option<i64>) -> Self {
        self.limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        self.offset = offset.unwrap_or(0).max(0);
        self
    }
}

/// Storage for audit records.
pub trait AuditStore: Send + Sync {
    /// Insert an audit record, returns the assigned ID
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    /// Matching records, newest first
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_filter_uses_default_page() {
        let filter = AuditFilter::new();
        assert_eq!(filter.limit, AuditFilter::DEFAULT_LIMIT);
        assert_eq!(filter.offset, 0);
        assert!(filter.batch_id.is_none());
    }

    #[test]
    fn test_page_is_clamped() {
        let filter = AuditFilter::new().with_page(Some(50_000), Some(-3));
        assert_eq!(filter.limit, AuditFilter::MAX_LIMIT);
        assert_eq!(filter.offset, 0);

        let filter = AuditFilter::new().with_page(Some(0), None);
        assert_eq!(filter.limit, 1);

        let filter = AuditFilter::new().with_page(None, Some(20));
        assert_eq!(filter.limit, AuditFilter::DEFAULT_LIMIT);
        assert_eq!(filter.offset, 20);
    }

    #[test]
    fn test_for_batch() {
        let filter = AuditFilter::for_batch(12).with_event_type("batch_full");
        assert_eq!(filter.batch_id, Some(12));
        assert_eq!(filter.event_type.as_deref(), Some("batch_full"));
    }
}
