//! The remote side of a sync: paginated record fetching and mapping into
//! local storage shapes.

pub mod client;
pub mod mapper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::models::common::EntityType;

/// Default number of records per fetch.
pub const DEFAULT_PAGE_LIMIT: u32 = 200;
/// Hard ceiling the source API enforces on page size.
pub const MAX_PAGE_LIMIT: u32 = 500;

/// One page of raw records from the source.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<serde_json::Value>,
    /// Total matching records when the source reports it.
    pub total_count: Option<u64>,
    pub has_more: bool,
}

/// A paginated, read-only record source. The sync engine is written against
/// this trait so tests can script pages without a network.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch one page of `entity_type` records starting at `offset`.
    ///
    /// `modified_since` narrows the result to records modified after the
    /// given instant; callers must only pass it when
    /// [`supports_modified_filter`](RecordSource::supports_modified_filter)
    /// returns true.
    async fn fetch_page(
        &self,
        entity_type: EntityType,
        offset: u64,
        limit: u32,
        modified_since: Option<DateTime<Utc>>,
    ) -> std::result::Result<RecordPage, FetchError>;

    /// Whether the source can filter by modification time. Offset paging is
    /// the guaranteed-safe fallback when it cannot.
    fn supports_modified_filter(&self) -> bool {
        false
    }
}
