//! Flight catalog seam.
//!
//! The aggregator reads catalog records for a route to merge with live
//! results; the sync scheduler upserts normalized records into it. Upserts
//! are keyed by [`FlightIdentity`], so replaying a sync never duplicates.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::DbErr;
use thiserror::Error;

use crate::models::flight_record::{CanonicalFlightRecord, FlightIdentity};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Database(#[from] DbErr),
    #[error("stored flight record is unreadable: {details}")]
    Corrupt { details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[async_trait]
pub trait FlightCatalog: Send + Sync {
    /// Insert the record, or overwrite the stored one with the same identity.
    async fn upsert(&self, record: &CanonicalFlightRecord) -> Result<UpsertOutcome, CatalogError>;

    /// Records flying `origin` → `destination` departing on `date` (UTC).
    async fn find_route(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<CanonicalFlightRecord>, CatalogError>;

    async fn count(&self) -> Result<u64, CatalogError>;
}

/// Process-local catalog.
#[derive(Debug, Default)]
pub struct InMemoryFlightCatalog {
    inner: Mutex<CatalogState>,
}

#[derive(Debug, Default)]
struct CatalogState {
    records: Vec<CanonicalFlightRecord>,
    index: HashMap<FlightIdentity, usize>,
}

impl InMemoryFlightCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record in insertion order.
    pub fn records(&self) -> Vec<CanonicalFlightRecord> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }
}

#[async_trait]
impl FlightCatalog for InMemoryFlightCatalog {
    async fn upsert(&self, record: &CanonicalFlightRecord) -> Result<UpsertOutcome, CatalogError> {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let identity = record.identity();
        match state.index.get(&identity).copied() {
            Some(idx) => {
                state.records[idx] = record.clone();
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let idx = state.records.len();
                state.records.push(record.clone());
                state.index.insert(identity, idx);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn find_route(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<CanonicalFlightRecord>, CatalogError> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .records
            .iter()
            .filter(|r| {
                r.origin.eq_ignore_ascii_case(origin)
                    && r.destination.eq_ignore_ascii_case(destination)
                    && r.departure_time.is_some_and(|t| t.date_naive() == date)
            })
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, CatalogError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len() as u64)
    }
}
