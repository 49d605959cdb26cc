//! External store interfaces consumed by the persistence layer.
//!
//! The object store and the document store are independent external systems
//! with no shared transaction; consistency between them is a policy of the
//! orchestrator (best-effort upload, authoritative document write), not a
//! property of these traits. The traits are deliberately narrow — `put` /
//! `delete` for blobs, keyed CRUD for documents — because everything else
//! the surrounding application does (queries, filters, pagination) is
//! outside this pipeline.
//!
//! [`memory`] provides in-process implementations used by the test suite and
//! handy for demos.

use thiserror::Error;

pub mod memory;

/// A storage backend failure, as reported by a store implementation.
///
/// The orchestrator decides severity: an object-store `put` failure degrades
/// into [`crate::error::UploadError`], while a document-store failure is
/// fatal ([`crate::error::LedgerError::Persistence`]).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named object or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else the backend reported.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Blob storage for receipt images.
///
/// `put` returns a URL with public or signed read access; `delete` takes
/// that URL back. Implementations map URLs to their own key scheme.
#[allow(async_fn_in_trait)]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under a backend-chosen key derived from `name`;
    /// returns the readable URL.
    async fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<String, StoreError>;

    /// Remove the object behind `url`. Callers treat failures as
    /// best-effort; implementations should still report them truthfully.
    async fn delete(&self, url: &str) -> Result<(), StoreError>;
}

/// Keyed document storage for ledger records.
///
/// Records are schemaless JSON at this boundary; the typed
/// [`crate::model::Expense`] round-trips through `serde_json::Value` on its
/// way in and out.
#[allow(async_fn_in_trait)]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record, returning its generated id.
    async fn create(
        &self,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<String, StoreError>;

    /// Merge `patch`'s top-level fields into an existing record.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Fetch a record by id; `None` when absent.
    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Remove a record by id. Deleting an absent record is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}
