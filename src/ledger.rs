//! Persistence orchestration: validated submission → stored ledger record.
//!
//! ## The partial-failure policy
//!
//! Image uploads are attempted before the record write, fan-out/fan-in, and
//! are strictly **best-effort**: a failed upload is logged, reported in the
//! outcome, and never blocks or rolls back the record write. Losing the
//! financial record over a storage hiccup is worse than losing a photo. The
//! document write is the single authoritative step — its failure is the only
//! thing reported as a failed submission.
//!
//! One submission moves through: idle → uploading (concurrent, per-image) →
//! writing → done; upload failures route into the write anyway with a
//! degraded URL list. [`crate::progress::SubmissionProgress`] mirrors those
//! transitions for observers.

use crate::error::{LedgerError, UploadError};
use crate::model::{ActorContext, Expense, ReceiptImages};
use crate::progress::{NoopSubmissionProgress, ProgressCallback};
use crate::session::CapturedImage;
use crate::store::{DocumentStore, ObjectStore, StoreError};
use crate::validate::ValidatedExpense;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a persisted submission.
///
/// `failed_uploads` being non-empty means a *degraded* success: the record
/// exists, some photos do not. Callers surface those as warnings, not
/// failures.
#[derive(Debug)]
pub struct SubmissionOutcome {
    /// The stored record, id assigned.
    pub record: Expense,
    /// Images that never reached the object store, in capture order.
    pub failed_uploads: Vec<UploadError>,
}

impl SubmissionOutcome {
    /// True when every image made it to storage.
    pub fn is_complete(&self) -> bool {
        self.failed_uploads.is_empty()
    }
}

/// The ledger: writes validated expenses against an object store and a
/// document store.
///
/// The two stores are independent systems with no shared transaction;
/// consistency is policy (see module docs), not two-phase commit.
pub struct Ledger<O, D> {
    objects: O,
    documents: D,
    collection: String,
    upload_concurrency: usize,
    progress: ProgressCallback,
}

impl<O: ObjectStore, D: DocumentStore> Ledger<O, D> {
    pub fn new(objects: O, documents: D) -> Self {
        Self {
            objects,
            documents,
            collection: "expenses".into(),
            upload_concurrency: 4,
            progress: Arc::new(NoopSubmissionProgress),
        }
    }

    /// Use a collection name other than `"expenses"`.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_upload_concurrency(mut self, n: usize) -> Self {
        self.upload_concurrency = n.max(1);
        self
    }

    /// Observe submissions via a [`crate::progress::SubmissionProgress`].
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Persist a new expense, uploading `images` first (best-effort).
    ///
    /// # Errors
    /// Only [`LedgerError::Persistence`] (the record write failed — nothing
    /// was saved) and [`LedgerError::Internal`]. Upload failures are *not*
    /// errors here; they degrade the outcome instead.
    pub async fn submit(
        &self,
        ctx: &ActorContext,
        validated: ValidatedExpense,
        images: Vec<CapturedImage>,
    ) -> Result<SubmissionOutcome, LedgerError> {
        // ── Step 1: Upload images (best-effort) ──────────────────────────
        let (urls, failed_uploads) = self.upload_all(&images).await;

        // ── Step 2: Write the record (authoritative) ─────────────────────
        self.progress.on_write_start();
        let now_ms = Utc::now().timestamp_millis();
        let mut record = validated.into_expense(ctx, ReceiptImages::Current(urls), now_ms);

        let body = serde_json::to_value(&record)
            .map_err(|e| LedgerError::Internal(format!("record serialisation: {e}")))?;
        let id = self
            .documents
            .create(&self.collection, body)
            .await
            .map_err(persistence_error)?;
        record.expense_id = id;

        let uploaded = record.receipt_image_url.urls().len();
        self.progress.on_complete(uploaded, failed_uploads.len());
        info!(
            "Expense {} stored for household {} ({} of {} images uploaded)",
            record.expense_id,
            ctx.household_id,
            uploaded,
            images.len()
        );

        Ok(SubmissionOutcome {
            record,
            failed_uploads,
        })
    }

    /// Re-persist an existing expense with revalidated fields.
    ///
    /// `new_images = None` leaves the stored image list untouched — an edit
    /// of amount or category never disturbs the photos. Supplying images
    /// uploads them (best-effort, as in [`Ledger::submit`]) and replaces the
    /// list with the URLs that succeeded.
    pub async fn update(
        &self,
        ctx: &ActorContext,
        id: &str,
        validated: ValidatedExpense,
        new_images: Option<Vec<CapturedImage>>,
    ) -> Result<SubmissionOutcome, LedgerError> {
        let existing = self
            .documents
            .get(&self.collection, id)
            .await
            .map_err(persistence_error)?;
        if existing.is_none() {
            return Err(LedgerError::NotFound { id: id.to_string() });
        }

        let mut patch = json!({
            "amount": validated.amount(),
            "date": validated.date().timestamp_millis(),
            "storeName": validated.store_name(),
            "categoryId": validated.category_id(),
            "walletId": validated.wallet_id(),
            "expenseTypeId": validated.expense_type_id(),
            "items": validated.items(),
            "memo": validated.memo(),
            "updatedAt": Utc::now().timestamp_millis(),
            "updatedBy": ctx.user_id.clone(),
        });

        let mut failed_uploads = Vec::new();
        if let Some(images) = &new_images {
            let (urls, failed) = self.upload_all(images).await;
            patch["receiptImageUrl"] = json!(urls);
            failed_uploads = failed;
        }

        self.progress.on_write_start();
        self.documents
            .update(&self.collection, id, patch)
            .await
            .map_err(persistence_error)?;

        let record = self
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound { id: id.to_string() })?;

        info!("Expense {} updated by {}", id, ctx.user_id);
        Ok(SubmissionOutcome {
            record,
            failed_uploads,
        })
    }

    /// Fetch an expense, normalising the legacy image field at the boundary.
    pub async fn get(&self, id: &str) -> Result<Option<Expense>, LedgerError> {
        let Some(body) = self
            .documents
            .get(&self.collection, id)
            .await
            .map_err(persistence_error)?
        else {
            return Ok(None);
        };

        let mut record: Expense = serde_json::from_value(body)
            .map_err(|e| LedgerError::Internal(format!("stored record is malformed: {e}")))?;
        record.expense_id = id.to_string();
        record.normalize_images();
        Ok(Some(record))
    }

    /// Delete an expense and (best-effort) its stored images.
    ///
    /// Every image deletion failure — already gone, malformed URL, backend
    /// error — is logged individually and swallowed: it must not stop the
    /// remaining images from being attempted, and it must never stop the
    /// record itself from being removed.
    pub async fn delete(&self, id: &str) -> Result<(), LedgerError> {
        let record = self
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound { id: id.to_string() })?;

        let urls = record.receipt_image_url.urls();
        if !urls.is_empty() {
            debug!("Deleting {} stored image(s) for expense {}", urls.len(), id);
        }
        for url in urls {
            if let Err(e) = self.objects.delete(url).await {
                warn!("Could not delete stored image '{url}' for expense {id}: {e}");
            }
        }

        self.documents
            .delete(&self.collection, id)
            .await
            .map_err(persistence_error)?;
        info!("Expense {} deleted", id);
        Ok(())
    }

    /// Fan the image uploads out, then fold the results back into capture
    /// order.
    ///
    /// Completion order is irrelevant; each result carries its ordinal and
    /// the final sort restores the original page order for both the URL list
    /// and the failure list.
    async fn upload_all(
        &self,
        images: &[CapturedImage],
    ) -> (Vec<String>, Vec<UploadError>) {
        let total = images.len();
        if total == 0 {
            return (Vec::new(), Vec::new());
        }
        self.progress.on_uploads_start(total);

        let mut results: Vec<(usize, Result<String, UploadError>)> =
            stream::iter(images.iter().map(|captured| {
                let name = format!(
                    "receipt-{:02}.{}",
                    captured.ordinal,
                    captured.image.extension()
                );
                async move {
                    let outcome = self
                        .objects
                        .put(&captured.image.bytes, &name, &captured.image.mime_type)
                        .await;
                    match outcome {
                        Ok(url) => {
                            self.progress.on_upload_complete(captured.ordinal, total, &url);
                            (captured.ordinal, Ok(url))
                        }
                        Err(e) => {
                            warn!(
                                "Upload of image #{} ('{}') failed: {e}",
                                captured.ordinal, name
                            );
                            self.progress
                                .on_upload_error(captured.ordinal, total, &e.to_string());
                            (
                                captured.ordinal,
                                Err(UploadError {
                                    ordinal: captured.ordinal,
                                    name,
                                    detail: e.to_string(),
                                }),
                            )
                        }
                    }
                }
            }))
            .buffer_unordered(self.upload_concurrency)
            .collect()
            .await;

        results.sort_by_key(|(ordinal, _)| *ordinal);

        let mut urls = Vec::new();
        let mut failed = Vec::new();
        for (_, result) in results {
            match result {
                Ok(url) => urls.push(url),
                Err(e) => failed.push(e),
            }
        }
        (urls, failed)
    }
}

fn persistence_error(e: StoreError) -> LedgerError {
    LedgerError::Persistence {
        detail: e.to_string(),
    }
}
