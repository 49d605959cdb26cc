//! Error types for the receipt2ledger library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`LedgerError`] — **Fatal for the attempt**: the submission (or one of
//!   its stages) cannot proceed. Returned as `Err(LedgerError)` from the
//!   pipeline entry points. Most variants are recoverable from the user's
//!   side — retake the photo, retry the extraction, correct the amount — and
//!   carry enough detail to drive that retry UI.
//!
//! * [`UploadError`] — **Non-fatal**: a single receipt image failed to reach
//!   the object store. Collected into
//!   [`crate::ledger::SubmissionOutcome::failed_uploads`] so callers can see
//!   the degraded result rather than losing the financial record to a
//!   storage hiccup.
//!
//! The one genuinely terminal case is [`LedgerError::Persistence`]: the
//! document write failed, so nothing was saved.

use thiserror::Error;

/// All fatal errors returned by the receipt2ledger library.
///
/// Per-image upload failures use [`UploadError`] and are surfaced in
/// [`crate::ledger::SubmissionOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ── Capture errors ────────────────────────────────────────────────────
    /// The source photo could not be decoded as an image.
    #[error("Cannot decode photo: {detail}\nRetake the photo and try again.")]
    ImageDecode { detail: String },

    /// A capture session with zero images cannot be analyzed or submitted.
    #[error("The capture session is empty — add at least one photo first")]
    EmptySession,

    /// The quality gate judged the representative image unusable.
    #[error("Photo rejected by the quality check: {reason}")]
    UnusableImage { reason: String },

    /// Downloading a photo from a URL failed.
    #[error("Failed to fetch photo from '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The model endpoint could not be reached (or kept failing) — transient,
    /// the caller may retry the same capture.
    #[error("Receipt extraction unavailable after {retries} attempts: {detail}")]
    ExtractionUnavailable { retries: u32, detail: String },

    /// The model responded, but its output could not be turned into a
    /// complete extraction result. Retry, or fall back to manual entry.
    #[error("Could not read the receipt from the model output: {detail}")]
    ExtractionParse { detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Validation errors ─────────────────────────────────────────────────
    /// The line items do not add up to the stated amount.
    ///
    /// Carries both totals so the caller can present a precise correction
    /// prompt instead of a bare "invalid input".
    #[error("Amount mismatch: line items total {expected}, but amount is {got}")]
    AmountMismatch { expected: i64, got: i64 },

    /// A required submission field is missing or empty.
    #[error("Required field '{field}' is missing")]
    MissingField { field: &'static str },

    /// A line item is malformed (negative price, zero quantity).
    #[error("Invalid line item '{name}': {detail}")]
    InvalidItem { name: String, detail: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// The ledger record itself could not be written. Nothing was saved.
    #[error("Ledger write failed: {detail}")]
    Persistence { detail: String },

    /// No ledger record exists under the given id.
    #[error("Expense '{id}' not found")]
    NotFound { id: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal upload failure for a single receipt image.
///
/// Stored in [`crate::ledger::SubmissionOutcome::failed_uploads`] when an
/// image could not be placed in the object store. The submission continues:
/// the ledger record is written with the URLs that did succeed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("Image #{ordinal} ('{name}') failed to upload: {detail}")]
pub struct UploadError {
    /// Capture-order position of the failed image.
    pub ordinal: usize,
    /// Object name the upload was attempted under.
    pub name: String,
    /// Human-readable failure description from the store.
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_mismatch_display_carries_both_totals() {
        let e = LedgerError::AmountMismatch {
            expected: 250,
            got: 300,
        };
        let msg = e.to_string();
        assert!(msg.contains("250"), "got: {msg}");
        assert!(msg.contains("300"), "got: {msg}");
    }

    #[test]
    fn extraction_unavailable_display() {
        let e = LedgerError::ExtractionUnavailable {
            retries: 3,
            detail: "connection reset".into(),
        };
        assert!(e.to_string().contains("3 attempts"));
        assert!(e.to_string().contains("connection reset"));
    }

    #[test]
    fn missing_field_display() {
        let e = LedgerError::MissingField { field: "walletId" };
        assert!(e.to_string().contains("walletId"));
    }

    #[test]
    fn upload_error_display() {
        let e = UploadError {
            ordinal: 1,
            name: "receipt-01.jpg".into(),
            detail: "503 from backend".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("#1"));
        assert!(msg.contains("receipt-01.jpg"));
        assert!(msg.contains("503"));
    }
}
