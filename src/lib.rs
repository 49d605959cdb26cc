//! # receipt2ledger
//!
//! Turn photographed paper receipts into validated household-ledger records
//! using Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Typing a grocery receipt into a ledger by hand is the chore that kills
//! household bookkeeping. This crate takes the photos instead: it bounds and
//! re-encodes each capture, lets a VLM read the receipt as a human would,
//! reconciles the extracted fields with the user's corrections, and persists
//! a record whose line items provably add up — while treating image storage
//! as best-effort so a storage hiccup never loses the financial entry.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo(s)
//!  │
//!  ├─ 1. Input       resolve path / URL / data-URI to raw bytes
//!  ├─ 2. Preprocess  downscale + JPEG re-encode within size budgets
//!  ├─ 3. Session     ordered pages of one physical receipt
//!  ├─ 4. Quality     optional "is this a readable receipt?" gate
//!  ├─ 5. Extract     one VLM call over all pages → structured fields
//!  ├─ 6. Reconcile   merge user corrections, enforce amount == Σ items
//!  └─ 7. Persist     best-effort image uploads + authoritative record write
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt2ledger::{
//!     analyze_capture, reconcile, ActorContext, CaptureSession, ExpenseDraft,
//!     FieldOverrides, Ledger, MemoryDocumentStore, MemoryObjectStore, PipelineConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::default();
//!
//!     let mut session = CaptureSession::new();
//!     session.add_raw(&std::fs::read("receipt-page-1.jpg")?, &config)?;
//!     session.add_raw(&std::fs::read("receipt-page-2.jpg")?, &config)?;
//!
//!     // Show the extraction to the user, collect their corrections…
//!     let extraction = analyze_capture(&session, &config).await?;
//!     let overrides = FieldOverrides {
//!         category_id: Some("groceries".into()),
//!         wallet_id: Some("cash".into()),
//!         ..Default::default()
//!     };
//!     let validated = reconcile(ExpenseDraft::from_extraction(extraction), overrides)?;
//!
//!     let ledger = Ledger::new(MemoryObjectStore::new(), MemoryDocumentStore::new());
//!     let ctx = ActorContext::new("user-1", "household-1");
//!     let outcome = ledger.submit(&ctx, validated, session.into_images()).await?;
//!     println!("stored as {}", outcome.record.expense_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt2ledger` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! receipt2ledger = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod flow;
pub mod ledger;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod store;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{LedgerError, UploadError};
pub use flow::{analyze_capture, capture_to_ledger, resolve_provider};
pub use ledger::{Ledger, SubmissionOutcome};
pub use model::{
    ActorContext, EncodedImage, Expense, ExpenseItem, ExtractionResult, ReceiptImages,
};
pub use pipeline::quality::QualityVerdict;
pub use progress::{NoopSubmissionProgress, ProgressCallback, SubmissionProgress};
pub use session::{CaptureSession, CapturedImage};
pub use store::memory::{MemoryDocumentStore, MemoryObjectStore};
pub use store::{DocumentStore, ObjectStore, StoreError};
pub use validate::{reconcile, ExpenseDraft, FieldOverrides, ValidatedExpense};
