//! Pipeline stages: photo in, structured extraction out.
//!
//! Each stage is an independent module with a narrow function surface:
//!
//! - [`input`] — resolve a photo source (path, URL, data-URI) to raw bytes
//! - [`preprocess`] — decode, downscale, and re-encode within size budgets
//! - [`quality`] — optional "is this a readable receipt?" pre-check
//! - [`extract`] — one model call over all pages → [`crate::model::ExtractionResult`]
//!
//! Validation and persistence live outside this module
//! ([`crate::validate`], [`crate::ledger`]) — the pipeline ends at a parsed
//! extraction.

pub mod extract;
pub mod input;
pub mod preprocess;
pub mod quality;
