//! Prompts for receipt extraction and the quality pre-check.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the JSON field names the prompts request
//!    must stay in lock-step with the structs `pipeline::extract` and
//!    `pipeline::quality` deserialise; one file to check when either changes.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    calling a real model, making contract regressions easy to catch.
//!
//! Callers can override the extraction prompt via
//! [`crate::config::PipelineConfig::extraction_prompt`]; the constants here
//! are used only when no override is provided.

/// Default prompt for extracting structured fields from receipt photos.
///
/// All pages of one receipt are attached to a single request carrying this
/// prompt, so the totals the model reports cover the receipt as a whole.
pub const RECEIPT_EXTRACTION_PROMPT: &str = r#"You are an assistant that reads photographed paper receipts. Extract the following information from the receipt image(s) and return it as JSON. When several images are attached they are consecutive pages of the SAME receipt — report one combined result, never per-page totals.

Fields to extract:
- storeName: the store or merchant name
- date: purchase date and time, ISO 8601 (e.g. "2025-10-24T15:30:00+09:00")
- totalAmount: the receipt total (number)
- tax: the tax portion of the total (number)
- items: array of line items
  - name: item name
  - price: unit price (number)
  - quantity: quantity (number)

Rules:
- All numbers must be integers in the smallest currency unit
- If the date is illegible, use the current time
- If the line items are illegible, return an empty array
- Respond with ONLY the JSON object, no extra commentary

Response format:
{
  "storeName": "Example Store",
  "date": "2025-10-24T15:30:00+09:00",
  "totalAmount": 3580,
  "tax": 258,
  "items": [
    {
      "name": "item name",
      "price": 198,
      "quantity": 1
    }
  ]
}"#;

/// Prompt for the optional quality pre-check on a representative image.
///
/// The verdict fields (`isReceipt`, `isReadable`, `reason`) are what
/// `pipeline::quality` deserialises; a missing or malformed verdict is
/// treated as "not usable".
pub const QUALITY_CHECK_PROMPT: &str = r#"Is this image a paper receipt, and is it readable enough to transcribe? Judge by:
- receipt-like layout (store name, amounts, an itemised list)
- text sharp enough to read
- exposure neither far too dark nor blown out

Return your verdict as JSON:
{
  "isReceipt": true/false,
  "isReadable": true/false,
  "reason": "short explanation"
}"#;
