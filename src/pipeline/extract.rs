//! Receipt extraction: one model call over all pages of one receipt.
//!
//! Every image in the capture session is attached to a single request — a
//! two-page receipt analysed page-by-page would double-count its totals, so
//! multi-page receipts are always submitted as one logical unit.
//!
//! The model returns free-form text that should contain one JSON object,
//! possibly fenced, possibly wrapped in prose. All of the heuristics for
//! locating and validating that object live here, behind
//! [`parse_extraction`], so the parsing can be hardened without touching
//! validation or persistence code.
//!
//! ## Retry Strategy
//!
//! Transport failures (timeouts, 429/503) retry with exponential backoff
//! (`retry_backoff_ms * 2^attempt`), bounded by `max_retries` so a bad
//! capture cannot run up unbounded API cost. A *parse* failure is never
//! retried automatically: the model answered, the answer was unusable, and
//! the user decides whether to retake or fall back to manual entry.

use crate::config::PipelineConfig;
use crate::error::LedgerError;
use crate::model::{ExpenseItem, ExtractionResult};
use crate::prompts::RECEIPT_EXTRACTION_PROMPT;
use crate::session::CapturedImage;
use chrono::{DateTime, NaiveDateTime, Utc};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Extract structured receipt fields from the session's images.
///
/// # Errors
/// - [`LedgerError::EmptySession`] — no images to analyse
/// - [`LedgerError::ExtractionUnavailable`] — the model could not be reached
///   after all retries (transient; the caller may try again)
/// - [`LedgerError::ExtractionParse`] — the model answered but the output
///   failed to yield a complete result (retry, or switch to manual entry)
///
/// On success the result is complete: a non-empty store name, a valid
/// timestamp (falling back to "now" when the receipt date is illegible), and
/// integer amounts. A partially-populated result is never returned.
pub async fn extract_receipt(
    provider: &Arc<dyn LLMProvider>,
    images: &[CapturedImage],
    config: &PipelineConfig,
) -> Result<ExtractionResult, LedgerError> {
    if images.is_empty() {
        return Err(LedgerError::EmptySession);
    }

    let prompt = config
        .extraction_prompt
        .as_deref()
        .unwrap_or(RECEIPT_EXTRACTION_PROMPT);

    let image_data: Vec<ImageData> = images
        .iter()
        .map(|captured| {
            ImageData::new(captured.image.to_base64(), captured.image.mime_type.as_str())
                .with_detail("high")
        })
        .collect();

    // The empty user text is intentional: the API requires a user turn, but
    // the images carry all the content and the system prompt all the rules.
    let messages = vec![
        ChatMessage::system(prompt),
        ChatMessage::user_with_images("", image_data),
    ];

    let options = CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    };

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Extraction retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = provider.chat(&messages, Some(&options));
        match timeout(Duration::from_secs(config.api_timeout_secs), call).await {
            Ok(Ok(response)) => {
                debug!(
                    "Extraction over {} image(s): {} input tokens, {} output tokens",
                    images.len(),
                    response.prompt_tokens,
                    response.completion_tokens
                );
                return parse_extraction(&response.content, Utc::now());
            }
            Ok(Err(e)) => {
                let err_msg = format!("{e}");
                warn!("Extraction attempt {} failed — {}", attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
            Err(_) => {
                let err_msg = format!("timed out after {}s", config.api_timeout_secs);
                warn!("Extraction attempt {} {}", attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(LedgerError::ExtractionUnavailable {
        retries: config.max_retries,
        detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
    })
}

// ── Response parsing ─────────────────────────────────────────────────────

/// Raw wire shape of the model's JSON, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    #[serde(default)]
    store_name: String,
    #[serde(default)]
    date: Option<String>,
    total_amount: i64,
    #[serde(default)]
    tax: Option<i64>,
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    name: String,
    price: i64,
    quantity: i64,
}

static RE_FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Locate the JSON object embedded in free-form model output.
///
/// A fenced ```json block wins; otherwise the slice from the first `{` to
/// the last `}` is taken, tolerating surrounding prose either way.
pub(crate) fn locate_json(text: &str) -> Option<&str> {
    if let Some(caps) = RE_FENCED_JSON.captures(text) {
        return Some(caps.get(1).map(|m| m.as_str()).unwrap_or_default());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse and validate the model's raw output into an [`ExtractionResult`].
///
/// `now` is the fallback timestamp when the receipt date is missing or does
/// not parse; injecting it keeps this function pure and the fallback
/// testable.
pub fn parse_extraction(
    text: &str,
    now: DateTime<Utc>,
) -> Result<ExtractionResult, LedgerError> {
    let json = locate_json(text).ok_or_else(|| LedgerError::ExtractionParse {
        detail: "no JSON object in model output".into(),
    })?;

    let raw: RawExtraction =
        serde_json::from_str(json).map_err(|e| LedgerError::ExtractionParse {
            detail: format!("malformed JSON: {e}"),
        })?;

    if raw.store_name.trim().is_empty() {
        return Err(LedgerError::ExtractionParse {
            detail: "storeName is empty".into(),
        });
    }

    let date = raw
        .date
        .as_deref()
        .and_then(parse_receipt_date)
        .unwrap_or(now);

    let mut items = Vec::with_capacity(raw.items.len());
    for item in raw.items {
        if item.price < 0 {
            return Err(LedgerError::ExtractionParse {
                detail: format!("item '{}' has negative price {}", item.name, item.price),
            });
        }
        if item.quantity < 1 {
            return Err(LedgerError::ExtractionParse {
                detail: format!("item '{}' has quantity {}", item.name, item.quantity),
            });
        }
        let quantity = u32::try_from(item.quantity).map_err(|_| LedgerError::ExtractionParse {
            detail: format!("item '{}' has implausible quantity {}", item.name, item.quantity),
        })?;
        items.push(ExpenseItem::new(item.name, item.price, quantity));
    }

    Ok(ExtractionResult {
        store_name: raw.store_name.trim().to_string(),
        date,
        total_amount: raw.total_amount,
        tax: raw.tax.unwrap_or(0),
        items,
    })
}

/// Parse the date string the model reports, leniently.
///
/// RFC 3339 with offset first; receipts without a printed timezone come back
/// as bare local timestamps, which are accepted and treated as UTC.
fn parse_receipt_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 24, 12, 0, 0).unwrap()
    }

    const GOOD_JSON: &str = r#"{
        "storeName": "Corner Shop",
        "date": "2025-10-24T15:30:00+09:00",
        "totalAmount": 3580,
        "tax": 258,
        "items": [
            {"name": "milk", "price": 198, "quantity": 2},
            {"name": "bread", "price": 158, "quantity": 1}
        ]
    }"#;

    #[test]
    fn locate_json_prefers_fenced_block() {
        let text = format!("Here you go:\n```json\n{GOOD_JSON}\n```\nanything else?");
        let found = locate_json(&text).expect("fenced JSON located");
        assert!(found.trim_start().starts_with('{'));
        assert!(found.contains("Corner Shop"));
    }

    #[test]
    fn locate_json_falls_back_to_brace_slice() {
        let text = format!("The receipt says: {GOOD_JSON} — hope that helps!");
        let found = locate_json(&text).expect("bare JSON located");
        assert!(found.starts_with('{') && found.ends_with('}'));
    }

    #[test]
    fn locate_json_none_when_absent() {
        assert!(locate_json("I could not read the image, sorry.").is_none());
        assert!(locate_json("").is_none());
    }

    #[test]
    fn parse_complete_response() {
        let result = parse_extraction(GOOD_JSON, fixed_now()).unwrap();
        assert_eq!(result.store_name, "Corner Shop");
        assert_eq!(result.total_amount, 3580);
        assert_eq!(result.tax, 258);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].quantity, 2);
        // 15:30+09:00 is 06:30 UTC
        assert_eq!(result.date.to_rfc3339(), "2025-10-24T06:30:00+00:00");
    }

    #[test]
    fn missing_date_falls_back_to_now() {
        let json = r#"{"storeName": "S", "totalAmount": 100}"#;
        let result = parse_extraction(json, fixed_now()).unwrap();
        assert_eq!(result.date, fixed_now());
        assert_eq!(result.tax, 0);
        assert!(result.items.is_empty());
    }

    #[test]
    fn garbage_date_falls_back_to_now() {
        let json = r#"{"storeName": "S", "date": "sometime tuesday", "totalAmount": 100}"#;
        let result = parse_extraction(json, fixed_now()).unwrap();
        assert_eq!(result.date, fixed_now());
    }

    #[test]
    fn naive_datetime_is_accepted() {
        let json = r#"{"storeName": "S", "date": "2025-10-24T15:30", "totalAmount": 100}"#;
        let result = parse_extraction(json, fixed_now()).unwrap();
        assert_eq!(result.date.to_rfc3339(), "2025-10-24T15:30:00+00:00");
    }

    #[test]
    fn empty_store_name_is_a_parse_error() {
        let json = r#"{"storeName": "  ", "totalAmount": 100}"#;
        let err = parse_extraction(json, fixed_now()).unwrap_err();
        assert!(matches!(err, LedgerError::ExtractionParse { .. }));
    }

    #[test]
    fn non_integer_total_is_a_parse_error() {
        let json = r#"{"storeName": "S", "totalAmount": "3580"}"#;
        let err = parse_extraction(json, fixed_now()).unwrap_err();
        assert!(matches!(err, LedgerError::ExtractionParse { .. }));

        // Fractional amounts are rejected, not rounded.
        let json = r#"{"storeName": "S", "totalAmount": 35.80}"#;
        let err = parse_extraction(json, fixed_now()).unwrap_err();
        assert!(matches!(err, LedgerError::ExtractionParse { .. }));
    }

    #[test]
    fn zero_quantity_item_is_a_parse_error() {
        let json = r#"{"storeName": "S", "totalAmount": 100,
                       "items": [{"name": "x", "price": 100, "quantity": 0}]}"#;
        let err = parse_extraction(json, fixed_now()).unwrap_err();
        assert!(matches!(err, LedgerError::ExtractionParse { .. }));
    }

    #[test]
    fn negative_price_item_is_a_parse_error() {
        let json = r#"{"storeName": "S", "totalAmount": 100,
                       "items": [{"name": "x", "price": -5, "quantity": 1}]}"#;
        let err = parse_extraction(json, fixed_now()).unwrap_err();
        assert!(matches!(err, LedgerError::ExtractionParse { .. }));
    }

    #[test]
    fn prose_without_json_is_a_parse_error() {
        let err = parse_extraction("That photo is too blurry to read.", fixed_now()).unwrap_err();
        assert!(matches!(err, LedgerError::ExtractionParse { .. }));
    }
}
