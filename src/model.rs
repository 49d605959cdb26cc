//! Domain data model: what the pipeline extracts and what the ledger stores.
//!
//! All currency fields are integers in the smallest currency unit — no floats
//! anywhere in the money path, so totals can be compared with plain `==`.
//! Dates are persisted as epoch milliseconds (the document-store convention
//! this crate writes against) and exposed as [`chrono`] types at the API
//! boundary.
//!
//! Field names serialise in camelCase because that is the wire shape the
//! document store and its other clients already use (`householdId`,
//! `receiptImageUrl`, …).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// The acting user and household a submission is written under.
///
/// Supplied by the caller's auth/session layer and passed explicitly into
/// every ledger call — the pipeline never derives or caches identity itself,
/// which keeps each stage independently testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: String,
    pub household_id: String,
}

impl ActorContext {
    pub fn new(user_id: impl Into<String>, household_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            household_id: household_id.into(),
        }
    }
}

/// A preprocessed, bounded-size encoded image ready for the model API or the
/// object store.
///
/// Produced by [`crate::pipeline::preprocess::preprocess`]; the raw capture
/// never travels further down the pipeline than that stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded bytes (JPEG after preprocessing).
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`, e.g. `"image/jpeg"`.
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    /// Base64 of the encoded bytes, as inlined into model API payloads.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` form, as used by browser capture flows.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// File extension matching the MIME type, for object-store names.
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            _ => "jpg",
        }
    }
}

/// One line item on a receipt.
///
/// `price` is the unit price; the line total is `price * quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseItem {
    pub name: String,
    /// Unit price in the smallest currency unit.
    pub price: i64,
    /// Number of units, ≥ 1 for any item the extractor accepts.
    pub quantity: u32,
}

impl ExpenseItem {
    pub fn new(name: impl Into<String>, price: i64, quantity: u32) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
        }
    }

    /// `price * quantity` for this line.
    pub fn line_total(&self) -> i64 {
        self.price * i64::from(self.quantity)
    }
}

/// Sum of `price * quantity` over a list of items.
pub fn items_total(items: &[ExpenseItem]) -> i64 {
    items.iter().map(ExpenseItem::line_total).sum()
}

/// Structured fields the model read off one receipt (all pages combined).
///
/// Produced once per capture session by
/// [`crate::pipeline::extract::extract_receipt`]; immutable once produced —
/// user corrections are layered on top during reconciliation, they never
/// mutate the extraction itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub store_name: String,
    /// Purchase timestamp; falls back to "now" when the receipt date could
    /// not be parsed.
    pub date: chrono::DateTime<chrono::Utc>,
    /// Receipt total in the smallest currency unit.
    pub total_amount: i64,
    /// Tax portion of the total; 0 when not printed on the receipt.
    pub tax: i64,
    /// Line items in printed order; empty when illegible.
    pub items: Vec<ExpenseItem>,
}

/// The receipt-image field of a stored expense: one legacy URL string or the
/// current ordered URL list.
///
/// Early records stored a single `"https://…"` string (empty string meaning
/// no image); multi-page capture changed the field to a list. Modelling the
/// two shapes as one untagged enum keeps every read path off `typeof`-style
/// branching: deserialise, call [`ReceiptImages::into_urls`], done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReceiptImages {
    /// Pre-multi-page schema: a single URL, `""` meaning none.
    Legacy(String),
    /// Current schema: ordered URLs, one per captured page.
    Current(Vec<String>),
}

impl ReceiptImages {
    /// Normalise either shape to the list form.
    pub fn into_urls(self) -> Vec<String> {
        match self {
            ReceiptImages::Legacy(url) if url.is_empty() => Vec::new(),
            ReceiptImages::Legacy(url) => vec![url],
            ReceiptImages::Current(urls) => urls,
        }
    }

    /// Borrowing view of the URLs, normalising the legacy empty string.
    pub fn urls(&self) -> &[String] {
        match self {
            ReceiptImages::Legacy(url) if url.is_empty() => &[],
            ReceiptImages::Legacy(url) => std::slice::from_ref(url),
            ReceiptImages::Current(urls) => urls,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.urls().is_empty()
    }
}

impl Default for ReceiptImages {
    fn default() -> Self {
        ReceiptImages::Current(Vec::new())
    }
}

/// A persisted household-ledger expense record.
///
/// Created by [`crate::ledger::Ledger::submit`]; every later mutation goes
/// back through the same validation path. The record exclusively owns its
/// `receipt_image_url` list — nothing else references those stored objects,
/// which is what makes "delete images, then delete record" safe without
/// reference counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Document id; assigned by the store, absent inside the stored body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expense_id: String,
    pub user_id: String,
    pub household_id: String,
    /// Total in the smallest currency unit.
    pub amount: i64,
    /// Purchase time, epoch milliseconds.
    pub date: i64,
    pub store_name: String,
    pub category_id: String,
    pub wallet_id: String,
    #[serde(default)]
    pub expense_type_id: Option<String>,
    #[serde(default)]
    pub items: Vec<ExpenseItem>,
    #[serde(default)]
    pub memo: String,
    /// Stored receipt images, in capture order. Accepts the legacy single
    /// string on read; always written in list form.
    #[serde(default)]
    pub receipt_image_url: ReceiptImages,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: String,
    pub updated_by: String,
}

impl Expense {
    /// Normalise the image field to the current list form in place.
    ///
    /// Called at the read boundary so the rest of the crate only ever sees
    /// [`ReceiptImages::Current`].
    pub fn normalize_images(&mut self) {
        let urls = std::mem::take(&mut self.receipt_image_url).into_urls();
        self.receipt_image_url = ReceiptImages::Current(urls);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_total_sums_line_totals() {
        let items = vec![
            ExpenseItem::new("milk", 100, 2),
            ExpenseItem::new("bread", 50, 1),
        ];
        assert_eq!(items_total(&items), 250);
        assert_eq!(items_total(&[]), 0);
    }

    #[test]
    fn receipt_images_reads_legacy_string() {
        let images: ReceiptImages = serde_json::from_str("\"https://img/1.jpg\"").unwrap();
        assert_eq!(images, ReceiptImages::Legacy("https://img/1.jpg".into()));
        assert_eq!(images.into_urls(), vec!["https://img/1.jpg".to_string()]);
    }

    #[test]
    fn receipt_images_reads_list() {
        let images: ReceiptImages = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(images.urls(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn legacy_empty_string_means_no_images() {
        let images: ReceiptImages = serde_json::from_str("\"\"").unwrap();
        assert!(images.is_empty());
        assert!(images.into_urls().is_empty());
    }

    #[test]
    fn legacy_and_list_normalise_to_the_same_urls() {
        let legacy: ReceiptImages = serde_json::from_str("\"url\"").unwrap();
        let list: ReceiptImages = serde_json::from_str(r#"["url"]"#).unwrap();
        assert_eq!(legacy.into_urls(), list.into_urls());
    }

    #[test]
    fn expense_serialises_camel_case() {
        let expense = Expense {
            expense_id: String::new(),
            user_id: "u1".into(),
            household_id: "h1".into(),
            amount: 250,
            date: 1_700_000_000_000,
            store_name: "Corner Shop".into(),
            category_id: "groceries".into(),
            wallet_id: "cash".into(),
            expense_type_id: None,
            items: vec![],
            memo: String::new(),
            receipt_image_url: ReceiptImages::default(),
            created_at: 1,
            updated_at: 1,
            created_by: "u1".into(),
            updated_by: "u1".into(),
        };
        let value = serde_json::to_value(&expense).unwrap();
        assert!(value.get("householdId").is_some());
        assert!(value.get("receiptImageUrl").is_some());
        assert!(value.get("storeName").is_some());
        // expense_id is the document key, not part of the stored body
        assert!(value.get("expenseId").is_none());
    }

    #[test]
    fn expense_reads_legacy_image_field() {
        let json = serde_json::json!({
            "userId": "u1",
            "householdId": "h1",
            "amount": 100,
            "date": 0,
            "storeName": "s",
            "categoryId": "c",
            "walletId": "w",
            "receiptImageUrl": "https://img/legacy.jpg",
            "createdAt": 0,
            "updatedAt": 0,
            "createdBy": "u1",
            "updatedBy": "u1",
        });
        let mut expense: Expense = serde_json::from_value(json).unwrap();
        expense.normalize_images();
        assert_eq!(
            expense.receipt_image_url,
            ReceiptImages::Current(vec!["https://img/legacy.jpg".into()])
        );
    }

    #[test]
    fn data_uri_round_trips_mime() {
        let img = EncodedImage {
            bytes: vec![0xFF, 0xD8, 0xFF],
            mime_type: "image/jpeg".into(),
            width: 1,
            height: 1,
        };
        let uri = img.to_data_uri();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert_eq!(img.extension(), "jpg");
    }
}
