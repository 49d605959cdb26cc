//! Reconciliation: merge extracted fields with user corrections and enforce
//! the amount/line-item invariant.
//!
//! This stage performs no I/O at all. It takes an [`ExpenseDraft`] (seeded
//! from an extraction, or blank for manual entry), layers
//! [`FieldOverrides`] on top, and either produces a [`ValidatedExpense`] or
//! rejects the submission. Keeping it pure is what makes the invariant
//! independently testable — no storage, no model, no clock.
//!
//! [`ValidatedExpense`] can only be constructed here. Persistence takes it
//! by value, so every create *and* every update necessarily passes through
//! [`reconcile`] — there is no API route around the amount check.

use crate::error::LedgerError;
use crate::model::{items_total, ActorContext, Expense, ExpenseItem, ExtractionResult, ReceiptImages};
use chrono::{DateTime, Utc};

/// A submission in progress: extracted (or blank) fields, before the user's
/// corrections and the required master-data choices are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseDraft {
    pub store_name: String,
    pub date: DateTime<Utc>,
    /// Total in the smallest currency unit.
    pub amount: i64,
    pub items: Vec<ExpenseItem>,
    /// Empty until the user picks a category.
    pub category_id: String,
    /// Empty until the user picks a wallet.
    pub wallet_id: String,
    pub expense_type_id: Option<String>,
    pub memo: String,
}

impl ExpenseDraft {
    /// Seed a draft from what the model read off the receipt.
    pub fn from_extraction(extraction: ExtractionResult) -> Self {
        Self {
            store_name: extraction.store_name,
            date: extraction.date,
            amount: extraction.total_amount,
            items: extraction.items,
            category_id: String::new(),
            wallet_id: String::new(),
            expense_type_id: None,
            memo: String::new(),
        }
    }

    /// Blank manual-entry seed dated `date`.
    pub fn manual(date: DateTime<Utc>) -> Self {
        Self {
            store_name: String::new(),
            date,
            amount: 0,
            items: Vec::new(),
            category_id: String::new(),
            wallet_id: String::new(),
            expense_type_id: None,
            memo: String::new(),
        }
    }
}

/// User-supplied corrections layered onto a draft.
///
/// Every field is optional; `None` keeps the draft's value. Overriding
/// `expense_type_id` with an empty string clears it (the persisted form is
/// `null`, never `""`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOverrides {
    pub store_name: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub amount: Option<i64>,
    pub items: Option<Vec<ExpenseItem>>,
    pub category_id: Option<String>,
    pub wallet_id: Option<String>,
    pub expense_type_id: Option<String>,
    pub memo: Option<String>,
}

/// A submission that passed reconciliation.
///
/// Fields are private: the only way to obtain one is [`reconcile`], which is
/// how the amount/items invariant stays enforced on every path into the
/// ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedExpense {
    store_name: String,
    date: DateTime<Utc>,
    amount: i64,
    items: Vec<ExpenseItem>,
    category_id: String,
    wallet_id: String,
    expense_type_id: Option<String>,
    memo: String,
}

impl ValidatedExpense {
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn items(&self) -> &[ExpenseItem] {
        &self.items
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    pub fn expense_type_id(&self) -> Option<&str> {
        self.expense_type_id.as_deref()
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    /// View this submission as a draft again, e.g. to apply another round of
    /// corrections before resubmitting.
    pub fn into_draft(self) -> ExpenseDraft {
        ExpenseDraft {
            store_name: self.store_name,
            date: self.date,
            amount: self.amount,
            items: self.items,
            category_id: self.category_id,
            wallet_id: self.wallet_id,
            expense_type_id: self.expense_type_id,
            memo: self.memo,
        }
    }

    /// Materialise the persisted record, stamping identity and audit fields.
    pub(crate) fn into_expense(
        self,
        ctx: &ActorContext,
        images: ReceiptImages,
        now_ms: i64,
    ) -> Expense {
        Expense {
            expense_id: String::new(),
            user_id: ctx.user_id.clone(),
            household_id: ctx.household_id.clone(),
            amount: self.amount,
            date: self.date.timestamp_millis(),
            store_name: self.store_name,
            category_id: self.category_id,
            wallet_id: self.wallet_id,
            expense_type_id: self.expense_type_id,
            items: self.items,
            memo: self.memo,
            receipt_image_url: images,
            created_at: now_ms,
            updated_at: now_ms,
            created_by: ctx.user_id.clone(),
            updated_by: ctx.user_id.clone(),
        }
    }
}

/// Merge `overrides` into `draft` and validate the result.
///
/// # Errors
/// - [`LedgerError::AmountMismatch`] — `items` is non-empty and
///   `sum(price × quantity)` ≠ `amount`; carries both totals. The check is
///   exact integer equality, and the mismatch is rejected, never silently
///   corrected. Empty `items` skips the check entirely (items are optional
///   metadata).
/// - [`LedgerError::MissingField`] — category, wallet, or store name absent.
/// - [`LedgerError::InvalidItem`] — a line item with negative price or zero
///   quantity survived to this point (e.g. hand-built overrides).
///
/// Reconciling an already-valid draft with empty overrides yields the same
/// record unchanged.
pub fn reconcile(
    draft: ExpenseDraft,
    overrides: FieldOverrides,
) -> Result<ValidatedExpense, LedgerError> {
    let store_name = overrides.store_name.unwrap_or(draft.store_name);
    let date = overrides.date.unwrap_or(draft.date);
    let amount = overrides.amount.unwrap_or(draft.amount);
    let items = overrides.items.unwrap_or(draft.items);
    let category_id = overrides.category_id.unwrap_or(draft.category_id);
    let wallet_id = overrides.wallet_id.unwrap_or(draft.wallet_id);
    let memo = overrides.memo.unwrap_or(draft.memo);

    // `Some("")` clears the expense type; the stored form is null, never "".
    let expense_type_id = match overrides.expense_type_id {
        Some(id) => Some(id),
        None => draft.expense_type_id,
    }
    .filter(|id| !id.is_empty());

    if store_name.trim().is_empty() {
        return Err(LedgerError::MissingField { field: "storeName" });
    }
    if category_id.trim().is_empty() {
        return Err(LedgerError::MissingField { field: "categoryId" });
    }
    if wallet_id.trim().is_empty() {
        return Err(LedgerError::MissingField { field: "walletId" });
    }

    for item in &items {
        if item.price < 0 {
            return Err(LedgerError::InvalidItem {
                name: item.name.clone(),
                detail: format!("negative price {}", item.price),
            });
        }
        if item.quantity == 0 {
            return Err(LedgerError::InvalidItem {
                name: item.name.clone(),
                detail: "zero quantity".into(),
            });
        }
    }

    if !items.is_empty() {
        let expected = items_total(&items);
        if expected != amount {
            return Err(LedgerError::AmountMismatch {
                expected,
                got: amount,
            });
        }
    }

    Ok(ValidatedExpense {
        store_name,
        date,
        amount,
        items,
        category_id,
        wallet_id,
        expense_type_id,
        memo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 24, 15, 30, 0).unwrap()
    }

    fn complete_draft(amount: i64, items: Vec<ExpenseItem>) -> ExpenseDraft {
        ExpenseDraft {
            store_name: "Corner Shop".into(),
            date: sample_date(),
            amount,
            items,
            category_id: "groceries".into(),
            wallet_id: "cash".into(),
            expense_type_id: None,
            memo: String::new(),
        }
    }

    #[test]
    fn matching_items_and_amount_are_accepted() {
        // [{price:100,quantity:2},{price:50,quantity:1}] totals 250.
        let items = vec![ExpenseItem::new("a", 100, 2), ExpenseItem::new("b", 50, 1)];
        let validated = reconcile(complete_draft(250, items), FieldOverrides::default())
            .expect("amount matches items");
        assert_eq!(validated.amount(), 250);
        assert_eq!(validated.items().len(), 2);
    }

    #[test]
    fn mismatched_amount_is_rejected_with_both_totals() {
        let items = vec![ExpenseItem::new("a", 100, 2), ExpenseItem::new("b", 50, 1)];
        let err = reconcile(complete_draft(300, items), FieldOverrides::default()).unwrap_err();
        match err {
            LedgerError::AmountMismatch { expected, got } => {
                assert_eq!(expected, 250);
                assert_eq!(got, 300);
            }
            other => panic!("expected AmountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn empty_items_skip_the_amount_check() {
        // Any amount passes when there are no line items to cross-check.
        for amount in [0, 1, 99_999] {
            assert!(reconcile(complete_draft(amount, vec![]), FieldOverrides::default()).is_ok());
        }
    }

    #[test]
    fn reconcile_is_idempotent_for_valid_input() {
        let items = vec![ExpenseItem::new("a", 100, 2), ExpenseItem::new("b", 50, 1)];
        let first = reconcile(complete_draft(250, items), FieldOverrides::default()).unwrap();
        let second = reconcile(first.clone().into_draft(), FieldOverrides::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn overrides_replace_extracted_fields() {
        let draft = complete_draft(250, vec![ExpenseItem::new("a", 250, 1)]);
        let overrides = FieldOverrides {
            store_name: Some("Fixed Name".into()),
            amount: Some(300),
            items: Some(vec![ExpenseItem::new("a", 150, 2)]),
            memo: Some("team lunch".into()),
            ..Default::default()
        };
        let validated = reconcile(draft, overrides).unwrap();
        assert_eq!(validated.store_name(), "Fixed Name");
        assert_eq!(validated.amount(), 300);
        assert_eq!(validated.memo(), "team lunch");
    }

    #[test]
    fn missing_category_or_wallet_is_rejected() {
        let mut draft = complete_draft(100, vec![]);
        draft.category_id = String::new();
        let err = reconcile(draft, FieldOverrides::default()).unwrap_err();
        assert!(matches!(err, LedgerError::MissingField { field: "categoryId" }));

        let mut draft = complete_draft(100, vec![]);
        draft.wallet_id = "  ".into();
        let err = reconcile(draft, FieldOverrides::default()).unwrap_err();
        assert!(matches!(err, LedgerError::MissingField { field: "walletId" }));
    }

    #[test]
    fn empty_expense_type_normalises_to_none() {
        let mut draft = complete_draft(100, vec![]);
        draft.expense_type_id = Some(String::new());
        let validated = reconcile(draft, FieldOverrides::default()).unwrap();
        assert_eq!(validated.expense_type_id(), None);

        // Overriding with "" clears an existing value.
        let mut draft = complete_draft(100, vec![]);
        draft.expense_type_id = Some("fixed".into());
        let overrides = FieldOverrides {
            expense_type_id: Some(String::new()),
            ..Default::default()
        };
        let validated = reconcile(draft, overrides).unwrap();
        assert_eq!(validated.expense_type_id(), None);
    }

    #[test]
    fn manual_seed_plus_overrides_is_a_full_submission() {
        let overrides = FieldOverrides {
            store_name: Some("Kiosk".into()),
            amount: Some(420),
            category_id: Some("snacks".into()),
            wallet_id: Some("card".into()),
            ..Default::default()
        };
        let validated = reconcile(ExpenseDraft::manual(sample_date()), overrides).unwrap();
        assert_eq!(validated.store_name(), "Kiosk");
        assert_eq!(validated.amount(), 420);
    }

    #[test]
    fn invalid_override_items_are_rejected() {
        let draft = complete_draft(100, vec![]);
        let overrides = FieldOverrides {
            amount: Some(0),
            items: Some(vec![ExpenseItem::new("void", 0, 0)]),
            ..Default::default()
        };
        let err = reconcile(draft, overrides).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidItem { .. }));
    }

    #[test]
    fn from_extraction_carries_fields_over() {
        let extraction = ExtractionResult {
            store_name: "Corner Shop".into(),
            date: sample_date(),
            total_amount: 356,
            tax: 32,
            items: vec![ExpenseItem::new("milk", 178, 2)],
        };
        let draft = ExpenseDraft::from_extraction(extraction);
        assert_eq!(draft.store_name, "Corner Shop");
        assert_eq!(draft.amount, 356);
        assert!(draft.category_id.is_empty());
    }
}
