//! # Payment Reconciler
//!
//! Records payments against a sale and keeps the paid total at or below the
//! sale total.
//!
//! ## Split Payment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total 85.00                                                            │
//! │                                                                         │
//! │  record card 50.00   paid 50.00   balance 35.00   Priced               │
//! │  record cash 40.00   50 + 40 > 85 → Overpayment, nothing stored        │
//! │  record cash 35.00   paid 85.00   balance  0.00   Settled              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call reads the existing payments and writes inside one transaction
//! that starts by touching the sale row, so two registers paying the same
//! sale are serialized by SQLite.
//!
//! Payments of a Settled sale are final: update and delete are rejected
//! with `SaleSettled`. New payments are already stopped by the overpayment
//! check.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use kasa_core::payment::{check_payment, summarize};
use kasa_core::validation::{
    validate_optional_text, validate_payment_amount, MAX_NOTES_LEN, MAX_REFERENCE_LEN,
};
use kasa_core::{CoreError, Money, Payment, PaymentMethod, PaymentStatus};
use kasa_db::repository::{payment, sale, sale_item};
use kasa_db::Database;

use crate::error::{SettlementError, SettlementResult};
use crate::orchestrator::ensure_mutable;

/// A payment as entered at the register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInput {
    /// One of cash, card, bank_transfer, e_wallet, check.
    pub method: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PaymentInput {
    pub fn new(method: PaymentMethod, amount_cents: i64) -> Self {
        PaymentInput {
            method: method.as_str().to_string(),
            amount_cents,
            reference: None,
            notes: None,
        }
    }

    fn validate(&self) -> SettlementResult<PaymentMethod> {
        let method: PaymentMethod = self.method.parse()?;
        validate_payment_amount(self.amount_cents)?;
        validate_optional_text("reference", self.reference.as_deref(), MAX_REFERENCE_LEN)?;
        validate_optional_text("notes", self.notes.as_deref(), MAX_NOTES_LEN)?;
        Ok(method)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentReconciler {
    db: Database,
}

impl PaymentReconciler {
    pub fn new(db: Database) -> Self {
        PaymentReconciler { db }
    }

    pub async fn record_payment(&self, sale_id: &str, input: PaymentInput) -> SettlementResult<Payment> {
        let method = input.validate()?;

        let mut tx = self.db.begin().await?;
        sale::touch(&mut tx, sale_id).await?;
        let current = sale::get_by_id(&mut tx, sale_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Sale", sale_id))?;
        let existing = payment::list_for_sale(&mut tx, sale_id).await?;

        let amount = Money::from_cents(input.amount_cents);
        if let Err(err) = check_payment(current.total_amount(), &existing, None, amount) {
            log_rejection(sale_id, &err);
            return Err(err.into());
        }

        let record = Payment {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            method,
            amount_cents: input.amount_cents,
            reference: input.reference,
            notes: input.notes,
            created_at: Utc::now(),
        };
        payment::insert(&mut tx, &record).await?;
        tx.commit().await?;

        info!(sale_id = %sale_id, payment_id = %record.id, method = %method, amount = input.amount_cents, "Payment recorded");
        Ok(record)
    }

    /// Replaces method, amount, reference and notes of a payment.
    pub async fn update_payment(&self, payment_id: &str, input: PaymentInput) -> SettlementResult<Payment> {
        let method = input.validate()?;
        let sale_id = self.sale_of(payment_id).await?;

        let mut tx = self.db.begin().await?;
        sale::touch(&mut tx, &sale_id).await?;
        let current = sale::get_by_id(&mut tx, &sale_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Sale", &sale_id))?;
        let existing = payment::list_for_sale(&mut tx, &sale_id).await?;

        let Some(stored) = existing.iter().find(|p| p.id == payment_id).cloned() else {
            return Err(SettlementError::not_found("Payment", payment_id));
        };
        let count = sale_item::count_for_sale(&mut tx, &sale_id).await?;
        ensure_mutable(&current, count as usize, &existing)?;

        let amount = Money::from_cents(input.amount_cents);
        if let Err(err) = check_payment(current.total_amount(), &existing, Some(payment_id), amount) {
            log_rejection(&sale_id, &err);
            return Err(err.into());
        }

        let updated = Payment {
            method,
            amount_cents: input.amount_cents,
            reference: input.reference,
            notes: input.notes,
            ..stored
        };
        payment::update(&mut tx, &updated).await?;
        tx.commit().await?;

        info!(sale_id = %sale_id, payment_id = %payment_id, amount = updated.amount_cents, "Payment updated");
        Ok(updated)
    }

    pub async fn delete_payment(&self, payment_id: &str) -> SettlementResult<()> {
        let sale_id = self.sale_of(payment_id).await?;

        let mut tx = self.db.begin().await?;
        sale::touch(&mut tx, &sale_id).await?;
        let current = sale::get_by_id(&mut tx, &sale_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Sale", &sale_id))?;
        let existing = payment::list_for_sale(&mut tx, &sale_id).await?;
        let count = sale_item::count_for_sale(&mut tx, &sale_id).await?;
        ensure_mutable(&current, count as usize, &existing)?;

        payment::delete(&mut tx, payment_id).await?;
        tx.commit().await?;

        info!(sale_id = %sale_id, payment_id = %payment_id, "Payment deleted");
        Ok(())
    }

    pub async fn get_payment(&self, payment_id: &str) -> SettlementResult<Payment> {
        self.db
            .payments()
            .get_by_id(payment_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Payment", payment_id))
    }

    /// Payments of a sale, oldest first.
    pub async fn list_payments(&self, sale_id: &str) -> SettlementResult<Vec<Payment>> {
        self.require_sale(sale_id).await?;
        Ok(self.db.payments().list_for_sale(sale_id).await?)
    }

    pub async fn status(&self, sale_id: &str) -> SettlementResult<PaymentStatus> {
        let current = self.require_sale(sale_id).await?;
        let payments = self.db.payments().list_for_sale(sale_id).await?;
        Ok(summarize(current.total_amount(), &payments))
    }

    async fn require_sale(&self, sale_id: &str) -> SettlementResult<kasa_core::Sale> {
        self.db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Sale", sale_id))
    }

    async fn sale_of(&self, payment_id: &str) -> SettlementResult<String> {
        Ok(self.get_payment(payment_id).await?.sale_id)
    }
}

fn log_rejection(sale_id: &str, err: &CoreError) {
    warn!(sale_id = %sale_id, error = %err, "Payment rejected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, priced_sale};

    #[tokio::test]
    async fn test_split_payment_until_settled() {
        let fx = fixture().await;
        let sale_id = priced_sale(&fx, 8500).await;
        let reconciler = PaymentReconciler::new(fx.db.clone());

        reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Card, 5000))
            .await
            .unwrap();

        let err = reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Cash, 4000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::Overpayment { total_cents: 8500, paid_cents: 5000, attempted_cents: 4000 }
        ));
        assert_eq!(reconciler.list_payments(&sale_id).await.unwrap().len(), 1);

        reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Cash, 3500))
            .await
            .unwrap();

        let status = reconciler.status(&sale_id).await.unwrap();
        assert!(status.is_fully_paid);
        assert_eq!(status.balance_cents, 0);
        assert_eq!(status.by_method.len(), 2);
    }

    #[tokio::test]
    async fn test_update_excludes_own_amount() {
        let fx = fixture().await;
        let sale_id = priced_sale(&fx, 1000).await;
        let reconciler = PaymentReconciler::new(fx.db.clone());

        let first = reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Cash, 600))
            .await
            .unwrap();
        reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Card, 300))
            .await
            .unwrap();

        // 600 → 650 still leaves 50 owing
        let mut input = PaymentInput::new(PaymentMethod::EWallet, 650);
        input.reference = Some("TX-991".into());
        let updated = reconciler.update_payment(&first.id, input).await.unwrap();
        assert_eq!(updated.method, PaymentMethod::EWallet);

        let err = reconciler
            .update_payment(&first.id, PaymentInput::new(PaymentMethod::Cash, 701))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Overpayment { .. }));

        reconciler.delete_payment(&first.id).await.unwrap();
        assert_eq!(reconciler.status(&sale_id).await.unwrap().total_paid_cents, 300);
    }

    #[tokio::test]
    async fn test_settled_payments_are_final() {
        let fx = fixture().await;
        let sale_id = priced_sale(&fx, 1000).await;
        let reconciler = PaymentReconciler::new(fx.db.clone());

        let first = reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Cash, 600))
            .await
            .unwrap();
        reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Card, 400))
            .await
            .unwrap();

        let err = reconciler.delete_payment(&first.id).await.unwrap_err();
        assert!(matches!(err, SettlementError::SaleSettled { .. }));

        let err = reconciler
            .update_payment(&first.id, PaymentInput::new(PaymentMethod::Cash, 500))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::SaleSettled { .. }));

        let status = reconciler.status(&sale_id).await.unwrap();
        assert_eq!(status.total_paid_cents, 1000);
        assert_eq!(status.payment_count, 2);
        assert_eq!(reconciler.get_payment(&first.id).await.unwrap().amount_cents, 600);
    }

    #[tokio::test]
    async fn test_amount_beyond_ceiling_stores_nothing() {
        let fx = fixture().await;
        let sale_id = priced_sale(&fx, 10000).await;
        let reconciler = PaymentReconciler::new(fx.db.clone());

        reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Cash, 5000))
            .await
            .unwrap();

        let err = reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Cash, i64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));

        let payments = reconciler.list_payments(&sale_id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(reconciler.status(&sale_id).await.unwrap().total_paid_cents, 5000);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let fx = fixture().await;
        let sale_id = priced_sale(&fx, 1000).await;
        let reconciler = PaymentReconciler::new(fx.db.clone());

        let err = reconciler
            .record_payment(&sale_id, PaymentInput::new(PaymentMethod::Cash, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));

        let mut input = PaymentInput::new(PaymentMethod::Cash, 100);
        input.method = "crypto".into();
        let err = reconciler.record_payment(&sale_id, input).await.unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));

        let err = reconciler
            .record_payment("missing", PaymentInput::new(PaymentMethod::Cash, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { .. }));
    }
}
