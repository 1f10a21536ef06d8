//! # Settlement Engine
//!
//! One handle over the database, the product locks and the cart sessions.
//! Every service it hands out shares the same pool and the same locks, so
//! a sale being built and a batch being adjusted on another register still
//! serialize on the product.
//!
//! ```rust,ignore
//! let engine = SettlementEngine::connect(SettlementConfig::load(None)?).await?;
//!
//! let sale = engine.sales().create_sale(CreateSaleInput::new(cashier_id)).await?;
//! engine.sales().create_sale_item(&sale.id, CreateItemInput::new(product_id, 2)).await?;
//! engine.payments().record_payment(&sale.id, PaymentInput::new(PaymentMethod::Cash, 3000)).await?;
//! ```

use tracing::info;

use kasa_db::Database;

use crate::cart::CartSessions;
use crate::config::SettlementConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::fifo::FifoCostResolver;
use crate::ledger::StockLedger;
use crate::locks::ProductLocks;
use crate::orchestrator::{CreateSaleInput, SaleDetails, SaleService};
use crate::reconciler::PaymentReconciler;
use crate::reports::ReportService;

#[derive(Debug, Clone)]
pub struct SettlementEngine {
    db: Database,
    locks: ProductLocks,
    carts: CartSessions,
    config: SettlementConfig,
}

impl SettlementEngine {
    /// Validates `config`, opens the pool and runs migrations.
    pub async fn connect(config: SettlementConfig) -> SettlementResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        info!(path = %config.database.path, bill_prefix = %config.billing.prefix, "Settlement engine ready");
        Ok(Self::with_database(db, config))
    }

    /// Wraps an already open database.
    pub fn with_database(db: Database, config: SettlementConfig) -> Self {
        SettlementEngine {
            db,
            locks: ProductLocks::new(),
            carts: CartSessions::new(config.cart.max_sessions),
            config,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn sales(&self) -> SaleService {
        SaleService::new(self.db.clone(), self.locks.clone(), self.config.billing.prefix.clone())
    }

    pub fn payments(&self) -> PaymentReconciler {
        PaymentReconciler::new(self.db.clone())
    }

    pub fn ledger(&self) -> StockLedger {
        StockLedger::new(self.db.clone(), self.locks.clone())
    }

    pub fn fifo(&self) -> FifoCostResolver {
        FifoCostResolver::new(self.db.clone())
    }

    pub fn reports(&self) -> ReportService {
        ReportService::new(self.db.clone())
    }

    pub fn carts(&self) -> &CartSessions {
        &self.carts
    }

    /// Looks the product up and adds it to an open cart.
    pub async fn add_to_cart(&self, cart_id: &str, product_id: &str, quantity: i64) -> SettlementResult<()> {
        let product = self
            .db
            .catalog()
            .get_product(product_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Product", product_id))?;
        self.carts
            .with_cart_mut(cart_id, |cart| cart.add_product(&product, quantity))
    }

    /// Checks an open cart out into a sale and closes the cart.
    ///
    /// On failure the cart stays open and unchanged.
    pub async fn checkout_cart(&self, cart_id: &str, input: CreateSaleInput) -> SettlementResult<SaleDetails> {
        let cart = self.carts.get(cart_id)?;
        let details = self.sales().checkout(&cart, input).await?;
        self.carts.evict(cart_id);
        Ok(details)
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::PaymentInput;
    use crate::testing::{add_batch, fixture, CASHIER_ID};
    use kasa_core::{DiscountSpec, PaymentMethod, SaleState};

    #[tokio::test]
    async fn test_cart_checkout_end_to_end() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 3, 4000, 1).await;
        let engine = SettlementEngine::with_database(fx.db.clone(), SettlementConfig::in_memory());

        let cart_id = engine.carts().create();
        engine.add_to_cart(&cart_id, &fx.product_id, 2).await.unwrap();
        engine
            .carts()
            .with_cart_mut(&cart_id, |cart| cart.set_bill_discount(DiscountSpec::fixed(500)))
            .unwrap();
        let preview = engine.carts().preview(&cart_id).unwrap();

        let details = engine
            .checkout_cart(&cart_id, CreateSaleInput::new(CASHIER_ID))
            .await
            .unwrap();
        assert_eq!(details.sale.total_amount_cents, preview.total_amount_cents);
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.state, SaleState::Priced);
        assert!(engine.carts().get(&cart_id).is_err());
        assert_eq!(engine.ledger().get_available(&fx.product_id).await.unwrap(), 1);

        engine
            .payments()
            .record_payment(
                &details.sale.id,
                PaymentInput::new(PaymentMethod::Card, details.sale.total_amount_cents),
            )
            .await
            .unwrap();
        assert_eq!(engine.sales().state(&details.sale.id).await.unwrap(), SaleState::Settled);
    }

    #[tokio::test]
    async fn test_failed_checkout_keeps_cart() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 1, 4000, 1).await;
        let engine = SettlementEngine::with_database(fx.db.clone(), SettlementConfig::in_memory());

        let cart_id = engine.carts().create();
        engine.add_to_cart(&cart_id, &fx.product_id, 2).await.unwrap();

        let err = engine
            .checkout_cart(&cart_id, CreateSaleInput::new(CASHIER_ID))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InsufficientStock { .. }));
        assert_eq!(engine.carts().get(&cart_id).unwrap().total_quantity(), 2);
        assert!(engine.sales().list_sales(None, None).await.unwrap().is_empty());
        assert_eq!(engine.ledger().get_available(&fx.product_id).await.unwrap(), 1);
    }
}
