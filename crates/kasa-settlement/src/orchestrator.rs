//! # Sale Orchestrator
//!
//! The sale lifecycle: header, lines, stock and totals.
//!
//! ## Adding a Line
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_sale_item(sale, {product, qty 3, 10% off})                      │
//! │                                                                         │
//! │  validate input ─► product exists and is active                        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  lock(product) ─► BEGIN                                                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  touch sale ─► sale not settled ─► available >= 3                      │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  plan FIFO cost ─► price line ─► insert item ─► consume stock          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  recompute totals ─► paid <= total ─► COMMIT ─► unlock                 │
//! │                                                                         │
//! │  Any error on the way: transaction dropped, nothing changed.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Derived State
//! `Open` (no items), `Priced` (items, balance outstanding), `Settled`
//! (payments cover the total). Nothing is stored; it is derived on demand.
//! Settled sales keep their lines, bill discount and existence.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use kasa_core::aggregate::{price_line, recompute};
use kasa_core::bill::{format_bill_number, sequence_scope, validate_bill_number};
use kasa_core::payment::summarize;
use kasa_core::profit::item_profit;
use kasa_core::validation::{
    validate_discount, validate_optional_text, validate_price_cents, validate_quantity,
    validate_required, MAX_NOTES_LEN,
};
use kasa_core::{
    DiscountSpec, Money, Payment, PaymentStatus, Product, Sale, SaleItem, SaleState,
    ValidationError, MAX_SALE_ITEMS,
};
use kasa_db::repository::{payment, sale, sale_item, sequence, stock};
use kasa_db::{Database, SaleFilter};

use crate::cart::Cart;
use crate::error::{SettlementError, SettlementResult};
use crate::fifo::FifoCostResolver;
use crate::ledger::Reference;
use crate::locks::ProductLocks;

// =============================================================================
// Inputs & Outputs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSaleInput {
    pub cashier_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Generated as `<PREFIX>-<YYYYMMDD>-<NNNNNN>` when absent.
    #[serde(default)]
    pub bill_number: Option<String>,
    /// Defaults to now.
    #[serde(default)]
    pub sale_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discount: DiscountSpec,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateSaleInput {
    pub fn new(cashier_id: impl Into<String>) -> Self {
        CreateSaleInput {
            cashier_id: cashier_id.into(),
            customer_id: None,
            bill_number: None,
            sale_date: None,
            discount: DiscountSpec::none(),
            notes: None,
        }
    }

    fn validate(&self) -> SettlementResult<()> {
        validate_required("cashier_id", &self.cashier_id)?;
        validate_discount("bill discount", self.discount)?;
        validate_optional_text("notes", self.notes.as_deref(), MAX_NOTES_LEN)?;
        if let Some(bill_number) = &self.bill_number {
            validate_bill_number(bill_number)?;
        }
        Ok(())
    }
}

/// Header changes. `None` leaves a field as it is; `Some(None)` clears an
/// optional one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSaleInput {
    #[serde(default)]
    pub customer_id: Option<Option<String>>,
    #[serde(default)]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub discount: Option<DiscountSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemInput {
    pub product_id: String,
    pub quantity: i64,
    /// Defaults to the product's current price.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub discount: DiscountSpec,
}

impl CreateItemInput {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        CreateItemInput {
            product_id: product_id.into(),
            quantity,
            unit_price_cents: None,
            discount: DiscountSpec::none(),
        }
    }

    fn validate(&self) -> SettlementResult<()> {
        validate_required("product_id", &self.product_id)?;
        validate_quantity(self.quantity)?;
        if let Some(price) = self.unit_price_cents {
            validate_price_cents(price)?;
        }
        validate_discount("line discount", self.discount)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItemInput {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub discount: Option<DiscountSpec>,
}

impl UpdateItemInput {
    fn validate(&self) -> SettlementResult<()> {
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        if let Some(price) = self.unit_price_cents {
            validate_price_cents(price)?;
        }
        if let Some(discount) = self.discount {
            validate_discount("line discount", discount)?;
        }
        Ok(())
    }
}

/// Everything about one sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleDetails {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub payments: Vec<Payment>,
    pub payment_status: PaymentStatus,
    pub state: SaleState,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct SaleService {
    db: Database,
    locks: ProductLocks,
    bill_prefix: String,
}

impl SaleService {
    pub fn new(db: Database, locks: ProductLocks, bill_prefix: impl Into<String>) -> Self {
        SaleService {
            db,
            locks,
            bill_prefix: bill_prefix.into(),
        }
    }

    // =========================================================================
    // Sales
    // =========================================================================

    pub async fn create_sale(&self, input: CreateSaleInput) -> SettlementResult<Sale> {
        input.validate()?;
        self.require_cashier(&input.cashier_id).await?;
        if let Some(customer_id) = &input.customer_id {
            self.require_customer(customer_id).await?;
        }

        let mut tx = self.db.begin().await?;
        let created = self.insert_sale(&mut tx, &input).await?;
        tx.commit().await?;

        info!(sale_id = %created.id, bill_number = %created.bill_number, cashier_id = %created.cashier_id, "Sale created");
        Ok(created)
    }

    pub async fn get_sale(&self, sale_id: &str) -> SettlementResult<Sale> {
        self.db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Sale", sale_id))
    }

    pub async fn get_sale_by_bill_number(&self, bill_number: &str) -> SettlementResult<Sale> {
        self.db
            .sales()
            .get_by_bill_number(bill_number)
            .await?
            .ok_or_else(|| SettlementError::not_found("Sale", bill_number))
    }

    /// Sale with its items, payments, payment status and derived state.
    pub async fn get_sale_details(&self, sale_id: &str) -> SettlementResult<SaleDetails> {
        let mut conn = self.db.pool().acquire().await?;
        let current = load_sale(&mut conn, sale_id).await?;
        let items = sale_item::list_for_sale(&mut conn, sale_id).await?;
        let payments = payment::list_for_sale(&mut conn, sale_id).await?;

        let payment_status = summarize(current.total_amount(), &payments);
        let state = SaleState::derive(items.len(), &payment_status);

        Ok(SaleDetails {
            sale: current,
            items,
            payments,
            payment_status,
            state,
        })
    }

    pub async fn state(&self, sale_id: &str) -> SettlementResult<SaleState> {
        Ok(self.get_sale_details(sale_id).await?.state)
    }

    /// Changes customer, notes and bill discount, then recomputes totals.
    ///
    /// A settled sale accepts customer and notes changes only.
    pub async fn update_sale(&self, sale_id: &str, input: UpdateSaleInput) -> SettlementResult<Sale> {
        if let Some(discount) = input.discount {
            validate_discount("bill discount", discount)?;
        }
        if let Some(Some(notes)) = &input.notes {
            validate_optional_text("notes", Some(notes), MAX_NOTES_LEN)?;
        }
        if let Some(Some(customer_id)) = &input.customer_id {
            self.require_customer(customer_id).await?;
        }

        let mut tx = self.db.begin().await?;
        sale::touch(&mut tx, sale_id).await?;
        let current = load_sale(&mut tx, sale_id).await?;
        let items = sale_item::list_for_sale(&mut tx, sale_id).await?;
        let payments = payment::list_for_sale(&mut tx, sale_id).await?;

        let mut next = current.clone();
        if let Some(discount) = input.discount {
            if discount != current.bill_discount() {
                ensure_mutable(&current, items.len(), &payments)?;
            }
            next.discount_percentage_bps = discount.percentage_bps;
            next.discount_fixed_cents = discount.fixed_cents;
        }
        if let Some(customer_id) = input.customer_id {
            next.customer_id = customer_id;
        }
        if let Some(notes) = input.notes {
            next.notes = notes;
        }

        sale::update_header(&mut tx, &next).await?;
        let next = store_totals(&mut tx, &next, &items, &payments).await?;
        tx.commit().await?;

        info!(sale_id = %sale_id, total = next.total_amount_cents, "Sale updated");
        Ok(next)
    }

    /// Deletes a sale without payments and returns all of its stock.
    ///
    /// The bill number stays consumed.
    pub async fn delete_sale(&self, sale_id: &str) -> SettlementResult<()> {
        let items = self.db.sale_items().list_for_sale(sale_id).await?;
        let mut locked: Vec<String> = items.iter().map(|i| i.product_id.clone()).collect();
        locked.sort();
        locked.dedup();
        let _guards = self.locks.lock_many(&locked).await;

        let mut tx = self.db.begin().await?;
        sale::touch(&mut tx, sale_id).await?;
        let current = load_sale(&mut tx, sale_id).await?;

        let payments = payment::list_for_sale(&mut tx, sale_id).await?;
        if !payments.is_empty() {
            warn!(sale_id = %sale_id, payments = payments.len(), "Refusing to delete paid sale");
            return Err(SettlementError::SaleHasPayments {
                sale_id: sale_id.to_string(),
                payment_count: payments.len() as i64,
            });
        }

        let items = sale_item::list_for_sale(&mut tx, sale_id).await?;
        if items.iter().any(|i| locked.binary_search(&i.product_id).is_err()) {
            return Err(SettlementError::Consistency(format!(
                "sale {sale_id} gained items while being deleted"
            )));
        }

        let mut returned = 0;
        for item in &items {
            returned += FifoCostResolver::release_all(
                &mut tx,
                &item.product_id,
                Reference::sale_item(&item.id),
                &current.cashier_id,
            )
            .await?;
        }

        sale::delete(&mut tx, sale_id).await?;
        tx.commit().await?;

        info!(sale_id = %sale_id, bill_number = %current.bill_number, units_returned = returned, "Sale deleted");
        Ok(())
    }

    /// Newest first, default page.
    pub async fn list_sales(&self, limit: Option<i64>, offset: Option<i64>) -> SettlementResult<Vec<Sale>> {
        self.search_sales(&SaleFilter {
            limit,
            offset,
            ..SaleFilter::default()
        })
        .await
    }

    pub async fn search_sales(&self, filter: &SaleFilter) -> SettlementResult<Vec<Sale>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            kasa_core::validation::validate_date_range(from, to)?;
        }
        Ok(self.db.sales().search(filter).await?)
    }

    // =========================================================================
    // Sale Items
    // =========================================================================

    pub async fn create_sale_item(&self, sale_id: &str, input: CreateItemInput) -> SettlementResult<SaleItem> {
        input.validate()?;
        let product = self.require_product(&input.product_id).await?;

        let _guard = self.locks.lock(&product.id).await;
        let mut tx = self.db.begin().await?;
        sale::touch(&mut tx, sale_id).await?;
        let current = load_sale(&mut tx, sale_id).await?;
        let payments = payment::list_for_sale(&mut tx, sale_id).await?;
        let count = sale_item::count_for_sale(&mut tx, sale_id).await?;
        ensure_mutable(&current, count as usize, &payments)?;

        let item = add_item(&mut tx, &current, &product, &input).await?;

        let items = sale_item::list_for_sale(&mut tx, sale_id).await?;
        let totals = store_totals(&mut tx, &current, &items, &payments).await?;
        tx.commit().await?;

        info!(
            sale_id = %sale_id,
            item_id = %item.id,
            product_id = %item.product_id,
            quantity = item.quantity,
            unit_cost = item.unit_cost_cents,
            line_total = item.line_total_cents,
            sale_total = totals.total_amount_cents,
            "Sale item added"
        );
        Ok(item)
    }

    pub async fn get_sale_item(&self, item_id: &str) -> SettlementResult<SaleItem> {
        self.db
            .sale_items()
            .get_by_id(item_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("SaleItem", item_id))
    }

    pub async fn list_sale_items(&self, sale_id: &str) -> SettlementResult<Vec<SaleItem>> {
        self.get_sale(sale_id).await?;
        Ok(self.db.sale_items().list_for_sale(sale_id).await?)
    }

    /// Changes quantity, price and/or line discount of a line.
    ///
    /// A larger quantity draws the difference FIFO; a smaller one gives it
    /// back to the batches drawn most recently. Unit cost is left as it was
    /// resolved when the line was created.
    pub async fn update_sale_item(&self, item_id: &str, input: UpdateItemInput) -> SettlementResult<SaleItem> {
        input.validate()?;
        let stored = self.get_sale_item(item_id).await?;

        let _guard = self.locks.lock(&stored.product_id).await;
        let mut tx = self.db.begin().await?;
        sale::touch(&mut tx, &stored.sale_id).await?;
        let item = sale_item::get_by_id(&mut tx, item_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("SaleItem", item_id))?;
        let current = load_sale(&mut tx, &item.sale_id).await?;
        let payments = payment::list_for_sale(&mut tx, &item.sale_id).await?;
        let count = sale_item::count_for_sale(&mut tx, &item.sale_id).await?;
        ensure_mutable(&current, count as usize, &payments)?;

        let quantity = input.quantity.unwrap_or(item.quantity);
        let reference = Reference::sale_item(&item.id);
        match quantity.cmp(&item.quantity) {
            Ordering::Greater => {
                let extra = quantity - item.quantity;
                ensure_available(&mut tx, &item.product_id, extra).await?;
                FifoCostResolver::consume(&mut tx, &item.product_id, extra, reference, &current.cashier_id)
                    .await?;
            }
            Ordering::Less => {
                FifoCostResolver::release(
                    &mut tx,
                    &item.product_id,
                    item.quantity - quantity,
                    reference,
                    &current.cashier_id,
                )
                .await?;
            }
            Ordering::Equal => {}
        }

        let unit_price_cents = input.unit_price_cents.unwrap_or(item.unit_price_cents);
        let discount = input.discount.unwrap_or_else(|| item.line_discount());
        let pricing = price_line(Money::from_cents(unit_price_cents), quantity, discount);

        let updated = SaleItem {
            quantity,
            unit_price_cents,
            discount_percentage_bps: discount.percentage_bps,
            discount_fixed_cents: discount.fixed_cents,
            discount_cents: pricing.discount.cents(),
            line_total_cents: pricing.line_total.cents(),
            updated_at: Utc::now(),
            ..item.clone()
        };
        sale_item::update(&mut tx, &updated).await?;

        let items = sale_item::list_for_sale(&mut tx, &item.sale_id).await?;
        let totals = store_totals(&mut tx, &current, &items, &payments).await?;
        tx.commit().await?;

        info!(
            item_id = %item_id,
            from_quantity = item.quantity,
            to_quantity = quantity,
            line_total = updated.line_total_cents,
            sale_total = totals.total_amount_cents,
            "Sale item updated"
        );
        Ok(updated)
    }

    /// Returns the line's stock and removes it.
    pub async fn delete_sale_item(&self, item_id: &str) -> SettlementResult<()> {
        let stored = self.get_sale_item(item_id).await?;

        let _guard = self.locks.lock(&stored.product_id).await;
        let mut tx = self.db.begin().await?;
        sale::touch(&mut tx, &stored.sale_id).await?;
        let item = sale_item::get_by_id(&mut tx, item_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("SaleItem", item_id))?;
        let current = load_sale(&mut tx, &item.sale_id).await?;
        let payments = payment::list_for_sale(&mut tx, &item.sale_id).await?;
        let count = sale_item::count_for_sale(&mut tx, &item.sale_id).await?;
        ensure_mutable(&current, count as usize, &payments)?;

        let returned = FifoCostResolver::release_all(
            &mut tx,
            &item.product_id,
            Reference::sale_item(&item.id),
            &current.cashier_id,
        )
        .await?;
        if returned != item.quantity {
            return Err(SettlementError::Consistency(format!(
                "sale item {item_id} holds {returned} units but has quantity {}",
                item.quantity
            )));
        }
        sale_item::delete(&mut tx, item_id).await?;

        let items = sale_item::list_for_sale(&mut tx, &item.sale_id).await?;
        let totals = store_totals(&mut tx, &current, &items, &payments).await?;
        tx.commit().await?;

        info!(item_id = %item_id, sale_id = %item.sale_id, units_returned = returned, sale_total = totals.total_amount_cents, "Sale item deleted");
        Ok(())
    }

    // =========================================================================
    // Profit
    // =========================================================================

    /// `max(0, (unit_price × qty − line_discount) − unit_cost × qty)`.
    pub fn item_profit(unit_cost: Money, unit_price: Money, line_discount: Money, quantity: i64) -> Money {
        item_profit(unit_cost, unit_price, line_discount, quantity)
    }

    pub async fn sale_item_profit(&self, item_id: &str) -> SettlementResult<Money> {
        let item = self.get_sale_item(item_id).await?;
        Ok(item_profit(
            item.unit_cost(),
            item.unit_price(),
            Money::from_cents(item.discount_cents),
            item.quantity,
        ))
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Turns a cart into a sale in one transaction.
    ///
    /// Lines keep the price frozen in the cart. The cart's bill discount
    /// replaces `input.discount`. Either every line is sold or none is.
    pub async fn checkout(&self, cart: &Cart, input: CreateSaleInput) -> SettlementResult<SaleDetails> {
        if cart.lines.is_empty() {
            return Err(ValidationError::Required {
                field: "cart lines".to_string(),
            }
            .into());
        }
        let input = CreateSaleInput {
            discount: cart.bill_discount,
            ..input
        };
        input.validate()?;
        self.require_cashier(&input.cashier_id).await?;
        if let Some(customer_id) = &input.customer_id {
            self.require_customer(customer_id).await?;
        }

        let mut lines = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let item_input = CreateItemInput {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_price_cents: Some(line.unit_price_cents),
                discount: line.discount,
            };
            item_input.validate()?;
            let product = self.require_product(&line.product_id).await?;
            lines.push((product, item_input));
        }

        let _guards = self
            .locks
            .lock_many(lines.iter().map(|(p, _)| p.id.as_str()))
            .await;
        let mut tx = self.db.begin().await?;
        let created = self.insert_sale(&mut tx, &input).await?;
        for (product, item_input) in &lines {
            add_item(&mut tx, &created, product, item_input).await?;
        }
        let items = sale_item::list_for_sale(&mut tx, &created.id).await?;
        let totals = store_totals(&mut tx, &created, &items, &[]).await?;
        tx.commit().await?;

        info!(sale_id = %totals.id, bill_number = %totals.bill_number, items = items.len(), total = totals.total_amount_cents, "Cart checked out");

        let payment_status = summarize(totals.total_amount(), &[]);
        let state = SaleState::derive(items.len(), &payment_status);
        Ok(SaleDetails {
            sale: totals,
            items,
            payments: Vec::new(),
            payment_status,
            state,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn insert_sale(&self, conn: &mut SqliteConnection, input: &CreateSaleInput) -> SettlementResult<Sale> {
        let now = Utc::now();
        let sale_date = input.sale_date.unwrap_or(now);

        let bill_number = match &input.bill_number {
            Some(supplied) => supplied.trim().to_string(),
            None => self.next_bill_number(conn, sale_date.date_naive()).await?,
        };

        let draft = Sale {
            id: Uuid::new_v4().to_string(),
            bill_number,
            customer_id: input.customer_id.clone(),
            cashier_id: input.cashier_id.clone(),
            sale_date,
            discount_percentage_bps: input.discount.percentage_bps,
            discount_fixed_cents: input.discount.fixed_cents,
            subtotal_cents: 0,
            discount_cents: 0,
            total_amount_cents: 0,
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        let created = recompute(&draft, &[]);

        sale::insert(conn, &created).await.map_err(|err| {
            if err.is_unique_violation_on("sales.bill_number") {
                warn!(bill_number = %created.bill_number, "Duplicate bill number");
                SettlementError::DuplicateBillNumber(created.bill_number.clone())
            } else {
                err.into()
            }
        })?;

        Ok(created)
    }

    async fn next_bill_number(&self, conn: &mut SqliteConnection, date: NaiveDate) -> SettlementResult<String> {
        let scope = sequence_scope(&self.bill_prefix, date);
        let value = sequence::next_value(conn, &scope).await?;
        Ok(format_bill_number(&self.bill_prefix, date, value))
    }

    async fn require_product(&self, product_id: &str) -> SettlementResult<Product> {
        let product = self
            .db
            .catalog()
            .get_product(product_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Product", product_id))?;
        if !product.is_active {
            return Err(SettlementError::inactive("Product", product_id));
        }
        Ok(product)
    }

    async fn require_cashier(&self, cashier_id: &str) -> SettlementResult<()> {
        let user = self
            .db
            .catalog()
            .get_user(cashier_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Cashier", cashier_id))?;
        if !user.is_active {
            return Err(SettlementError::inactive("Cashier", cashier_id));
        }
        Ok(())
    }

    async fn require_customer(&self, customer_id: &str) -> SettlementResult<()> {
        self.db
            .catalog()
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Customer", customer_id))?;
        Ok(())
    }
}

// =============================================================================
// Transaction Steps
// =============================================================================

async fn load_sale(conn: &mut SqliteConnection, sale_id: &str) -> SettlementResult<Sale> {
    sale::get_by_id(conn, sale_id)
        .await?
        .ok_or_else(|| SettlementError::not_found("Sale", sale_id))
}

pub(crate) fn ensure_mutable(current: &Sale, item_count: usize, payments: &[Payment]) -> SettlementResult<()> {
    let status = summarize(current.total_amount(), payments);
    if !SaleState::derive(item_count, &status).is_mutable() {
        warn!(sale_id = %current.id, "Sale is settled");
        return Err(SettlementError::SaleSettled {
            sale_id: current.id.clone(),
        });
    }
    Ok(())
}

async fn ensure_available(conn: &mut SqliteConnection, product_id: &str, quantity: i64) -> SettlementResult<()> {
    let available = stock::available(conn, product_id).await?;
    if available < quantity {
        warn!(product_id = %product_id, available, requested = quantity, "Insufficient stock");
        return Err(SettlementError::InsufficientStock {
            product_id: product_id.to_string(),
            available,
            requested: quantity,
        });
    }
    Ok(())
}

/// Costs, prices, stores and draws one new line.
async fn add_item(
    conn: &mut SqliteConnection,
    current: &Sale,
    product: &Product,
    input: &CreateItemInput,
) -> SettlementResult<SaleItem> {
    let count = sale_item::count_for_sale(conn, &current.id).await?;
    if count as usize >= MAX_SALE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "sale items".to_string(),
            min: 1,
            max: MAX_SALE_ITEMS as i64,
        }
        .into());
    }

    ensure_available(conn, &product.id, input.quantity).await?;
    let plan = FifoCostResolver::plan(conn, &product.id, input.quantity).await?;

    let unit_price = Money::from_cents(input.unit_price_cents.unwrap_or(product.price_cents));
    let pricing = price_line(unit_price, input.quantity, input.discount);

    let now = Utc::now();
    let item = SaleItem {
        id: Uuid::new_v4().to_string(),
        sale_id: current.id.clone(),
        product_id: product.id.clone(),
        quantity: input.quantity,
        unit_price_cents: unit_price.cents(),
        unit_cost_cents: plan.unit_cost.cents(),
        discount_percentage_bps: input.discount.percentage_bps,
        discount_fixed_cents: input.discount.fixed_cents,
        discount_cents: pricing.discount.cents(),
        line_total_cents: pricing.line_total.cents(),
        created_at: now,
        updated_at: now,
    };
    sale_item::insert(conn, &item).await?;

    let consumed = FifoCostResolver::consume(
        conn,
        &product.id,
        input.quantity,
        Reference::sale_item(&item.id),
        &current.cashier_id,
    )
    .await?;
    if consumed.unit_cost != plan.unit_cost {
        return Err(SettlementError::Consistency(format!(
            "FIFO cost for {} moved from {} to {} inside one transaction",
            product.id, plan.unit_cost, consumed.unit_cost
        )));
    }

    Ok(item)
}

/// Recomputes totals from `items` and stores them.
///
/// ## Errors
/// `TotalBelowPaid` if the new total is below what `payments` already cover.
async fn store_totals(
    conn: &mut SqliteConnection,
    current: &Sale,
    items: &[SaleItem],
    payments: &[Payment],
) -> SettlementResult<Sale> {
    let next = recompute(current, items);
    let paid: Money = payments.iter().map(Payment::amount).sum();

    if paid > next.total_amount() {
        warn!(sale_id = %current.id, total = next.total_amount_cents, paid = paid.cents(), "Change would leave sale overpaid");
        return Err(SettlementError::TotalBelowPaid {
            sale_id: current.id.clone(),
            total_cents: next.total_amount_cents,
            paid_cents: paid.cents(),
        });
    }

    sale::update_totals(conn, &next).await?;
    Ok(next)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{PaymentInput, PaymentReconciler};
    use crate::testing::{add_batch, fixture, CASHIER_ID};
    use kasa_core::PaymentMethod;

    fn service(fx: &crate::testing::Fixture) -> SaleService {
        SaleService::new(fx.db.clone(), ProductLocks::new(), "INV")
    }

    #[tokio::test]
    async fn test_generated_bill_numbers_are_sequential() {
        let fx = fixture().await;
        let sales = service(&fx);
        let day = "2026-01-31T10:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let mut input = CreateSaleInput::new(CASHIER_ID);
        input.sale_date = Some(day);
        let first = sales.create_sale(input.clone()).await.unwrap();
        let second = sales.create_sale(input).await.unwrap();

        assert_eq!(first.bill_number, "INV-20260131-000001");
        assert_eq!(second.bill_number, "INV-20260131-000002");
        assert_eq!(first.total_amount_cents, 0);
    }

    #[tokio::test]
    async fn test_supplied_duplicate_bill_number() {
        let fx = fixture().await;
        let sales = service(&fx);

        let mut input = CreateSaleInput::new(CASHIER_ID);
        input.bill_number = Some("MANUAL-1".into());
        sales.create_sale(input.clone()).await.unwrap();

        let err = sales.create_sale(input).await.unwrap_err();
        assert!(matches!(err, SettlementError::DuplicateBillNumber(ref b) if b == "MANUAL-1"));
    }

    #[tokio::test]
    async fn test_unknown_references_rejected() {
        let fx = fixture().await;
        let sales = service(&fx);

        let err = sales.create_sale(CreateSaleInput::new("nobody")).await.unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { ref entity, .. } if entity == "Cashier"));

        let mut input = CreateSaleInput::new(CASHIER_ID);
        input.customer_id = Some("nobody".into());
        let err = sales.create_sale(input).await.unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { ref entity, .. } if entity == "Customer"));

        let sale = sales.create_sale(CreateSaleInput::new(CASHIER_ID)).await.unwrap();
        let err = sales
            .create_sale_item(&sale.id, CreateItemInput::new("nothing", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { ref entity, .. } if entity == "Product"));
    }

    #[tokio::test]
    async fn test_item_costs_prices_and_totals() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 5, 1000, 3).await;
        add_batch(&fx.db, &fx.product_id, 10, 1200, 1).await;
        let sales = service(&fx);

        let sale = sales.create_sale(CreateSaleInput::new(CASHIER_ID)).await.unwrap();
        let mut input = CreateItemInput::new(&fx.product_id, 8);
        input.unit_price_cents = Some(1500);
        input.discount = DiscountSpec::percentage(1000);
        let item = sales.create_sale_item(&sale.id, input).await.unwrap();

        assert_eq!(item.unit_cost_cents, 1075);
        assert_eq!(item.discount_cents, 1200);
        assert_eq!(item.line_total_cents, 10800);

        let details = sales.get_sale_details(&sale.id).await.unwrap();
        assert_eq!(details.sale.subtotal_cents, 10800);
        assert_eq!(details.sale.total_amount_cents, 10800);
        assert_eq!(details.state, SaleState::Priced);

        // (1500 × 8 − 1200) − 1075 × 8 = 2200
        assert_eq!(sales.sale_item_profit(&item.id).await.unwrap().cents(), 2200);
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_nothing_behind() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 2, 1000, 1).await;
        let sales = service(&fx);
        let sale = sales.create_sale(CreateSaleInput::new(CASHIER_ID)).await.unwrap();

        let err = sales
            .create_sale_item(&sale.id, CreateItemInput::new(&fx.product_id, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InsufficientStock { available: 2, requested: 3, .. }));

        assert!(sales.list_sale_items(&sale.id).await.unwrap().is_empty());
        assert_eq!(fx.db.stock().available(&fx.product_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_settled_sale_is_frozen() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 10, 1000, 1).await;
        let sales = service(&fx);
        let payments = PaymentReconciler::new(fx.db.clone());

        let sale = sales.create_sale(CreateSaleInput::new(CASHIER_ID)).await.unwrap();
        let item = sales
            .create_sale_item(&sale.id, CreateItemInput::new(&fx.product_id, 1))
            .await
            .unwrap();
        payments
            .record_payment(&sale.id, PaymentInput::new(PaymentMethod::Cash, item.line_total_cents))
            .await
            .unwrap();
        assert_eq!(sales.state(&sale.id).await.unwrap(), SaleState::Settled);

        let err = sales
            .create_sale_item(&sale.id, CreateItemInput::new(&fx.product_id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::SaleSettled { .. }));

        let err = sales
            .update_sale(
                &sale.id,
                UpdateSaleInput {
                    discount: Some(DiscountSpec::fixed(100)),
                    ..UpdateSaleInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::SaleSettled { .. }));

        // notes are still editable
        let updated = sales
            .update_sale(
                &sale.id,
                UpdateSaleInput {
                    notes: Some(Some("gift wrap".into())),
                    ..UpdateSaleInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("gift wrap"));

        let err = sales.delete_sale(&sale.id).await.unwrap_err();
        assert!(matches!(err, SettlementError::SaleHasPayments { payment_count: 1, .. }));
    }

    #[tokio::test]
    async fn test_amounts_beyond_ceiling_rejected() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 10, 1000, 1).await;
        let sales = service(&fx);
        let sale = sales.create_sale(CreateSaleInput::new(CASHIER_ID)).await.unwrap();

        let mut input = CreateItemInput::new(&fx.product_id, 2);
        input.unit_price_cents = Some(i64::MAX / 2 + 10);
        let err = sales.create_sale_item(&sale.id, input).await.unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));
        assert!(sales.list_sale_items(&sale.id).await.unwrap().is_empty());
        assert_eq!(fx.db.stock().available(&fx.product_id).await.unwrap(), 10);

        sales
            .create_sale_item(&sale.id, CreateItemInput::new(&fx.product_id, 1))
            .await
            .unwrap();
        let before = sales.get_sale(&sale.id).await.unwrap();

        let err = sales
            .update_sale(
                &sale.id,
                UpdateSaleInput {
                    discount: Some(DiscountSpec::new(1000, i64::MAX)),
                    ..UpdateSaleInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));

        let after = sales.get_sale(&sale.id).await.unwrap();
        assert_eq!(after.total_amount_cents, before.total_amount_cents);
        assert!(after.total_amount_cents >= 0);
    }

    #[tokio::test]
    async fn test_fully_discounted_sale_stays_editable() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 10, 1000, 1).await;
        let sales = service(&fx);
        let payments = PaymentReconciler::new(fx.db.clone());

        let sale = sales.create_sale(CreateSaleInput::new(CASHIER_ID)).await.unwrap();
        let item = sales
            .create_sale_item(&sale.id, CreateItemInput::new(&fx.product_id, 1))
            .await
            .unwrap();
        let free = sales
            .update_sale(
                &sale.id,
                UpdateSaleInput {
                    discount: Some(DiscountSpec::percentage(10000)),
                    ..UpdateSaleInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(free.total_amount_cents, 0);

        // nothing is owed, so any payment overpays and the sale never settles
        let err = payments
            .record_payment(&sale.id, PaymentInput::new(PaymentMethod::Cash, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Overpayment { total_cents: 0, .. }));
        assert_eq!(sales.state(&sale.id).await.unwrap(), SaleState::Priced);

        let restored = sales
            .update_sale(
                &sale.id,
                UpdateSaleInput {
                    discount: Some(DiscountSpec::none()),
                    ..UpdateSaleInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(restored.total_amount_cents, item.line_total_cents);
    }

    #[tokio::test]
    async fn test_delete_sale_returns_stock() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 10, 1000, 1).await;
        let sales = service(&fx);

        let sale = sales.create_sale(CreateSaleInput::new(CASHIER_ID)).await.unwrap();
        sales
            .create_sale_item(&sale.id, CreateItemInput::new(&fx.product_id, 4))
            .await
            .unwrap();
        assert_eq!(fx.db.stock().available(&fx.product_id).await.unwrap(), 6);

        sales.delete_sale(&sale.id).await.unwrap();
        assert_eq!(fx.db.stock().available(&fx.product_id).await.unwrap(), 10);
        assert!(matches!(
            sales.get_sale(&sale.id).await,
            Err(SettlementError::NotFound { .. })
        ));
    }

    #[test]
    fn test_item_profit_clamps_losses() {
        let c = Money::from_cents;
        assert_eq!(SaleService::item_profit(c(1000), c(1500), c(0), 2).cents(), 1000);
        assert_eq!(SaleService::item_profit(c(2000), c(1500), c(0), 1).cents(), 0);
    }
}
