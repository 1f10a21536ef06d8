//! # Cart Sessions
//!
//! In-progress carts, one per register session, before they become sales.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Register Action          CartSessions              Cart Change         │
//! │  ───────────────          ────────────              ───────────         │
//! │                                                                         │
//! │  New customer ──────────► create() ───────────────► empty cart, id      │
//! │  Scan product ──────────► with_cart_mut(add_product) lines.push/merge  │
//! │  Change quantity ───────► with_cart_mut(set_quantity)                  │
//! │  Line discount ─────────► with_cart_mut(set_line_discount)             │
//! │  Show totals ───────────► preview() ──────────────► (read only)        │
//! │  Suggest promotion ─────► suggest_rule(rules) ────► (read only)        │
//! │  Pay ───────────────────► SettlementEngine::checkout_cart ► evict()    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines freeze name, category and price when added, so the preview does
//! not move if the catalog changes mid-sale. Nothing here touches stock;
//! availability is checked at checkout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use kasa_core::aggregate::{price_line, totals};
use kasa_core::rules::{best_rule, DiscountRule, RuleContext, RuleLine};
use kasa_core::validation::{validate_discount, validate_quantity};
use kasa_core::{DiscountOutcome, DiscountSpec, Money, Product, ValidationError, MAX_ITEM_QUANTITY, MAX_SALE_ITEMS};

use crate::error::{SettlementError, SettlementResult};

// =============================================================================
// Cart
// =============================================================================

/// A product in the cart, frozen at the time it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub category_id: Option<String>,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub discount: DiscountSpec,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartLine {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            category_id: product.category_id.clone(),
            unit_price_cents: product.price_cents,
            quantity,
            discount: DiscountSpec::none(),
            added_at: Utc::now(),
        }
    }
}

/// Lines are unique by product. Adding a product again raises its quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub lines: Vec<CartLine>,
    pub bill_discount: DiscountSpec,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    pub fn new() -> Self {
        let now = Utc::now();
        Cart {
            id: Uuid::new_v4().to_string(),
            lines: Vec::new(),
            bill_discount: DiscountSpec::none(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_product(&mut self, product: &Product, quantity: i64) -> SettlementResult<()> {
        validate_quantity(quantity)?;
        if !product.is_active {
            return Err(SettlementError::inactive("Product", &product.id));
        }

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let merged = line.quantity + quantity;
            if merged > MAX_ITEM_QUANTITY {
                return Err(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max: MAX_ITEM_QUANTITY,
                }
                .into());
            }
            line.quantity = merged;
        } else {
            if self.lines.len() >= MAX_SALE_ITEMS {
                return Err(ValidationError::OutOfRange {
                    field: "cart lines".to_string(),
                    min: 1,
                    max: MAX_SALE_ITEMS as i64,
                }
                .into());
            }
            self.lines.push(CartLine::from_product(product, quantity));
        }

        self.touch();
        Ok(())
    }

    /// Zero removes the line.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) -> SettlementResult<()> {
        if quantity == 0 {
            return self.remove_line(product_id);
        }
        validate_quantity(quantity)?;
        self.line_mut(product_id)?.quantity = quantity;
        self.touch();
        Ok(())
    }

    pub fn set_line_discount(&mut self, product_id: &str, discount: DiscountSpec) -> SettlementResult<()> {
        validate_discount("line discount", discount)?;
        self.line_mut(product_id)?.discount = discount;
        self.touch();
        Ok(())
    }

    pub fn set_bill_discount(&mut self, discount: DiscountSpec) -> SettlementResult<()> {
        validate_discount("bill discount", discount)?;
        self.bill_discount = discount;
        self.touch();
        Ok(())
    }

    pub fn remove_line(&mut self, product_id: &str) -> SettlementResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return Err(SettlementError::not_found("CartLine", product_id));
        }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.bill_discount = DiscountSpec::none();
        self.touch();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Prices every line and the bill exactly as checkout will.
    pub fn preview(&self) -> CartPreview {
        let lines: Vec<CartLinePreview> = self
            .lines
            .iter()
            .map(|line| {
                let pricing = price_line(Money::from_cents(line.unit_price_cents), line.quantity, line.discount);
                CartLinePreview {
                    product_id: line.product_id.clone(),
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price_cents,
                    gross_cents: pricing.gross.cents(),
                    discount_cents: pricing.discount.cents(),
                    line_total_cents: pricing.line_total.cents(),
                }
            })
            .collect();

        let bill = totals(
            lines.iter().map(|l| Money::from_cents(l.line_total_cents)),
            self.bill_discount,
        );

        CartPreview {
            cart_id: self.id.clone(),
            item_count: lines.len(),
            total_quantity: self.total_quantity(),
            subtotal_cents: bill.subtotal.cents(),
            discount_cents: bill.discount.cents(),
            total_amount_cents: bill.total_amount.cents(),
            lines,
        }
    }

    /// What discount rules see: line totals after line discounts.
    pub fn rule_context(&self) -> RuleContext {
        RuleContext::new(
            self.lines
                .iter()
                .map(|line| RuleLine {
                    category_id: line.category_id.clone(),
                    quantity: line.quantity,
                    line_total: price_line(Money::from_cents(line.unit_price_cents), line.quantity, line.discount)
                        .line_total,
                })
                .collect(),
        )
    }

    fn line_mut(&mut self, product_id: &str) -> SettlementResult<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| SettlementError::not_found("CartLine", product_id))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLinePreview {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub gross_cents: i64,
    pub discount_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartPreview {
    pub cart_id: String,
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_amount_cents: i64,
    pub lines: Vec<CartLinePreview>,
}

// =============================================================================
// Sessions
// =============================================================================

/// Carts keyed by id, shared by clone.
///
/// When full, creating a cart evicts the one untouched the longest.
#[derive(Debug, Clone)]
pub struct CartSessions {
    carts: Arc<Mutex<HashMap<String, Cart>>>,
    max_sessions: usize,
}

impl CartSessions {
    pub fn new(max_sessions: usize) -> Self {
        CartSessions {
            carts: Arc::new(Mutex::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
        }
    }

    // A panic inside a closure leaves at worst one half-edited cart; the map
    // itself stays usable.
    fn carts(&self) -> MutexGuard<'_, HashMap<String, Cart>> {
        self.carts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens an empty cart and returns its id.
    pub fn create(&self) -> String {
        let cart = Cart::new();
        let id = cart.id.clone();

        let mut carts = self.carts();
        if carts.len() >= self.max_sessions {
            let stale = carts
                .values()
                .min_by_key(|c| c.updated_at)
                .map(|c| c.id.clone());
            if let Some(stale) = stale {
                carts.remove(&stale);
                info!(cart_id = %stale, "Cart evicted to make room");
            }
        }
        carts.insert(id.clone(), cart);

        debug!(cart_id = %id, open = carts.len(), "Cart created");
        id
    }

    pub fn get(&self, cart_id: &str) -> SettlementResult<Cart> {
        self.with_cart(cart_id, Cart::clone)
    }

    /// Runs `f` with read access to one cart.
    pub fn with_cart<F, R>(&self, cart_id: &str, f: F) -> SettlementResult<R>
    where
        F: FnOnce(&Cart) -> R,
    {
        let carts = self.carts();
        let cart = carts
            .get(cart_id)
            .ok_or_else(|| SettlementError::not_found("Cart", cart_id))?;
        Ok(f(cart))
    }

    /// Runs `f` with write access to one cart.
    ///
    /// ```rust,ignore
    /// sessions.with_cart_mut(&id, |cart| cart.add_product(&product, 2))?;
    /// ```
    pub fn with_cart_mut<F, R>(&self, cart_id: &str, f: F) -> SettlementResult<R>
    where
        F: FnOnce(&mut Cart) -> SettlementResult<R>,
    {
        let mut carts = self.carts();
        let cart = carts
            .get_mut(cart_id)
            .ok_or_else(|| SettlementError::not_found("Cart", cart_id))?;
        f(cart)
    }

    /// Removes a cart, returning it if it was open.
    pub fn evict(&self, cart_id: &str) -> Option<Cart> {
        let evicted = self.carts().remove(cart_id);
        if evicted.is_some() {
            debug!(cart_id = %cart_id, "Cart evicted");
        }
        evicted
    }

    pub fn preview(&self, cart_id: &str) -> SettlementResult<CartPreview> {
        self.with_cart(cart_id, Cart::preview)
    }

    /// The active rule that takes the most off this cart, if any matches.
    pub fn suggest_rule(
        &self,
        cart_id: &str,
        rules: &[DiscountRule],
    ) -> SettlementResult<Option<(DiscountRule, DiscountOutcome)>> {
        let ctx = self.with_cart(cart_id, Cart::rule_context)?;
        Ok(best_rule(rules, &ctx).map(|(rule, outcome)| (rule.clone(), outcome)))
    }

    pub fn len(&self) -> usize {
        self.carts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.carts().is_empty()
    }
}
