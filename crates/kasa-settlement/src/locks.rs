//! # Per-Product Locks
//!
//! Serializes stock consumption and returns for one product.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Register A: add 3 × TEA-500        Register B: add 4 × TEA-500        │
//! │        │                                  │                             │
//! │        ▼                                  ▼                             │
//! │  lock(TEA-500) ── acquired          lock(TEA-500) ── waits              │
//! │  BEGIN; check, plan, draw; COMMIT         │                             │
//! │  guard dropped ──────────────────────────►│ acquired                    │
//! │                                     BEGIN; sees A's draws; ...          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are always taken before the transaction opens. Operations touching
//! several products take them through [`ProductLocks::lock_many`], which
//! orders by product id so two such operations cannot deadlock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Held while a product's stock is being changed.
pub type ProductGuard = OwnedMutexGuard<()>;

#[derive(Debug, Clone, Default)]
pub struct ProductLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries nobody holds or waits on are dropped on the way, so the table
    /// only keeps products that are in use.
    async fn handle(&self, product_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(product_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Waits for exclusive access to one product's stock.
    pub async fn lock(&self, product_id: &str) -> ProductGuard {
        let handle = self.handle(product_id).await;
        trace!(product_id = %product_id, "Waiting for product lock");
        handle.lock_owned().await
    }

    /// Locks several products in id order. Duplicates are locked once.
    pub async fn lock_many<I, S>(&self, product_ids: I) -> Vec<ProductGuard>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids: Vec<String> = product_ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.lock(id).await);
        }
        guards
    }

    /// Products in the lock table.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
