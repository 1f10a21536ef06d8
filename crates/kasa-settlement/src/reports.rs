//! # Reports
//!
//! Read-only roll-ups over a date range. Ranges are half-open: `from` is
//! included, `to` is not.

use chrono::{DateTime, Utc};
use tracing::debug;

use kasa_core::profit::{analyze, ProfitAnalysis};
use kasa_core::validation::validate_date_range;
use kasa_core::SalesSummary;
use kasa_db::Database;

use crate::error::SettlementResult;

#[derive(Debug, Clone)]
pub struct ReportService {
    db: Database,
}

impl ReportService {
    pub fn new(db: Database) -> Self {
        ReportService { db }
    }

    /// Sale count, units, discounts, totals and paid amount for the range.
    pub async fn sales_summary(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> SettlementResult<SalesSummary> {
        validate_date_range(from, to)?;
        Ok(self.db.reports().sales_summary(from, to).await?)
    }

    /// Revenue, FIFO cost and profit per product for the range.
    ///
    /// A line sold below cost counts as zero profit; it does not offset
    /// other lines.
    pub async fn profit_analysis(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> SettlementResult<ProfitAnalysis> {
        validate_date_range(from, to)?;
        let lines = self.db.reports().profit_lines(from, to).await?;
        debug!(lines = lines.len(), "Analyzing profit");
        Ok(analyze(lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SettlementError;
    use crate::orchestrator::{CreateItemInput, CreateSaleInput, SaleService};
    use crate::locks::ProductLocks;
    use crate::testing::{add_batch, fixture, CASHIER_ID};
    use chrono::Duration;

    #[tokio::test]
    async fn test_profit_uses_fifo_cost() {
        let fx = fixture().await;
        add_batch(&fx.db, &fx.product_id, 5, 1000, 3).await;
        add_batch(&fx.db, &fx.product_id, 10, 1200, 1).await;
        let sales = SaleService::new(fx.db.clone(), ProductLocks::new(), "INV");

        let sale = sales.create_sale(CreateSaleInput::new(CASHIER_ID)).await.unwrap();
        let mut input = CreateItemInput::new(&fx.product_id, 8);
        input.unit_price_cents = Some(1500);
        sales.create_sale_item(&sale.id, input).await.unwrap();

        let reports = ReportService::new(fx.db.clone());
        let now = Utc::now();
        let analysis = reports
            .profit_analysis(now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(analysis.revenue_cents, 12000);
        assert_eq!(analysis.cost_cents, 8600);
        assert_eq!(analysis.profit_cents, 3400);
        assert_eq!(analysis.by_product.len(), 1);
        assert_eq!(analysis.by_product[0].quantity_sold, 8);

        let summary = reports
            .sales_summary(now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(summary.sale_count, 1);
        assert_eq!(summary.units_sold, 8);
        assert_eq!(summary.total_amount_cents, 12000);
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let fx = fixture().await;
        let reports = ReportService::new(fx.db.clone());
        let now = Utc::now();
        let err = reports
            .sales_summary(now, now - Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));
    }
}
