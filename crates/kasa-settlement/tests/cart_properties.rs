//! Cart previews over random carts.

use chrono::Utc;
use kasa_core::{DiscountSpec, Product, MAX_MONEY_CENTS};
use kasa_settlement::Cart;
use proptest::prelude::*;

fn product(n: usize, price_cents: i64) -> Product {
    Product {
        id: format!("p{n}"),
        sku: format!("SKU-{n}"),
        name: format!("Product {n}"),
        category_id: None,
        price_cents,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn near_ceiling() -> std::ops::RangeInclusive<i64> {
    (MAX_MONEY_CENTS - 1_000)..=MAX_MONEY_CENTS
}

fn discount() -> impl Strategy<Value = DiscountSpec> {
    (0i64..=10_000, prop_oneof![0i64..50_000, near_ceiling()])
        .prop_map(|(bps, fixed)| DiscountSpec::new(bps, fixed))
}

proptest! {
    #[test]
    fn preview_totals_stay_in_bounds(
        lines in prop::collection::vec(
            (prop_oneof![1i64..100_000, near_ceiling()], 1i64..=50, discount()),
            1..12,
        ),
        bill in discount(),
    ) {
        let mut cart = Cart::new();
        for (n, (price, quantity, line_discount)) in lines.iter().enumerate() {
            cart.add_product(&product(n, *price), *quantity).unwrap();
            cart.set_line_discount(&format!("p{n}"), *line_discount).unwrap();
        }
        cart.set_bill_discount(bill).unwrap();

        let preview = cart.preview();
        let line_sum: i64 = preview.lines.iter().map(|l| l.line_total_cents).sum();

        prop_assert_eq!(preview.subtotal_cents, line_sum);
        prop_assert_eq!(preview.subtotal_cents - preview.discount_cents, preview.total_amount_cents);
        prop_assert!(preview.total_amount_cents >= 0);
        prop_assert!(preview.total_amount_cents <= preview.subtotal_cents);
        for line in &preview.lines {
            prop_assert!(line.line_total_cents >= 0);
            prop_assert!(line.line_total_cents <= line.gross_cents);
            prop_assert_eq!(line.gross_cents - line.discount_cents, line.line_total_cents);
        }
    }

    #[test]
    fn discounts_above_ceiling_are_refused(
        bps in 0i64..=10_000,
        fixed in (MAX_MONEY_CENTS + 1)..=i64::MAX,
    ) {
        let mut cart = Cart::new();
        cart.add_product(&product(0, 1000), 1).unwrap();

        prop_assert!(cart.set_line_discount("p0", DiscountSpec::new(bps, fixed)).is_err());
        prop_assert!(cart.set_bill_discount(DiscountSpec::new(bps, fixed)).is_err());
        prop_assert_eq!(cart.preview().total_amount_cents, 1000);
    }
}
