//! Aggregate sales insights over the purchase table.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::purchase::Purchase;
use crate::events::{EventSink, PipelineEvent};

pub const TOP_PRODUCTS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RevenueEntry {
    pub key: String,
    pub revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SalesInsights {
    /// Best-selling products by revenue, highest first, at most [`TOP_PRODUCTS`].
    pub top_products: Vec<RevenueEntry>,
    /// Every category by revenue, highest first.
    pub category_sales: Vec<RevenueEntry>,
    pub avg_spend_per_customer: Decimal,
    pub customer_count: usize,
    pub total_revenue: Decimal,
}

pub fn analyze_sales(purchases: &[Purchase], sink: &dyn EventSink) -> SalesInsights {
    let mut by_product: HashMap<&str, Decimal> = HashMap::new();
    let mut by_category: HashMap<&str, Decimal> = HashMap::new();
    let mut by_customer: HashMap<&str, Decimal> = HashMap::new();

    for purchase in purchases {
        *by_product.entry(purchase.product_id.as_str()).or_default() += purchase.amount;
        *by_category.entry(purchase.category.as_str()).or_default() += purchase.amount;
        *by_customer.entry(purchase.customer_id.as_str()).or_default() += purchase.amount;
    }

    let mut top_products = ranked(by_product);
    top_products.truncate(TOP_PRODUCTS);
    let category_sales = ranked(by_category);

    let total_revenue: Decimal = by_customer.values().copied().sum();
    let customer_count = by_customer.len();
    let avg_spend_per_customer = if customer_count == 0 {
        Decimal::ZERO
    } else {
        total_revenue / Decimal::from(customer_count)
    };

    sink.emit(
        PipelineEvent::info("analysis.completed", "sales insights computed")
            .with_field("top_products", as_map(&top_products))
            .with_field("category_sales", as_map(&category_sales))
            .with_field("avg_spend_per_customer", avg_spend_per_customer)
            .with_field("customer_count", customer_count),
    );

    SalesInsights {
        top_products,
        category_sales,
        avg_spend_per_customer,
        customer_count,
        total_revenue,
    }
}

/// Revenue descending; equal revenue falls back to key order so output is stable.
fn ranked(totals: HashMap<&str, Decimal>) -> Vec<RevenueEntry> {
    let mut entries: Vec<RevenueEntry> = totals
        .into_iter()
        .map(|(key, revenue)| RevenueEntry { key: key.to_owned(), revenue })
        .collect();
    entries.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.key.cmp(&b.key)));
    entries
}

fn as_map(entries: &[RevenueEntry]) -> BTreeMap<&str, Decimal> {
    entries.iter().map(|entry| (entry.key.as_str(), entry.revenue)).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::analyze_sales;
    use crate::domain::purchase::Purchase;
    use crate::events::InMemoryEventSink;

    fn purchase(customer: &str, product: &str, category: &str, cents: i64) -> Purchase {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).expect("date");
        Purchase::new(customer, product, category, Decimal::new(cents, 2), date)
    }

    #[test]
    fn ranks_products_and_categories_by_revenue() {
        let purchases = vec![
            purchase("C1", "P1", "Books", 1000),
            purchase("C2", "P2", "Toys", 5000),
            purchase("C1", "P1", "Books", 2500),
            purchase("C3", "P3", "Home", 3500),
        ];
        let sink = InMemoryEventSink::default();

        let insights = analyze_sales(&purchases, &sink);

        let products: Vec<&str> = insights.top_products.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(products, vec!["P2", "P1", "P3"]);
        assert_eq!(insights.top_products[1].revenue, Decimal::new(3500, 2));
        let categories: Vec<&str> =
            insights.category_sales.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(categories, vec!["Toys", "Books", "Home"]);
        assert_eq!(insights.avg_spend_per_customer, Decimal::new(4000, 2));
        assert!(sink.find("analysis.completed").is_some());
    }

    #[test]
    fn average_spend_keeps_full_precision() {
        let purchases = vec![
            purchase("C1", "P1", "Books", 1000),
            purchase("C2", "P2", "Toys", 1000),
            purchase("C3", "P3", "Home", 1001),
        ];

        let insights = analyze_sales(&purchases, &InMemoryEventSink::default());

        assert_eq!(insights.avg_spend_per_customer, Decimal::new(3001, 2) / Decimal::from(3));
        assert!(insights.avg_spend_per_customer.scale() > 2);
    }

    #[test]
    fn top_products_are_capped_at_ten() {
        let purchases: Vec<Purchase> = (0..15)
            .map(|i| purchase("C1", &format!("P{i:02}"), "Books", 100 + i))
            .collect();

        let insights = analyze_sales(&purchases, &InMemoryEventSink::default());

        assert_eq!(insights.top_products.len(), 10);
        assert_eq!(insights.top_products[0].key, "P14");
        assert_eq!(insights.category_sales.len(), 1);
    }

    #[test]
    fn revenue_ties_are_ordered_by_key() {
        let purchases = vec![purchase("C1", "PB", "Books", 100), purchase("C2", "PA", "Books", 100)];

        let insights = analyze_sales(&purchases, &InMemoryEventSink::default());

        assert_eq!(insights.top_products[0].key, "PA");
    }

    #[test]
    fn empty_table_yields_zero_average() {
        let insights = analyze_sales(&[], &InMemoryEventSink::default());

        assert!(insights.top_products.is_empty());
        assert_eq!(insights.avg_spend_per_customer, Decimal::ZERO);
        assert_eq!(insights.customer_count, 0);
    }
}
