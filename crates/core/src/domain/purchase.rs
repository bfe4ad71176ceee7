use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;

/// Column headers of the purchase table, in file order.
pub const PURCHASE_COLUMNS: [&str; 5] =
    ["CustomerID", "ProductID", "Category", "PurchaseAmount", "PurchaseDate"];

/// One row of the purchase table. Rows are not unique; the same customer may buy the
/// same product many times on the same day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub category: String,
    pub amount: Decimal,
    pub date: NaiveDate,
}

impl Purchase {
    pub fn new(
        customer_id: impl Into<String>,
        product_id: impl Into<String>,
        category: impl Into<String>,
        amount: Decimal,
        date: NaiveDate,
    ) -> Self {
        Self {
            customer_id: CustomerId::new(customer_id),
            product_id: ProductId::new(product_id),
            category: category.into(),
            amount,
            date,
        }
    }

    /// Amount as `f64` for the numeric stages.
    pub fn amount_f64(&self) -> f64 {
        self.amount.try_into().unwrap_or(0.0)
    }
}
