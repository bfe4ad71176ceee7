//! Synthetic purchase data for demos and local runs.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::data::IngestError;
use crate::domain::customer::CustomerId;
use crate::domain::product::{Product, ProductId};
use crate::domain::purchase::{Purchase, PURCHASE_COLUMNS};
use crate::errors::DomainError;

pub const CATEGORIES: [&str; 5] = ["Electronics", "Books", "Clothing", "Home", "Toys"];

const MIN_AMOUNT_CENTS: i64 = 500;
const MAX_AMOUNT_CENTS: i64 = 50_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticDataSpec {
    pub customers: usize,
    pub products: usize,
    pub purchases: usize,
    pub history_days: i64,
    pub today: NaiveDate,
    /// `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SyntheticDataSpec {
    fn default() -> Self {
        Self {
            customers: 500,
            products: 50,
            purchases: 5000,
            history_days: 365,
            today: Utc::now().date_naive(),
            seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticDataset {
    pub customers: Vec<CustomerId>,
    pub products: Vec<Product>,
    pub purchases: Vec<Purchase>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetFiles {
    pub customers: PathBuf,
    pub products: PathBuf,
    pub purchases: PathBuf,
}

pub fn generate_dataset(spec: &SyntheticDataSpec) -> Result<SyntheticDataset, DomainError> {
    if spec.purchases > 0 && (spec.customers == 0 || spec.products == 0) {
        return Err(DomainError::InvalidParameter {
            operation: "generate_dataset",
            parameter: "customers/products",
            value: format!("{}/{}", spec.customers, spec.products),
            reason: "purchases need at least one customer and one product".to_owned(),
        });
    }
    if spec.history_days < 0 {
        return Err(DomainError::InvalidParameter {
            operation: "generate_dataset",
            parameter: "history_days",
            value: spec.history_days.to_string(),
            reason: "must not be negative".to_owned(),
        });
    }

    let mut rng = match spec.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut seen = HashSet::with_capacity(spec.customers);
    let mut customers = Vec::with_capacity(spec.customers);
    while customers.len() < spec.customers {
        let id = format!("{:08x}", rng.gen::<u32>());
        if seen.insert(id.clone()) {
            customers.push(CustomerId(id));
        }
    }

    let products: Vec<Product> = (0..spec.products)
        .map(|index| Product {
            id: ProductId(format!("P{index:03}")),
            category: CATEGORIES[rng.gen_range(0..CATEGORIES.len())].to_owned(),
        })
        .collect();

    let mut purchases = Vec::with_capacity(spec.purchases);
    for _ in 0..spec.purchases {
        let (Some(customer), Some(product)) = (customers.choose(&mut rng), products.choose(&mut rng))
        else {
            break;
        };
        let amount = Decimal::new(rng.gen_range(MIN_AMOUNT_CENTS..=MAX_AMOUNT_CENTS), 2);
        let date = spec.today - Duration::days(rng.gen_range(0..=spec.history_days));
        purchases.push(Purchase {
            customer_id: customer.clone(),
            product_id: product.id.clone(),
            category: product.category.clone(),
            amount,
            date,
        });
    }

    Ok(SyntheticDataset { customers, products, purchases })
}

/// Writes `customers.csv`, `products.csv` and `purchases.csv` into `dir`.
pub fn write_dataset(dir: &Path, dataset: &SyntheticDataset) -> Result<DatasetFiles, IngestError> {
    fs::create_dir_all(dir)
        .map_err(|source| IngestError::WriteFile { path: dir.to_path_buf(), source })?;

    let files = DatasetFiles {
        customers: dir.join("customers.csv"),
        products: dir.join("products.csv"),
        purchases: dir.join("purchases.csv"),
    };

    let mut writer = csv::Writer::from_path(&files.customers)?;
    writer.write_record(["CustomerID"])?;
    for customer in &dataset.customers {
        writer.write_record([customer.as_str()])?;
    }
    flush(writer, &files.customers)?;

    let mut writer = csv::Writer::from_path(&files.products)?;
    writer.write_record(["ProductID", "Category"])?;
    for product in &dataset.products {
        writer.write_record([product.id.as_str(), product.category.as_str()])?;
    }
    flush(writer, &files.products)?;

    write_purchases(&files.purchases, &dataset.purchases)?;

    Ok(files)
}

/// Writes the purchase table to `path` with the loader's header, creating the parent
/// directory. No other file is touched.
pub fn write_purchases(path: &Path, purchases: &[Purchase]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| IngestError::WriteFile { path: parent.to_path_buf(), source })?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(PURCHASE_COLUMNS)?;
    for purchase in purchases {
        let amount = purchase.amount.to_string();
        let date = purchase.date.format("%Y-%m-%d").to_string();
        writer.write_record([
            purchase.customer_id.as_str(),
            purchase.product_id.as_str(),
            purchase.category.as_str(),
            amount.as_str(),
            date.as_str(),
        ])?;
    }
    flush(writer, path)
}

fn flush(mut writer: csv::Writer<fs::File>, path: &Path) -> Result<(), IngestError> {
    writer.flush().map_err(|source| IngestError::WriteFile { path: path.to_path_buf(), source })
}
