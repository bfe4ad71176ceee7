//! Data access: loading the purchase table, filtering it, and producing synthetic data.

pub mod filter;
pub mod generate;
pub mod loader;

use std::path::PathBuf;

use thiserror::Error;

pub use filter::{filter_purchases, sanitize_category, PurchaseFilter};
pub use generate::{
    generate_dataset, write_dataset, write_purchases, DatasetFiles, SyntheticDataSpec,
    SyntheticDataset,
};
pub use loader::{
    load_purchases, load_purchases_from_reader, parse_purchase_date, DroppedRow, LoadSummary,
    LoadedPurchases,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not read purchases file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not write `{path}`: {source}")]
    WriteFile { path: PathBuf, source: std::io::Error },
    #[error("malformed purchase table: {0}")]
    Csv(#[from] csv::Error),
    #[error("purchases file schema does not match expected format (missing columns: {})", .missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("row {row}: PurchaseAmount `{value}` is not a non-negative decimal")]
    InvalidAmount { row: usize, value: String },
}
