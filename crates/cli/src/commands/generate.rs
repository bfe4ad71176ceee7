use std::path::PathBuf;

use chrono::Utc;
use retail_core::data::{generate_dataset, write_dataset, SyntheticDataSpec};
use retail_core::ApplicationError;
use serde_json::json;

use crate::commands::CommandResult;

#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub output_dir: PathBuf,
    pub customers: usize,
    pub products: usize,
    pub purchases: usize,
    pub history_days: i64,
    pub seed: Option<u64>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        let spec = SyntheticDataSpec::default();
        Self {
            output_dir: PathBuf::from("data"),
            customers: spec.customers,
            products: spec.products,
            purchases: spec.purchases,
            history_days: spec.history_days,
            seed: None,
        }
    }
}

pub fn run(options: GenerateOptions) -> CommandResult {
    let spec = SyntheticDataSpec {
        customers: options.customers,
        products: options.products,
        purchases: options.purchases,
        history_days: options.history_days,
        today: Utc::now().date_naive(),
        seed: options.seed,
    };

    let result = generate_dataset(&spec)
        .map_err(ApplicationError::from)
        .and_then(|dataset| {
            write_dataset(&options.output_dir, &dataset)
                .map(|files| (dataset, files))
                .map_err(ApplicationError::from)
        });

    match result {
        Ok((dataset, files)) => CommandResult::success(
            "generate",
            format!(
                "wrote {} purchases for {} customers into `{}`",
                dataset.purchases.len(),
                dataset.customers.len(),
                options.output_dir.display()
            ),
            json!({
                "files": files,
                "customers": dataset.customers.len(),
                "products": dataset.products.len(),
                "purchases": dataset.purchases.len(),
                "seed": options.seed,
            }),
        ),
        Err(error) => CommandResult::from_error("generate", &error),
    }
}
