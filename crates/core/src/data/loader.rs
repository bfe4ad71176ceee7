use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::data::IngestError;
use crate::domain::purchase::{Purchase, PURCHASE_COLUMNS};
use crate::events::{EventSink, PipelineEvent};

const CUSTOMER: usize = 0;
const PRODUCT: usize = 1;
const CATEGORY: usize = 2;
const AMOUNT: usize = 3;
const DATE: usize = 4;

/// A row that was read but left out of the table. `row` is 1-based over data rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DroppedRow {
    pub row: usize,
    pub value: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub rows_dropped: usize,
    pub dropped_rows: Vec<DroppedRow>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedPurchases {
    pub purchases: Vec<Purchase>,
    pub summary: LoadSummary,
}

pub fn load_purchases(path: &Path, sink: &dyn EventSink) -> Result<LoadedPurchases, IngestError> {
    let file = File::open(path)
        .map_err(|source| IngestError::ReadFile { path: path.to_path_buf(), source })?;

    load_purchases_from_reader(file, sink).map_err(|error| {
        sink.emit(
            PipelineEvent::error("data.load.failed", "error loading purchases file")
                .with_field("path", path.display().to_string())
                .with_field("error", error.to_string()),
        );
        error
    })
}

/// Reads a purchase table. Missing columns are fatal; rows whose date cannot be parsed
/// are dropped and reported in the [`LoadSummary`].
pub fn load_purchases_from_reader<R: Read>(
    reader: R,
    sink: &dyn EventSink,
) -> Result<LoadedPurchases, IngestError> {
    let mut csv_reader =
        csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut indices = [0usize; PURCHASE_COLUMNS.len()];
    let mut missing = Vec::new();
    for (slot, column) in PURCHASE_COLUMNS.iter().enumerate() {
        match headers.iter().position(|header| header == *column) {
            Some(index) => indices[slot] = index,
            None => missing.push((*column).to_owned()),
        }
    }
    if !missing.is_empty() {
        return Err(IngestError::Schema { missing });
    }

    let mut purchases = Vec::new();
    let mut summary = LoadSummary::default();

    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let row = index + 1;
        summary.rows_read += 1;
        let field = |slot: usize| record.get(indices[slot]).unwrap_or_default();

        // Rows are dropped on a bad date before the amount is checked.
        let raw_date = field(DATE);
        let Some(date) = parse_purchase_date(raw_date) else {
            summary.dropped_rows.push(DroppedRow {
                row,
                value: raw_date.to_owned(),
                reason: "unparseable PurchaseDate".to_owned(),
            });
            continue;
        };

        let raw_amount = field(AMOUNT);
        let amount = parse_amount(raw_amount)
            .ok_or_else(|| IngestError::InvalidAmount { row, value: raw_amount.to_owned() })?;

        purchases.push(Purchase::new(
            field(CUSTOMER),
            field(PRODUCT),
            field(CATEGORY),
            amount,
            date,
        ));
    }

    summary.rows_loaded = purchases.len();
    summary.rows_dropped = summary.dropped_rows.len();

    if summary.rows_dropped > 0 {
        sink.emit(
            PipelineEvent::warn("data.load.rows_dropped", "dropped rows with unparseable dates")
                .with_field("rows_dropped", summary.rows_dropped)
                .with_field(
                    "first_rows",
                    summary.dropped_rows.iter().take(10).map(|dropped| dropped.row).collect::<Vec<_>>(),
                ),
        );
    }
    sink.emit(
        PipelineEvent::info("data.load.completed", "loaded and validated purchases data")
            .with_field("rows_read", summary.rows_read)
            .with_field("row_count", summary.rows_loaded)
            .with_field("rows_dropped", summary.rows_dropped),
    );

    Ok(LoadedPurchases { purchases, summary })
}

fn parse_amount(value: &str) -> Option<Decimal> {
    let amount = Decimal::from_str(value).or_else(|_| Decimal::from_scientific(value)).ok()?;
    (!amount.is_sign_negative() || amount.is_zero()).then_some(amount)
}

/// Accepts a bare ISO date, an ISO date-time (with `T` or a space), or RFC 3339.
pub fn parse_purchase_date(value: &str) -> Option<NaiveDate> {
    if value.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp.date());
        }
    }
    DateTime::parse_from_rfc3339(value).ok().map(|timestamp| timestamp.date_naive())
}
