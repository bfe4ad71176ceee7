use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::purchase::Purchase;
use crate::events::{EventSink, PipelineEvent};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
}

impl PurchaseFilter {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none() && self.requested_category().is_none()
    }

    fn requested_category(&self) -> Option<&str> {
        self.category.as_deref().filter(|category| !category.is_empty())
    }
}

/// Strips every character outside `[A-Za-z0-9\s]`.
///
/// The result is compared verbatim against stored categories, so a stored category that
/// contains punctuation ("Sci-Fi") can never be selected: its sanitised form ("SciFi")
/// differs from the stored value.
pub fn sanitize_category(category: &str) -> String {
    static DISALLOWED: OnceLock<Option<Regex>> = OnceLock::new();
    match DISALLOWED.get_or_init(|| Regex::new(r"[^a-zA-Z0-9\s]+").ok()) {
        Some(pattern) => pattern.replace_all(category, "").into_owned(),
        None => strip_disallowed(category),
    }
}

fn strip_disallowed(category: &str) -> String {
    category.chars().filter(|ch| ch.is_ascii_alphanumeric() || ch.is_whitespace()).collect()
}

/// Keeps purchases inside the inclusive date window whose category equals the sanitised
/// requested category. An empty filter returns the input unchanged.
pub fn filter_purchases(
    purchases: &[Purchase],
    filter: &PurchaseFilter,
    sink: &dyn EventSink,
) -> Vec<Purchase> {
    let category = filter.requested_category().map(sanitize_category);

    let filtered: Vec<Purchase> = purchases
        .iter()
        .filter(|purchase| filter.start_date.map_or(true, |start| purchase.date >= start))
        .filter(|purchase| filter.end_date.map_or(true, |end| purchase.date <= end))
        .filter(|purchase| category.as_ref().map_or(true, |category| &purchase.category == category))
        .cloned()
        .collect();

    sink.emit(
        PipelineEvent::info("data.filter.applied", "data filtered")
            .with_field("start_date", filter.start_date)
            .with_field("end_date", filter.end_date)
            .with_field("category", &category)
            .with_field("rows_before", purchases.len())
            .with_field("rows_after", filtered.len()),
    );

    filtered
}
