//! Template-facing view of a pipeline outcome.

use chrono::Utc;
use retail_core::{PipelineOutcome, RevenueEntry};
use serde::Serialize;

pub const REPORT_TITLE: &str = "Retail Analytics Report";
const PRIMARY_COLOR: &str = "#2563eb";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RevenueRow {
    pub key: String,
    pub revenue: String,
    /// Bar width in percent of the largest row.
    pub share: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentRow {
    pub label: String,
    pub customers: usize,
    pub mean_spending: f64,
    pub mean_purchase_count: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportView {
    pub title: String,
    pub primary_color: String,
    pub generated_at: String,
    pub correlation_id: String,
    pub rows_analyzed: usize,
    pub customer_count: usize,
    pub total_revenue: String,
    pub avg_spend_per_customer: String,
    pub top_products: Vec<RevenueRow>,
    pub category_sales: Vec<RevenueRow>,
    pub segments: Vec<SegmentRow>,
    pub recommendations_text: String,
    pub rmse: Option<f64>,
}

impl ReportView {
    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        let insights = &outcome.insights;
        Self {
            title: REPORT_TITLE.to_owned(),
            primary_color: PRIMARY_COLOR.to_owned(),
            generated_at: Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
            correlation_id: outcome.correlation_id.clone(),
            rows_analyzed: outcome.rows_analyzed,
            customer_count: insights.customer_count,
            total_revenue: insights.total_revenue.to_string(),
            // Rounded in decimal; the `money` filter works in f64.
            avg_spend_per_customer: insights.avg_spend_per_customer.round_dp(2).to_string(),
            top_products: revenue_rows(&insights.top_products),
            category_sales: revenue_rows(&insights.category_sales),
            segments: outcome
                .segmentation
                .clusters
                .iter()
                .map(|cluster| SegmentRow {
                    label: cluster.label.clone(),
                    customers: cluster.members,
                    mean_spending: cluster.mean_spending,
                    mean_purchase_count: cluster.mean_purchase_count,
                })
                .collect(),
            recommendations_text: outcome.recommendations_text.clone(),
            rmse: outcome.training.rmse,
        }
    }
}

fn revenue_rows(entries: &[RevenueEntry]) -> Vec<RevenueRow> {
    let max = entries.iter().map(|entry| entry.revenue).max().unwrap_or_default();
    entries
        .iter()
        .map(|entry| {
            let share = if max.is_zero() {
                0.0
            } else {
                let ratio: f64 = (entry.revenue / max).try_into().unwrap_or(0.0);
                ratio * 100.0
            };
            RevenueRow { key: entry.key.clone(), revenue: entry.revenue.to_string(), share }
        })
        .collect()
}
