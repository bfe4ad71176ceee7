//! Customer segmentation: aggregate purchases per customer, standardise the spending
//! features, cluster them, and name each cluster by its spending rank.
//!
//! Labels follow the rank of a cluster's mean total spending within the run, so the
//! same customers keep the same tier even though cluster ids are an arbitrary
//! permutation from one fit to the next.

pub mod kmeans;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

pub use kmeans::{Clusterer, KMeans, KMeansFit};

use crate::domain::customer::CustomerId;
use crate::domain::purchase::Purchase;
use crate::errors::DomainError;
use crate::events::{EventSink, PipelineEvent};

/// Tier names in ascending order of mean spending.
pub const SPENDING_TIERS: [&str; 4] =
    ["Low Spenders", "Moderate Spenders", "High Spenders", "Very High Spenders"];

/// Spending totals for one customer over the analysed purchases
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustomerAggregate {
    pub customer_id: CustomerId,
    /// Sum of purchase amounts
    pub total_spending: Decimal,
    /// Number of purchase rows
    pub purchase_count: usize,
}

/// A customer aggregate with its cluster assignment
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustomerSegment {
    pub customer_id: CustomerId,
    pub total_spending: Decimal,
    pub purchase_count: usize,
    /// Raw cluster id from the clusterer; only meaningful within one run
    pub cluster_id: usize,
    /// Spending tier of the cluster, e.g. `High Spenders`
    pub cluster_label: String,
}

/// Per-cluster statistics in unscaled units
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    /// Position in ascending mean-spending order, starting at 0.
    pub rank: usize,
    /// Tier label derived from `rank`
    pub label: String,
    /// Customers assigned to this cluster
    pub members: usize,
    /// Mean total spending of the members
    pub mean_spending: f64,
    /// Mean purchase count of the members
    pub mean_purchase_count: f64,
}

/// Result of one segmentation run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Segmentation {
    /// Requested cluster count
    pub k: usize,
    /// One entry per distinct customer, ordered by customer id.
    pub segments: Vec<CustomerSegment>,
    /// Non-empty clusters in rank order.
    pub clusters: Vec<ClusterSummary>,
}

impl Segmentation {
    /// Segment of `customer_id`, if the customer appeared in the input
    pub fn get(&self, customer_id: &CustomerId) -> Option<&CustomerSegment> {
        self.segments
            .binary_search_by(|segment| segment.customer_id.cmp(customer_id))
            .ok()
            .map(|index| &self.segments[index])
    }

    /// Customer count per label, lowest tier first.
    pub fn label_counts(&self) -> Vec<(String, usize)> {
        self.clusters.iter().map(|cluster| (cluster.label.clone(), cluster.members)).collect()
    }
}

/// Label for the cluster at `rank`; ranks past the tier vocabulary get `Cluster {rank}`.
pub fn tier_label(rank: usize) -> String {
    SPENDING_TIERS.get(rank).map_or_else(|| format!("Cluster {rank}"), |label| (*label).to_owned())
}

/// Totals per distinct customer, ordered by customer id
pub fn aggregate_customers(purchases: &[Purchase]) -> Vec<CustomerAggregate> {
    let mut totals: BTreeMap<&CustomerId, (Decimal, usize)> = BTreeMap::new();
    for purchase in purchases {
        let entry = totals.entry(&purchase.customer_id).or_insert((Decimal::ZERO, 0));
        entry.0 += purchase.amount;
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(customer_id, (total_spending, purchase_count))| CustomerAggregate {
            customer_id: customer_id.clone(),
            total_spending,
            purchase_count,
        })
        .collect()
}

/// Per-column standardisation fitted on the rows it transforms. Uses the population
/// standard deviation; a constant column maps to zeros.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardScaler {
    /// Column means
    pub means: Vec<f64>,
    /// Column standard deviations, with 1.0 standing in for zero
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dim = rows.first().map_or(0, Vec::len);
        let n = rows.len().max(1) as f64;

        let means: Vec<f64> =
            (0..dim).map(|column| rows.iter().map(|row| row[column]).sum::<f64>() / n).collect();
        let scales = (0..dim)
            .map(|column| {
                let variance =
                    rows.iter().map(|row| (row[column] - means[column]).powi(2)).sum::<f64>() / n;
                let deviation = variance.sqrt();
                if deviation > f64::EPSILON {
                    deviation
                } else {
                    1.0
                }
            })
            .collect();

        Self { means, scales }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(value, (mean, scale))| (value - mean) / scale)
                    .collect()
            })
            .collect()
    }
}

pub fn segment_customers(
    purchases: &[Purchase],
    k: usize,
    clusterer: &dyn Clusterer,
    sink: &dyn EventSink,
) -> Result<Segmentation, DomainError> {
    if purchases.is_empty() {
        return Err(DomainError::InsufficientData { operation: "segment_customers", rows: 0 });
    }

    let aggregates = aggregate_customers(purchases);
    if k == 0 || k > aggregates.len() {
        return Err(DomainError::InvalidParameter {
            operation: "segment_customers",
            parameter: "k",
            value: k.to_string(),
            reason: format!("must be in 1..={} (distinct customers)", aggregates.len()),
        });
    }

    let features: Vec<Vec<f64>> = aggregates
        .iter()
        .map(|aggregate| {
            let spending: f64 = aggregate.total_spending.try_into().unwrap_or(0.0);
            vec![spending, aggregate.purchase_count as f64]
        })
        .collect();
    let scaled = StandardScaler::fit(&features).transform(&features);

    let assignments = clusterer.fit(&scaled, k)?;
    if assignments.len() != aggregates.len() || assignments.iter().any(|&cluster| cluster >= k) {
        return Err(DomainError::InvalidParameter {
            operation: "segment_customers",
            parameter: "assignments",
            value: assignments.len().to_string(),
            reason: format!("clusterer must return one id in 0..{k} per customer"),
        });
    }

    let clusters = summarize_clusters(&features, &assignments, k);
    let labels: BTreeMap<usize, &str> =
        clusters.iter().map(|cluster| (cluster.cluster_id, cluster.label.as_str())).collect();

    let segments = aggregates
        .into_iter()
        .zip(&assignments)
        .map(|(aggregate, &cluster_id)| CustomerSegment {
            customer_id: aggregate.customer_id,
            total_spending: aggregate.total_spending,
            purchase_count: aggregate.purchase_count,
            cluster_id,
            cluster_label: labels.get(&cluster_id).copied().unwrap_or_default().to_owned(),
        })
        .collect();

    sink.emit(
        PipelineEvent::info("segmentation.completed", "customer clustering completed")
            .with_field("k", k)
            .with_field("cluster_summary", &clusters),
    );

    Ok(Segmentation { k, segments, clusters })
}

/// Unscaled per-cluster means, ranked ascending by mean spending. Equal means keep
/// cluster id order.
fn summarize_clusters(features: &[Vec<f64>], assignments: &[usize], k: usize) -> Vec<ClusterSummary> {
    let mut totals = vec![(0.0_f64, 0.0_f64, 0usize); k];
    for (row, &cluster) in features.iter().zip(assignments) {
        totals[cluster].0 += row[0];
        totals[cluster].1 += row[1];
        totals[cluster].2 += 1;
    }

    let mut clusters: Vec<ClusterSummary> = totals
        .into_iter()
        .enumerate()
        .filter(|(_, (_, _, members))| *members > 0)
        .map(|(cluster_id, (spending, count, members))| ClusterSummary {
            cluster_id,
            rank: 0,
            label: String::new(),
            members,
            mean_spending: spending / members as f64,
            mean_purchase_count: count / members as f64,
        })
        .collect();

    clusters.sort_by(|a, b| {
        a.mean_spending.total_cmp(&b.mean_spending).then_with(|| a.cluster_id.cmp(&b.cluster_id))
    });
    for (rank, cluster) in clusters.iter_mut().enumerate() {
        cluster.rank = rank;
        cluster.label = tier_label(rank);
    }
    clusters
}
