//! One end-to-end analytics run over an in-memory purchase table.

use serde::Serialize;

use crate::analysis::{analyze_sales, SalesInsights};
use crate::config::AppConfig;
use crate::data::filter_purchases;
use crate::domain::customer::CustomerId;
use crate::domain::purchase::Purchase;
use crate::errors::{ApplicationError, DomainError};
use crate::events::{EventSink, PipelineEvent};
use crate::recommend::{
    explain, render_recommendations, Recommendation, RecommendationEngine, TrainingReport,
};
use crate::segmentation::{segment_customers, Segmentation};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub correlation_id: String,
    pub rows_in: usize,
    pub rows_analyzed: usize,
    pub insights: SalesInsights,
    pub segmentation: Segmentation,
    pub training: TrainingReport,
    pub customer_id: CustomerId,
    pub recommendations: Vec<Recommendation>,
    pub explanation: String,
    /// Display line handed to reporting.
    pub recommendations_text: String,
}

/// filter -> analysis -> segmentation -> train -> recommend -> explain.
pub fn run_pipeline(
    purchases: &[Purchase],
    config: &AppConfig,
    sink: &dyn EventSink,
) -> Result<PipelineOutcome, ApplicationError> {
    let filtered = filter_purchases(purchases, &config.filter.purchase_filter(), sink);

    let insights = analyze_sales(&filtered, sink);

    let kmeans = config.segmentation.kmeans();
    let segmentation =
        segment_customers(&filtered, config.segmentation.clusters, &kmeans, sink)?;

    let mut engine = RecommendationEngine::new(config.recommendation.recommender());
    let training = engine.train(&filtered, sink)?;

    let customer_id = target_customer(config, &filtered)?;
    let recommendations =
        engine.recommend(&customer_id, &filtered, config.recommendation.top_n, sink)?;
    let explanation = explain(&customer_id, &recommendations);
    let recommendations_text =
        render_recommendations(&customer_id, &recommendations, &explanation);

    sink.emit(
        PipelineEvent::info("pipeline.completed", "analytics pipeline completed")
            .with_field("rows_in", purchases.len())
            .with_field("rows_analyzed", filtered.len())
            .with_field("customers", segmentation.segments.len())
            .with_field("recommended_for", customer_id.as_str()),
    );

    Ok(PipelineOutcome {
        correlation_id: sink.correlation_id().to_owned(),
        rows_in: purchases.len(),
        rows_analyzed: filtered.len(),
        insights,
        segmentation,
        training,
        customer_id,
        recommendations,
        explanation,
        recommendations_text,
    })
}

fn target_customer(config: &AppConfig, purchases: &[Purchase]) -> Result<CustomerId, DomainError> {
    if let Some(customer) = &config.recommendation.customer {
        return Ok(CustomerId::new(customer.as_str()));
    }
    purchases
        .first()
        .map(|purchase| purchase.customer_id.clone())
        .ok_or(DomainError::InsufficientData { operation: "recommend", rows: 0 })
}
