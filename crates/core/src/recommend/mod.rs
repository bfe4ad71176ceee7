//! Recommendation engine: trains a collaborative-filtering model on implicit purchase
//! ratings and ranks unpurchased catalog items for one customer.

pub mod knn;

use std::collections::HashSet;

use serde::Serialize;

pub use knn::{
    holdout_split, ratings_from_purchases, rmse, KnnConfig, KnnModel, Prediction, Rating,
    RatingPredictor, RatingScale, Similarity,
};

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;
use crate::domain::purchase::Purchase;
use crate::errors::DomainError;
use crate::events::{EventSink, PipelineEvent};

/// Settings for training and serving recommendations
#[derive(Clone, Debug, PartialEq)]
pub struct RecommenderConfig {
    /// Neighbourhood and similarity settings of the k-NN model
    pub knn: KnnConfig,
    /// Share of rating cells held out for the accuracy check.
    pub holdout_fraction: f64,
    /// Seed for the holdout shuffle
    pub seed: u64,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self { knn: KnnConfig::default(), holdout_fraction: 0.2, seed: 42 }
    }
}

/// Summary of one training run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingReport {
    /// Rating cells (one per customer and product)
    pub ratings: usize,
    /// Distinct customers seen in training
    pub customers: usize,
    /// Distinct products seen in training
    pub products: usize,
    /// Cells held out for the accuracy check
    pub holdout: usize,
    /// `None` when there were too few cells to hold any out.
    pub rmse: Option<f64>,
}

/// A product the customer has not bought, with its predicted rating
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    pub product_id: ProductId,
    /// Predicted rating on the configured scale
    pub predicted_score: f64,
}

/// Holds the fitted model between `train` and `recommend`
#[derive(Clone, Debug, Default)]
pub struct RecommendationEngine {
    config: RecommenderConfig,
    model: Option<KnnModel>,
}

impl RecommendationEngine {
    pub fn new(config: RecommenderConfig) -> Self {
        Self { config, model: None }
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&KnnModel> {
        self.model.as_ref()
    }

    /// Fits the serving model on every rating cell. The held-out RMSE is measured on a
    /// separate model and only reported.
    pub fn train(
        &mut self,
        purchases: &[Purchase],
        sink: &dyn EventSink,
    ) -> Result<TrainingReport, DomainError> {
        let ratings = ratings_from_purchases(purchases, self.config.knn.scale);
        if ratings.is_empty() {
            return Err(DomainError::InsufficientData { operation: "train_model", rows: 0 });
        }

        let (train, held_out) =
            holdout_split(&ratings, self.config.holdout_fraction, self.config.seed);
        let accuracy = if held_out.is_empty() {
            None
        } else {
            let probe = KnnModel::fit(&train, &self.config.knn)?;
            rmse(&probe, &held_out)
        };

        let model = KnnModel::fit(&ratings, &self.config.knn)?;
        let report = TrainingReport {
            ratings: ratings.len(),
            customers: model.customer_count(),
            products: model.product_count(),
            holdout: held_out.len(),
            rmse: accuracy,
        };
        self.model = Some(model);

        sink.emit(
            PipelineEvent::info("recommendation.model_trained", "recommendation model trained")
                .with_field("ratings", report.ratings)
                .with_field("customers", report.customers)
                .with_field("products", report.products)
                .with_field("holdout", report.holdout)
                .with_field("rmse", report.rmse),
        );

        Ok(report)
    }

    /// Ranks every catalog product the customer has not bought yet. The catalog is the set
    /// of distinct products in `purchases`, in first-seen order; equal scores keep that
    /// order.
    pub fn recommend(
        &self,
        customer_id: &CustomerId,
        purchases: &[Purchase],
        top_n: usize,
        sink: &dyn EventSink,
    ) -> Result<Vec<Recommendation>, DomainError> {
        let model =
            self.model.as_ref().ok_or(DomainError::ModelNotReady { operation: "recommend" })?;

        let catalog = catalog(purchases);
        if catalog.is_empty() {
            return Err(DomainError::EmptyCatalog {
                operation: "recommend",
                customer_id: customer_id.to_string(),
            });
        }

        let purchased: HashSet<&ProductId> = purchases
            .iter()
            .filter(|purchase| &purchase.customer_id == customer_id)
            .map(|purchase| &purchase.product_id)
            .collect();

        let mut ranked: Vec<Recommendation> = catalog
            .into_iter()
            .filter(|product_id| !purchased.contains(product_id))
            .map(|product_id| Recommendation {
                predicted_score: model.predict(customer_id, product_id).estimate,
                product_id: product_id.clone(),
            })
            .collect();
        let candidates = ranked.len();
        ranked.sort_by(|a, b| b.predicted_score.total_cmp(&a.predicted_score));
        ranked.truncate(top_n);

        sink.emit(
            PipelineEvent::info("recommendation.generated", "recommendations generated")
                .with_field("customer_id", customer_id.as_str())
                .with_field("purchased", purchased.len())
                .with_field("candidates", candidates)
                .with_field("returned", ranked.len()),
        );

        Ok(ranked)
    }
}

fn catalog(purchases: &[Purchase]) -> Vec<&ProductId> {
    let mut seen = HashSet::new();
    purchases
        .iter()
        .map(|purchase| &purchase.product_id)
        .filter(|product_id| seen.insert(*product_id))
        .collect()
}

/// Fixed explanation sentence; it names the customer and nothing about the items.
pub fn explain(customer_id: &CustomerId, _recommendations: &[Recommendation]) -> String {
    format!(
        "Recommendations for Customer {customer_id} based on similar users' purchasing amounts. \
         These items are predicted to have high purchase ratings for this customer."
    )
}

pub fn render_recommendations(
    customer_id: &CustomerId,
    recommendations: &[Recommendation],
    explanation: &str,
) -> String {
    let items: Vec<String> = recommendations
        .iter()
        .map(|item| format!("{} ({:.2})", item.product_id, item.predicted_score))
        .collect();
    format!("Customer {customer_id} => [{}], Explanation: {explanation}", items.join(", "))
}
