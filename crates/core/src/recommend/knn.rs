//! User-based k-nearest-neighbour collaborative filtering over implicit ratings.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;
use crate::domain::purchase::Purchase;
use crate::errors::DomainError;

/// Narrow prediction seam: estimate a customer's affinity for a product.
pub trait RatingPredictor {
    fn predict(&self, customer_id: &CustomerId, product_id: &ProductId) -> Prediction;
}

/// Similarity measure between two customers' rating rows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// `1 / (1 + mean squared difference)` over co-rated products.
    Msd,
    /// Cosine of the angle between the co-rated vectors.
    Cosine,
}

impl std::str::FromStr for Similarity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "msd" => Ok(Self::Msd),
            "cosine" => Ok(Self::Cosine),
            other => Err(format!("unsupported similarity `{other}` (expected msd|cosine)")),
        }
    }
}

/// Inclusive bounds for ratings and predictions
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl RatingScale {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KnnConfig {
    /// Most peers consulted per prediction
    pub neighbors: usize,
    /// Fewer qualifying peers than this falls back to the global mean
    pub min_neighbors: usize,
    pub similarity: Similarity,
    pub scale: RatingScale,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            neighbors: 40,
            min_neighbors: 1,
            similarity: Similarity::Msd,
            scale: RatingScale { min: 0.0, max: 5000.0 },
        }
    }
}

/// Implicit rating of one product by one customer
#[derive(Clone, Debug, PartialEq)]
pub struct Rating {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    /// Clamped predicted rating
    pub estimate: f64,
    /// Peers that contributed to the weighted mean
    pub neighbors_used: usize,
    /// Set when no qualifying neighbour exists and the estimate is the global mean.
    pub fallback: bool,
}

/// One rating per (customer, product) cell: the summed purchase amount, clamped to the
/// scale. Cells keep the order in which they first appear.
pub fn ratings_from_purchases(purchases: &[Purchase], scale: RatingScale) -> Vec<Rating> {
    let mut cells: HashMap<(&CustomerId, &ProductId), usize> = HashMap::new();
    let mut ratings: Vec<Rating> = Vec::new();
    for purchase in purchases {
        let amount = purchase.amount_f64();
        match cells.get(&(&purchase.customer_id, &purchase.product_id)) {
            Some(&index) => ratings[index].value += amount,
            None => {
                cells.insert((&purchase.customer_id, &purchase.product_id), ratings.len());
                ratings.push(Rating {
                    customer_id: purchase.customer_id.clone(),
                    product_id: purchase.product_id.clone(),
                    value: amount,
                });
            }
        }
    }
    for rating in &mut ratings {
        rating.value = scale.clamp(rating.value);
    }
    ratings
}

/// Seeded shuffle, then the first `ceil(fraction * n)` cells are held out. At least one
/// cell stays on each side whenever there are two or more cells.
pub fn holdout_split(ratings: &[Rating], fraction: f64, seed: u64) -> (Vec<Rating>, Vec<Rating>) {
    if ratings.len() < 2 || fraction <= 0.0 {
        return (ratings.to_vec(), Vec::new());
    }

    let mut order: Vec<usize> = (0..ratings.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let holdout = ((fraction * ratings.len() as f64).ceil() as usize).clamp(1, ratings.len() - 1);
    let test = order[..holdout].iter().map(|&index| ratings[index].clone()).collect();
    let train = order[holdout..].iter().map(|&index| ratings[index].clone()).collect();
    (train, test)
}

/// User-based k-NN fitted on a set of rating cells
#[derive(Clone, Debug)]
pub struct KnnModel {
    config: KnnConfig,
    customers: HashMap<CustomerId, usize>,
    products: HashMap<ProductId, usize>,
    /// customer index -> product index -> rating
    ratings_by_customer: Vec<HashMap<usize, f64>>,
    /// product index -> (customer index, rating)
    raters_by_product: Vec<Vec<(usize, f64)>>,
    similarity: Vec<Vec<f64>>,
    global_mean: f64,
}

impl KnnModel {
    pub fn fit(ratings: &[Rating], config: &KnnConfig) -> Result<Self, DomainError> {
        if ratings.is_empty() {
            return Err(DomainError::InsufficientData { operation: "train_model", rows: 0 });
        }

        let mut customers: HashMap<CustomerId, usize> = HashMap::new();
        let mut products: HashMap<ProductId, usize> = HashMap::new();
        let mut ratings_by_customer: Vec<HashMap<usize, f64>> = Vec::new();
        let mut raters_by_product: Vec<Vec<(usize, f64)>> = Vec::new();

        for rating in ratings {
            let customer = *customers.entry(rating.customer_id.clone()).or_insert_with(|| {
                ratings_by_customer.push(HashMap::new());
                ratings_by_customer.len() - 1
            });
            let product = *products.entry(rating.product_id.clone()).or_insert_with(|| {
                raters_by_product.push(Vec::new());
                raters_by_product.len() - 1
            });
            let value = config.scale.clamp(rating.value);
            ratings_by_customer[customer].insert(product, value);
            raters_by_product[product].retain(|(rater, _)| *rater != customer);
            raters_by_product[product].push((customer, value));
        }

        let cells: usize = ratings_by_customer.iter().map(HashMap::len).sum();
        let total: f64 = ratings_by_customer.iter().flat_map(|row| row.values()).sum();
        let global_mean = total / cells.max(1) as f64;

        let similarity = similarity_matrix(&ratings_by_customer, config.similarity);

        Ok(Self {
            config: config.clone(),
            customers,
            products,
            ratings_by_customer,
            raters_by_product,
            similarity,
            global_mean,
        })
    }

    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn similarity_between(&self, left: &CustomerId, right: &CustomerId) -> Option<f64> {
        let left = *self.customers.get(left)?;
        let right = *self.customers.get(right)?;
        Some(self.similarity[left][right])
    }

    fn fallback(&self) -> Prediction {
        Prediction { estimate: self.config.scale.clamp(self.global_mean), neighbors_used: 0, fallback: true }
    }
}

impl RatingPredictor for KnnModel {
    fn predict(&self, customer_id: &CustomerId, product_id: &ProductId) -> Prediction {
        let (Some(&customer), Some(&product)) =
            (self.customers.get(customer_id), self.products.get(product_id))
        else {
            return self.fallback();
        };

        let mut peers: Vec<(f64, f64)> = self.raters_by_product[product]
            .iter()
            .filter(|(rater, _)| *rater != customer)
            .map(|&(rater, rating)| (self.similarity[customer][rater], rating))
            .collect();
        peers.sort_by(|a, b| b.0.total_cmp(&a.0));
        peers.truncate(self.config.neighbors);

        let mut weight = 0.0;
        let mut weighted = 0.0;
        let mut used = 0;
        for (similarity, rating) in peers {
            if similarity > 0.0 {
                weight += similarity;
                weighted += similarity * rating;
                used += 1;
            }
        }

        if used < self.config.min_neighbors.max(1) || weight <= 0.0 {
            return self.fallback();
        }

        Prediction {
            estimate: self.config.scale.clamp(weighted / weight),
            neighbors_used: used,
            fallback: false,
        }
    }
}

/// Root-mean-square error of `predictor` over held-out ratings; `None` for an empty set.
pub fn rmse(predictor: &dyn RatingPredictor, held_out: &[Rating]) -> Option<f64> {
    if held_out.is_empty() {
        return None;
    }
    let squared: f64 = held_out
        .iter()
        .map(|rating| {
            let estimate = predictor.predict(&rating.customer_id, &rating.product_id).estimate;
            (estimate - rating.value).powi(2)
        })
        .sum();
    Some((squared / held_out.len() as f64).sqrt())
}

fn similarity_matrix(ratings: &[HashMap<usize, f64>], kind: Similarity) -> Vec<Vec<f64>> {
    let n = ratings.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for left in 0..n {
        matrix[left][left] = 1.0;
        for right in (left + 1)..n {
            let score = pair_similarity(&ratings[left], &ratings[right], kind);
            matrix[left][right] = score;
            matrix[right][left] = score;
        }
    }
    matrix
}

fn pair_similarity(left: &HashMap<usize, f64>, right: &HashMap<usize, f64>, kind: Similarity) -> f64 {
    let (smaller, larger) = if left.len() <= right.len() { (left, right) } else { (right, left) };
    let common: Vec<(f64, f64)> = smaller
        .iter()
        .filter_map(|(product, &a)| larger.get(product).map(|&b| (a, b)))
        .collect();
    if common.is_empty() {
        return 0.0;
    }

    match kind {
        Similarity::Msd => {
            let msd = common.iter().map(|(a, b)| (a - b).powi(2)).sum::<f64>() / common.len() as f64;
            1.0 / (msd + 1.0)
        }
        Similarity::Cosine => {
            let dot: f64 = common.iter().map(|(a, b)| a * b).sum();
            let left_norm = common.iter().map(|(a, _)| a * a).sum::<f64>().sqrt();
            let right_norm = common.iter().map(|(_, b)| b * b).sum::<f64>().sqrt();
            if left_norm == 0.0 || right_norm == 0.0 {
                0.0
            } else {
                dot / (left_norm * right_norm)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{
        holdout_split, ratings_from_purchases, rmse, KnnConfig, KnnModel, Rating, RatingPredictor,
        RatingScale, Similarity,
    };
    use crate::domain::customer::CustomerId;
    use crate::domain::product::ProductId;
    use crate::domain::purchase::Purchase;

    fn rating(customer: &str, product: &str, value: f64) -> Rating {
        Rating {
            customer_id: CustomerId::new(customer),
            product_id: ProductId::new(product),
            value,
        }
    }

    fn neighbourhood() -> Vec<Rating> {
        vec![
            rating("alice", "P1", 100.0),
            rating("alice", "P2", 200.0),
            rating("bob", "P1", 100.0),
            rating("bob", "P2", 200.0),
            rating("bob", "P3", 300.0),
            rating("carol", "P1", 400.0),
            rating("carol", "P3", 10.0),
        ]
    }

    #[test]
    fn prediction_leans_towards_most_similar_peer() {
        let model = KnnModel::fit(&neighbourhood(), &KnnConfig::default()).expect("fit");

        let prediction = model.predict(&CustomerId::new("alice"), &ProductId::new("P3"));

        assert!(!prediction.fallback);
        assert_eq!(prediction.neighbors_used, 2);
        assert!(prediction.estimate > 299.0, "bob is identical to alice, got {}", prediction.estimate);
    }

    #[test]
    fn identical_customers_have_unit_msd_similarity() {
        let model = KnnModel::fit(&neighbourhood(), &KnnConfig::default()).expect("fit");

        let similarity = model
            .similarity_between(&CustomerId::new("alice"), &CustomerId::new("bob"))
            .expect("known customers");

        assert!((similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_customer_or_product_falls_back_to_global_mean() {
        let model = KnnModel::fit(&neighbourhood(), &KnnConfig::default()).expect("fit");
        let mean = model.global_mean();

        let unknown_customer = model.predict(&CustomerId::new("dave"), &ProductId::new("P1"));
        let unknown_product = model.predict(&CustomerId::new("alice"), &ProductId::new("P9"));

        assert!(unknown_customer.fallback && unknown_product.fallback);
        assert_eq!(unknown_customer.estimate, mean);
        assert!((mean - 1310.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn neighbourhood_size_limits_peers() {
        let config = KnnConfig { neighbors: 1, ..KnnConfig::default() };
        let model = KnnModel::fit(&neighbourhood(), &config).expect("fit");

        let prediction = model.predict(&CustomerId::new("alice"), &ProductId::new("P3"));

        assert_eq!(prediction.neighbors_used, 1);
        assert!((prediction.estimate - 300.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_is_scale_invariant() {
        let ratings = vec![
            rating("u1", "P1", 1.0),
            rating("u1", "P2", 2.0),
            rating("u2", "P1", 10.0),
            rating("u2", "P2", 20.0),
        ];
        let config = KnnConfig { similarity: Similarity::Cosine, ..KnnConfig::default() };
        let model = KnnModel::fit(&ratings, &config).expect("fit");

        let similarity =
            model.similarity_between(&CustomerId::new("u1"), &CustomerId::new("u2")).expect("known");

        assert!((similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn repeated_purchases_collapse_into_one_clamped_cell() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).expect("date");
        let purchases = vec![
            Purchase::new("C1", "P1", "Books", Decimal::from(3000), date),
            Purchase::new("C2", "P1", "Books", Decimal::from(40), date),
            Purchase::new("C1", "P1", "Books", Decimal::from(3000), date),
        ];

        let ratings = ratings_from_purchases(&purchases, RatingScale { min: 0.0, max: 5000.0 });

        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].customer_id.as_str(), "C1");
        assert_eq!(ratings[0].value, 5000.0);
        assert_eq!(ratings[1].value, 40.0);
    }

    #[test]
    fn holdout_split_is_seeded_and_keeps_both_sides_non_empty() {
        let ratings = neighbourhood();

        let (train, test) = holdout_split(&ratings, 0.2, 42);
        let (train_again, test_again) = holdout_split(&ratings, 0.2, 42);

        assert_eq!(test.len(), 2);
        assert_eq!(train.len() + test.len(), ratings.len());
        assert_eq!(train, train_again);
        assert_eq!(test, test_again);

        let (train, test) = holdout_split(&ratings[..2], 0.2, 42);
        assert_eq!((train.len(), test.len()), (1, 1));
    }

    #[test]
    fn rmse_is_zero_for_perfect_predictions_and_none_when_empty() {
        let model = KnnModel::fit(&neighbourhood(), &KnnConfig::default()).expect("fit");

        assert_eq!(rmse(&model, &[]), None);
        let error = rmse(&model, &[rating("alice", "P3", 300.0)]).expect("rmse");
        assert!(error < 1.0);
    }

    #[test]
    fn fitting_nothing_is_insufficient_data() {
        assert!(KnnModel::fit(&[], &KnnConfig::default()).is_err());
    }
}
