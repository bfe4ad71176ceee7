use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::PurchaseFilter;
use crate::recommend::{KnnConfig, RatingScale, RecommenderConfig, Similarity};
use crate::segmentation::KMeans;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["retail.toml", "config/retail.toml"];

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub data: DataConfig,
    pub filter: FilterConfig,
    pub segmentation: SegmentationConfig,
    pub recommendation: RecommendationConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataConfig {
    pub purchases_path: PathBuf,
    /// Write a synthetic dataset when `purchases_path` does not exist.
    pub generate_if_missing: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationConfig {
    pub clusters: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub restarts: usize,
    pub tolerance: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecommendationConfig {
    pub neighbors: usize,
    pub min_neighbors: usize,
    pub max_rating: f64,
    pub similarity: Similarity,
    pub holdout_fraction: f64,
    pub seed: u64,
    pub top_n: usize,
    /// Defaults to the first customer of the filtered table.
    pub customer: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub template_dir: Option<PathBuf>,
    pub pdf: bool,
    pub wkhtmltopdf_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub purchases_path: Option<PathBuf>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub clusters: Option<usize>,
    pub customer: Option<String>,
    pub top_n: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub pdf: Option<bool>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                purchases_path: PathBuf::from("data/purchases.csv"),
                generate_if_missing: true,
            },
            filter: FilterConfig::default(),
            segmentation: SegmentationConfig {
                clusters: 4,
                seed: 42,
                max_iterations: 300,
                restarts: 10,
                tolerance: 1e-4,
            },
            recommendation: RecommendationConfig {
                neighbors: 40,
                min_neighbors: 1,
                max_rating: 5000.0,
                similarity: Similarity::Msd,
                holdout_fraction: 0.2,
                seed: 42,
                top_n: 5,
                customer: None,
            },
            report: ReportConfig {
                output_dir: PathBuf::from("reports"),
                template_dir: None,
                pdf: true,
                wkhtmltopdf_path: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl FilterConfig {
    pub fn purchase_filter(&self) -> PurchaseFilter {
        PurchaseFilter {
            start_date: self.start_date,
            end_date: self.end_date,
            category: self.category.clone(),
        }
    }
}

impl SegmentationConfig {
    pub fn kmeans(&self) -> KMeans {
        KMeans {
            seed: self.seed,
            max_iterations: self.max_iterations,
            restarts: self.restarts,
            tolerance: self.tolerance,
        }
    }
}

impl RecommendationConfig {
    pub fn recommender(&self) -> RecommenderConfig {
        RecommenderConfig {
            knn: KnnConfig {
                neighbors: self.neighbors,
                min_neighbors: self.min_neighbors,
                similarity: self.similarity,
                scale: RatingScale { min: 0.0, max: self.max_rating },
            },
            holdout_fraction: self.holdout_fraction,
            seed: self.seed,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(data) = patch.data {
            if let Some(purchases_path) = data.purchases_path {
                self.data.purchases_path = purchases_path;
            }
            if let Some(generate_if_missing) = data.generate_if_missing {
                self.data.generate_if_missing = generate_if_missing;
            }
        }

        if let Some(filter) = patch.filter {
            if let Some(start_date) = filter.start_date {
                self.filter.start_date = Some(start_date);
            }
            if let Some(end_date) = filter.end_date {
                self.filter.end_date = Some(end_date);
            }
            if let Some(category) = filter.category {
                self.filter.category = non_empty(category);
            }
        }

        if let Some(segmentation) = patch.segmentation {
            if let Some(clusters) = segmentation.clusters {
                self.segmentation.clusters = clusters;
            }
            if let Some(seed) = segmentation.seed {
                self.segmentation.seed = seed;
            }
            if let Some(max_iterations) = segmentation.max_iterations {
                self.segmentation.max_iterations = max_iterations;
            }
            if let Some(restarts) = segmentation.restarts {
                self.segmentation.restarts = restarts;
            }
            if let Some(tolerance) = segmentation.tolerance {
                self.segmentation.tolerance = tolerance;
            }
        }

        if let Some(recommendation) = patch.recommendation {
            if let Some(neighbors) = recommendation.neighbors {
                self.recommendation.neighbors = neighbors;
            }
            if let Some(min_neighbors) = recommendation.min_neighbors {
                self.recommendation.min_neighbors = min_neighbors;
            }
            if let Some(max_rating) = recommendation.max_rating {
                self.recommendation.max_rating = max_rating;
            }
            if let Some(similarity) = recommendation.similarity {
                self.recommendation.similarity = similarity;
            }
            if let Some(holdout_fraction) = recommendation.holdout_fraction {
                self.recommendation.holdout_fraction = holdout_fraction;
            }
            if let Some(seed) = recommendation.seed {
                self.recommendation.seed = seed;
            }
            if let Some(top_n) = recommendation.top_n {
                self.recommendation.top_n = top_n;
            }
            if let Some(customer) = recommendation.customer {
                self.recommendation.customer = non_empty(customer);
            }
        }

        if let Some(report) = patch.report {
            if let Some(output_dir) = report.output_dir {
                self.report.output_dir = output_dir;
            }
            if let Some(template_dir) = report.template_dir {
                self.report.template_dir = Some(template_dir);
            }
            if let Some(pdf) = report.pdf {
                self.report.pdf = pdf;
            }
            if let Some(wkhtmltopdf_path) = report.wkhtmltopdf_path {
                self.report.wkhtmltopdf_path = Some(wkhtmltopdf_path);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RETAIL_DATA_PURCHASES_PATH") {
            self.data.purchases_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("RETAIL_DATA_GENERATE_IF_MISSING") {
            self.data.generate_if_missing = parse_bool("RETAIL_DATA_GENERATE_IF_MISSING", &value)?;
        }

        if let Some(value) = read_env("RETAIL_FILTER_START_DATE") {
            self.filter.start_date = Some(parse_date("RETAIL_FILTER_START_DATE", &value)?);
        }
        if let Some(value) = read_env("RETAIL_FILTER_END_DATE") {
            self.filter.end_date = Some(parse_date("RETAIL_FILTER_END_DATE", &value)?);
        }
        if let Some(value) = read_env("RETAIL_FILTER_CATEGORY") {
            self.filter.category = Some(value);
        }

        if let Some(value) = read_env("RETAIL_SEGMENTATION_CLUSTERS") {
            self.segmentation.clusters = parse_usize("RETAIL_SEGMENTATION_CLUSTERS", &value)?;
        }
        if let Some(value) = read_env("RETAIL_SEGMENTATION_SEED") {
            self.segmentation.seed = parse_u64("RETAIL_SEGMENTATION_SEED", &value)?;
        }

        if let Some(value) = read_env("RETAIL_RECOMMENDATION_NEIGHBORS") {
            self.recommendation.neighbors = parse_usize("RETAIL_RECOMMENDATION_NEIGHBORS", &value)?;
        }
        if let Some(value) = read_env("RETAIL_RECOMMENDATION_MAX_RATING") {
            self.recommendation.max_rating = parse_f64("RETAIL_RECOMMENDATION_MAX_RATING", &value)?;
        }
        if let Some(value) = read_env("RETAIL_RECOMMENDATION_TOP_N") {
            self.recommendation.top_n = parse_usize("RETAIL_RECOMMENDATION_TOP_N", &value)?;
        }
        if let Some(value) = read_env("RETAIL_RECOMMENDATION_CUSTOMER") {
            self.recommendation.customer = Some(value);
        }

        if let Some(value) = read_env("RETAIL_REPORT_OUTPUT_DIR") {
            self.report.output_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("RETAIL_REPORT_PDF") {
            self.report.pdf = parse_bool("RETAIL_REPORT_PDF", &value)?;
        }

        let log_level = read_env("RETAIL_LOGGING_LEVEL").or_else(|| read_env("RETAIL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RETAIL_LOGGING_FORMAT").or_else(|| read_env("RETAIL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(purchases_path) = overrides.purchases_path {
            self.data.purchases_path = purchases_path;
        }
        if let Some(start_date) = overrides.start_date {
            self.filter.start_date = Some(start_date);
        }
        if let Some(end_date) = overrides.end_date {
            self.filter.end_date = Some(end_date);
        }
        if let Some(category) = overrides.category {
            self.filter.category = non_empty(category);
        }
        if let Some(clusters) = overrides.clusters {
            self.segmentation.clusters = clusters;
        }
        if let Some(customer) = overrides.customer {
            self.recommendation.customer = non_empty(customer);
        }
        if let Some(top_n) = overrides.top_n {
            self.recommendation.top_n = top_n;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.report.output_dir = output_dir;
        }
        if let Some(pdf) = overrides.pdf {
            self.report.pdf = pdf;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_filter(&self.filter)?;
        validate_segmentation(&self.segmentation)?;
        validate_recommendation(&self.recommendation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_filter(filter: &FilterConfig) -> Result<(), ConfigError> {
    if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
        if start > end {
            return Err(ConfigError::Validation(format!(
                "filter.start_date ({start}) must not be after filter.end_date ({end})"
            )));
        }
    }
    Ok(())
}

fn validate_segmentation(segmentation: &SegmentationConfig) -> Result<(), ConfigError> {
    if segmentation.clusters == 0 {
        return Err(ConfigError::Validation(
            "segmentation.clusters must be greater than zero".to_string(),
        ));
    }
    if segmentation.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "segmentation.max_iterations must be greater than zero".to_string(),
        ));
    }
    if segmentation.restarts == 0 {
        return Err(ConfigError::Validation(
            "segmentation.restarts must be greater than zero".to_string(),
        ));
    }
    if segmentation.tolerance.is_nan() || segmentation.tolerance < 0.0 {
        return Err(ConfigError::Validation(
            "segmentation.tolerance must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_recommendation(recommendation: &RecommendationConfig) -> Result<(), ConfigError> {
    if recommendation.neighbors == 0 {
        return Err(ConfigError::Validation(
            "recommendation.neighbors must be greater than zero".to_string(),
        ));
    }
    if recommendation.min_neighbors > recommendation.neighbors {
        return Err(ConfigError::Validation(format!(
            "recommendation.min_neighbors ({}) must not exceed recommendation.neighbors ({})",
            recommendation.min_neighbors, recommendation.neighbors
        )));
    }
    if recommendation.max_rating <= 0.0 || !recommendation.max_rating.is_finite() {
        return Err(ConfigError::Validation(
            "recommendation.max_rating must be a positive number".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&recommendation.holdout_fraction) {
        return Err(ConfigError::Validation(
            "recommendation.holdout_fraction must be in range [0, 1)".to_string(),
        ));
    }
    if recommendation.top_n == 0 {
        return Err(ConfigError::Validation(
            "recommendation.top_n must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| invalid_override(key, value))
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    data: Option<DataPatch>,
    filter: Option<FilterPatch>,
    segmentation: Option<SegmentationPatch>,
    recommendation: Option<RecommendationPatch>,
    report: Option<ReportPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DataPatch {
    purchases_path: Option<PathBuf>,
    generate_if_missing: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterPatch {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentationPatch {
    clusters: Option<usize>,
    seed: Option<u64>,
    max_iterations: Option<usize>,
    restarts: Option<usize>,
    tolerance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationPatch {
    neighbors: Option<usize>,
    min_neighbors: Option<usize>,
    max_rating: Option<f64>,
    similarity: Option<Similarity>,
    holdout_fraction: Option<f64>,
    seed: Option<u64>,
    top_n: Option<usize>,
    customer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportPatch {
    output_dir: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    pdf: Option<bool>,
    wkhtmltopdf_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
