use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use retail_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run(config_path: Option<PathBuf>) -> String {
    let options = LoadOptions { config_path: config_path.clone(), ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let fields: Vec<(&str, String, &[&str])> = vec![
        (
            "data.purchases_path",
            config.data.purchases_path.display().to_string(),
            &["RETAIL_DATA_PURCHASES_PATH"],
        ),
        (
            "data.generate_if_missing",
            config.data.generate_if_missing.to_string(),
            &["RETAIL_DATA_GENERATE_IF_MISSING"],
        ),
        ("filter.start_date", optional(config.filter.start_date), &["RETAIL_FILTER_START_DATE"]),
        ("filter.end_date", optional(config.filter.end_date), &["RETAIL_FILTER_END_DATE"]),
        ("filter.category", optional(config.filter.category.as_ref()), &["RETAIL_FILTER_CATEGORY"]),
        (
            "segmentation.clusters",
            config.segmentation.clusters.to_string(),
            &["RETAIL_SEGMENTATION_CLUSTERS"],
        ),
        ("segmentation.seed", config.segmentation.seed.to_string(), &["RETAIL_SEGMENTATION_SEED"]),
        ("segmentation.max_iterations", config.segmentation.max_iterations.to_string(), &[]),
        ("segmentation.restarts", config.segmentation.restarts.to_string(), &[]),
        ("segmentation.tolerance", config.segmentation.tolerance.to_string(), &[]),
        (
            "recommendation.neighbors",
            config.recommendation.neighbors.to_string(),
            &["RETAIL_RECOMMENDATION_NEIGHBORS"],
        ),
        ("recommendation.min_neighbors", config.recommendation.min_neighbors.to_string(), &[]),
        (
            "recommendation.max_rating",
            config.recommendation.max_rating.to_string(),
            &["RETAIL_RECOMMENDATION_MAX_RATING"],
        ),
        (
            "recommendation.similarity",
            format!("{:?}", config.recommendation.similarity).to_ascii_lowercase(),
            &[],
        ),
        (
            "recommendation.holdout_fraction",
            config.recommendation.holdout_fraction.to_string(),
            &[],
        ),
        ("recommendation.seed", config.recommendation.seed.to_string(), &[]),
        (
            "recommendation.top_n",
            config.recommendation.top_n.to_string(),
            &["RETAIL_RECOMMENDATION_TOP_N"],
        ),
        (
            "recommendation.customer",
            optional(config.recommendation.customer.as_ref()),
            &["RETAIL_RECOMMENDATION_CUSTOMER"],
        ),
        (
            "report.output_dir",
            config.report.output_dir.display().to_string(),
            &["RETAIL_REPORT_OUTPUT_DIR"],
        ),
        (
            "report.template_dir",
            optional(config.report.template_dir.as_ref().map(|path| path.display())),
            &[],
        ),
        ("report.pdf", config.report.pdf.to_string(), &["RETAIL_REPORT_PDF"]),
        (
            "report.wkhtmltopdf_path",
            optional(config.report.wkhtmltopdf_path.as_ref().map(|path| path.display())),
            &[],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["RETAIL_LOGGING_LEVEL", "RETAIL_LOG_LEVEL"],
        ),
        (
            "logging.format",
            config.logging.format.as_str().to_string(),
            &["RETAIL_LOGGING_FORMAT", "RETAIL_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        lines.push(render_line(key, &value, source(key, env_keys)));
    }

    lines.join("\n")
}

fn optional(value: Option<impl ToString>) -> String {
    value.map(|value| value.to_string()).unwrap_or_else(|| "<unset>".to_string())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
