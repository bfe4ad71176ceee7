use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use retail_cli::commands::generate::GenerateOptions;
use retail_cli::commands::{config, doctor, generate, run};
use retail_core::config::{ConfigOverrides, LoadOptions};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn generate_writes_reproducible_dataset() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let result = generate::run(small_dataset(dir.path()));
        assert_eq!(result.exit_code, 0, "expected successful generate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "generate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["purchases"], 600);
        assert!(dir.path().join("purchases.csv").exists());
        assert!(dir.path().join("customers.csv").exists());
        assert!(dir.path().join("products.csv").exists());

        let first = fs::read_to_string(dir.path().join("purchases.csv")).expect("purchases");
        let again = generate::run(small_dataset(dir.path()));
        assert_eq!(again.exit_code, 0);
        let second = fs::read_to_string(dir.path().join("purchases.csv")).expect("purchases");
        assert_eq!(first, second, "same seed should produce identical files");
    });
}

#[test]
fn run_returns_success_with_generated_data() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let generated = generate::run(small_dataset(&dir.path().join("data")));
        assert_eq!(generated.exit_code, 0);

        let result = run::run(run_options(&dir, dir.path().join("data/purchases.csv")));
        assert_eq!(result.exit_code, 0, "expected successful run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["status"], "ok");

        let details = &payload["details"];
        assert_eq!(details["rows_loaded"], 600);
        assert_eq!(details["generated"], false);
        assert!(details["top_products"].as_array().is_some_and(|rows| rows.len() <= 5));
        assert!(details["recommendations"].as_array().is_some_and(|recs| recs.len() == 5));
        assert!(details["recommendations_text"]
            .as_str()
            .is_some_and(|text| text.contains("Explanation: Recommendations for Customer")));
        assert!(details["report"]["pdf"].is_null(), "pdf output is disabled");

        let html = dir.path().join("reports/RetailAnalyticsReport.html");
        let page = fs::read_to_string(html).expect("html report should be written");
        assert!(page.contains("Retail Analytics Report"));
    });
}

#[test]
fn run_records_report_failure_without_failing() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let generated = generate::run(small_dataset(&dir.path().join("data")));
        assert_eq!(generated.exit_code, 0);

        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).expect("template dir");
        let config_path = dir.path().join("retail.toml");
        let config = format!("[report]\ntemplate_dir = {:?}\n", templates.display().to_string());
        fs::write(&config_path, config).expect("config file");

        let mut options = run_options(&dir, dir.path().join("data/purchases.csv"));
        options.config_path = Some(config_path);
        let result = run::run(options);
        assert_eq!(result.exit_code, 0, "report failures should not fail the run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["report"]["error_class"], "rendering");
        assert!(!dir.path().join("reports/RetailAnalyticsReport.html").exists());
    });
}

#[test]
fn run_generates_missing_purchases_file() {
    with_env(&[("RETAIL_DATA_GENERATE_IF_MISSING", "true")], || {
        let dir = TempDir::new().expect("tempdir");
        let purchases = dir.path().join("input/purchases.csv");

        let result = run::run(run_options(&dir, purchases.clone()));
        assert_eq!(result.exit_code, 0, "expected successful run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["details"]["generated"], true);
        assert!(purchases.exists());
    });
}

#[test]
fn generating_missing_purchases_leaves_sibling_files_alone() {
    with_env(&[("RETAIL_DATA_GENERATE_IF_MISSING", "true")], || {
        let dir = TempDir::new().expect("tempdir");
        let existing = "CustomerID,ProductID,Category,PurchaseAmount,PurchaseDate\n\
                        KEEP,P1,Books,1.00,2025-01-01\n";
        for name in ["purchases.csv", "customers.csv", "products.csv"] {
            fs::write(dir.path().join(name), existing).expect("sibling file");
        }
        let purchases = dir.path().join("q3.csv");

        let result = run::run(run_options(&dir, purchases.clone()));
        assert_eq!(result.exit_code, 0, "expected successful run: {}", result.output);

        assert!(purchases.exists());
        for name in ["purchases.csv", "customers.csv", "products.csv"] {
            let after = fs::read_to_string(dir.path().join(name)).expect("sibling should survive");
            assert_eq!(after, existing, "{name} should be untouched");
        }
    });
}

#[test]
fn run_returns_config_failure_for_invalid_clusters() {
    with_env(&[("RETAIL_SEGMENTATION_CLUSTERS", "0")], || {
        let dir = TempDir::new().expect("tempdir");
        let result = run::run(run_options(&dir, dir.path().join("purchases.csv")));
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn run_returns_schema_failure_for_wrong_columns() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let purchases = dir.path().join("purchases.csv");
        fs::write(&purchases, "CustomerID,ProductID,Amount\nC1,P1,10.00\n").expect("csv");

        let result = run::run(run_options(&dir, purchases));
        assert_eq!(result.exit_code, 3, "expected data access failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "schema");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("PurchaseAmount")));
    });
}

#[test]
fn run_returns_domain_failure_when_filter_leaves_fewer_customers_than_clusters() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let purchases = dir.path().join("purchases.csv");
        fs::write(
            &purchases,
            "CustomerID,ProductID,PurchaseDate,PurchaseAmount,Category\n\
             C1,P1,2025-01-02,10.00,Books\n\
             C2,P2,2025-01-03,20.00,Books\n\
             C3,P3,2025-01-04,30.00,Toys\n",
        )
        .expect("csv");

        let mut options = run_options(&dir, purchases);
        options.overrides.category = Some("Books".to_string());
        let result = run::run(options);
        assert_eq!(result.exit_code, 4, "expected domain failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_parameter");
    });
}

#[test]
fn doctor_reports_ready_environment_as_json() {
    with_env(&[("RETAIL_REPORT_PDF", "false")], || {
        let dir = TempDir::new().expect("tempdir");
        let generated = generate::run(small_dataset(dir.path()));
        assert_eq!(generated.exit_code, 0);
        let purchases = dir.path().join("purchases.csv");
        env::set_var("RETAIL_DATA_PURCHASES_PATH", &purchases);

        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 0, "expected doctor pass: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("purchases_file"), "pass");
        assert_eq!(status_of("report_template"), "pass");
        assert_eq!(status_of("wkhtmltopdf"), "skipped");
    });
}

#[test]
fn doctor_fails_when_purchases_file_is_missing() {
    with_env(&[("RETAIL_DATA_GENERATE_IF_MISSING", "false")], || {
        let dir = TempDir::new().expect("tempdir");
        env::set_var("RETAIL_DATA_PURCHASES_PATH", dir.path().join("absent.csv"));

        let result = doctor::run(None, false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] purchases_file:"));
    });
}

#[test]
fn config_attributes_values_to_env_and_file() {
    with_env(&[("RETAIL_RECOMMENDATION_TOP_N", "9")], || {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("retail.toml");
        fs::write(&path, "[segmentation]\nclusters = 3\n").expect("config file");

        let output = config::run(Some(path.clone()));

        assert!(output.contains("- recommendation.top_n = 9 (source: env (RETAIL_RECOMMENDATION_TOP_N))"));
        assert!(output.contains(&format!(
            "- segmentation.clusters = 3 (source: file ({}))",
            path.display()
        )));
        assert!(output.contains("- segmentation.seed = 42 (source: default)"));
    });
}

fn small_dataset(dir: &Path) -> GenerateOptions {
    GenerateOptions {
        output_dir: dir.to_path_buf(),
        customers: 60,
        products: 30,
        purchases: 600,
        history_days: 120,
        seed: Some(7),
    }
}

fn run_options(dir: &TempDir, purchases_path: PathBuf) -> LoadOptions {
    LoadOptions {
        config_path: Some(dir.path().join("absent.toml")),
        require_file: false,
        overrides: ConfigOverrides {
            purchases_path: Some(purchases_path),
            output_dir: Some(dir.path().join("reports")),
            pdf: Some(false),
            ..ConfigOverrides::default()
        },
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "RETAIL_DATA_PURCHASES_PATH",
        "RETAIL_DATA_GENERATE_IF_MISSING",
        "RETAIL_FILTER_START_DATE",
        "RETAIL_FILTER_END_DATE",
        "RETAIL_FILTER_CATEGORY",
        "RETAIL_SEGMENTATION_CLUSTERS",
        "RETAIL_SEGMENTATION_SEED",
        "RETAIL_RECOMMENDATION_NEIGHBORS",
        "RETAIL_RECOMMENDATION_MAX_RATING",
        "RETAIL_RECOMMENDATION_TOP_N",
        "RETAIL_RECOMMENDATION_CUSTOMER",
        "RETAIL_REPORT_OUTPUT_DIR",
        "RETAIL_REPORT_PDF",
        "RETAIL_LOGGING_LEVEL",
        "RETAIL_LOGGING_FORMAT",
        "RETAIL_LOG_LEVEL",
        "RETAIL_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
