use std::path::PathBuf;

use retail_core::config::{AppConfig, LoadOptions};
use retail_core::data::load_purchases;
use retail_core::InMemoryEventSink;
use retail_report::ReportGenerator;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(config_path: Option<PathBuf>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config_path: Option<PathBuf>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions { config_path, ..LoadOptions::default() }) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_purchases_file(&config));
            checks.push(check_report_template(&config));
            checks.push(check_wkhtmltopdf(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["purchases_file", "report_template", "wkhtmltopdf"] {
                checks.push(DoctorCheck::skipped(
                    name,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_purchases_file(config: &AppConfig) -> DoctorCheck {
    let path = &config.data.purchases_path;
    if !path.exists() {
        return if config.data.generate_if_missing {
            DoctorCheck::pass(
                "purchases_file",
                format!("`{}` is missing; `run` will generate synthetic data", path.display()),
            )
        } else {
            DoctorCheck::fail("purchases_file", format!("`{}` does not exist", path.display()))
        };
    }

    let sink = InMemoryEventSink::default();
    match load_purchases(path, &sink) {
        Ok(loaded) => DoctorCheck::pass(
            "purchases_file",
            format!(
                "`{}` loaded {} of {} rows",
                path.display(),
                loaded.summary.rows_loaded,
                loaded.summary.rows_read
            ),
        ),
        Err(error) => DoctorCheck::fail("purchases_file", error.to_string()),
    }
}

fn check_report_template(config: &AppConfig) -> DoctorCheck {
    let source = match &config.report.template_dir {
        Some(dir) => format!("template directory `{}`", dir.display()),
        None => "embedded template".to_string(),
    };
    match ReportGenerator::from_config(&config.report) {
        Ok(_) => DoctorCheck::pass("report_template", format!("{source} compiled")),
        Err(error) => DoctorCheck::fail("report_template", error.to_string()),
    }
}

fn check_wkhtmltopdf(config: &AppConfig) -> DoctorCheck {
    if !config.report.pdf {
        return DoctorCheck::skipped("wkhtmltopdf", "pdf output disabled");
    }

    let located = ReportGenerator::from_config(&config.report)
        .ok()
        .and_then(|generator| generator.wkhtmltopdf_path().map(|path| path.to_path_buf()));

    match located {
        Some(path) => DoctorCheck::pass("wkhtmltopdf", format!("found at `{}`", path.display())),
        None => DoctorCheck::fail(
            "wkhtmltopdf",
            "not found; reports will be written as HTML only (set report.pdf = false to silence)",
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
