use std::path::Path;

use anyhow::Context;
use retail_core::config::{AppConfig, LoadOptions, ReportConfig};
use retail_core::data::{generate_dataset, load_purchases, write_purchases, SyntheticDataSpec};
use retail_core::{
    run_pipeline, ApplicationError, EventSink, PipelineEvent, PipelineOutcome, TracingEventSink,
};
use retail_report::{ReportArtifacts, ReportGenerator};
use serde_json::json;

use crate::commands::CommandResult;
use crate::logging::init_logging;

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return CommandResult::from_error("run", &ApplicationError::from(error)),
    };
    init_logging(&config.logging);

    let sink = TracingEventSink::default();
    match execute(&config, &sink) {
        Ok(result) => result,
        Err(error) => CommandResult::from_error("run", &error),
    }
}

fn execute(config: &AppConfig, sink: &dyn EventSink) -> Result<CommandResult, ApplicationError> {
    let purchases_path = &config.data.purchases_path;
    let generated = if !purchases_path.exists() && config.data.generate_if_missing {
        generate_purchases_file(purchases_path)?;
        sink.emit(
            PipelineEvent::info("data.generated", "synthetic purchases written")
                .with_field("path", purchases_path.display().to_string()),
        );
        true
    } else {
        false
    };

    let loaded = load_purchases(purchases_path, sink)?;
    let outcome = run_pipeline(&loaded.purchases, config, sink)?;

    let report = match write_report(&outcome, &config.report, sink) {
        Ok(artifacts) => json!({ "html": artifacts.html, "pdf": artifacts.pdf }),
        Err(error) => {
            let error = ApplicationError::Rendering(format!("{error:#}"));
            sink.emit(
                PipelineEvent::error("report.failed", "report generation failed")
                    .with_field("error", error.to_string()),
            );
            json!({ "error_class": error.error_class(), "message": error.to_string() })
        }
    };

    let details = json!({
        "correlation_id": outcome.correlation_id,
        "purchases_path": purchases_path,
        "generated": generated,
        "rows_read": loaded.summary.rows_read,
        "rows_loaded": loaded.summary.rows_loaded,
        "rows_dropped": loaded.summary.rows_dropped,
        "rows_analyzed": outcome.rows_analyzed,
        "top_products": outcome.insights.top_products,
        "category_sales": outcome.insights.category_sales,
        "avg_spend_per_customer": outcome.insights.avg_spend_per_customer,
        "segments": outcome.segmentation.label_counts(),
        "customer_id": outcome.customer_id,
        "recommendations": outcome.recommendations,
        "recommendations_text": outcome.recommendations_text,
        "rmse": outcome.training.rmse,
        "report": report,
    });

    Ok(CommandResult::success(
        "run",
        format!(
            "analysed {} purchases across {} customers",
            outcome.rows_analyzed,
            outcome.segmentation.segments.len()
        ),
        details,
    ))
}

fn generate_purchases_file(path: &Path) -> Result<(), ApplicationError> {
    let dataset = generate_dataset(&SyntheticDataSpec::default())?;
    write_purchases(path, &dataset.purchases)?;
    Ok(())
}

fn write_report(
    outcome: &PipelineOutcome,
    config: &ReportConfig,
    sink: &dyn EventSink,
) -> anyhow::Result<ReportArtifacts> {
    let generator = ReportGenerator::from_config(config).context("failed to load report template")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;

    runtime
        .block_on(generator.write_report(outcome, config, sink))
        .with_context(|| format!("failed to write report into `{}`", config.output_dir.display()))
}
