//! Report generation for analytics runs.
//!
//! Renders a pipeline outcome through an HTML Tera template and, when `wkhtmltopdf` is
//! available, converts the page to PDF.

pub mod filters;
pub mod view;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use retail_core::config::ReportConfig;
use retail_core::{EventSink, PipelineEvent, PipelineOutcome};
use serde::Serialize;
use tera::{Context, Tera};
use tokio::process::Command;

pub use filters::{format_money, register_template_filters};
pub use view::ReportView;

pub const REPORT_TEMPLATE: &str = "retail_report.html.tera";
pub const HTML_FILE_NAME: &str = "RetailAnalyticsReport.html";
pub const PDF_FILE_NAME: &str = "RetailAnalyticsReport.pdf";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("template error: {0}")]
    Template(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("wkhtmltopdf not found")]
    WkhtmltopdfNotFound,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportArtifacts {
    pub html: PathBuf,
    pub pdf: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ReportGenerator {
    tera: Tera,
    wkhtmltopdf_path: Option<PathBuf>,
}

impl ReportGenerator {
    /// Generator backed by the template compiled into this crate.
    pub fn with_embedded_template() -> Result<Self, ReportError> {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        tera.add_raw_template(REPORT_TEMPLATE, include_str!("../templates/retail_report.html.tera"))
            .map_err(|e| ReportError::Template(e.to_string()))?;

        Ok(Self { tera, wkhtmltopdf_path: None })
    }

    /// Generator backed by every template under `template_dir`; the directory must contain
    /// `retail_report.html.tera`.
    pub fn from_template_dir(template_dir: &Path) -> Result<Self, ReportError> {
        let mut tera = Tera::new(&format!("{}/**/*", template_dir.display()))
            .map_err(|e| ReportError::Template(e.to_string()))?;
        register_template_filters(&mut tera);

        if !tera.get_template_names().any(|name| name == REPORT_TEMPLATE) {
            return Err(ReportError::Template(format!(
                "`{}` does not contain {REPORT_TEMPLATE}",
                template_dir.display()
            )));
        }

        Ok(Self { tera, wkhtmltopdf_path: None })
    }

    /// Picks the template source and locates `wkhtmltopdf` (configured path first, then
    /// `PATH`).
    pub fn from_config(config: &ReportConfig) -> Result<Self, ReportError> {
        let generator = match &config.template_dir {
            Some(dir) => Self::from_template_dir(dir)?,
            None => Self::with_embedded_template()?,
        };
        let wkhtmltopdf = match &config.wkhtmltopdf_path {
            Some(path) => path.exists().then(|| path.clone()),
            None => locate_wkhtmltopdf(),
        };
        Ok(generator.with_wkhtmltopdf(wkhtmltopdf))
    }

    pub fn with_wkhtmltopdf(mut self, path: Option<PathBuf>) -> Self {
        self.wkhtmltopdf_path = path;
        self
    }

    pub fn wkhtmltopdf_path(&self) -> Option<&Path> {
        self.wkhtmltopdf_path.as_deref()
    }

    pub fn render_html(&self, view: &ReportView) -> Result<String, ReportError> {
        let context =
            Context::from_serialize(view).map_err(|e| ReportError::Template(e.to_string()))?;
        self.tera.render(REPORT_TEMPLATE, &context).map_err(|e| ReportError::Template(e.to_string()))
    }

    /// Writes the HTML report into `config.output_dir` and, if requested, the PDF next to
    /// it. A missing or failing `wkhtmltopdf` leaves the HTML in place and is reported as
    /// `report.pdf_skipped`.
    pub async fn write_report(
        &self,
        outcome: &PipelineOutcome,
        config: &ReportConfig,
        sink: &dyn EventSink,
    ) -> Result<ReportArtifacts, ReportError> {
        let html = self.render_html(&ReportView::from_outcome(outcome))?;

        tokio::fs::create_dir_all(&config.output_dir).await?;
        let html_path = config.output_dir.join(HTML_FILE_NAME);
        tokio::fs::write(&html_path, &html).await?;

        let pdf = if config.pdf { self.write_pdf(&html_path, config, sink).await } else { None };

        sink.emit(
            PipelineEvent::info("report.rendered", "report written")
                .with_field("html", html_path.display().to_string())
                .with_field("pdf", pdf.as_ref().map(|path| path.display().to_string())),
        );

        Ok(ReportArtifacts { html: html_path, pdf })
    }

    async fn write_pdf(
        &self,
        html_path: &Path,
        config: &ReportConfig,
        sink: &dyn EventSink,
    ) -> Option<PathBuf> {
        let pdf_path = config.output_dir.join(PDF_FILE_NAME);
        let result = match &self.wkhtmltopdf_path {
            Some(wkhtmltopdf) => convert_html_to_pdf(wkhtmltopdf, html_path, &pdf_path).await,
            None => Err(ReportError::WkhtmltopdfNotFound),
        };

        match result {
            Ok(()) => Some(pdf_path),
            Err(error) => {
                sink.emit(
                    PipelineEvent::warn("report.pdf_skipped", "PDF conversion skipped")
                        .with_field("reason", error.to_string()),
                );
                None
            }
        }
    }
}

/// Convert HTML to PDF using wkhtmltopdf
async fn convert_html_to_pdf(
    wkhtmltopdf: &Path,
    html_path: &Path,
    pdf_path: &Path,
) -> Result<(), ReportError> {
    let output = Command::new(wkhtmltopdf)
        .arg("--page-size")
        .arg("A4")
        .arg("--margin-top")
        .arg("10mm")
        .arg("--margin-bottom")
        .arg("10mm")
        .arg("--margin-left")
        .arg("10mm")
        .arg("--margin-right")
        .arg("10mm")
        .arg("--encoding")
        .arg("utf-8")
        .arg("--enable-local-file-access")
        .arg(html_path)
        .arg(pdf_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::error!(stderr = %stderr, "wkhtmltopdf failed");
        return Err(ReportError::Conversion(stderr.to_string()));
    }

    Ok(())
}

pub fn locate_wkhtmltopdf() -> Option<PathBuf> {
    which::which("wkhtmltopdf").ok()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use retail_core::config::ReportConfig;

    use super::{ReportError, ReportGenerator};

    fn report_config(output_dir: PathBuf, pdf: bool) -> ReportConfig {
        ReportConfig { output_dir, template_dir: None, pdf, wkhtmltopdf_path: None }
    }

    #[test]
    fn embedded_template_loads() {
        let generator = ReportGenerator::with_embedded_template().expect("template");

        assert!(generator.wkhtmltopdf_path().is_none());
    }

    #[test]
    fn template_dir_without_report_template_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("other.html.tera"), "<p>{{ title }}</p>").expect("write");

        let result = ReportGenerator::from_template_dir(dir.path());

        assert!(matches!(result, Err(ReportError::Template(message)) if message.contains("retail_report")));
    }

    #[test]
    fn configured_wkhtmltopdf_path_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = report_config(dir.path().to_path_buf(), true);
        config.wkhtmltopdf_path = Some(dir.path().join("no-such-binary"));

        let generator = ReportGenerator::from_config(&config).expect("generator");

        assert!(generator.wkhtmltopdf_path().is_none());
    }
}
