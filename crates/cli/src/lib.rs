pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use retail_core::config::{ConfigOverrides, LoadOptions, LogFormat};

use crate::commands::generate::GenerateOptions;

#[derive(Debug, Parser)]
#[command(
    name = "retail",
    about = "Retail analytics pipeline CLI",
    long_about = "Analyse purchase history: sales insights, customer segments, collaborative-filtering recommendations, and an HTML/PDF report.",
    after_help = "Examples:\n  retail run --category Books --no-pdf\n  retail generate --seed 7\n  retail doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a TOML config file (default: retail.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Load purchases, run the analytics pipeline, and write the report")]
    Run(RunArgs),
    #[command(about = "Write synthetic customers, products, and purchases CSV files")]
    Generate(GenerateArgs),
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, the purchases file, the report template, and wkhtmltopdf")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long = "data", help = "Purchases CSV path")]
    purchases_path: Option<PathBuf>,
    #[arg(long, help = "Inclusive lower bound on PurchaseDate (YYYY-MM-DD)")]
    start_date: Option<NaiveDate>,
    #[arg(long, help = "Inclusive upper bound on PurchaseDate (YYYY-MM-DD)")]
    end_date: Option<NaiveDate>,
    #[arg(long, help = "Keep only purchases in this product category")]
    category: Option<String>,
    #[arg(long, help = "Number of customer segments")]
    clusters: Option<usize>,
    #[arg(long, help = "Customer to recommend for (default: first customer in the data)")]
    customer: Option<String>,
    #[arg(long, help = "Number of recommendations")]
    top_n: Option<usize>,
    #[arg(long, help = "Directory for the HTML and PDF report")]
    output_dir: Option<PathBuf>,
    #[arg(long, help = "Skip PDF conversion")]
    no_pdf: bool,
    #[arg(long, help = "trace, debug, info, warn, or error")]
    log_level: Option<String>,
    #[arg(long, help = "compact, pretty, or json")]
    log_format: Option<LogFormat>,
}

impl RunArgs {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            purchases_path: self.purchases_path,
            start_date: self.start_date,
            end_date: self.end_date,
            category: self.category,
            clusters: self.clusters,
            customer: self.customer,
            top_n: self.top_n,
            output_dir: self.output_dir,
            pdf: self.no_pdf.then_some(false),
            log_level: self.log_level,
            log_format: self.log_format,
        }
    }
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long, default_value = "data", help = "Directory for the generated CSV files")]
    output_dir: PathBuf,
    #[arg(long)]
    customers: Option<usize>,
    #[arg(long)]
    products: Option<usize>,
    #[arg(long)]
    purchases: Option<usize>,
    #[arg(long = "days", help = "Purchase dates fall within this many days before today")]
    history_days: Option<i64>,
    #[arg(long, help = "Seed for reproducible output")]
    seed: Option<u64>,
}

impl GenerateArgs {
    fn into_options(self) -> GenerateOptions {
        let defaults = GenerateOptions::default();
        GenerateOptions {
            output_dir: self.output_dir,
            customers: self.customers.unwrap_or(defaults.customers),
            products: self.products.unwrap_or(defaults.products),
            purchases: self.purchases.unwrap_or(defaults.purchases),
            history_days: self.history_days.unwrap_or(defaults.history_days),
            seed: self.seed,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => commands::run::run(LoadOptions {
            require_file: cli.config.is_some(),
            config_path: cli.config,
            overrides: args.into_overrides(),
        }),
        Command::Generate(args) => commands::generate::run(args.into_options()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(cli.config) }
        }
        Command::Doctor { json } => commands::doctor::run(cli.config, json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn run_flags_map_onto_config_overrides() {
        let cli = Cli::parse_from([
            "retail",
            "--config",
            "custom.toml",
            "run",
            "--category",
            "Books",
            "--start-date",
            "2024-01-01",
            "--clusters",
            "3",
            "--no-pdf",
        ]);

        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("custom.toml")));
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        let overrides = args.into_overrides();
        assert_eq!(overrides.category.as_deref(), Some("Books"));
        assert_eq!(overrides.clusters, Some(3));
        assert_eq!(overrides.pdf, Some(false));
        assert_eq!(overrides.start_date.map(|date| date.to_string()).as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn omitted_pdf_flag_leaves_config_value_alone() {
        let cli = Cli::parse_from(["retail", "run"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.into_overrides().pdf, None);
    }

    #[test]
    fn generate_defaults_fill_unset_counts() {
        let cli = Cli::parse_from(["retail", "generate", "--seed", "7", "--customers", "20"]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate subcommand");
        };
        let options = args.into_options();
        assert_eq!(options.customers, 20);
        assert_eq!(options.products, 50);
        assert_eq!(options.seed, Some(7));
    }
}
