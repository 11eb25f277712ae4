/*============================================================
  Synavera Project: UCW
  Module: ucw_core::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for UCW Core. Loads a page fixture and a CMP
    scenario, runs the activation engine against them, and
    emits a structured activation report.

  Security / Safety Notes:
    Operates within user privileges. Reads fixtures and writes
    the report and log only; no network access.

  Dependencies:
    clap for CLI parsing, chrono for timestamps, tokio for the
    current-thread runtime.

  Operational Scope:
    Invoked by operators and CI to replay consent timelines.

  Revision History:
    2025-11-13 COD  Authored UCW Core runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use chrono::Utc;
use clap::{ArgAction, Parser};
use tokio::task::LocalSet;

use ucw_core::error::Result;
use ucw_core::logger::Logger;
use ucw_core::report::{build_report, print_summary, write_report};
use ucw_core::sim::{run_scenario, PageFixture, Scenario};
use ucw_core::UcwConfig;

/// Command-line arguments for UCW-Core.
#[derive(Debug, Parser)]
#[command(
    name = "UCW-Core",
    version,
    author = "Synavera Systems",
    about = "Consent-gated embed activation replay"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Page fixture (TOML) with the deferred elements.
    #[arg(long, value_name = "PATH")]
    page: PathBuf,
    /// CMP scenario (TOML); defaults to a page without CMP.
    #[arg(long, value_name = "PATH")]
    scenario: Option<PathBuf>,
    /// Override report output path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Do not write the report; emit summary only.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Enable verbose logging to stderr.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match LocalSet::new().run_until(run()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[UCW-Core] {}", err);
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = UcwConfig::load_from_optional_path(cli.config.as_deref())?;
    let report_path = cli.report.clone().unwrap_or_else(|| config.report_path());

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .or_else(|| Some(config.log_dir().join(format!("core_{session_stamp}.log"))));
    let logger = Rc::new(Logger::new(log_path, cli.verbose || config.debug)?);
    logger.info("INIT", "UCW Core starting.");

    let fixture = PageFixture::load(&cli.page)?;
    let scenario = match cli.scenario.as_deref() {
        Some(path) => Scenario::load(path)?,
        None => Scenario::default(),
    };
    logger.info(
        "FIXTURE",
        format!(
            "elements={} steps={} cmp={}",
            fixture.elements.len(),
            scenario.steps.len(),
            scenario
                .generation
                .map(|generation| generation.to_string())
                .unwrap_or_else(|| "none".into())
        ),
    );

    let run = run_scenario(&fixture, &scenario, &config, Rc::clone(&logger)).await?;
    let report = build_report(&run, &logger);

    if cli.dry_run {
        print_summary(&report);
    } else {
        write_report(&report, &report_path)?;
        logger.info(
            "REPORT",
            format!("Report written to {}", report_path.display()),
        );
    }

    logger.info(
        "SUMMARY",
        format!(
            "placeholders={} activated={} pending={}",
            report.metadata.placeholders,
            report.metadata.services_activated,
            report.metadata.services_pending
        ),
    );
    logger.info("COMPLETE", "Run settled.");
    logger.finalize()?;

    Ok(ExitCode::SUCCESS)
}
