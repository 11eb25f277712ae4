/*============================================================
  Synavera Project: UCW
  Module: ucw_core::report
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Summarise a scenario run as an activation report: which
    services were activated, where each element ended up, and
    which accept clicks failed to record consent.

  Security / Safety Notes:
    Report data is written to operator-controlled paths; no
    consent payloads are included.

  Dependencies:
    serde for JSON serialization, chrono for timestamps.

  Operational Scope:
    Produced by the binary after the timeline settles.

  Revision History:
    2025-11-13 COD  Adapted manifest writer into activation report.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic ordering for reproducible reports
    - Rich metadata for audit and observability
============================================================*/

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::bridge::CmpGeneration;
use crate::dom::{ElementId, PageDom, Slot};
use crate::error::{Result, UcwError};
use crate::logger::Logger;
use crate::placeholder::{PlaceholderVariant, DEFERRED_SRC_ATTR};
use crate::sim::{ClickRecord, ScenarioRun};

/// Full report document.
#[derive(Debug, Serialize)]
pub struct ActivationReport {
    pub metadata: ReportMetadata,
    pub services: BTreeMap<String, ServiceReport>,
    pub clicks: Vec<ClickRecord>,
}

#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub generated_by: String,
    pub cmp: Option<CmpGeneration>,
    pub cmp_ready: bool,
    pub elements: usize,
    pub placeholders: usize,
    pub services_activated: usize,
    pub services_pending: usize,
    pub recheck_passes: u64,
    pub change_signals: u64,
    pub elapsed_ms: u128,
}

#[derive(Debug, Serialize)]
pub struct ServiceReport {
    pub activated: bool,
    pub activation_runs: usize,
    pub placeholders: Vec<PlaceholderReport>,
}

#[derive(Debug, Serialize)]
pub struct PlaceholderReport {
    pub element: ElementId,
    pub variant: PlaceholderVariant,
    pub slot: Option<Slot>,
    /// Live `src` once activated; `None` while deferred.
    pub src: Option<String>,
    pub deferred_src: Option<String>,
}

/// Build the report from a finished run.
pub fn build_report(run: &ScenarioRun, logger: &Logger) -> ActivationReport {
    let coordinator = &run.coordinator;
    let mut services: BTreeMap<String, ServiceReport> = BTreeMap::new();

    for mounted in &run.mounted {
        let entry = services
            .entry(mounted.service.to_string())
            .or_insert_with(|| ServiceReport {
                activated: coordinator.is_activated(&mounted.service),
                activation_runs: coordinator.activation_runs(&mounted.service),
                placeholders: Vec::new(),
            });
        entry.placeholders.push(PlaceholderReport {
            element: mounted.element,
            variant: mounted.variant,
            slot: run.page.slot(mounted.element),
            src: run.page.attribute(mounted.element, "src"),
            deferred_src: run.page.attribute(mounted.element, DEFERRED_SRC_ATTR),
        });
    }

    for (service, report) in &services {
        logger.debug(
            "REPORT",
            format!(
                "{service}: activated={} placeholders={}",
                report.activated,
                report.placeholders.len()
            ),
        );
    }

    let activated = services.values().filter(|s| s.activated).count();
    let metadata = ReportMetadata {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        generated_by: "ucw_core".to_string(),
        cmp: coordinator.bridge().generation(),
        cmp_ready: coordinator.bridge().is_ready(),
        elements: run.page.element_count(),
        placeholders: run.mounted.len(),
        services_activated: activated,
        services_pending: services.len() - activated,
        recheck_passes: coordinator.recheck_passes(),
        change_signals: coordinator.change_signals(),
        elapsed_ms: run.elapsed.as_millis(),
    };

    ActivationReport {
        metadata,
        services,
        clicks: run.clicks.clone(),
    }
}

/// Persist the report to the given path.
pub fn write_report(report: &ActivationReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            UcwError::Filesystem(format!(
                "Failed to create report directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    let file = File::create(path).map_err(|err| {
        UcwError::Filesystem(format!(
            "Failed to create report file {}: {err}",
            path.display()
        ))
    })?;
    serde_json::to_writer_pretty(file, report).map_err(|err| {
        UcwError::Serialization(format!("Failed to write report {}: {err}", path.display()))
    })?;
    Ok(())
}

pub fn print_summary(report: &ActivationReport) {
    let cmp = report
        .metadata
        .cmp
        .map(|generation| generation.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!(
        "→ Activation dry-run. CMP={} Placeholders={} Activated={} Pending={} Passes={}",
        cmp,
        report.metadata.placeholders,
        report.metadata.services_activated,
        report.metadata.services_pending,
        report.metadata.recheck_passes
    );
    for click in report.clicks.iter().filter(|click| click.error.is_some()) {
        println!(
            "  ! click on {} at t+{}ms: {}",
            click.service,
            click.at_ms,
            click.error.as_deref().unwrap_or_default()
        );
    }
}
