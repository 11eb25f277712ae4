/*============================================================
  Synavera Project: UCW
  Module: ucw_core::sim::scenario
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load page fixtures and CMP timelines from TOML, then run
    the engine against them: install and initialize the CMP,
    mount the page, replay grants, native events, and clicks.

  Security / Safety Notes:
    Fixtures are read from operator-supplied paths only.

  Dependencies:
    serde + toml for fixtures, tokio::time for the timeline.

  Operational Scope:
    Must be awaited inside a `LocalSet` on a current-thread
    runtime.

  Revision History:
    2025-11-13 COD  Authored scenario runner.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Steps applied in timestamp order, ties in file order
    - Click failures recorded, never fatal
============================================================*/

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, sleep_until, Instant};

use crate::bridge::{CmpEvent, CmpGeneration, CmpGlobals, ConsentBridge, DialogView, LegacyEvent};
use crate::config::UcwConfig;
use crate::coordinator::ActivationCoordinator;
use crate::dom::{ElementSpec, SimulatedPage};
use crate::error::{Result, UcwError};
use crate::logger::Logger;
use crate::placeholder::SERVICE_ID_ATTR;
use crate::registry::PlaceholderRegistry;
use crate::scan::{mount_page, MountedPlaceholder};

use super::ScriptedCmp;

/// Page description: document language plus deferred elements.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageFixture {
    pub lang: Option<String>,
    #[serde(rename = "element")]
    pub elements: Vec<ElementSpec>,
}

impl PageFixture {
    pub fn load(path: &Path) -> Result<Self> {
        read_toml(path, "page fixture")
    }

    pub fn build(&self) -> Rc<SimulatedPage> {
        SimulatedPage::from_specs(self.lang.clone(), &self.elements)
    }
}

/// CMP timeline. Without `generation` the page has no CMP at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub generation: Option<CmpGeneration>,
    /// When the CMP global appears.
    pub installed_at_ms: u64,
    /// When the CMP reports initialized; `None` means never.
    pub initialized_at_ms: Option<u64>,
    /// Consent already stored before page load.
    pub granted: Vec<String>,
    /// Services the CMP knows about.
    pub services: Vec<String>,
    /// Quiet time after the last step before the run ends.
    pub settle_ms: u64,
    #[serde(rename = "step")]
    pub steps: Vec<Step>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            generation: None,
            installed_at_ms: 0,
            initialized_at_ms: Some(0),
            granted: Vec::new(),
            services: Vec::new(),
            settle_ms: 1_000,
            steps: Vec::new(),
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        read_toml(path, "scenario")
    }

    /// Timeline with install and initialize folded in, sorted by time.
    fn timeline(&self) -> Vec<Step> {
        let mut timeline = Vec::with_capacity(self.steps.len() + 2);
        if self.installed_at_ms > 0 {
            timeline.push(Step {
                at_ms: self.installed_at_ms,
                action: StepAction::Install,
            });
        }
        if let Some(at_ms) = self.initialized_at_ms.filter(|at| *at > 0) {
            timeline.push(Step {
                at_ms,
                action: StepAction::Initialize,
            });
        }
        timeline.extend(self.steps.iter().cloned());
        timeline.sort_by_key(|step| step.at_ms);
        timeline
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Install,
    Initialize,
    /// Store consent without any native event.
    Grant { service: String },
    /// Grant and emit the save-settings burst.
    SaveSettings { services: Vec<String> },
    AcceptAll,
    RejectAll,
    ConsentChanged,
    ConsentSaved,
    UiChanged {
        #[serde(default)]
        ui_action: Option<String>,
    },
    ViewChanged {
        #[serde(default)]
        previous_view: Option<String>,
        #[serde(default)]
        view: Option<String>,
    },
    /// Click the accept control of the `index`-th live placeholder of `service`.
    Click {
        service: String,
        #[serde(default)]
        index: usize,
    },
    FailQueries {
        #[serde(default = "enabled")]
        failing: bool,
    },
}

fn enabled() -> bool {
    true
}

/// Result of a scripted accept click.
#[derive(Debug, Clone, Serialize)]
pub struct ClickRecord {
    pub at_ms: u64,
    pub service: String,
    pub error: Option<String>,
}

/// Everything the report needs after a run.
pub struct ScenarioRun {
    pub page: Rc<SimulatedPage>,
    pub coordinator: Rc<ActivationCoordinator>,
    pub cmp: Option<Rc<ScriptedCmp>>,
    pub mounted: Vec<MountedPlaceholder>,
    pub clicks: Vec<ClickRecord>,
    pub elapsed: Duration,
}

/// Run `scenario` against a fresh page built from `fixture`.
pub async fn run_scenario(
    fixture: &PageFixture,
    scenario: &Scenario,
    config: &UcwConfig,
    logger: Rc<Logger>,
) -> Result<ScenarioRun> {
    let start = Instant::now();
    let globals = Rc::new(CmpGlobals::new());
    let cmp = scenario.generation.map(ScriptedCmp::new);

    if let Some(cmp) = &cmp {
        cmp.with_services(scenario.services.iter().cloned());
        for service in &scenario.granted {
            cmp.grant(service);
        }
        if scenario.installed_at_ms == 0 {
            cmp.install(&globals);
        }
        if scenario.initialized_at_ms == Some(0) {
            cmp.initialize();
        }
    }

    let bridge = ConsentBridge::new(globals.clone(), config.bridge.clone(), Rc::clone(&logger));
    let coordinator = ActivationCoordinator::new(
        bridge,
        PlaceholderRegistry::new(Rc::clone(&logger)),
        config.bridge.clone(),
        Rc::clone(&logger),
    );
    let page = fixture.build();
    let mounted = mount_page(page.clone(), &coordinator, &config.widget, &logger);
    coordinator.link();

    let mut clicks = Vec::new();
    for step in scenario.timeline() {
        sleep_until(start + Duration::from_millis(step.at_ms)).await;
        logger.debug("STEP", format!("t+{}ms {:?}", step.at_ms, step.action));

        if let StepAction::Click { service, index } = &step.action {
            clicks.push(click(&page, service, *index, step.at_ms));
            continue;
        }
        let Some(cmp) = &cmp else {
            logger.warn(
                "STEP",
                format!("t+{}ms {:?} ignored: scenario has no CMP", step.at_ms, step.action),
            );
            continue;
        };
        apply(cmp, &globals, &step.action, &logger)?;
    }

    sleep(Duration::from_millis(scenario.settle_ms)).await;

    Ok(ScenarioRun {
        page,
        coordinator,
        cmp,
        mounted,
        clicks,
        elapsed: start.elapsed(),
    })
}

fn apply(cmp: &Rc<ScriptedCmp>, globals: &CmpGlobals, action: &StepAction, logger: &Logger) -> Result<()> {
    let legacy = cmp.generation() == CmpGeneration::Legacy;
    match action {
        StepAction::Install => cmp.install(globals),
        StepAction::Initialize => cmp.initialize(),
        StepAction::Grant { service } => cmp.grant(service),
        StepAction::SaveSettings { services } => cmp.save_settings(services),
        StepAction::AcceptAll => cmp.accept_all(),
        StepAction::RejectAll if legacy => cmp.emit_legacy(LegacyEvent::RejectAll),
        StepAction::ConsentChanged if !legacy => cmp.emit(CmpEvent::ConsentChanged),
        StepAction::ConsentSaved if !legacy => cmp.emit(CmpEvent::ConsentSaved),
        StepAction::UiChanged { ui_action } if !legacy => cmp.emit(CmpEvent::UiChanged {
            action: ui_action.clone(),
        }),
        StepAction::ViewChanged {
            previous_view,
            view,
        } if legacy => cmp.emit_legacy(LegacyEvent::ViewChanged {
            previous_view: previous_view.as_deref().map(DialogView::parse),
            view: view.as_deref().map(DialogView::parse),
        }),
        StepAction::FailQueries { failing } => cmp.set_failing(*failing),
        StepAction::Click { .. } => {
            return Err(UcwError::Runtime("click steps are not CMP actions".into()))
        }
        other => logger.warn(
            "STEP",
            format!("{other:?} has no {} equivalent; skipped", cmp.generation()),
        ),
    }
    Ok(())
}

fn click(page: &SimulatedPage, service: &str, index: usize, at_ms: u64) -> ClickRecord {
    let controls = page.accept_controls(SERVICE_ID_ATTR, service);
    let error = match controls.get(index) {
        Some(container) => page.click_accept(*container).err().map(|err| err.to_string()),
        None => Some(format!(
            "no accept control #{index} for `{service}` ({} live)",
            controls.len()
        )),
    };
    ClickRecord {
        at_ms,
        service: service.to_string(),
        error,
    }
}

fn read_toml<T>(path: &Path, what: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let raw = std::fs::read_to_string(path).map_err(|err| {
        UcwError::Filesystem(format!("Failed to read {what} {}: {err}", path.display()))
    })?;
    toml::from_str(&raw)
        .map_err(|err| UcwError::Config(format!("Invalid {what} {}: {err}", path.display())))
}
