/*============================================================
  Synavera Project: UCW
  Module: ucw_core::sim
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    In-memory host environment: scripted CMP surfaces and the
    scenario runner that replays a consent timeline against a
    page fixture.

  Security / Safety Notes:
    No network, no real CMP.

  Dependencies:
    serde + toml for fixtures, tokio::time for the timeline.

  Operational Scope:
    Used by the binary and by tests.

  Revision History:
    2025-11-13 COD  Grouped simulation surfaces.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic replay under virtual time
============================================================*/

pub mod cmp;
pub mod scenario;

pub use cmp::ScriptedCmp;
pub use scenario::{run_scenario, ClickRecord, PageFixture, Scenario, ScenarioRun, Step, StepAction};
