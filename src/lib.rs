/*============================================================
  Synavera Project: UCW
  Module: ucw_core
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Consent-gated activation engine for deferred third-party
    embeds. Bridges every Usercentrics CMP generation and turns
    placeholders into live content exactly once per service.

  Security / Safety Notes:
    Nothing deferred loads before consent is known or the
    visitor accepts from the placeholder itself.

  Dependencies:
    tokio (current-thread + LocalSet), serde, toml, url,
    indexmap, thiserror, chrono, sha2, dirs.

  Operational Scope:
    Library consumed by the `ucw-core` binary and embedders
    providing their own `PageDom` and `CmpHandles`.

  Revision History:
    2025-11-13 COD  Split engine into library crate.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Single-threaded engine; no locks
    - CMP faults degrade to "not granted"
============================================================*/

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod dom;
pub mod error;
pub mod logger;
pub mod placeholder;
pub mod registry;
pub mod report;
pub mod scan;
pub mod service;
pub mod sim;

pub use bridge::{CmpAdapter, CmpGeneration, ConsentAnswer, ConsentBridge};
pub use config::UcwConfig;
pub use coordinator::ActivationCoordinator;
pub use error::{Result, UcwError};
pub use logger::Logger;
pub use registry::{PlaceholderKey, PlaceholderRegistry, Registration};
pub use service::ServiceId;
