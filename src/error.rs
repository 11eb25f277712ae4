/*============================================================
  Synavera Project: UCW
  Module: ucw_core::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise UCW error types so the consent engine, the DOM
    boundary, and the binary share one diagnostic vocabulary.

  Security / Safety Notes:
    Errors carry service identifiers and element handles only;
    consent payloads are never embedded in messages.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    CmpNotReady is surfaced to user-initiated accept paths. CMP
    faults are contained at the bridge and only ever logged.

  Revision History:
    2025-11-12 COD  Established consent engine error taxonomy.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - Untrusted third-party faults degrade, never propagate
    - Stable exit codes for operational tooling
============================================================*/

use std::fmt;
use std::io;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for UCW operations.
pub type Result<T> = std::result::Result<T, UcwError>;

/// Enumerates high-level error domains surfaced by UCW.
#[derive(Debug, Error)]
pub enum UcwError {
    #[error("Usercentrics CMP is not ready; cannot record consent for `{service}`")]
    CmpNotReady { service: String },
    #[error("CMP query failed: {0}")]
    AdapterQuery(String),
    #[error("Placeholder for `{service}` failed to activate: {reason}")]
    PlaceholderActivation { service: String, reason: String },
    #[error("DOM: {0}")]
    Dom(String),
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error("Runtime: {0}")]
    Runtime(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl UcwError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            UcwError::CmpNotReady { .. } => ExitCode::from(10),
            UcwError::AdapterQuery(_) => ExitCode::from(11),
            UcwError::PlaceholderActivation { .. } => ExitCode::from(12),
            UcwError::Dom(_) => ExitCode::from(13),
            UcwError::Config(_) => ExitCode::from(20),
            UcwError::Serialization(_) => ExitCode::from(31),
            UcwError::Filesystem(_) => ExitCode::from(40),
            UcwError::Runtime(_) => ExitCode::from(50),
            UcwError::Io(_) => ExitCode::from(41),
        }
    }
}

/// Fault raised by a CMP surface while answering a query or command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmpFault {
    /// The surface does not expose the requested method.
    Unsupported(&'static str),
    /// The surface threw or rejected.
    Failed(String),
}

impl fmt::Display for CmpFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpFault::Unsupported(method) => write!(f, "method `{method}` is not available"),
            CmpFault::Failed(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for CmpFault {}

impl From<CmpFault> for UcwError {
    fn from(fault: CmpFault) -> Self {
        UcwError::AdapterQuery(fault.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_fault_converts_to_adapter_query() {
        let err: UcwError = CmpFault::Failed("getConsentDetails rejected".into()).into();
        assert!(matches!(err, UcwError::AdapterQuery(ref msg) if msg == "getConsentDetails rejected"));
    }

    #[test]
    fn not_ready_names_the_service() {
        let err = UcwError::CmpNotReady {
            service: "BJz7qNsdj-7".into(),
        };
        assert!(err.to_string().contains("BJz7qNsdj-7"));
    }
}
