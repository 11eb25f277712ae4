/*============================================================
  Synavera Project: UCW
  Module: ucw_core::service
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Shared structures describing consentable services and the
    consent payloads the CMP generations hand back.

  Security / Safety Notes:
    Pure data containers; no I/O performed in this module.

  Dependencies:
    serde for payload decoding.

  Operational Scope:
    Used by bridge adapters to decide consent, and by the sim
    surfaces to script CMP state.

  Revision History:
    2025-11-12 COD  Introduced ServiceId and payload contracts.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear data contracts between modules
    - Lenient decoding of third-party payload shapes
============================================================*/

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifier of one consentable third-party service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ServiceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Consent detail payload returned by the event-driven surfaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsentDetails {
    pub consent: Option<GlobalConsent>,
    pub services: Option<ServicesPayload>,
}

/// Global consent block of a details payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalConsent {
    pub status: Option<GlobalConsentStatus>,
    pub service_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalConsentStatus {
    AllAccepted,
    AllDenied,
    SomeAccepted,
    #[serde(other)]
    Unknown,
}

/// Per-service entries come either as a list or keyed by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServicesPayload {
    List(Vec<ServiceEntry>),
    Map(BTreeMap<String, ServiceEntry>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: Option<String>,
    pub service_id: Option<String>,
    pub consent: Option<ServiceConsent>,
    #[serde(deserialize_with = "present_truthy")]
    pub status: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConsent {
    #[serde(deserialize_with = "present_truthy")]
    pub given: Option<bool>,
    #[serde(deserialize_with = "present_truthy")]
    pub status: Option<bool>,
}

impl ServiceEntry {
    fn matches(&self, id: &ServiceId) -> bool {
        self.id.as_deref() == Some(id.as_str()) || self.service_id.as_deref() == Some(id.as_str())
    }

    /// `consent.given`, else `consent.status`, else `status`, else false.
    pub fn granted(&self) -> bool {
        self.consent
            .as_ref()
            .and_then(|consent| consent.given.or(consent.status))
            .or(self.status)
            .unwrap_or(false)
    }
}

impl ServicesPayload {
    pub fn find(&self, id: &ServiceId) -> Option<&ServiceEntry> {
        match self {
            ServicesPayload::List(entries) => entries.iter().find(|entry| entry.matches(id)),
            ServicesPayload::Map(entries) => entries.get(id.as_str()),
        }
    }
}

impl ConsentDetails {
    /// Decide consent for `id`: global all-accepted, then the service's own
    /// entry, then the granted-id list, else false.
    pub fn grants(&self, id: &ServiceId) -> bool {
        let global = self.consent.as_ref();
        if global.and_then(|consent| consent.status) == Some(GlobalConsentStatus::AllAccepted) {
            return true;
        }
        if let Some(entry) = self.services.as_ref().and_then(|services| services.find(id)) {
            return entry.granted();
        }
        global
            .and_then(|consent| consent.service_ids.as_ref())
            .map(|ids| ids.iter().any(|granted| granted == id.as_str()))
            .unwrap_or(false)
    }
}

/// One row of the legacy flat service list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceBaseInfo {
    pub id: String,
    pub name: Option<String>,
    pub consent: Option<LegacyConsent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConsent {
    #[serde(deserialize_with = "truthy")]
    pub status: bool,
}

/// Look `id` up in the legacy list; absent means not consented.
pub fn legacy_grants(services: &[ServiceBaseInfo], id: &ServiceId) -> bool {
    services
        .iter()
        .find(|info| info.id == id.as_str())
        .and_then(|info| info.consent.as_ref())
        .map(|consent| consent.status)
        .unwrap_or(false)
}

/// CMP flags are read by truthiness: `false`, `null`, `0`, `NaN` and `""`
/// are false, anything else is true.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0 && !n.is_nan()).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| is_truthy(&value))
}

/// A present key decides the fallback chain even when its value is `null`.
fn present_truthy<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    truthy(deserializer).map(Some)
}

/// Batched consent mutation sent to the event-driven surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConsentUpdate {
    pub id: ServiceId,
    pub consent: bool,
}
