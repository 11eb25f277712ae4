/*============================================================
  Synavera Project: UCW
  Module: ucw_core::registry
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Track placeholders awaiting consent per service, and the
    set of services already activated.

  Security / Safety Notes:
    A service, once activated, never queues again; late
    placeholders for it activate on registration.

  Dependencies:
    indexmap for registration-ordered service keys.

  Operational Scope:
    Owned by the ActivationCoordinator; every mutation runs to
    completion on the page thread.

  Revision History:
    2025-11-12 COD  Implemented placeholder registry.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Idempotent activation
    - Per-item fault isolation
    - Iteration over a detached snapshot
============================================================*/

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::UcwError;
use crate::logger::Logger;
use crate::placeholder::Placeholder;
use crate::service::ServiceId;

/// Registry-assigned identity of one placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceholderKey(u64);

impl fmt::Display for PlaceholderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "placeholder#{}", self.0)
    }
}

/// Outcome of `register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Queued until the service is activated.
    Pending(PlaceholderKey),
    /// The service was already active; activated on the spot.
    Activated(PlaceholderKey),
}

impl Registration {
    pub fn key(&self) -> PlaceholderKey {
        match self {
            Registration::Pending(key) | Registration::Activated(key) => *key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationSummary {
    pub service: ServiceId,
    pub activated: usize,
    pub failed: usize,
    /// True when the service had been activated before this call.
    pub already_active: bool,
}

struct Entry {
    key: PlaceholderKey,
    placeholder: Box<dyn Placeholder>,
}

pub struct PlaceholderRegistry {
    pending: IndexMap<ServiceId, Vec<Entry>>,
    activated: HashSet<ServiceId>,
    runs: HashMap<ServiceId, usize>,
    next_key: u64,
    logger: Rc<Logger>,
}

impl PlaceholderRegistry {
    pub fn new(logger: Rc<Logger>) -> Self {
        Self {
            pending: IndexMap::new(),
            activated: HashSet::new(),
            runs: HashMap::new(),
            next_key: 0,
            logger,
        }
    }

    pub fn register(&mut self, id: ServiceId, placeholder: Box<dyn Placeholder>) -> Registration {
        match self.admit(id.clone(), placeholder) {
            Admission::Queued(key) => Registration::Pending(key),
            Admission::Ready(key, placeholder) => {
                run_activation(&self.logger, &id, key, placeholder, false);
                Registration::Activated(key)
            }
        }
    }

    /// Queue `placeholder`, or hand it back for immediate activation when
    /// its service is already active. The caller runs the activation.
    pub fn admit(&mut self, id: ServiceId, placeholder: Box<dyn Placeholder>) -> Admission {
        let key = PlaceholderKey(self.next_key);
        self.next_key += 1;

        if self.activated.contains(&id) {
            self.logger.debug(
                "REGISTER",
                format!("{key} for already active {id}; activating now"),
            );
            *self.runs.entry(id).or_default() += 1;
            return Admission::Ready(key, placeholder);
        }

        self.logger
            .debug("REGISTER", format!("{key} queued for {id}"));
        self.pending
            .entry(id)
            .or_default()
            .push(Entry { key, placeholder });
        Admission::Queued(key)
    }

    /// Drop one pending placeholder without activating it.
    pub fn unregister(&mut self, id: &ServiceId, key: PlaceholderKey) -> Option<Box<dyn Placeholder>> {
        let entries = self.pending.get_mut(id)?;
        let index = entries.iter().position(|entry| entry.key == key)?;
        let removed = entries.remove(index);
        if entries.is_empty() {
            self.pending.shift_remove(id);
        }
        Some(removed.placeholder)
    }

    /// Drop every pending placeholder of `id`; returns how many.
    pub fn unregister_all(&mut self, id: &ServiceId) -> usize {
        self.pending
            .shift_remove(id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn activate(&mut self, id: &ServiceId) -> ActivationSummary {
        self.activate_with_origin(id, None)
    }

    /// Activate every pending placeholder of `id`. The placeholder whose
    /// accept control was used, if any, is told so.
    pub fn activate_with_origin(
        &mut self,
        id: &ServiceId,
        origin: Option<PlaceholderKey>,
    ) -> ActivationSummary {
        let batch = self.take_batch(id, origin);
        batch.run(&self.logger)
    }

    /// Mark `id` activated and detach its pending placeholders. Running the
    /// batch needs no access to the registry, so placeholders may register
    /// new ones while it runs; those activate on admission.
    pub fn take_batch(&mut self, id: &ServiceId, origin: Option<PlaceholderKey>) -> ActivationBatch {
        if self.activated.contains(id) {
            self.logger
                .debug("ACTIVATE", format!("{id} already active; skipping"));
            return ActivationBatch {
                service: id.clone(),
                origin,
                entries: Vec::new(),
                already_active: true,
            };
        }

        self.activated.insert(id.clone());
        let entries = self.pending.shift_remove(id).unwrap_or_default();
        *self.runs.entry(id.clone()).or_default() += entries.len();
        self.logger.info(
            "ACTIVATE",
            format!("Activating {} placeholder(s) for {id}", entries.len()),
        );
        ActivationBatch {
            service: id.clone(),
            origin,
            entries,
            already_active: false,
        }
    }

    pub fn is_activated(&self, id: &ServiceId) -> bool {
        self.activated.contains(id)
    }

    /// Services with pending placeholders, in first-registration order.
    pub fn all_service_ids(&self) -> Vec<ServiceId> {
        self.pending.keys().cloned().collect()
    }

    pub fn pending_count(&self, id: &ServiceId) -> usize {
        self.pending.get(id).map(Vec::len).unwrap_or(0)
    }

    pub fn is_pending(&self, id: &ServiceId, key: PlaceholderKey) -> bool {
        self.pending
            .get(id)
            .map(|entries| entries.iter().any(|entry| entry.key == key))
            .unwrap_or(false)
    }

    /// How many placeholders of `id` have had their activation run.
    pub fn activation_runs(&self, id: &ServiceId) -> usize {
        self.runs.get(id).copied().unwrap_or(0)
    }

    pub fn activated_services(&self) -> Vec<ServiceId> {
        let mut services: Vec<ServiceId> = self.activated.iter().cloned().collect();
        services.sort();
        services
    }
}

/// Placeholders detached from the registry, ready to activate.
pub struct ActivationBatch {
    service: ServiceId,
    origin: Option<PlaceholderKey>,
    entries: Vec<Entry>,
    already_active: bool,
}

impl ActivationBatch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn run(self, logger: &Logger) -> ActivationSummary {
        let mut summary = ActivationSummary {
            service: self.service.clone(),
            activated: 0,
            failed: 0,
            already_active: self.already_active,
        };
        for entry in self.entries {
            let from_user_action = self.origin == Some(entry.key);
            if run_activation(logger, &self.service, entry.key, entry.placeholder, from_user_action) {
                summary.activated += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }
}

/// Outcome of `admit`.
pub enum Admission {
    Queued(PlaceholderKey),
    /// The service is already active; activate this placeholder now.
    Ready(PlaceholderKey, Box<dyn Placeholder>),
}

/// Activate one placeholder; failures are logged and isolated.
pub fn run_activation(
    logger: &Logger,
    id: &ServiceId,
    key: PlaceholderKey,
    mut placeholder: Box<dyn Placeholder>,
    from_user_action: bool,
) -> bool {
    match placeholder.activate(from_user_action) {
        Ok(()) => {
            logger.debug(
                "ACTIVATE",
                format!("{key} ({}) activated for {id}", placeholder.element()),
            );
            true
        }
        Err(err) => {
            let err = match err {
                err @ UcwError::PlaceholderActivation { .. } => err,
                other => UcwError::PlaceholderActivation {
                    service: id.to_string(),
                    reason: other.to_string(),
                },
            };
            logger.error("ACTIVATE", format!("{key}: {err}"));
            false
        }
    }
}
