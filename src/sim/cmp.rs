/*============================================================
  Synavera Project: UCW
  Module: ucw_core::sim::cmp
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Scriptable stand-in for every CMP generation, used by the
    scenario runner and by tests.

  Security / Safety Notes:
    In-memory only; never talks to a real CMP.

  Dependencies:
    tokio::sync::oneshot for eventual answers.

  Operational Scope:
    Installed into `CmpGlobals` under the slot matching its
    generation.

  Revision History:
    2025-11-12 COD  Added scripted CMP surface.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Listeners invoked outside of internal borrows
============================================================*/

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tokio::sync::oneshot;

use crate::bridge::surface::{
    AsyncEventCmp, CmpEvent, CmpEventKind, CmpGlobals, CmpListener, Deferred, DialogView,
    EventCmp, LegacyCmp, LegacyEvent, LegacyEventKind, LegacyListener, SyncEventCmp,
};
use crate::bridge::CmpGeneration;
use crate::error::CmpFault;
use crate::service::{
    ConsentDetails, GlobalConsent, GlobalConsentStatus, LegacyConsent, ServiceBaseInfo,
    ServiceConsent, ServiceConsentUpdate, ServiceEntry, ServiceId, ServicesPayload,
};

type DetailsSender = oneshot::Sender<Result<Option<ConsentDetails>, CmpFault>>;

/// Scripted CMP; one instance speaks exactly one generation.
pub struct ScriptedCmp {
    generation: CmpGeneration,
    state: RefCell<ScriptState>,
}

struct ScriptState {
    initialized: bool,
    failing: bool,
    batch_update: bool,
    stall_details: bool,
    all_accepted: bool,
    catalog: BTreeSet<String>,
    granted: BTreeSet<String>,
    listeners: Vec<(CmpEventKind, CmpListener)>,
    window_listeners: Vec<(LegacyEventKind, LegacyListener)>,
    stalled: Vec<DetailsSender>,
    updates: Vec<ServiceConsentUpdate>,
    saves: usize,
    queries: usize,
}

impl ScriptedCmp {
    pub fn new(generation: CmpGeneration) -> Rc<Self> {
        Rc::new(Self {
            generation,
            state: RefCell::new(ScriptState {
                initialized: false,
                failing: false,
                batch_update: true,
                stall_details: false,
                all_accepted: false,
                catalog: BTreeSet::new(),
                granted: BTreeSet::new(),
                listeners: Vec::new(),
                window_listeners: Vec::new(),
                stalled: Vec::new(),
                updates: Vec::new(),
                saves: 0,
                queries: 0,
            }),
        })
    }

    pub fn generation(&self) -> CmpGeneration {
        self.generation
    }

    /// Put this surface into its global slot.
    pub fn install(self: &Rc<Self>, globals: &CmpGlobals) {
        match self.generation {
            CmpGeneration::EventAsync => globals.install_uc_cmp(Rc::clone(self) as Rc<dyn AsyncEventCmp>),
            CmpGeneration::EventSync => globals.install_uc_cmp_sync(Rc::clone(self) as Rc<dyn SyncEventCmp>),
            CmpGeneration::Legacy => globals.install_uc_ui(Rc::clone(self) as Rc<dyn LegacyCmp>),
        }
    }

    /// Services the CMP knows about (the legacy list enumerates them).
    pub fn with_services<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .borrow_mut()
            .catalog
            .extend(ids.into_iter().map(Into::into));
    }

    pub fn initialize(&self) {
        self.state.borrow_mut().initialized = true;
        self.emit_legacy(LegacyEvent::Initialized);
    }

    /// Record consent silently, without any native event.
    pub fn grant(&self, id: &str) {
        let mut state = self.state.borrow_mut();
        state.catalog.insert(id.to_string());
        state.granted.insert(id.to_string());
    }

    /// Grant and emit the burst a "save settings" click produces.
    pub fn save_settings(&self, ids: &[String]) {
        for id in ids {
            self.grant(id);
        }
        match self.generation {
            CmpGeneration::Legacy => {
                self.emit_legacy(LegacyEvent::SaveSettings);
                self.emit_legacy(LegacyEvent::ViewChanged {
                    previous_view: Some(DialogView::SecondLayer),
                    view: Some(DialogView::None),
                });
            }
            _ => {
                self.emit(CmpEvent::ConsentChanged);
                self.emit(CmpEvent::ConsentSaved);
                self.emit(CmpEvent::UiChanged {
                    action: Some("save".into()),
                });
            }
        }
    }

    /// Accept every service and emit the matching burst.
    pub fn accept_all(&self) {
        self.state.borrow_mut().all_accepted = true;
        match self.generation {
            CmpGeneration::Legacy => {
                self.emit_legacy(LegacyEvent::AcceptAll);
                self.emit_legacy(LegacyEvent::ViewChanged {
                    previous_view: Some(DialogView::FirstLayer),
                    view: Some(DialogView::PrivacyButton),
                });
            }
            _ => {
                self.emit(CmpEvent::UiChanged {
                    action: Some("acceptAll".into()),
                });
                self.emit(CmpEvent::ConsentChanged);
            }
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    pub fn without_batch_update(&self) {
        self.state.borrow_mut().batch_update = false;
    }

    /// Hold async consent answers until `release_details`.
    pub fn stall_details(&self, stall: bool) {
        self.state.borrow_mut().stall_details = stall;
    }

    pub fn release_details(&self) {
        let (senders, details) = {
            let mut state = self.state.borrow_mut();
            (std::mem::take(&mut state.stalled), state.details())
        };
        for sender in senders {
            let _ = sender.send(Ok(Some(details.clone())));
        }
    }

    pub fn emit(&self, event: CmpEvent) {
        let listeners: Vec<CmpListener> = self
            .state
            .borrow()
            .listeners
            .iter()
            .filter(|(kind, _)| *kind == event.kind())
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn emit_legacy(&self, event: LegacyEvent) {
        let listeners: Vec<LegacyListener> = self
            .state
            .borrow()
            .window_listeners
            .iter()
            .filter(|(kind, _)| *kind == event.kind())
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn updates(&self) -> Vec<ServiceConsentUpdate> {
        self.state.borrow().updates.clone()
    }

    pub fn save_count(&self) -> usize {
        self.state.borrow().saves
    }

    /// Consent queries answered (or refused) so far.
    pub fn query_count(&self) -> usize {
        self.state.borrow().queries
    }

    fn check(&self) -> Result<(), CmpFault> {
        if self.state.borrow().failing {
            Err(CmpFault::Failed("scripted CMP fault".into()))
        } else {
            Ok(())
        }
    }
}

impl ScriptState {
    fn details(&self) -> ConsentDetails {
        let status = if self.all_accepted {
            GlobalConsentStatus::AllAccepted
        } else if self.granted.is_empty() {
            GlobalConsentStatus::AllDenied
        } else {
            GlobalConsentStatus::SomeAccepted
        };
        let entries = self
            .granted
            .iter()
            .map(|id| ServiceEntry {
                id: Some(id.clone()),
                consent: Some(ServiceConsent {
                    given: Some(true),
                    status: None,
                }),
                ..ServiceEntry::default()
            })
            .collect();
        ConsentDetails {
            consent: Some(GlobalConsent {
                status: Some(status),
                service_ids: Some(self.granted.iter().cloned().collect()),
            }),
            services: Some(ServicesPayload::List(entries)),
        }
    }
}

impl EventCmp for ScriptedCmp {
    fn is_initialized(&self) -> Result<bool, CmpFault> {
        self.check()?;
        Ok(self.state.borrow().initialized)
    }

    fn update_services_consents(
        &self,
        updates: Vec<ServiceConsentUpdate>,
    ) -> Result<Deferred<()>, CmpFault> {
        self.check()?;
        let mut state = self.state.borrow_mut();
        if !state.batch_update {
            return Err(CmpFault::Unsupported("updateServicesConsents"));
        }
        for update in &updates {
            if update.consent {
                state.granted.insert(update.id.to_string());
            } else {
                state.granted.remove(update.id.as_str());
            }
        }
        state.updates.extend(updates);
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Ok(()));
        Ok(receiver)
    }

    fn save_consents(&self) -> Result<(), CmpFault> {
        self.check()?;
        self.state.borrow_mut().saves += 1;
        self.emit(CmpEvent::ConsentSaved);
        Ok(())
    }

    fn add_event_listener(
        &self,
        kind: CmpEventKind,
        listener: CmpListener,
    ) -> Result<(), CmpFault> {
        self.state.borrow_mut().listeners.push((kind, listener));
        Ok(())
    }
}

impl AsyncEventCmp for ScriptedCmp {
    fn consent_details(&self) -> Result<Deferred<Option<ConsentDetails>>, CmpFault> {
        let mut state = self.state.borrow_mut();
        state.queries += 1;
        let (sender, receiver) = oneshot::channel();
        if state.failing {
            let _ = sender.send(Err(CmpFault::Failed("getConsentDetails rejected".into())));
        } else if state.stall_details {
            state.stalled.push(sender);
        } else {
            let _ = sender.send(Ok(Some(state.details())));
        }
        Ok(receiver)
    }
}

impl SyncEventCmp for ScriptedCmp {
    fn consent_details(&self) -> Result<Option<ConsentDetails>, CmpFault> {
        self.state.borrow_mut().queries += 1;
        self.check()?;
        Ok(Some(self.state.borrow().details()))
    }
}

impl LegacyCmp for ScriptedCmp {
    fn is_initialized(&self) -> Result<bool, CmpFault> {
        self.check()?;
        Ok(self.state.borrow().initialized)
    }

    fn services_base_info(&self) -> Result<Vec<ServiceBaseInfo>, CmpFault> {
        self.state.borrow_mut().queries += 1;
        self.check()?;
        let state = self.state.borrow();
        Ok(state
            .catalog
            .iter()
            .map(|id| ServiceBaseInfo {
                id: id.clone(),
                name: None,
                consent: Some(LegacyConsent {
                    status: state.all_accepted || state.granted.contains(id),
                }),
            })
            .collect())
    }

    fn accept_service(&self, id: &ServiceId) -> Result<(), CmpFault> {
        self.check()?;
        self.grant(id.as_str());
        self.state.borrow_mut().saves += 1;
        Ok(())
    }

    fn add_window_listener(&self, kind: LegacyEventKind, listener: LegacyListener) {
        self.state.borrow_mut().window_listeners.push((kind, listener));
    }
}
