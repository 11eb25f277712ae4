/*============================================================
  Synavera Project: UCW
  Module: ucw_core::bridge
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Present every supported CMP generation through one
    contract: readiness, consent query, consent request, and a
    coalesced "consent may have changed" signal.

  Security / Safety Notes:
    Faults raised by the CMP are contained here and degrade to
    "not ready" / "not consented". Only the user-initiated
    request path can fail, and only with CmpNotReady.

  Dependencies:
    tokio (spawn_local, time, oneshot) for deferred work.

  Operational Scope:
    Constructed once per page. The adapter is detected lazily
    and latched on first detection. Timer-driven methods must
    be called from inside a `LocalSet`.

  Revision History:
    2025-11-12 COD  Authored consent bridge.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Adapter chosen once, never re-dispatched per call site
    - No cached consent values; every query hits the CMP
    - Exactly-once readiness callbacks
============================================================*/

pub mod coalesce;
pub mod surface;

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::config::BridgeConfig;
use crate::error::{CmpFault, Result, UcwError};
use crate::logger::Logger;
use crate::service::{legacy_grants, ServiceConsentUpdate, ServiceId};

pub use coalesce::Coalescer;
pub use surface::{
    AsyncEventCmp, CmpEvent, CmpEventKind, CmpGlobals, CmpHandles, Deferred, DialogView, EventCmp,
    LegacyCmp, LegacyEvent, LegacyEventKind, SyncEventCmp,
};

/// Consent answer: available now, or resolving later with one value.
pub enum ConsentAnswer {
    Immediate(bool),
    Eventual(Pin<Box<dyn Future<Output = bool>>>),
}

impl ConsentAnswer {
    pub async fn resolve(self) -> bool {
        match self {
            ConsentAnswer::Immediate(granted) => granted,
            ConsentAnswer::Eventual(pending) => pending.await,
        }
    }

    /// The value, if it is already known.
    pub fn now(&self) -> Option<bool> {
        match self {
            ConsentAnswer::Immediate(granted) => Some(*granted),
            ConsentAnswer::Eventual(_) => None,
        }
    }
}

impl fmt::Debug for ConsentAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsentAnswer::Immediate(granted) => f.debug_tuple("Immediate").field(granted).finish(),
            ConsentAnswer::Eventual(_) => f.write_str("Eventual(..)"),
        }
    }
}

/// CMP generation an adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CmpGeneration {
    EventAsync,
    EventSync,
    Legacy,
}

impl fmt::Display for CmpGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpGeneration::EventAsync => f.write_str("__ucCmp (async)"),
            CmpGeneration::EventSync => f.write_str("__ucCmp (sync)"),
            CmpGeneration::Legacy => f.write_str("UC_UI (legacy)"),
        }
    }
}

/// One variant per CMP generation, selected once by probing.
#[derive(Clone)]
pub enum CmpAdapter {
    EventAsync(Rc<dyn AsyncEventCmp>),
    EventSync(Rc<dyn SyncEventCmp>),
    Legacy(Rc<dyn LegacyCmp>),
}

impl CmpAdapter {
    /// Detect in fixed precedence: async `__ucCmp`, sync `__ucCmp`, `UC_UI`.
    pub fn detect(handles: &dyn CmpHandles) -> Option<Self> {
        if let Some(cmp) = handles.uc_cmp() {
            return Some(CmpAdapter::EventAsync(cmp));
        }
        if let Some(cmp) = handles.uc_cmp_sync() {
            return Some(CmpAdapter::EventSync(cmp));
        }
        handles.uc_ui().map(CmpAdapter::Legacy)
    }

    pub fn generation(&self) -> CmpGeneration {
        match self {
            CmpAdapter::EventAsync(_) => CmpGeneration::EventAsync,
            CmpAdapter::EventSync(_) => CmpGeneration::EventSync,
            CmpAdapter::Legacy(_) => CmpGeneration::Legacy,
        }
    }

    fn is_initialized(&self) -> std::result::Result<bool, CmpFault> {
        match self {
            CmpAdapter::EventAsync(cmp) => cmp.is_initialized(),
            CmpAdapter::EventSync(cmp) => cmp.is_initialized(),
            CmpAdapter::Legacy(cmp) => cmp.is_initialized(),
        }
    }
}

type ReadyCallback = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

/// Generation-agnostic view of the page's CMP.
pub struct ConsentBridge {
    handles: Rc<dyn CmpHandles>,
    adapter: OnceCell<CmpAdapter>,
    settings: BridgeConfig,
    logger: Rc<Logger>,
}

impl ConsentBridge {
    pub fn new(handles: Rc<dyn CmpHandles>, settings: BridgeConfig, logger: Rc<Logger>) -> Rc<Self> {
        Rc::new(Self {
            handles,
            adapter: OnceCell::new(),
            settings,
            logger,
        })
    }

    /// The detected adapter; detects again until a CMP handle shows up.
    pub fn adapter(&self) -> Option<&CmpAdapter> {
        if let Some(adapter) = self.adapter.get() {
            return Some(adapter);
        }
        let detected = CmpAdapter::detect(self.handles.as_ref())?;
        self.logger.info(
            "CMP",
            format!("Detected {} surface", detected.generation()),
        );
        Some(self.adapter.get_or_init(|| detected))
    }

    pub fn generation(&self) -> Option<CmpGeneration> {
        self.adapter().map(CmpAdapter::generation)
    }

    /// Never fails; CMP faults read as "not ready".
    pub fn is_ready(&self) -> bool {
        let Some(adapter) = self.adapter() else {
            return false;
        };
        match adapter.is_initialized() {
            Ok(ready) => ready,
            Err(fault) => {
                self.contain("READY", fault);
                false
            }
        }
    }

    /// Run `callback` once the CMP is ready. Already ready: next tick.
    /// Never ready: never runs.
    pub fn wait_for_ready(self: &Rc<Self>, callback: impl FnOnce() + 'static) {
        let slot: ReadyCallback = Rc::new(RefCell::new(Some(Box::new(callback))));

        if self.is_ready() {
            tokio::task::spawn_local(async move { fire_once(&slot) });
            return;
        }

        if let Some(CmpAdapter::Legacy(ui)) = self.adapter() {
            self.logger
                .debug("READY", "Waiting for UC_UI_INITIALIZED window event");
            let slot = Rc::clone(&slot);
            ui.add_window_listener(
                LegacyEventKind::Initialized,
                Rc::new(move |_| fire_once(&slot)),
            );
            return;
        }

        self.logger.debug(
            "READY",
            format!(
                "Polling CMP readiness every {}ms",
                self.settings.ready_poll().as_millis()
            ),
        );
        let bridge = Rc::clone(self);
        tokio::task::spawn_local(async move {
            loop {
                sleep(bridge.settings.ready_poll()).await;
                if bridge.is_ready() {
                    fire_once(&slot);
                    break;
                }
            }
        });
    }

    /// Current consent for `id`. Faults and unknown surfaces read as false.
    pub fn get_consent(&self, id: &ServiceId) -> ConsentAnswer {
        let Some(adapter) = self.adapter() else {
            return ConsentAnswer::Immediate(false);
        };
        match adapter {
            CmpAdapter::EventAsync(cmp) => match cmp.consent_details() {
                Ok(pending) => {
                    let id = id.clone();
                    let logger = Rc::clone(&self.logger);
                    ConsentAnswer::Eventual(Box::pin(async move {
                        match pending.await {
                            Ok(Ok(details)) => details.map(|d| d.grants(&id)).unwrap_or(false),
                            Ok(Err(fault)) => {
                                contain(&logger, "CONSENT", fault);
                                false
                            }
                            Err(_) => {
                                logger.debug(
                                    "CONSENT",
                                    format!("Consent details for {id} were dropped unanswered"),
                                );
                                false
                            }
                        }
                    }))
                }
                Err(fault) => {
                    self.contain("CONSENT", fault);
                    ConsentAnswer::Immediate(false)
                }
            },
            CmpAdapter::EventSync(cmp) => match cmp.consent_details() {
                Ok(details) => {
                    ConsentAnswer::Immediate(details.map(|d| d.grants(id)).unwrap_or(false))
                }
                Err(fault) => {
                    self.contain("CONSENT", fault);
                    ConsentAnswer::Immediate(false)
                }
            },
            CmpAdapter::Legacy(ui) => match ui.services_base_info() {
                Ok(services) => ConsentAnswer::Immediate(legacy_grants(&services, id)),
                Err(fault) => {
                    self.contain("CONSENT", fault);
                    ConsentAnswer::Immediate(false)
                }
            },
        }
    }

    /// Record consent for `id` upstream. Fails only when the CMP is not
    /// ready; the update itself is fire-and-forget.
    pub fn request_consent(&self, id: &ServiceId) -> Result<()> {
        if !self.is_ready() {
            return Err(UcwError::CmpNotReady {
                service: id.to_string(),
            });
        }
        match self.adapter() {
            Some(CmpAdapter::EventAsync(cmp)) => self.persist_batched(Rc::clone(cmp), id),
            Some(CmpAdapter::EventSync(cmp)) => self.persist_batched(Rc::clone(cmp), id),
            Some(CmpAdapter::Legacy(ui)) => {
                if let Err(fault) = ui.accept_service(id) {
                    self.logger
                        .warn("REQUEST", format!("UC_UI.acceptService({id}) failed: {fault}"));
                }
            }
            None => {
                return Err(UcwError::CmpNotReady {
                    service: id.to_string(),
                })
            }
        }
        self.logger
            .info("REQUEST", format!("Consent requested for {id}"));
        Ok(())
    }

    fn persist_batched<S>(&self, cmp: Rc<S>, id: &ServiceId)
    where
        S: EventCmp + ?Sized + 'static,
    {
        let update = vec![ServiceConsentUpdate {
            id: id.clone(),
            consent: true,
        }];
        match cmp.update_services_consents(update) {
            Ok(pending) => {
                let logger = Rc::clone(&self.logger);
                let id = id.clone();
                tokio::task::spawn_local(async move {
                    match pending.await {
                        Ok(Ok(())) => {
                            if let Err(fault) = cmp.save_consents() {
                                logger.warn(
                                    "REQUEST",
                                    format!("saveConsents after update for {id} failed: {fault}"),
                                );
                            }
                        }
                        Ok(Err(fault)) => logger.warn(
                            "REQUEST",
                            format!("updateServicesConsents for {id} rejected: {fault}"),
                        ),
                        Err(_) => logger.warn(
                            "REQUEST",
                            format!("updateServicesConsents for {id} never settled"),
                        ),
                    }
                });
            }
            Err(CmpFault::Unsupported(_)) => {
                if let Err(fault) = cmp.save_consents() {
                    self.logger
                        .warn("REQUEST", format!("saveConsents for {id} failed: {fault}"));
                }
            }
            Err(fault) => self.logger.warn(
                "REQUEST",
                format!("updateServicesConsents for {id} failed: {fault}"),
            ),
        }
    }

    /// Subscribe `callback` to every native change signal of the active
    /// CMP, coalesced into one call per burst. Returns the coalescer so
    /// callers can observe how many passes were delivered.
    pub fn on_consent_changed(self: &Rc<Self>, callback: Rc<dyn Fn()>) -> Coalescer {
        let coalescer = Coalescer::new(self.settings.debounce(), callback);
        if let Some(adapter) = self.adapter().cloned() {
            self.subscribe(adapter, coalescer.clone());
            return coalescer;
        }

        let bridge = Rc::clone(self);
        let pending = coalescer.clone();
        tokio::task::spawn_local(async move {
            loop {
                sleep(bridge.settings.ready_poll()).await;
                if let Some(adapter) = bridge.adapter().cloned() {
                    bridge.subscribe(adapter, pending);
                    break;
                }
            }
        });
        coalescer
    }

    fn subscribe(&self, adapter: CmpAdapter, coalescer: Coalescer) {
        match adapter {
            CmpAdapter::EventAsync(cmp) => self.subscribe_events(cmp, coalescer),
            CmpAdapter::EventSync(cmp) => self.subscribe_events(cmp, coalescer),
            CmpAdapter::Legacy(ui) => {
                for kind in [
                    LegacyEventKind::ViewChanged,
                    LegacyEventKind::AcceptAll,
                    LegacyEventKind::SaveSettings,
                    LegacyEventKind::RejectAll,
                ] {
                    let logger = Rc::clone(&self.logger);
                    let coalescer = coalescer.clone();
                    ui.add_window_listener(
                        kind,
                        Rc::new(move |event: &LegacyEvent| {
                            logger.debug("EVENT", format!("{} received", event.kind().as_str()));
                            if event.signals_recheck() {
                                coalescer.trigger();
                            }
                        }),
                    );
                }
                self.logger
                    .debug("LISTEN", "Subscribed to UC_UI window events");
            }
        }
    }

    fn subscribe_events<S>(&self, cmp: Rc<S>, coalescer: Coalescer)
    where
        S: EventCmp + ?Sized,
    {
        for kind in CmpEventKind::ALL {
            let logger = Rc::clone(&self.logger);
            let coalescer = coalescer.clone();
            let listener = Rc::new(move |event: &CmpEvent| {
                logger.debug("EVENT", format!("{} received", event.kind().as_str()));
                if event.signals_recheck() {
                    coalescer.trigger();
                }
            });
            if let Err(fault) = cmp.add_event_listener(kind, listener) {
                self.contain("LISTEN", fault);
            }
        }
        self.logger
            .debug("LISTEN", "Subscribed to __ucCmp events");
    }

    fn contain(&self, code: &str, fault: CmpFault) {
        contain(&self.logger, code, fault);
    }
}

fn contain(logger: &Logger, code: &str, fault: CmpFault) {
    let err = UcwError::from(fault);
    logger.debug(code, format!("{err}; treating as not granted"));
}

fn fire_once(slot: &ReadyCallback) {
    let callback = slot.borrow_mut().take();
    if let Some(callback) = callback {
        callback();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use tokio::task::LocalSet;

    use super::*;
    use crate::sim::ScriptedCmp;

    fn bridge_for(globals: Rc<CmpGlobals>) -> Rc<ConsentBridge> {
        ConsentBridge::new(
            globals,
            BridgeConfig::default(),
            Rc::new(Logger::stderr(false)),
        )
    }

    #[test]
    fn detection_prefers_newest_surface() {
        let globals = Rc::new(CmpGlobals::new());
        ScriptedCmp::new(CmpGeneration::Legacy).install(&globals);
        ScriptedCmp::new(CmpGeneration::EventSync).install(&globals);
        let bridge = bridge_for(Rc::clone(&globals));
        assert_eq!(bridge.generation(), Some(CmpGeneration::EventSync));

        ScriptedCmp::new(CmpGeneration::EventAsync).install(&globals);
        // Latched after first detection.
        assert_eq!(bridge.generation(), Some(CmpGeneration::EventSync));
        assert_eq!(
            bridge_for(globals).generation(),
            Some(CmpGeneration::EventAsync)
        );
    }

    #[test]
    fn unknown_environment_degrades() {
        let bridge = bridge_for(Rc::new(CmpGlobals::new()));
        assert!(!bridge.is_ready());
        assert_eq!(bridge.get_consent(&"svc-a".into()).now(), Some(false));
        assert!(matches!(
            bridge.request_consent(&"svc-a".into()),
            Err(UcwError::CmpNotReady { .. })
        ));
    }

    #[test]
    fn sync_and_legacy_answer_immediately() {
        for generation in [CmpGeneration::EventSync, CmpGeneration::Legacy] {
            let globals = Rc::new(CmpGlobals::new());
            let cmp = ScriptedCmp::new(generation);
            cmp.install(&globals);
            cmp.grant("svc-a");
            let bridge = bridge_for(globals);
            assert_eq!(bridge.get_consent(&"svc-a".into()).now(), Some(true));
            assert_eq!(bridge.get_consent(&"svc-b".into()).now(), Some(false));
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn async_surface_resolves_eventually() {
        let globals = Rc::new(CmpGlobals::new());
        let cmp = ScriptedCmp::new(CmpGeneration::EventAsync);
        cmp.install(&globals);
        cmp.grant("svc-a");
        let bridge = bridge_for(globals);

        let answer = bridge.get_consent(&"svc-a".into());
        assert!(answer.now().is_none());
        assert!(answer.resolve().await);
        assert!(!bridge.get_consent(&"svc-b".into()).resolve().await);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn faulty_surface_reads_as_not_ready_and_not_granted() {
        for generation in [
            CmpGeneration::EventAsync,
            CmpGeneration::EventSync,
            CmpGeneration::Legacy,
        ] {
            let globals = Rc::new(CmpGlobals::new());
            let cmp = ScriptedCmp::new(generation);
            cmp.install(&globals);
            cmp.initialize();
            cmp.grant("svc-a");
            cmp.set_failing(true);
            let bridge = bridge_for(globals);
            assert!(!bridge.is_ready());
            assert!(!bridge.get_consent(&"svc-a".into()).resolve().await);
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn wait_for_ready_fires_once_when_polled_surface_initializes() {
        LocalSet::new()
            .run_until(async {
                let globals = Rc::new(CmpGlobals::new());
                let cmp = ScriptedCmp::new(CmpGeneration::EventAsync);
                cmp.install(&globals);
                let bridge = bridge_for(globals);

                let fired = Rc::new(Cell::new(0u32));
                let seen = Rc::clone(&fired);
                bridge.wait_for_ready(move || seen.set(seen.get() + 1));

                sleep(Duration::from_millis(100)).await;
                assert_eq!(fired.get(), 0);

                cmp.initialize();
                sleep(Duration::from_millis(100)).await;
                assert_eq!(fired.get(), 1);

                sleep(Duration::from_millis(100)).await;
                assert_eq!(fired.get(), 1);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn wait_for_ready_uses_legacy_init_event() {
        LocalSet::new()
            .run_until(async {
                let globals = Rc::new(CmpGlobals::new());
                let cmp = ScriptedCmp::new(CmpGeneration::Legacy);
                cmp.install(&globals);
                let bridge = bridge_for(globals);

                let fired = Rc::new(Cell::new(0u32));
                let seen = Rc::clone(&fired);
                bridge.wait_for_ready(move || seen.set(seen.get() + 1));

                cmp.initialize();
                cmp.initialize();
                assert_eq!(fired.get(), 1);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn ready_bridge_defers_callback_to_next_tick() {
        LocalSet::new()
            .run_until(async {
                let globals = Rc::new(CmpGlobals::new());
                let cmp = ScriptedCmp::new(CmpGeneration::EventSync);
                cmp.install(&globals);
                cmp.initialize();
                let bridge = bridge_for(globals);

                let fired = Rc::new(Cell::new(false));
                let seen = Rc::clone(&fired);
                bridge.wait_for_ready(move || seen.set(true));
                assert!(!fired.get());
                tokio::task::yield_now().await;
                assert!(fired.get());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn surface_installed_late_is_picked_up() {
        LocalSet::new()
            .run_until(async {
                let globals = Rc::new(CmpGlobals::new());
                let bridge = bridge_for(Rc::clone(&globals));

                let fired = Rc::new(Cell::new(false));
                let seen = Rc::clone(&fired);
                bridge.wait_for_ready(move || seen.set(true));

                let cmp = ScriptedCmp::new(CmpGeneration::Legacy);
                cmp.install(&globals);
                cmp.initialize();
                sleep(Duration::from_millis(50)).await;
                assert!(fired.get());
                assert_eq!(bridge.generation(), Some(CmpGeneration::Legacy));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn request_consent_updates_then_saves() {
        LocalSet::new()
            .run_until(async {
                let globals = Rc::new(CmpGlobals::new());
                let cmp = ScriptedCmp::new(CmpGeneration::EventAsync);
                cmp.install(&globals);
                let bridge = bridge_for(globals);

                assert!(bridge.request_consent(&"svc-a".into()).is_err());
                cmp.initialize();
                bridge.request_consent(&"svc-a".into()).unwrap();
                sleep(Duration::from_millis(10)).await;

                assert_eq!(cmp.updates().len(), 1);
                assert_eq!(cmp.save_count(), 1);
                assert!(bridge.get_consent(&"svc-a".into()).resolve().await);
            })
            .await;
    }

    #[test]
    fn request_consent_without_batch_update_only_saves() {
        let globals = Rc::new(CmpGlobals::new());
        let cmp = ScriptedCmp::new(CmpGeneration::EventSync);
        cmp.install(&globals);
        cmp.initialize();
        cmp.without_batch_update();
        let bridge = bridge_for(globals);

        bridge.request_consent(&"svc-a".into()).unwrap();
        assert!(cmp.updates().is_empty());
        assert_eq!(cmp.save_count(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn native_event_bursts_coalesce() {
        LocalSet::new()
            .run_until(async {
                let globals = Rc::new(CmpGlobals::new());
                let cmp = ScriptedCmp::new(CmpGeneration::Legacy);
                cmp.install(&globals);
                cmp.initialize();
                let bridge = bridge_for(globals);

                let passes = Rc::new(Cell::new(0u32));
                let seen = Rc::clone(&passes);
                bridge.on_consent_changed(Rc::new(move || seen.set(seen.get() + 1)));

                for _ in 0..5 {
                    cmp.emit_legacy(LegacyEvent::SaveSettings);
                }
                cmp.emit_legacy(LegacyEvent::RejectAll);
                sleep(Duration::from_millis(300)).await;
                assert_eq!(passes.get(), 1);

                cmp.emit_legacy(LegacyEvent::RejectAll);
                sleep(Duration::from_millis(300)).await;
                assert_eq!(passes.get(), 1);
            })
            .await;
    }
}
