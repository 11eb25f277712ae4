/*============================================================
  Synavera Project: UCW
  Module: ucw_core::coordinator
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Drive every placeholder from pending to activated exactly
    once, whichever CMP generation is present and whenever
    consent arrives: before registration, after it, or via the
    placeholder's own accept control.

  Security / Safety Notes:
    Activation is one-way; revoking consent later never puts
    a placeholder back.

  Dependencies:
    tokio::task::spawn_local for eventual consent answers and
    the delayed post-readiness recheck.

  Operational Scope:
    One instance per page, sharing the bridge and registry it
    was built with.

  Revision History:
    2025-11-12 COD  Authored activation coordinator.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Registry borrows never span an await
    - CMP callbacks hold weak references only
    - Full rescan on every coalesced change signal
============================================================*/

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tokio::time::sleep;

use crate::bridge::{Coalescer, ConsentAnswer, ConsentBridge};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::logger::Logger;
use crate::placeholder::Placeholder;
use crate::registry::{
    run_activation, ActivationSummary, Admission, PlaceholderKey, PlaceholderRegistry, Registration,
};
use crate::service::ServiceId;

pub struct ActivationCoordinator {
    registry: RefCell<PlaceholderRegistry>,
    bridge: Rc<ConsentBridge>,
    settings: BridgeConfig,
    logger: Rc<Logger>,
    linked: Cell<bool>,
    passes: Cell<u64>,
    change_signal: RefCell<Option<Coalescer>>,
}

impl ActivationCoordinator {
    pub fn new(
        bridge: Rc<ConsentBridge>,
        registry: PlaceholderRegistry,
        settings: BridgeConfig,
        logger: Rc<Logger>,
    ) -> Rc<Self> {
        Rc::new(Self {
            registry: RefCell::new(registry),
            bridge,
            settings,
            logger,
            linked: Cell::new(false),
            passes: Cell::new(0),
            change_signal: RefCell::new(None),
        })
    }

    pub fn bridge(&self) -> &Rc<ConsentBridge> {
        &self.bridge
    }

    /// Register a rendered placeholder and check its service right away.
    pub fn register(self: &Rc<Self>, placeholder: Box<dyn Placeholder>) -> Registration {
        let id = placeholder.service_id().clone();
        let admission = self.registry.borrow_mut().admit(id.clone(), placeholder);
        match admission {
            Admission::Queued(key) => {
                self.check_service(&id);
                Registration::Pending(key)
            }
            Admission::Ready(key, placeholder) => {
                run_activation(&self.logger, &id, key, placeholder, false);
                Registration::Activated(key)
            }
        }
    }

    /// Withdraw a pending placeholder, e.g. when its element left the page.
    pub fn withdraw(&self, id: &ServiceId, key: PlaceholderKey) -> bool {
        self.registry.borrow_mut().unregister(id, key).is_some()
    }

    /// Wire readiness and change signals. Runs once; later calls are no-ops.
    pub fn link(self: &Rc<Self>) {
        if self.linked.replace(true) {
            return;
        }
        self.logger.info("LINK", "Linking CMP to placeholder registry");

        let weak = Rc::downgrade(self);
        let recheck_delay = self.settings.ready_recheck();
        self.bridge.wait_for_ready(move || {
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            coordinator.logger.info("READY", "CMP ready; checking pending services");
            coordinator.recheck_all();

            let weak = Rc::downgrade(&coordinator);
            tokio::task::spawn_local(async move {
                sleep(recheck_delay).await;
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.recheck_all();
                }
            });
        });

        let weak: Weak<Self> = Rc::downgrade(self);
        let signal = self.bridge.on_consent_changed(Rc::new(move || {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.logger.debug("CHANGE", "Consent change signal; rechecking");
                coordinator.recheck_all();
            }
        }));
        *self.change_signal.borrow_mut() = Some(signal);
    }

    /// Re-query consent for every service that still has pending placeholders.
    pub fn recheck_all(self: &Rc<Self>) {
        self.passes.set(self.passes.get() + 1);
        let services = self.registry.borrow().all_service_ids();
        self.logger.debug(
            "RECHECK",
            format!("Pass {} over {} service(s)", self.passes.get(), services.len()),
        );
        for id in services {
            self.check_service(&id);
        }
    }

    fn check_service(self: &Rc<Self>, id: &ServiceId) {
        if self.registry.borrow().is_activated(id) {
            return;
        }
        match self.bridge.get_consent(id) {
            ConsentAnswer::Immediate(true) => {
                self.logger
                    .info("CONSENT", format!("Consent present for {id}"));
                self.activate(id);
            }
            ConsentAnswer::Immediate(false) => {}
            answer @ ConsentAnswer::Eventual(_) => {
                let weak = Rc::downgrade(self);
                let id = id.clone();
                tokio::task::spawn_local(async move {
                    let granted = answer.resolve().await;
                    if let (true, Some(coordinator)) = (granted, weak.upgrade()) {
                        coordinator
                            .logger
                            .info("CONSENT", format!("Consent confirmed for {id}"));
                        coordinator.activate(&id);
                    }
                });
            }
        }
    }

    /// Placeholders run after the registry borrow is released, so they may
    /// register new placeholders while activating.
    pub fn activate(&self, id: &ServiceId) -> ActivationSummary {
        self.activate_with_origin(id, None)
    }

    fn activate_with_origin(&self, id: &ServiceId, origin: Option<PlaceholderKey>) -> ActivationSummary {
        let batch = self.registry.borrow_mut().take_batch(id, origin);
        batch.run(&self.logger)
    }

    /// Accept control of `key` was used: activate the whole service now,
    /// then record the decision upstream. `CmpNotReady` is returned after
    /// the content is already shown.
    pub fn accept(&self, id: &ServiceId, key: PlaceholderKey) -> Result<ActivationSummary> {
        self.logger
            .info("ACCEPT", format!("{key} accepted {id}"));
        let summary = self.activate_with_origin(id, Some(key));
        self.bridge.request_consent(id).map_err(|err| {
            self.logger.error("ACCEPT", err.to_string());
            err
        })?;
        Ok(summary)
    }

    pub fn is_activated(&self, id: &ServiceId) -> bool {
        self.registry.borrow().is_activated(id)
    }

    pub fn is_pending(&self, id: &ServiceId, key: PlaceholderKey) -> bool {
        self.registry.borrow().is_pending(id, key)
    }

    pub fn pending_services(&self) -> Vec<ServiceId> {
        self.registry.borrow().all_service_ids()
    }

    pub fn pending_count(&self, id: &ServiceId) -> usize {
        self.registry.borrow().pending_count(id)
    }

    pub fn activated_services(&self) -> Vec<ServiceId> {
        self.registry.borrow().activated_services()
    }

    pub fn activation_runs(&self, id: &ServiceId) -> usize {
        self.registry.borrow().activation_runs(id)
    }

    /// Full recheck passes run so far (readiness, delayed, change signals).
    pub fn recheck_passes(&self) -> u64 {
        self.passes.get()
    }

    /// Coalesced change signals delivered so far.
    pub fn change_signals(&self) -> u64 {
        self.change_signal
            .borrow()
            .as_ref()
            .map(Coalescer::fired)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::task::LocalSet;

    use super::*;
    use crate::bridge::{CmpGeneration, CmpGlobals, LegacyEvent};
    use crate::dom::{ContainerId, ElementId};
    use crate::error::UcwError;
    use crate::placeholder::PlaceholderVariant;
    use crate::registry::tests::recording;
    use crate::sim::ScriptedCmp;

    type Journal = Rc<RefCell<Vec<(&'static str, bool)>>>;

    struct Fixture {
        cmp: Rc<ScriptedCmp>,
        coordinator: Rc<ActivationCoordinator>,
        journal: Journal,
    }

    fn fixture(generation: CmpGeneration) -> Fixture {
        let globals = Rc::new(CmpGlobals::new());
        let cmp = ScriptedCmp::new(generation);
        cmp.install(&globals);
        let logger = Rc::new(Logger::stderr(false));
        let settings = BridgeConfig::default();
        let bridge = ConsentBridge::new(globals, settings.clone(), Rc::clone(&logger));
        let coordinator = ActivationCoordinator::new(
            bridge,
            PlaceholderRegistry::new(Rc::clone(&logger)),
            settings,
            logger,
        );
        Fixture {
            cmp,
            coordinator,
            journal: Rc::new(RefCell::new(Vec::new())),
        }
    }

    async fn settle() {
        sleep(Duration::from_millis(1_000)).await;
    }

    const ALL: [CmpGeneration; 3] = [
        CmpGeneration::EventAsync,
        CmpGeneration::EventSync,
        CmpGeneration::Legacy,
    ];

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn pending_placeholders_activate_when_consent_arrives() {
        for generation in ALL {
            LocalSet::new()
                .run_until(async {
                    let fx = fixture(generation);
                    let svc: ServiceId = "svc-a".into();
                    fx.coordinator.register(recording("svc-a", "p1", &fx.journal));
                    fx.coordinator.register(recording("svc-a", "p2", &fx.journal));
                    fx.coordinator.link();
                    fx.cmp.initialize();
                    settle().await;
                    assert!(!fx.coordinator.is_activated(&svc), "{generation}");

                    fx.cmp.save_settings(&["svc-a".to_string()]);
                    settle().await;
                    assert!(fx.coordinator.is_activated(&svc), "{generation}");
                    assert_eq!(fx.journal.borrow().len(), 2, "{generation}");

                    let registration = fx.coordinator.register(recording("svc-a", "p3", &fx.journal));
                    assert!(matches!(registration, Registration::Activated(_)));
                    assert!(fx.coordinator.pending_services().is_empty());
                    assert_eq!(fx.coordinator.activation_runs(&svc), 3);
                })
                .await;
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn consent_granted_before_registration_activates_on_registration() {
        for generation in ALL {
            LocalSet::new()
                .run_until(async {
                    let fx = fixture(generation);
                    fx.cmp.initialize();
                    fx.cmp.grant("svc-a");
                    fx.coordinator.register(recording("svc-a", "p1", &fx.journal));
                    if generation != CmpGeneration::EventAsync {
                        assert_eq!(fx.journal.borrow().len(), 1, "{generation}");
                    }
                    settle().await;
                    assert_eq!(*fx.journal.borrow(), vec![("p1", false)], "{generation}");
                })
                .await;
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn repeated_change_signals_never_double_activate() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture(CmpGeneration::EventAsync);
                let svc: ServiceId = "svc-a".into();
                fx.coordinator.register(recording("svc-a", "p1", &fx.journal));
                fx.coordinator.register(recording("svc-b", "q1", &fx.journal));
                fx.coordinator.link();
                fx.cmp.initialize();
                fx.cmp.grant("svc-a");

                for _ in 0..10 {
                    fx.cmp.accept_all();
                    settle().await;
                }
                assert_eq!(fx.coordinator.activation_runs(&svc), 1);
                assert_eq!(fx.coordinator.activation_runs(&"svc-b".into()), 1);
                assert_eq!(fx.journal.borrow().len(), 2);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn burst_of_native_events_runs_one_pass() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture(CmpGeneration::Legacy);
                fx.cmp.initialize();
                fx.coordinator.register(recording("svc-a", "p1", &fx.journal));
                fx.coordinator.link();
                settle().await;
                let before = fx.coordinator.recheck_passes();

                for _ in 0..5 {
                    fx.cmp.emit_legacy(LegacyEvent::SaveSettings);
                }
                settle().await;
                assert_eq!(fx.coordinator.recheck_passes(), before + 1);
                assert_eq!(fx.coordinator.change_signals(), 1);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn faulty_cmp_yields_zero_activations() {
        for generation in ALL {
            LocalSet::new()
                .run_until(async {
                    let fx = fixture(generation);
                    fx.cmp.grant("svc-a");
                    fx.cmp.initialize();
                    fx.cmp.set_failing(true);
                    fx.coordinator.register(recording("svc-a", "p1", &fx.journal));
                    fx.coordinator.link();
                    fx.cmp.save_settings(&["svc-a".to_string()]);
                    settle().await;

                    assert!(fx.journal.borrow().is_empty(), "{generation}");
                    assert_eq!(fx.coordinator.pending_services(), vec![ServiceId::from("svc-a")]);
                })
                .await;
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn accept_activates_optimistically_and_requests_consent() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture(CmpGeneration::EventAsync);
                let svc: ServiceId = "svc-a".into();
                fx.cmp.initialize();
                fx.coordinator.register(recording("svc-a", "p1", &fx.journal));
                let clicked = fx
                    .coordinator
                    .register(recording("svc-a", "p2", &fx.journal))
                    .key();
                fx.coordinator.link();
                fx.cmp.stall_details(true);

                let summary = fx.coordinator.accept(&svc, clicked).unwrap();
                assert_eq!(summary.activated, 2);
                assert_eq!(*fx.journal.borrow(), vec![("p1", false), ("p2", true)]);

                settle().await;
                assert_eq!(fx.cmp.updates().len(), 1);
                assert_eq!(fx.cmp.save_count(), 1);
                assert_eq!(fx.coordinator.activation_runs(&svc), 2);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn accept_before_ready_surfaces_error_after_activation() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture(CmpGeneration::Legacy);
                let svc: ServiceId = "svc-a".into();
                let key = fx
                    .coordinator
                    .register(recording("svc-a", "p1", &fx.journal))
                    .key();

                let err = fx.coordinator.accept(&svc, key).unwrap_err();
                assert!(matches!(err, UcwError::CmpNotReady { .. }));
                assert!(fx.coordinator.is_activated(&svc));
                assert_eq!(fx.journal.borrow().len(), 1);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn stalled_consent_query_leaves_service_pending() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture(CmpGeneration::EventAsync);
                let svc: ServiceId = "svc-a".into();
                fx.cmp.initialize();
                fx.cmp.grant("svc-a");
                fx.cmp.stall_details(true);
                fx.coordinator.register(recording("svc-a", "p1", &fx.journal));
                fx.coordinator.link();
                settle().await;
                assert!(!fx.coordinator.is_activated(&svc));

                fx.cmp.release_details();
                settle().await;
                assert!(fx.coordinator.is_activated(&svc));
                assert_eq!(fx.coordinator.activation_runs(&svc), 1);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn withdrawn_placeholder_is_not_activated() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture(CmpGeneration::EventSync);
                let svc: ServiceId = "svc-a".into();
                let gone = fx
                    .coordinator
                    .register(recording("svc-a", "gone", &fx.journal))
                    .key();
                fx.coordinator.register(recording("svc-a", "kept", &fx.journal));
                assert!(fx.coordinator.withdraw(&svc, gone));
                assert!(!fx.coordinator.is_pending(&svc, gone));

                fx.cmp.grant("svc-a");
                fx.coordinator.activate(&svc);
                assert_eq!(*fx.journal.borrow(), vec![("kept", false)]);
            })
            .await;
    }

    /// Restoring this element reveals further embeds, registered from
    /// inside `activate`.
    struct RevealsNested {
        service: ServiceId,
        coordinator: Weak<ActivationCoordinator>,
        journal: Journal,
    }

    impl Placeholder for RevealsNested {
        fn service_id(&self) -> &ServiceId {
            &self.service
        }

        fn variant(&self) -> PlaceholderVariant {
            PlaceholderVariant::Iframe
        }

        fn element(&self) -> ElementId {
            ElementId(0)
        }

        fn render(&mut self) -> crate::error::Result<ContainerId> {
            Ok(ContainerId(0))
        }

        fn activate(&mut self, from_user_action: bool) -> crate::error::Result<()> {
            self.journal.borrow_mut().push(("outer", from_user_action));
            let coordinator = self
                .coordinator
                .upgrade()
                .ok_or_else(|| UcwError::Runtime("coordinator dropped".into()))?;
            coordinator.register(recording("svc-a", "nested-same", &self.journal));
            coordinator.register(recording("svc-b", "nested-other", &self.journal));
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn placeholders_registered_during_activation_are_not_lost() {
        LocalSet::new()
            .run_until(async {
                let fx = fixture(CmpGeneration::EventSync);
                let svc: ServiceId = "svc-a".into();
                fx.cmp.initialize();
                let outer = fx
                    .coordinator
                    .register(Box::new(RevealsNested {
                        service: svc.clone(),
                        coordinator: Rc::downgrade(&fx.coordinator),
                        journal: Rc::clone(&fx.journal),
                    }))
                    .key();

                let summary = fx.coordinator.accept(&svc, outer).unwrap();
                assert_eq!(summary.activated, 1);
                assert_eq!(
                    *fx.journal.borrow(),
                    vec![("outer", true), ("nested-same", false)]
                );
                assert_eq!(fx.coordinator.activation_runs(&svc), 2);
                assert_eq!(fx.coordinator.pending_services(), vec![ServiceId::from("svc-b")]);

                fx.cmp.grant("svc-b");
                fx.coordinator.activate(&"svc-b".into());
                assert_eq!(fx.journal.borrow().last(), Some(&("nested-other", false)));
            })
            .await;
    }
}
