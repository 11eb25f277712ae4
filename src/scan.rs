/*============================================================
  Synavera Project: UCW
  Module: ucw_core::scan
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Discover deferred elements on a page, render their
    placeholders, and hand them to the coordinator with an
    accept control wired back to it.

  Security / Safety Notes:
    Elements without both `data-uc-id` and `data-src` are left
    untouched.

  Dependencies:
    PageDom boundary and placeholder factory.

  Operational Scope:
    Run once per page after the coordinator is linked.

  Revision History:
    2025-11-13 COD  Added page discovery and mounting.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Document order preserved
    - One bad element never aborts the scan
============================================================*/

use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::config::WidgetConfig;
use crate::coordinator::ActivationCoordinator;
use crate::dom::{ContainerId, ElementId, PageDom};
use crate::error::{Result, UcwError};
use crate::logger::Logger;
use crate::placeholder::{self, PlaceholderVariant, DEFERRED_SRC_ATTR, SERVICE_ID_ATTR};
use crate::registry::PlaceholderKey;
use crate::service::ServiceId;

/// One placeholder put on the page by `mount_page`.
#[derive(Debug, Clone, Serialize)]
pub struct MountedPlaceholder {
    pub element: ElementId,
    pub container: ContainerId,
    pub service: ServiceId,
    pub variant: PlaceholderVariant,
    #[serde(skip)]
    pub key: PlaceholderKey,
    /// True when consent was already known at registration.
    pub activated_on_mount: bool,
}

/// Elements carrying both `data-uc-id` and `data-src`, in document order.
pub fn discover(dom: &dyn PageDom) -> Vec<ElementId> {
    dom.elements_with_attribute(SERVICE_ID_ATTR)
        .into_iter()
        .filter(|el| dom.attribute(*el, DEFERRED_SRC_ATTR).is_some())
        .collect()
}

/// Render and register a placeholder for every deferred element.
pub fn mount_page(
    dom: Rc<dyn PageDom>,
    coordinator: &Rc<ActivationCoordinator>,
    config: &WidgetConfig,
    logger: &Logger,
) -> Vec<MountedPlaceholder> {
    let elements = discover(dom.as_ref());
    logger.info(
        "SCAN",
        format!("Found {} deferred element(s)", elements.len()),
    );

    let mut mounted = Vec::with_capacity(elements.len());
    for element in elements {
        match mount_element(Rc::clone(&dom), element, coordinator, config) {
            Ok(entry) => {
                logger.debug(
                    "SCAN",
                    format!(
                        "{} → {} ({}) for {}",
                        entry.element, entry.container, entry.variant, entry.service
                    ),
                );
                mounted.push(entry);
            }
            Err(err) => logger.warn("SCAN", format!("Skipping {element}: {err}")),
        }
    }
    mounted
}

fn mount_element(
    dom: Rc<dyn PageDom>,
    element: ElementId,
    coordinator: &Rc<ActivationCoordinator>,
    config: &WidgetConfig,
) -> Result<MountedPlaceholder> {
    let mut placeholder = placeholder::create(Rc::clone(&dom), element, config)?;
    let container = placeholder.render()?;
    let service = placeholder.service_id().clone();
    let variant = placeholder.variant();

    let key = coordinator.register(placeholder).key();
    // Consent may already be known, in which case the container is gone.
    let pending = coordinator.is_pending(&service, key);
    if pending {
        dom.on_accept(container, accept_handler(coordinator, service.clone(), key))?;
    }

    Ok(MountedPlaceholder {
        element,
        container,
        service,
        variant,
        key,
        activated_on_mount: !pending,
    })
}

fn accept_handler(
    coordinator: &Rc<ActivationCoordinator>,
    service: ServiceId,
    key: PlaceholderKey,
) -> crate::dom::AcceptHandler {
    let weak: Weak<ActivationCoordinator> = Rc::downgrade(coordinator);
    Box::new(move || {
        let coordinator = weak
            .upgrade()
            .ok_or_else(|| UcwError::Runtime("coordinator dropped".into()))?;
        coordinator.accept(&service, key).map(|_| ())
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use tokio::task::LocalSet;
    use tokio::time::sleep;

    use super::*;
    use crate::bridge::{CmpGeneration, CmpGlobals, ConsentBridge};
    use crate::config::BridgeConfig;
    use crate::dom::{ElementSpec, SimulatedPage, Slot};
    use crate::registry::PlaceholderRegistry;
    use crate::sim::ScriptedCmp;

    fn element(service: Option<&str>, src: Option<&str>) -> ElementSpec {
        let mut attributes = BTreeMap::new();
        if let Some(service) = service {
            attributes.insert(SERVICE_ID_ATTR.to_string(), service.to_string());
        }
        if let Some(src) = src {
            attributes.insert(DEFERRED_SRC_ATTR.to_string(), src.to_string());
        }
        ElementSpec {
            tag: "iframe".into(),
            width: Some(640.0),
            height: Some(360.0),
            attributes,
        }
    }

    fn engine(generation: CmpGeneration) -> (Rc<ScriptedCmp>, Rc<ActivationCoordinator>, Rc<Logger>) {
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
            Rc::clone(&logger),
        );
        (cmp, coordinator, logger)
    }

    #[test]
    fn discovery_requires_both_attributes() {
        let page = SimulatedPage::from_specs(
            None,
            &[
                element(Some("svc-a"), Some("https://a.example/embed")),
                element(Some("svc-b"), None),
                element(None, Some("https://c.example/embed")),
                element(Some("svc-d"), Some("https://d.example/embed")),
            ],
        );
        assert_eq!(discover(page.as_ref()), vec![ElementId(0), ElementId(3)]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn clicking_accept_activates_every_placeholder_of_the_service() {
        LocalSet::new()
            .run_until(async {
                let (cmp, coordinator, logger) = engine(CmpGeneration::EventSync);
                let page = SimulatedPage::from_specs(
                    Some("en".into()),
                    &[
                        element(Some("svc-a"), Some("https://a.example/one")),
                        element(Some("svc-b"), Some("https://b.example/embed")),
                        element(Some("svc-a"), Some("https://a.example/two")),
                    ],
                );
                cmp.initialize();
                let mounted = mount_page(page.clone(), &coordinator, &WidgetConfig::default(), &logger);
                coordinator.link();
                assert_eq!(mounted.len(), 3);
                assert!(mounted.iter().all(|m| !m.activated_on_mount));

                let controls = page.accept_controls(SERVICE_ID_ATTR, "svc-a");
                assert_eq!(controls.len(), 2);
                page.click_accept(controls[1]).unwrap();

                assert_eq!(page.slot(ElementId(0)), Some(Slot::InDocument));
                assert_eq!(page.slot(ElementId(2)), Some(Slot::InDocument));
                assert!(matches!(page.slot(ElementId(1)), Some(Slot::Placeholder(_))));
                assert_eq!(
                    page.attribute(ElementId(2), "src").as_deref(),
                    Some("https://a.example/two")
                );

                sleep(Duration::from_millis(1_000)).await;
                assert_eq!(cmp.save_count(), 1);
                assert_eq!(coordinator.activation_runs(&"svc-a".into()), 2);
                assert!(!coordinator.is_activated(&"svc-b".into()));
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn granted_services_mount_and_activate_at_once() {
        LocalSet::new()
            .run_until(async {
                let (cmp, coordinator, logger) = engine(CmpGeneration::Legacy);
                cmp.initialize();
                cmp.grant("svc-a");
                let page = SimulatedPage::from_specs(
                    None,
                    &[
                        element(Some("svc-a"), Some("https://a.example/one")),
                        element(Some("svc-a"), Some("https://a.example/two")),
                    ],
                );
                let mounted = mount_page(page.clone(), &coordinator, &WidgetConfig::default(), &logger);

                assert!(mounted.iter().all(|m| m.activated_on_mount));
                assert_eq!(coordinator.activation_runs(&"svc-a".into()), 2);
                assert_eq!(page.slot(ElementId(0)), Some(Slot::InDocument));
                assert_eq!(page.slot(ElementId(1)), Some(Slot::InDocument));
                assert!(page.accept_controls(SERVICE_ID_ATTR, "svc-a").is_empty());
            })
            .await;
    }
}
