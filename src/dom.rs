/*============================================================
  Synavera Project: UCW
  Module: ucw_core::dom
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Define the page boundary placeholders act on, and provide
    an in-memory page that records every swap.

  Security / Safety Notes:
    Markup is assembled from page-owner configuration and the
    element's own attributes; nothing from the CMP is rendered.

  Dependencies:
    serde for page fixtures.

  Operational Scope:
    `PageDom` is implemented by real page bindings; the
    `SimulatedPage` drives the binary and the tests.

  Revision History:
    2025-11-12 COD  Introduced page boundary and simulator.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Handlers invoked outside of internal borrows
    - Reversible swaps: element parked while placeholder shows
============================================================*/

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UcwError};

/// Handle of an element in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ElementId(pub usize);

/// Handle of a rendered placeholder container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ContainerId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

/// Click handler bound to a placeholder's accept button.
pub type AcceptHandler = Box<dyn Fn() -> Result<()>>;

/// Visual parts of a placeholder, ready for templating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMarkup {
    pub style: String,
    pub background: String,
    pub text_html: String,
    pub accept_label: String,
    pub accept_class: Option<String>,
}

impl PlaceholderMarkup {
    pub const CONTAINER_CLASS: &'static str = "uc-widget-container";

    /// Inner HTML of the `uc-widget-container` element.
    pub fn inner_html(&self) -> String {
        let button_class = match &self.accept_class {
            Some(extra) => format!("uc-widget-accept {extra}"),
            None => "uc-widget-accept".to_string(),
        };
        format!(
            "<img class=\"uc-widget-background\" src=\"{}\"/>\
             <div class=\"uc-widget-embedding\">\
             <div class=\"uc-widget-text\">{}</div>\
             <div class=\"uc-widget-control\"><button class=\"{}\">{}</button></div>\
             </div>",
            self.background, self.text_html, button_class, self.accept_label
        )
    }
}

/// Operations placeholders need from the host page.
pub trait PageDom {
    /// Document language (`<html lang>`), if any.
    fn language(&self) -> Option<String>;

    /// Elements carrying `name`, in document order.
    fn elements_with_attribute(&self, name: &str) -> Vec<ElementId>;

    fn tag_name(&self, element: ElementId) -> Option<String>;

    fn attribute(&self, element: ElementId, name: &str) -> Option<String>;

    /// `None` removes the attribute.
    fn set_attribute(&self, element: ElementId, name: &str, value: Option<&str>) -> Result<()>;

    /// Rendered width and height in CSS pixels.
    fn bounding_size(&self, element: ElementId) -> Result<(f64, f64)>;

    /// Swap `element` out for a placeholder container.
    fn replace_with_placeholder(
        &self,
        element: ElementId,
        markup: &PlaceholderMarkup,
    ) -> Result<ContainerId>;

    /// Put `element` back where `container` stands; the container is discarded.
    fn restore_element(&self, container: ContainerId, element: ElementId) -> Result<()>;

    fn on_accept(&self, container: ContainerId, handler: AcceptHandler) -> Result<()>;
}

/// Element description used by page fixtures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementSpec {
    pub tag: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub attributes: BTreeMap<String, String>,
}

/// Where an element currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "container", rename_all = "snake_case")]
pub enum Slot {
    InDocument,
    Placeholder(ContainerId),
}

struct SimElement {
    tag: String,
    size: (f64, f64),
    attributes: BTreeMap<String, String>,
    slot: Slot,
}

struct SimContainer {
    element: ElementId,
    markup: PlaceholderMarkup,
    handler: Option<Rc<dyn Fn() -> Result<()>>>,
}

#[derive(Default)]
struct PageState {
    lang: Option<String>,
    elements: Vec<SimElement>,
    containers: BTreeMap<ContainerId, SimContainer>,
    next_container: usize,
}

/// In-memory page.
#[derive(Default)]
pub struct SimulatedPage {
    state: RefCell<PageState>,
}

impl SimulatedPage {
    pub fn new(lang: Option<String>) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(PageState {
                lang,
                ..PageState::default()
            }),
        })
    }

    pub fn from_specs(lang: Option<String>, specs: &[ElementSpec]) -> Rc<Self> {
        let page = Self::new(lang);
        for spec in specs {
            page.add_element(spec.clone());
        }
        page
    }

    pub fn add_element(&self, spec: ElementSpec) -> ElementId {
        let mut state = self.state.borrow_mut();
        let id = ElementId(state.elements.len());
        state.elements.push(SimElement {
            tag: if spec.tag.is_empty() {
                "iframe".to_string()
            } else {
                spec.tag.to_ascii_lowercase()
            },
            size: (spec.width.unwrap_or(0.0), spec.height.unwrap_or(0.0)),
            attributes: spec.attributes,
            slot: Slot::InDocument,
        });
        id
    }

    pub fn slot(&self, element: ElementId) -> Option<Slot> {
        self.state
            .borrow()
            .elements
            .get(element.0)
            .map(|el| el.slot)
    }

    pub fn markup(&self, container: ContainerId) -> Option<PlaceholderMarkup> {
        self.state
            .borrow()
            .containers
            .get(&container)
            .map(|c| c.markup.clone())
    }

    /// Live containers whose element belongs to `service` and has a handler.
    pub fn accept_controls(&self, service_attribute: &str, service: &str) -> Vec<ContainerId> {
        let state = self.state.borrow();
        state
            .containers
            .iter()
            .filter(|(_, container)| container.handler.is_some())
            .filter(|(_, container)| {
                state.elements[container.element.0]
                    .attributes
                    .get(service_attribute)
                    .map(String::as_str)
                    == Some(service)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Click the accept button of `container`.
    pub fn click_accept(&self, container: ContainerId) -> Result<()> {
        let handler = self
            .state
            .borrow()
            .containers
            .get(&container)
            .and_then(|c| c.handler.clone())
            .ok_or_else(|| UcwError::Dom(format!("{container} has no accept control")))?;
        handler()
    }

    pub fn element_count(&self) -> usize {
        self.state.borrow().elements.len()
    }

    fn with_element<T>(
        &self,
        element: ElementId,
        f: impl FnOnce(&mut SimElement) -> T,
    ) -> Result<T> {
        let mut state = self.state.borrow_mut();
        state
            .elements
            .get_mut(element.0)
            .map(f)
            .ok_or_else(|| UcwError::Dom(format!("unknown {element}")))
    }
}

impl PageDom for SimulatedPage {
    fn language(&self) -> Option<String> {
        self.state.borrow().lang.clone()
    }

    fn elements_with_attribute(&self, name: &str) -> Vec<ElementId> {
        self.state
            .borrow()
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.slot == Slot::InDocument && el.attributes.contains_key(name))
            .map(|(idx, _)| ElementId(idx))
            .collect()
    }

    fn tag_name(&self, element: ElementId) -> Option<String> {
        self.with_element(element, |el| el.tag.clone()).ok()
    }

    fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        self.with_element(element, |el| el.attributes.get(name).cloned())
            .ok()
            .flatten()
    }

    fn set_attribute(&self, element: ElementId, name: &str, value: Option<&str>) -> Result<()> {
        self.with_element(element, |el| match value {
            Some(value) => {
                el.attributes.insert(name.to_string(), value.to_string());
            }
            None => {
                el.attributes.remove(name);
            }
        })
    }

    fn bounding_size(&self, element: ElementId) -> Result<(f64, f64)> {
        self.with_element(element, |el| el.size)
    }

    fn replace_with_placeholder(
        &self,
        element: ElementId,
        markup: &PlaceholderMarkup,
    ) -> Result<ContainerId> {
        let mut state = self.state.borrow_mut();
        let container = ContainerId(state.next_container);
        let el = state
            .elements
            .get_mut(element.0)
            .ok_or_else(|| UcwError::Dom(format!("unknown {element}")))?;
        if el.slot != Slot::InDocument {
            return Err(UcwError::Dom(format!("{element} is not attached")));
        }
        el.slot = Slot::Placeholder(container);
        state.next_container += 1;
        state.containers.insert(
            container,
            SimContainer {
                element,
                markup: markup.clone(),
                handler: None,
            },
        );
        Ok(container)
    }

    fn restore_element(&self, container: ContainerId, element: ElementId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match state.containers.get(&container) {
            Some(c) if c.element == element => {}
            Some(_) => {
                return Err(UcwError::Dom(format!(
                    "{container} does not hold {element}"
                )))
            }
            None => return Err(UcwError::Dom(format!("{container} is detached"))),
        }
        state.containers.remove(&container);
        if let Some(el) = state.elements.get_mut(element.0) {
            el.slot = Slot::InDocument;
        }
        Ok(())
    }

    fn on_accept(&self, container: ContainerId, handler: AcceptHandler) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let target = state
            .containers
            .get_mut(&container)
            .ok_or_else(|| UcwError::Dom(format!("{container} is detached")))?;
        target.handler = Some(Rc::from(handler));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iframe(service: &str) -> ElementSpec {
        ElementSpec {
            tag: "IFRAME".into(),
            width: Some(640.0),
            height: Some(360.0),
            attributes: BTreeMap::from([
                ("data-uc-id".to_string(), service.to_string()),
                ("data-src".to_string(), "https://maps.example/embed".to_string()),
            ]),
        }
    }

    fn markup() -> PlaceholderMarkup {
        PlaceholderMarkup {
            style: "width: 640px; height: 360px;".into(),
            background: "bg.png".into(),
            text_html: "We use the service Maps".into(),
            accept_label: "Accept".into(),
            accept_class: Some("btn btn-primary".into()),
        }
    }

    #[test]
    fn swap_and_restore_round_trip() {
        let page = SimulatedPage::from_specs(None, &[iframe("svc-a")]);
        let el = ElementId(0);
        assert_eq!(page.tag_name(el).as_deref(), Some("iframe"));

        let container = page.replace_with_placeholder(el, &markup()).unwrap();
        assert_eq!(page.slot(el), Some(Slot::Placeholder(container)));
        assert!(page.elements_with_attribute("data-uc-id").is_empty());
        assert!(page.replace_with_placeholder(el, &markup()).is_err());

        page.restore_element(container, el).unwrap();
        assert_eq!(page.slot(el), Some(Slot::InDocument));
        assert!(page.restore_element(container, el).is_err());
    }

    #[test]
    fn click_routes_to_handler_and_reports_missing_control() {
        let page = SimulatedPage::from_specs(None, &[iframe("svc-a")]);
        let container = page.replace_with_placeholder(ElementId(0), &markup()).unwrap();
        assert!(page.click_accept(container).is_err());

        page.on_accept(container, Box::new(|| Err(UcwError::Runtime("clicked".into()))))
            .unwrap();
        assert_eq!(page.accept_controls("data-uc-id", "svc-a"), vec![container]);
        let err = page.click_accept(container).unwrap_err();
        assert!(matches!(err, UcwError::Runtime(ref msg) if msg == "clicked"));
    }

    #[test]
    fn markup_template_carries_extra_button_class() {
        let html = markup().inner_html();
        assert!(html.contains("class=\"uc-widget-accept btn btn-primary\""));
        assert!(html.contains("<div class=\"uc-widget-text\">We use the service Maps</div>"));
        assert!(html.starts_with("<img class=\"uc-widget-background\" src=\"bg.png\"/>"));
    }
}
