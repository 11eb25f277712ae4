/*============================================================
  Synavera Project: UCW
  Module: ucw_core::placeholder::iframe
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Generic placeholder for deferred iframes and scripts.

  Security / Safety Notes:
    `data-src` is cleared when the real `src` is set so the
    source is not picked up twice.

  Dependencies:
    PageDom boundary only.

  Operational Scope:
    Default variant; the video variant wraps it.

  Revision History:
    2025-11-12 COD  Implemented iframe placeholder.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Reversible DOM swap
============================================================*/

use std::rc::Rc;

use crate::config::WidgetConfig;
use crate::dom::{ContainerId, ElementId, PageDom, PlaceholderMarkup};
use crate::error::{Result, UcwError};
use crate::service::ServiceId;

use super::template::{resolve_text, size_style, ElementOverrides, PlaceholderText, TRANSPARENT_PIXEL};
use super::{
    Placeholder, PlaceholderVariant, ACCEPT_ATTR, ACCEPT_CLASS_ATTR, BACKGROUND_ATTR,
    DEFERRED_SRC_ATTR, SERVICE_ID_ATTR, SERVICE_NAME_ATTR, TEXT_ATTR,
};

pub struct IframePlaceholder {
    dom: Rc<dyn PageDom>,
    element: ElementId,
    service: ServiceId,
    text: PlaceholderText,
    container: Option<ContainerId>,
}

impl IframePlaceholder {
    pub fn new(dom: Rc<dyn PageDom>, element: ElementId, config: &WidgetConfig) -> Result<Self> {
        let service = dom
            .attribute(element, SERVICE_ID_ATTR)
            .filter(|id| !id.trim().is_empty())
            .map(ServiceId::new)
            .ok_or_else(|| UcwError::Dom(format!("{element} has no {SERVICE_ID_ATTR}")))?;
        let overrides = ElementOverrides {
            text: dom.attribute(element, TEXT_ATTR),
            accept: dom.attribute(element, ACCEPT_ATTR),
            accept_class: dom.attribute(element, ACCEPT_CLASS_ATTR),
        };
        let name = dom
            .attribute(element, SERVICE_NAME_ATTR)
            .unwrap_or_else(|| service.to_string());
        let text = resolve_text(&overrides, &name, dom.language().as_deref(), config);

        Ok(Self {
            dom,
            element,
            service,
            text,
            container: None,
        })
    }

    pub fn dom(&self) -> &Rc<dyn PageDom> {
        &self.dom
    }

    pub fn container(&self) -> Option<ContainerId> {
        self.container
    }

    /// `data-uc-background-image`, else a transparent pixel.
    pub fn default_background(&self) -> String {
        self.dom
            .attribute(self.element, BACKGROUND_ATTR)
            .unwrap_or_else(|| TRANSPARENT_PIXEL.to_string())
    }

    pub(crate) fn render_with_background(&mut self, background: String) -> Result<ContainerId> {
        if let Some(container) = self.container {
            return Err(UcwError::Dom(format!(
                "{} already rendered as {container}",
                self.element
            )));
        }
        let (width, height) = self.dom.bounding_size(self.element)?;
        let markup = PlaceholderMarkup {
            style: size_style(
                self.dom.attribute(self.element, "width").as_deref(),
                self.dom.attribute(self.element, "height").as_deref(),
                (width, height),
            ),
            background,
            text_html: self.text.text_html.clone(),
            accept_label: self.text.accept_label.clone(),
            accept_class: self.text.accept_class.clone(),
        };
        let container = self.dom.replace_with_placeholder(self.element, &markup)?;
        self.container = Some(container);
        Ok(container)
    }
}

impl Placeholder for IframePlaceholder {
    fn service_id(&self) -> &ServiceId {
        &self.service
    }

    fn variant(&self) -> PlaceholderVariant {
        PlaceholderVariant::Iframe
    }

    fn element(&self) -> ElementId {
        self.element
    }

    fn render(&mut self) -> Result<ContainerId> {
        let background = self.default_background();
        self.render_with_background(background)
    }

    fn activate(&mut self, _from_user_action: bool) -> Result<()> {
        let container = self
            .container
            .take()
            .ok_or_else(|| UcwError::PlaceholderActivation {
                service: self.service.to_string(),
                reason: format!("{} was never rendered", self.element),
            })?;
        let source = self.dom.attribute(self.element, DEFERRED_SRC_ATTR);
        self.dom.restore_element(container, self.element)?;
        if let Some(source) = source {
            self.dom.set_attribute(self.element, DEFERRED_SRC_ATTR, None)?;
            self.dom.set_attribute(self.element, "src", Some(&source))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dom::{SimulatedPage, Slot};

    fn page() -> Rc<SimulatedPage> {
        SimulatedPage::from_specs(
            Some("en".into()),
            &[crate::dom::ElementSpec {
                tag: "iframe".into(),
                width: Some(800.0),
                height: Some(450.0),
                attributes: BTreeMap::from([
                    (SERVICE_ID_ATTR.to_string(), "svc-maps".to_string()),
                    (SERVICE_NAME_ATTR.to_string(), "Google Maps".to_string()),
                    (DEFERRED_SRC_ATTR.to_string(), "https://maps.example/embed".to_string()),
                    ("height".to_string(), "450".to_string()),
                ]),
            }],
        )
    }

    #[test]
    fn render_then_activate_restores_and_loads() {
        let page = page();
        let mut placeholder =
            IframePlaceholder::new(page.clone(), ElementId(0), &WidgetConfig::default()).unwrap();

        let container = placeholder.render().unwrap();
        let markup = page.markup(container).unwrap();
        assert_eq!(markup.style, "width: 800px; height: 450px;");
        assert_eq!(markup.background, TRANSPARENT_PIXEL);
        assert!(markup.text_html.contains("Google Maps"));
        assert!(page.attribute(ElementId(0), "src").is_none());

        placeholder.activate(false).unwrap();
        assert_eq!(page.slot(ElementId(0)), Some(Slot::InDocument));
        assert_eq!(
            page.attribute(ElementId(0), "src").as_deref(),
            Some("https://maps.example/embed")
        );
        assert!(page.attribute(ElementId(0), DEFERRED_SRC_ATTR).is_none());
    }

    #[test]
    fn second_render_and_unrendered_activation_fail() {
        let page = page();
        let mut placeholder =
            IframePlaceholder::new(page.clone(), ElementId(0), &WidgetConfig::default()).unwrap();
        assert!(matches!(
            placeholder.activate(true),
            Err(UcwError::PlaceholderActivation { .. })
        ));
        placeholder.render().unwrap();
        assert!(placeholder.render().is_err());
    }

    #[test]
    fn missing_service_id_is_rejected() {
        let page = SimulatedPage::from_specs(None, &[crate::dom::ElementSpec::default()]);
        assert!(IframePlaceholder::new(page, ElementId(0), &WidgetConfig::default()).is_err());
    }
}
