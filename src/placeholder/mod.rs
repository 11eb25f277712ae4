/*============================================================
  Synavera Project: UCW
  Module: ucw_core::placeholder
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    The placeholder capability: render a stand-in for deferred
    content, and swap the real element back when activated.

  Security / Safety Notes:
    The deferred source is only copied into `src` on
    activation; nothing loads while the placeholder shows.

  Dependencies:
    url for source host/path inspection.

  Operational Scope:
    Created per discovered element by `create`; owned by the
    registry until activated, then dropped.

  Revision History:
    2025-11-12 COD  Defined placeholder capability and factory.
  ------------------------------------------------------------
  SSE Principles Observed:
    - One render per placeholder
    - Variants override preview only, never activation
============================================================*/

pub mod iframe;
pub mod template;
pub mod video;

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use url::Url;

use crate::config::WidgetConfig;
use crate::dom::{ContainerId, ElementId, PageDom};
use crate::error::Result;
use crate::service::ServiceId;

pub use iframe::IframePlaceholder;
pub use video::VideoPlaceholder;

pub const SERVICE_ID_ATTR: &str = "data-uc-id";
pub const DEFERRED_SRC_ATTR: &str = "data-src";
pub const SERVICE_NAME_ATTR: &str = "data-usercentrics";
pub const TEXT_ATTR: &str = "data-text";
pub const ACCEPT_ATTR: &str = "data-accept";
pub const ACCEPT_CLASS_ATTR: &str = "data-accept-class";
pub const BACKGROUND_ATTR: &str = "data-uc-background-image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderVariant {
    Iframe,
    Video,
}

impl fmt::Display for PlaceholderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderVariant::Iframe => f.write_str("iframe"),
            PlaceholderVariant::Video => f.write_str("video"),
        }
    }
}

/// A stand-in for one deferred element.
pub trait Placeholder {
    fn service_id(&self) -> &ServiceId;

    fn variant(&self) -> PlaceholderVariant;

    /// The deferred element this placeholder stands in for.
    fn element(&self) -> ElementId;

    /// Swap the element for the placeholder container. Called once.
    fn render(&mut self) -> Result<ContainerId>;

    /// Swap the real element back and start loading it. Repeat calls are
    /// prevented by the registry, not here.
    fn activate(&mut self, from_user_action: bool) -> Result<()>;
}

/// Build the placeholder variant matching the element's deferred source.
pub fn create(
    dom: Rc<dyn PageDom>,
    element: ElementId,
    config: &WidgetConfig,
) -> Result<Box<dyn Placeholder>> {
    let source = dom.attribute(element, DEFERRED_SRC_ATTR);
    let base = IframePlaceholder::new(dom, element, config)?;
    if source.as_deref().map(is_video_source).unwrap_or(false) {
        Ok(Box::new(VideoPlaceholder::new(base)))
    } else {
        Ok(Box::new(base))
    }
}

/// Parse a deferred source; protocol-relative URLs are read as https.
pub fn parse_source(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("//") {
        Url::parse(&format!("https://{rest}")).ok()
    } else {
        Url::parse(raw).ok()
    }
}

fn is_video_source(raw: &str) -> bool {
    parse_source(raw)
        .and_then(|url| url.host_str().map(|host| host.contains(".youtube-nocookie.")))
        .unwrap_or(false)
}
