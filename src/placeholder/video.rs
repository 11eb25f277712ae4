/*============================================================
  Synavera Project: UCW
  Module: ucw_core::placeholder::video
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Video placeholder: an iframe placeholder whose preview is
    the poster image served by the privacy proxy.

  Security / Safety Notes:
    The poster is fetched from the proxy, never from the video
    host, so no request reaches the provider before consent.

  Dependencies:
    url for path extraction.

  Operational Scope:
    Chosen by the factory for youtube-nocookie sources.

  Revision History:
    2025-11-12 COD  Implemented video poster variant.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Falls back to the generic preview on any parse failure
============================================================*/

use crate::dom::{ContainerId, ElementId};
use crate::error::Result;
use crate::service::ServiceId;

use super::{parse_source, IframePlaceholder, Placeholder, PlaceholderVariant, DEFERRED_SRC_ATTR};

pub const POSTER_PROXY: &str = "https://privacy-proxy-server.usercentrics.eu/video/youtube/";

pub struct VideoPlaceholder {
    inner: IframePlaceholder,
}

impl VideoPlaceholder {
    pub fn new(inner: IframePlaceholder) -> Self {
        Self { inner }
    }

    /// Proxy poster derived from the source's last path segment.
    pub fn poster(&self) -> String {
        self.inner
            .dom()
            .attribute(self.inner.element(), DEFERRED_SRC_ATTR)
            .and_then(|src| poster_url(&src))
            .unwrap_or_else(|| self.inner.default_background())
    }
}

pub fn poster_url(src: &str) -> Option<String> {
    let url = parse_source(src)?;
    let video = url.path_segments()?.last()?.to_string();
    if video.is_empty() {
        return None;
    }
    Some(format!("{POSTER_PROXY}{video}-poster-image"))
}

impl Placeholder for VideoPlaceholder {
    fn service_id(&self) -> &ServiceId {
        self.inner.service_id()
    }

    fn variant(&self) -> PlaceholderVariant {
        PlaceholderVariant::Video
    }

    fn element(&self) -> ElementId {
        self.inner.element()
    }

    fn render(&mut self) -> Result<ContainerId> {
        let poster = self.poster();
        self.inner.render_with_background(poster)
    }

    fn activate(&mut self, from_user_action: bool) -> Result<()> {
        self.inner.activate(from_user_action)
    }
}
