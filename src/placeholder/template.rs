/*============================================================
  Synavera Project: UCW
  Module: ucw_core::placeholder::template
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Resolve placeholder text, accept label, button class, and
    container size from element attributes, page config, and
    built-in defaults.

  Security / Safety Notes:
    Text is page-owner HTML and is passed through verbatim.

  Dependencies:
    None beyond crate config.

  Operational Scope:
    Called once per placeholder before rendering.

  Revision History:
    2025-11-12 COD  Added placeholder text resolution.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Element beats language config beats root config
============================================================*/

use crate::config::{language_code, TextOverrides, WidgetConfig};

/// Transparent 1x1 GIF shown when no preview image is known.
pub const TRANSPARENT_PIXEL: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAP///wAAACH5BAEAAAAALAAAAAABAAEAAAICRAEAOw==";

const FALLBACK_STYLE: &str = "width: 100%; height: 250px;";

struct Defaults {
    prefix: &'static str,
    suffix: &'static str,
    accept: &'static str,
}

const EN: Defaults = Defaults {
    prefix: "We use the service ",
    suffix: " to embed content. This service may collect data about your activities. \
             Agree to use the Service to view this content.",
    accept: "Accept",
};

const DE: Defaults = Defaults {
    prefix: "Wir nutzen den Service ",
    suffix: " um Inhalte einzubetten. Dieser Service kann Daten zu Ihren Aktivitäten sammeln. \
             Stimmen Sie der Nutzung des Service zu, um diese Inhalte anzuzeigen.",
    accept: "Akzeptieren",
};

/// Per-element overrides read from `data-*` attributes.
#[derive(Debug, Clone, Default)]
pub struct ElementOverrides {
    pub text: Option<String>,
    pub accept: Option<String>,
    pub accept_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderText {
    pub text_html: String,
    pub accept_label: String,
    pub accept_class: Option<String>,
}

pub fn resolve_text(
    element: &ElementOverrides,
    service_name: &str,
    lang: Option<&str>,
    config: &WidgetConfig,
) -> PlaceholderText {
    let code = lang.map(language_code).unwrap_or_default();
    let defaults = if code == "de" { &DE } else { &EN };
    let localized = config.for_language(&code);
    let root = &config.defaults;
    let pick = |field: fn(&TextOverrides) -> &Option<String>| -> Option<String> {
        localized
            .and_then(|block| non_empty(field(block)))
            .or_else(|| non_empty(field(root)))
    };

    let text_html = non_empty(&element.text)
        .or_else(|| pick(|o| &o.text_html))
        .unwrap_or_else(|| {
            let prefix = pick(|o| &o.text_service_prefix).unwrap_or_else(|| defaults.prefix.into());
            let suffix = pick(|o| &o.text_suffix_html).unwrap_or_else(|| defaults.suffix.into());
            format!("{prefix}{service_name}{suffix}")
        });

    PlaceholderText {
        text_html,
        accept_label: non_empty(&element.accept)
            .or_else(|| pick(|o| &o.accept_label))
            .unwrap_or_else(|| defaults.accept.into()),
        accept_class: non_empty(&element.accept_class).or_else(|| pick(|o| &o.accept_label_class)),
    }
}

/// Container size: explicit attributes (bare numbers get `px`), else the
/// element's rendered box. A zero dimension falls back to a fixed box.
pub fn size_style(width: Option<&str>, height: Option<&str>, bounding: (f64, f64)) -> String {
    let width = dimension(width, bounding.0);
    let height = dimension(height, bounding.1);
    if width == "0px" || height == "0px" {
        FALLBACK_STYLE.to_string()
    } else {
        format!("width: {width}; height: {height};")
    }
}

fn dimension(attribute: Option<&str>, fallback: f64) -> String {
    match attribute.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) if raw.parse::<f64>().map(f64::is_finite).unwrap_or(false) => {
            format!("{raw}px")
        }
        Some(raw) => raw.to_string(),
        None => format!("{fallback}px"),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}
