/*============================================================
  Synavera Project: UCW
  Module: ucw_core::bridge::surface
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Describe the page-level CMP handles the bridge can find:
    the event-driven `__ucCmp` surface (async and synchronous
    flavours) and the legacy `UC_UI` window API.

  Security / Safety Notes:
    Every method may fail; implementations report faults as
    `CmpFault` values instead of panicking.

  Dependencies:
    tokio::sync::oneshot for eventual answers.

  Operational Scope:
    Implemented by real page bindings and by the scripted
    surfaces in `sim`; detected once by `ConsentBridge`.

  Revision History:
    2025-11-12 COD  Captured CMP surface contracts.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Narrow traits at the third-party boundary
    - Fallible by default
============================================================*/

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tokio::sync::oneshot;

use crate::error::CmpFault;
use crate::service::{ConsentDetails, ServiceBaseInfo, ServiceConsentUpdate, ServiceId};

/// An answer the CMP delivers later, exactly once.
pub type Deferred<T> = oneshot::Receiver<Result<T, CmpFault>>;

/// Listener for `__ucCmp` events.
pub type CmpListener = Rc<dyn Fn(&CmpEvent)>;

/// Listener for legacy `UC_UI_*` window events.
pub type LegacyListener = Rc<dyn Fn(&LegacyEvent)>;

/// Named events of the event-driven surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpEventKind {
    ConsentChanged,
    ConsentSaved,
    UiChanged,
}

impl CmpEventKind {
    pub const ALL: [CmpEventKind; 3] = [
        CmpEventKind::ConsentChanged,
        CmpEventKind::ConsentSaved,
        CmpEventKind::UiChanged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CmpEventKind::ConsentChanged => "consentChanged",
            CmpEventKind::ConsentSaved => "consentSaved",
            CmpEventKind::UiChanged => "uiChanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmpEvent {
    ConsentChanged,
    ConsentSaved,
    UiChanged { action: Option<String> },
}

impl CmpEvent {
    pub fn kind(&self) -> CmpEventKind {
        match self {
            CmpEvent::ConsentChanged => CmpEventKind::ConsentChanged,
            CmpEvent::ConsentSaved => CmpEventKind::ConsentSaved,
            CmpEvent::UiChanged { .. } => CmpEventKind::UiChanged,
        }
    }

    /// Whether this event may have changed a consent decision.
    pub fn signals_recheck(&self) -> bool {
        match self {
            CmpEvent::ConsentChanged | CmpEvent::ConsentSaved => true,
            CmpEvent::UiChanged { action } => action.as_deref() == Some("acceptAll"),
        }
    }
}

/// Dialog views reported by `UC_UI_VIEW_CHANGED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogView {
    None,
    PrivacyButton,
    FirstLayer,
    SecondLayer,
    Other(String),
}

impl DialogView {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "NONE" => DialogView::None,
            "PRIVACY_BUTTON" => DialogView::PrivacyButton,
            "FIRST_LAYER" => DialogView::FirstLayer,
            "SECOND_LAYER" => DialogView::SecondLayer,
            other => DialogView::Other(other.to_string()),
        }
    }

    /// True for views in which the consent dialog is open.
    pub fn is_dialog(&self) -> bool {
        !matches!(self, DialogView::None | DialogView::PrivacyButton)
    }
}

impl fmt::Display for DialogView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogView::None => f.write_str("NONE"),
            DialogView::PrivacyButton => f.write_str("PRIVACY_BUTTON"),
            DialogView::FirstLayer => f.write_str("FIRST_LAYER"),
            DialogView::SecondLayer => f.write_str("SECOND_LAYER"),
            DialogView::Other(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyEventKind {
    Initialized,
    ViewChanged,
    AcceptAll,
    SaveSettings,
    RejectAll,
}

impl LegacyEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LegacyEventKind::Initialized => "UC_UI_INITIALIZED",
            LegacyEventKind::ViewChanged => "UC_UI_VIEW_CHANGED",
            LegacyEventKind::AcceptAll => "UC_UI_ACCEPT_ALL",
            LegacyEventKind::SaveSettings => "UC_UI_SAVE_SETTINGS",
            LegacyEventKind::RejectAll => "UC_UI_REJECT_ALL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyEvent {
    Initialized,
    ViewChanged {
        previous_view: Option<DialogView>,
        view: Option<DialogView>,
    },
    AcceptAll,
    SaveSettings,
    RejectAll,
}

impl LegacyEvent {
    pub fn kind(&self) -> LegacyEventKind {
        match self {
            LegacyEvent::Initialized => LegacyEventKind::Initialized,
            LegacyEvent::ViewChanged { .. } => LegacyEventKind::ViewChanged,
            LegacyEvent::AcceptAll => LegacyEventKind::AcceptAll,
            LegacyEvent::SaveSettings => LegacyEventKind::SaveSettings,
            LegacyEvent::RejectAll => LegacyEventKind::RejectAll,
        }
    }

    /// Whether this event may have granted consent. A view change counts
    /// only when the dialog was open before it.
    pub fn signals_recheck(&self) -> bool {
        match self {
            LegacyEvent::ViewChanged { previous_view, .. } => previous_view
                .as_ref()
                .map(DialogView::is_dialog)
                .unwrap_or(true),
            LegacyEvent::AcceptAll | LegacyEvent::SaveSettings => true,
            LegacyEvent::Initialized | LegacyEvent::RejectAll => false,
        }
    }
}

/// Behaviour shared by both flavours of the `__ucCmp` surface.
pub trait EventCmp {
    fn is_initialized(&self) -> Result<bool, CmpFault>;

    /// Batched consent update; `CmpFault::Unsupported` when absent.
    fn update_services_consents(
        &self,
        updates: Vec<ServiceConsentUpdate>,
    ) -> Result<Deferred<()>, CmpFault>;

    fn save_consents(&self) -> Result<(), CmpFault>;

    fn add_event_listener(&self, kind: CmpEventKind, listener: CmpListener)
        -> Result<(), CmpFault>;
}

/// Newest generation: consent details arrive asynchronously.
pub trait AsyncEventCmp: EventCmp {
    fn consent_details(&self) -> Result<Deferred<Option<ConsentDetails>>, CmpFault>;
}

/// Polyfilled generation: consent details are answered in place.
pub trait SyncEventCmp: EventCmp {
    fn consent_details(&self) -> Result<Option<ConsentDetails>, CmpFault>;
}

/// Legacy `UC_UI` API with window-level events.
pub trait LegacyCmp {
    fn is_initialized(&self) -> Result<bool, CmpFault>;

    fn services_base_info(&self) -> Result<Vec<ServiceBaseInfo>, CmpFault>;

    fn accept_service(&self, id: &ServiceId) -> Result<(), CmpFault>;

    fn add_window_listener(&self, kind: LegacyEventKind, listener: LegacyListener);
}

/// Access to the known global CMP handles.
pub trait CmpHandles {
    fn uc_cmp(&self) -> Option<Rc<dyn AsyncEventCmp>>;
    fn uc_cmp_sync(&self) -> Option<Rc<dyn SyncEventCmp>>;
    fn uc_ui(&self) -> Option<Rc<dyn LegacyCmp>>;
}

/// Settable global slots; a CMP script may install itself after start.
#[derive(Default)]
pub struct CmpGlobals {
    uc_cmp: RefCell<Option<Rc<dyn AsyncEventCmp>>>,
    uc_cmp_sync: RefCell<Option<Rc<dyn SyncEventCmp>>>,
    uc_ui: RefCell<Option<Rc<dyn LegacyCmp>>>,
}

impl CmpGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_uc_cmp(&self, cmp: Rc<dyn AsyncEventCmp>) {
        *self.uc_cmp.borrow_mut() = Some(cmp);
    }

    pub fn install_uc_cmp_sync(&self, cmp: Rc<dyn SyncEventCmp>) {
        *self.uc_cmp_sync.borrow_mut() = Some(cmp);
    }

    pub fn install_uc_ui(&self, cmp: Rc<dyn LegacyCmp>) {
        *self.uc_ui.borrow_mut() = Some(cmp);
    }
}

impl CmpHandles for CmpGlobals {
    fn uc_cmp(&self) -> Option<Rc<dyn AsyncEventCmp>> {
        self.uc_cmp.borrow().clone()
    }

    fn uc_cmp_sync(&self) -> Option<Rc<dyn SyncEventCmp>> {
        self.uc_cmp_sync.borrow().clone()
    }

    fn uc_ui(&self) -> Option<Rc<dyn LegacyCmp>> {
        self.uc_ui.borrow().clone()
    }
}
