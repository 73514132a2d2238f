//! Host notifications and the canonical lifecycle events derived from them.
//!
//! Raw notifications are loosely shaped tables (`what`, `Rets`, sender).
//! They are decoded exactly once, at the dispatcher boundary, into a
//! [`HostNotification`]; consumers only ever see [`CanonicalEvent`].

use serde_json::Value;

use super::host::CompRef;
use super::keys::*;

/// A notification as delivered by the host's UI manager.
#[derive(Clone)]
pub struct RawNotification {
    /// Action identifier, e.g. `Comp_Save`
    pub what: String,
    /// Return table of the action (`{"success": true}` for saves)
    pub rets: Value,
    /// Comp the notification refers to: the sender for save/open, the newly
    /// created comp for `Comp_New`.
    pub comp: Option<CompRef>,
}

impl RawNotification {
    pub fn new(what: impl Into<String>, rets: Value) -> Self {
        Self {
            what: what.into(),
            rets,
            comp: None,
        }
    }

    pub fn with_comp(mut self, comp: CompRef) -> Self {
        self.comp = Some(comp);
        self
    }
}

impl std::fmt::Debug for RawNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawNotification")
            .field("what", &self.what)
            .field("rets", &self.rets)
            .field("comp", &self.comp.as_ref().map(|c| c.name()))
            .finish()
    }
}

/// The closed set of notification kinds the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Save,
    SaveAs,
    New,
    Opened,
    Other,
}

impl NotificationKind {
    pub fn from_action_id(what: &str) -> Self {
        match what {
            ACTION_COMP_SAVE => NotificationKind::Save,
            ACTION_COMP_SAVE_AS => NotificationKind::SaveAs,
            ACTION_COMP_NEW => NotificationKind::New,
            ACTION_COMP_OPENED => NotificationKind::Opened,
            _ => NotificationKind::Other,
        }
    }
}

/// Decoded notification: kind, the save success flag (if any) and the
/// original payload.
#[derive(Debug, Clone)]
pub struct HostNotification {
    pub kind: NotificationKind,
    pub success: Option<bool>,
    pub raw: RawNotification,
}

impl HostNotification {
    pub fn decode(raw: RawNotification) -> Self {
        let kind = NotificationKind::from_action_id(&raw.what);
        let success = raw.rets.get("success").and_then(Value::as_bool);
        Self { kind, success, raw }
    }

    /// Map to a canonical event. Cancelled saves (`success` false or
    /// missing) and unknown kinds produce nothing.
    pub fn into_canonical(self) -> Option<CanonicalEvent> {
        match self.kind {
            NotificationKind::Save | NotificationKind::SaveAs => {
                if self.success == Some(true) {
                    Some(CanonicalEvent::Saved(self.raw))
                } else {
                    None
                }
            }
            NotificationKind::New => Some(CanonicalEvent::Created(self.raw)),
            NotificationKind::Opened => Some(CanonicalEvent::Opened(self.raw)),
            NotificationKind::Other => None,
        }
    }
}

/// Context the workfile tool switched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskChange {
    pub folder_path: String,
    pub task_name: String,
}

/// Normalized lifecycle signal.
#[derive(Debug, Clone)]
pub enum CanonicalEvent {
    Opened(RawNotification),
    Saved(RawNotification),
    Created(RawNotification),
    TaskChanged(TaskChange),
}

impl CanonicalEvent {
    /// Event topic name as used by the pipeline's callback registry.
    pub fn topic(&self) -> &'static str {
        match self {
            CanonicalEvent::Opened(_) => "open",
            CanonicalEvent::Saved(_) => "save",
            CanonicalEvent::Created(_) => "new",
            CanonicalEvent::TaskChanged(_) => "taskChanged",
        }
    }

    /// Comp carried by the originating notification.
    pub fn comp(&self) -> Option<&CompRef> {
        match self {
            CanonicalEvent::Opened(raw)
            | CanonicalEvent::Saved(raw)
            | CanonicalEvent::Created(raw) => raw.comp.as_ref(),
            CanonicalEvent::TaskChanged(_) => None,
        }
    }
}
