//! Capability traits over the host application's scripting bridge.
//!
//! The bridge itself (node graph, attribute get/set, undo stack) is owned by
//! Fusion; this crate only talks to it through these traits so every
//! component above can be exercised against in-memory fakes.
//!
//! All implementations must be `Send + Sync`: the poller thread holds a
//! [`NotificationSource`] and raw notifications carry a [`CompRef`] across
//! the channel back to the owning thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::attrs::{AttrValue, Attrs};
use super::events::RawNotification;
use super::keys::*;

pub type CompRef = Arc<dyn Comp>;
pub type ToolRef = Arc<dyn Tool>;

/// Host bridge errors
#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    /// The scripting bridge is not connected (host not initialised yet)
    NotConnected,
    /// A node of the requested type could not be created
    ToolCreateFailed(String),
    /// The host refused or failed a file operation
    File(String),
    /// Any other call that the host rejected
    Call(String),
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::NotConnected => write!(f, "Fusion scripting bridge not connected"),
            HostError::ToolCreateFailed(t) => write!(f, "Failed to create tool: {}", t),
            HostError::File(e) => write!(f, "Host file operation failed: {}", e),
            HostError::Call(e) => write!(f, "Host call failed: {}", e),
        }
    }
}

impl std::error::Error for HostError {}

/// The running Fusion application.
pub trait FusionApp: Send + Sync {
    /// Currently active comp, `None` when no comp is open or the host is
    /// not initialised. Never fails loudly.
    fn current_comp(&self) -> Option<CompRef>;

    /// Open a comp file and make it current.
    fn load_comp(&self, path: &Path) -> Result<CompRef, HostError>;

    /// Register interest in one notification kind (`AddNotify`). Must be
    /// called once per kind before the poller can observe it.
    fn add_notify(&self, action_id: &str) -> Result<(), HostError>;

    /// Handle to the host's notification queue, `None` when the UI manager
    /// cannot be found.
    fn notification_source(&self) -> Option<Arc<dyn NotificationSource>>;

    /// Write a line to the host console.
    fn print(&self, message: &str);
}

/// Non-blocking access to the host's queued notifications.
pub trait NotificationSource: Send + Sync {
    /// Next queued notification or `None` when the queue is empty.
    fn next_notification(&self) -> Option<RawNotification>;
}

/// The single open document (session).
pub trait Comp: Send + Sync {
    /// Display name of the comp (for logs)
    fn name(&self) -> String;

    fn get_attrs(&self) -> Attrs;
    fn set_attrs(&self, attrs: &Attrs);

    /// Preferences below `prefix` with the prefix stripped, e.g.
    /// `get_prefs("Comp.FrameFormat")` yields `Rate`, `Width`, ...
    fn get_prefs(&self, prefix: &str) -> Attrs;
    /// Batched preference write with fully qualified keys.
    fn set_prefs(&self, prefs: &Attrs);

    /// Exclusive edit lock
    fn lock(&self);
    fn unlock(&self);
    /// Open a named undo boundary
    fn start_undo(&self, name: &str);
    /// Close the current undo boundary; `keep == false` discards it from
    /// the undo history.
    fn end_undo(&self, keep: bool);

    /// All nodes in host enumeration order, optionally only the selected
    /// ones and optionally filtered by tool type.
    fn tools(&self, selected_only: bool, tool_type: Option<&str>) -> Vec<ToolRef>;
    fn add_tool(&self, tool_type: &str) -> Result<ToolRef, HostError>;

    /// Comp-level metadata (same protocol as [`Tool::get_data`]).
    fn get_data(&self, key: &str) -> Option<AttrValue>;
    fn set_data(&self, key: &str, value: AttrValue);

    /// Resolve path maps (`Comp:/...`) to an absolute path.
    fn map_path(&self, path: &str) -> String;
    /// Convert an absolute path to a path-mapped one where possible.
    fn reverse_map_path(&self, path: &str) -> String;

    /// Save to `path`, or in place when `None`.
    fn save(&self, path: Option<&Path>) -> Result<(), HostError>;
    /// Paste serialized tool settings into the flow.
    fn paste(&self, contents: &str) -> Result<(), HostError>;

    fn app_version(&self) -> String;

    /// Current file path, `None` when the comp was never saved.
    fn file_name(&self) -> Option<PathBuf> {
        self.get_attrs()
            .get_str(COMPS_FILE_NAME)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }

    fn is_modified(&self) -> bool {
        self.get_attrs().get_bool_or(COMPB_MODIFIED, false)
    }

    fn frame_format(&self) -> FrameFormat {
        FrameFormat::from_prefs(&self.get_prefs(PREFS_FRAME_FORMAT))
    }
}

/// An addressable node inside a comp.
///
/// Metadata protocol: `set_data("ns.key", v)` writes one entry;
/// `get_data("ns.key")` reads it back; `get_data("ns")` returns the whole
/// namespace bag as an [`AttrValue::Map`] (or `None` when empty).
pub trait Tool: Send + Sync {
    fn name(&self) -> String;
    /// Tool type id, e.g. `Saver` or `Loader`
    fn tool_type(&self) -> String;

    fn get_attrs(&self) -> Attrs;
    fn set_attrs(&self, attrs: &Attrs);

    fn get_data(&self, key: &str) -> Option<AttrValue>;
    fn set_data(&self, key: &str, value: AttrValue);

    /// Evaluated input value at `frame` (`None` = time undefined).
    fn input(&self, input: &str, frame: Option<i64>) -> Option<AttrValue>;
    fn set_input(&self, input: &str, frame: Option<i64>, value: AttrValue);

    /// Expression attached to an input, if any.
    fn expression(&self, input: &str) -> Option<String>;
    fn set_expression(&self, input: &str, expression: Option<&str>);

    /// Apply a `.setting` file to this tool.
    fn load_settings(&self, path: &Path) -> Result<(), HostError>;

    fn delete(&self);
}

/// Typed view over the `Comp.FrameFormat` preferences.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameFormat {
    pub rate: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub aspect_x: Option<f64>,
    pub aspect_y: Option<f64>,
}

impl FrameFormat {
    pub fn from_prefs(prefs: &Attrs) -> Self {
        Self {
            rate: prefs.get_f64(PREF_RATE),
            width: prefs.get_i64(PREF_WIDTH),
            height: prefs.get_i64(PREF_HEIGHT),
            aspect_x: prefs.get_f64(PREF_ASPECT_X),
            aspect_y: prefs.get_f64(PREF_ASPECT_Y),
        }
    }

    /// aspectX / aspectY, 1.0 when either is missing or Y is zero.
    pub fn pixel_aspect(&self) -> f64 {
        match (self.aspect_x, self.aspect_y) {
            (Some(x), Some(y)) if y != 0.0 => x / y,
            _ => 1.0,
        }
    }
}
