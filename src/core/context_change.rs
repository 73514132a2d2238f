//! Save-into-another-context detection.
//!
//! `Idle -> SavePending` when the workfile tool is about to save a comp that
//! lives under the current work directory, back to `Idle` on the next
//! `saved` event. A `taskChanged` event seen while pending means the save
//! moved the comp into another task.
//!
//! The state is owned by the pipeline and only touched from the scripting
//! thread (the before-save hook and the dispatcher), so it carries no lock.
//! Comps saved from outside the work directory are never flagged: missing a
//! context change is preferred over prompting on an unrelated save.

use std::path::Path;

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveContextState {
    #[default]
    Idle,
    SavePending,
}

impl SaveContextState {
    /// Before-save hook. Returns true when the state became pending.
    pub fn before_save(&mut self, comp_file: Option<&Path>, workdir: Option<&Path>) -> bool {
        match (comp_file, workdir) {
            (Some(file), Some(workdir)) if is_inside(file, workdir) => {
                debug!("About to save {} inside {}", file.display(), workdir.display());
                *self = SaveContextState::SavePending;
                true
            }
            _ => false,
        }
    }

    /// The save went through.
    pub fn on_saved(&mut self) {
        *self = SaveContextState::Idle;
    }

    pub fn is_save_pending(&self) -> bool {
        *self == SaveContextState::SavePending
    }
}

/// `dir` is a strict ancestor of `path` (component-wise).
pub fn is_inside(path: &Path, dir: &Path) -> bool {
    path != dir && path.starts_with(dir)
}
