//! Scoped comp edits: lock + undo chunk, and frame range preservation.
//!
//! Both guards restore host state in `Drop`, so every exit path (normal
//! return, `?`, panic unwinding) releases the lock and closes the undo
//! boundary. Nesting is not used by this crate.

use log::trace;

use crate::entities::keys::*;
use crate::entities::{Attrs, Comp};

/// Default undo chunk name used by script edits.
pub const DEFAULT_UNDO_NAME: &str = "Script CMD";

/// Active lock + undo chunk on a comp. Released on drop.
#[must_use = "the comp is unlocked as soon as the guard is dropped"]
pub struct UndoChunk<'a> {
    comp: &'a dyn Comp,
    keep_undo: bool,
}

/// Lock `comp` and open an undo chunk named `name`.
///
/// With `keep_undo == false` the chunk is removed from the undo history
/// when closed (used for reads that temporarily edit inputs).
pub fn lock_and_undo_chunk<'a>(comp: &'a dyn Comp, name: &str, keep_undo: bool) -> UndoChunk<'a> {
    trace!("Lock comp '{}' and start undo '{}'", comp.name(), name);
    comp.lock();
    comp.start_undo(name);
    UndoChunk { comp, keep_undo }
}

impl Drop for UndoChunk<'_> {
    fn drop(&mut self) {
        self.comp.unlock();
        self.comp.end_undo(self.keep_undo);
        trace!("Unlocked comp '{}' (keep undo: {})", self.comp.name(), self.keep_undo);
    }
}

/// Run `f` inside a lock + undo chunk.
pub fn with_undo_chunk<R>(
    comp: &dyn Comp,
    name: &str,
    keep_undo: bool,
    f: impl FnOnce() -> R,
) -> R {
    let _chunk = lock_and_undo_chunk(comp, name, keep_undo);
    f()
}

/// Snapshot of the comp's global and render range, restored on drop.
#[must_use = "the frame range is restored as soon as the guard is dropped"]
pub struct MaintainedCompRange<'a> {
    comp: &'a dyn Comp,
    preserved: Attrs,
}

/// Preserve the comp frame ranges for the lifetime of the guard.
pub fn maintained_comp_range(comp: &dyn Comp) -> MaintainedCompRange<'_> {
    let attrs = comp.get_attrs();
    let preserved = [COMPN_GLOBAL_START, COMPN_GLOBAL_END, COMPN_RENDER_START, COMPN_RENDER_END]
        .into_iter()
        .filter_map(|key| attrs.get(key).map(|v| (key.to_string(), v.clone())))
        .collect();
    MaintainedCompRange { comp, preserved }
}

impl Drop for MaintainedCompRange<'_> {
    fn drop(&mut self) {
        if !self.preserved.is_empty() {
            self.comp.set_attrs(&self.preserved);
        }
    }
}
