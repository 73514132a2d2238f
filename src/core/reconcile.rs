//! Reconciliation engine: comp configuration vs. task attributes.
//!
//! State-free; every call reads the comp and the task context afresh.
//! Frame range is applied on request but never validated, only frame rate,
//! resolution and pixel aspect are compared.

use log::{info, warn};

use super::undo::{DEFAULT_UNDO_NAME, lock_and_undo_chunk};
use crate::entities::keys::*;
use crate::entities::{
    AttrValue, Attrs, Comp, CompRef, CreateError, CreationContext, Prompter, RepairRequest,
    ResetOptions, TaskContext, TaskEntity,
};

/// Frame rate assumed when the task has none.
pub const DEFAULT_FPS: f64 = 24.0;

pub const REPAIR_TITLE: &str = "Fusion comp has invalid configuration";

/// Set the comp's global range to the range with handles, and optionally
/// its render range to the range without.
///
/// Missing handles count as zero. Runs inside a lock + undo chunk.
pub fn update_frame_range(
    comp: &dyn Comp,
    start: i64,
    end: i64,
    handle_start: Option<i64>,
    handle_end: Option<i64>,
    set_render_range: bool,
) {
    let handle_start = handle_start.unwrap_or(0);
    let handle_end = handle_end.unwrap_or(0);

    let mut attrs = Attrs::new()
        .with(COMPN_GLOBAL_START, start - handle_start)
        .with(COMPN_GLOBAL_END, end + handle_end);
    if set_render_range {
        attrs.set(COMPN_RENDER_START, start);
        attrs.set(COMPN_RENDER_END, end);
    }

    let _chunk = lock_and_undo_chunk(comp, DEFAULT_UNDO_NAME, true);
    comp.set_attrs(&attrs);
}

pub fn set_frame_rate(comp: &dyn Comp, fps: f64) {
    comp.set_prefs(&Attrs::new().with(frame_format_key(PREF_RATE), fps));
}

pub fn set_resolution(comp: &dyn Comp, width: i64, height: i64) {
    comp.set_prefs(
        &Attrs::new()
            .with(frame_format_key(PREF_WIDTH), width)
            .with(frame_format_key(PREF_HEIGHT), height),
    );
}

pub fn set_current_context_framerange(comp: &dyn Comp, task: &TaskEntity) {
    let a = &task.attributes;
    update_frame_range(comp, a.frame_start, a.frame_end, a.handle_start, a.handle_end, true);
}

pub fn set_current_context_fps(comp: &dyn Comp, task: &TaskEntity) {
    set_frame_rate(comp, task.attributes.fps.unwrap_or(DEFAULT_FPS));
}

pub fn set_current_context_resolution(comp: &dyn Comp, task: &TaskEntity) {
    let a = &task.attributes;
    info!("Setting comp frame format resolution to {}x{}", a.resolution_width, a.resolution_height);
    set_resolution(comp, a.resolution_width, a.resolution_height);
}

/// One validated frame format preference.
struct PrefCheck {
    pref: &'static str,
    label: &'static str,
    expected: AttrValue,
}

/// The five checked preferences with the task's expected values. Pixel
/// aspect Y is pinned to 1.0, X carries the task's aspect ratio.
fn pref_checks(task: &TaskEntity) -> [PrefCheck; 5] {
    let a = &task.attributes;
    [
        PrefCheck {
            pref: PREF_RATE,
            label: "FPS",
            expected: a.fps.unwrap_or(DEFAULT_FPS).into(),
        },
        PrefCheck {
            pref: PREF_WIDTH,
            label: "Resolution Width",
            expected: a.resolution_width.into(),
        },
        PrefCheck {
            pref: PREF_HEIGHT,
            label: "Resolution Height",
            expected: a.resolution_height.into(),
        },
        PrefCheck {
            pref: PREF_ASPECT_X,
            label: "Pixel Aspect Ratio X",
            expected: a.pixel_aspect.into(),
        },
        PrefCheck {
            pref: PREF_ASPECT_Y,
            label: "Pixel Aspect Ratio Y",
            expected: AttrValue::Float(1.0),
        },
    ]
}

fn values_match(current: Option<&AttrValue>, expected: &AttrValue) -> bool {
    match (current.and_then(AttrValue::as_f64), expected.as_f64()) {
        (Some(c), Some(e)) => c == e,
        _ => false,
    }
}

/// Batched write of all checked preferences.
fn repair_prefs(comp: &dyn Comp, checks: &[PrefCheck]) {
    let prefs: Attrs = checks
        .iter()
        .map(|c| (frame_format_key(c.pref), c.expected.clone()))
        .collect();
    comp.set_prefs(&prefs);
}

/// Compare the comp's frame format with the current task.
///
/// Returns the mismatch diagnostics (`"<label> <current> should be
/// <expected>"`). With `force_repair` all five values are written in one
/// batch and nothing is prompted; otherwise the repair is offered through
/// the prompter and only happens if it invokes the callback.
pub fn validate_comp_prefs(
    comp: &CompRef,
    context: &dyn TaskContext,
    prompter: &dyn Prompter,
    force_repair: bool,
) -> Vec<String> {
    let task = match context.current_task() {
        Ok(task) => task,
        Err(e) => {
            warn!("Skipping comp preference validation: {}", e);
            return Vec::new();
        }
    };
    let context_path = format!("{} > {}", context.current_folder_path(), task.name);
    let prefs = comp.get_prefs(PREFS_FRAME_FORMAT);
    let checks = pref_checks(&task);

    let mut invalid = Vec::new();
    for check in &checks {
        let current = prefs.get(check.pref);
        if values_match(current, &check.expected) {
            continue;
        }
        let current_text = current.map(AttrValue::to_text).unwrap_or_else(|| "None".to_string());
        let expected_text = check.expected.to_text();
        invalid.push(format!("{} {} should be {}", check.label, current_text, expected_text));

        if !force_repair {
            warn!(
                "Comp {} {} does not match {} {} {}",
                check.label, current_text, context_path, check.label, expected_text
            );
        }
    }

    if invalid.is_empty() {
        return invalid;
    }

    if force_repair {
        info!("Applying default Comp preferences..");
        repair_prefs(&**comp, &checks);
        return invalid;
    }

    let repair_comp = comp.clone();
    let message = format!("Comp preferences mismatches '{}'\n{}", context_path, invalid.join("\n"));
    prompter.prompt_repair(RepairRequest {
        title: REPAIR_TITLE.to_string(),
        message,
        diagnostics: invalid.clone(),
        repair: Box::new(move || repair_prefs(&*repair_comp, &checks)),
    });
    invalid
}

/// Move every instance with a non-empty folder/task onto the current
/// context and persist the changes. Returns the number of instances changed.
pub fn update_content_on_context_change(
    creation: &dyn CreationContext,
    folder_path: &str,
    task_name: &str,
) -> Result<usize, CreateError> {
    let mut instances = creation.instances();
    let mut changed = 0;

    for instance in instances.iter_mut() {
        let mut touched = false;
        if !instance.folder_path.is_empty() && instance.folder_path != folder_path {
            instance.folder_path = folder_path.to_string();
            touched = true;
        }
        if !instance.task.is_empty() && instance.task != task_name {
            instance.task = task_name.to_string();
            touched = true;
        }
        if touched {
            changed += 1;
        }
    }

    creation.save_changes(&instances)?;
    Ok(changed)
}

/// Ask which settings to reset after saving into another context, then
/// apply the selection. `None` when the user cancelled.
pub fn prompt_reset_context(
    comp: &dyn Comp,
    context: &dyn TaskContext,
    creation: &dyn CreationContext,
    prompter: &dyn Prompter,
) -> Option<ResetOptions> {
    let options = prompter.prompt_reset_context()?;

    let task = match context.current_task() {
        Ok(task) => task,
        Err(e) => {
            warn!("Unable to reset comp to new context: {}", e);
            return Some(options);
        }
    };

    if options.frame_range {
        set_current_context_framerange(comp, &task);
    }
    if options.fps {
        set_current_context_fps(comp, &task);
    }
    if options.resolution {
        set_current_context_resolution(comp, &task);
    }
    if options.instances {
        let folder_path = context.current_folder_path();
        let task_name = context.current_task_name();
        if let Err(e) = update_content_on_context_change(creation, &folder_path, &task_name) {
            warn!("{}", e);
        }
    }
    Some(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Instance;
    use crate::testing::{
        MemoryCreationContext, MockComp, RecordingPrompter, StaticTaskContext, task_entity,
    };

    #[test]
    fn test_update_frame_range_with_handles() {
        let comp = MockComp::new("c");
        update_frame_range(&*comp, 1001, 1050, Some(5), Some(5), true);
        let attrs = comp.get_attrs();
        assert_eq!(attrs.get_i64(COMPN_GLOBAL_START), Some(996));
        assert_eq!(attrs.get_i64(COMPN_GLOBAL_END), Some(1055));
        assert_eq!(attrs.get_i64(COMPN_RENDER_START), Some(1001));
        assert_eq!(attrs.get_i64(COMPN_RENDER_END), Some(1050));
        assert_eq!(
            comp.calls(),
            vec!["lock", "start_undo:Script CMD", "set_attrs", "unlock", "end_undo:true"]
        );
    }

    #[test]
    fn test_update_frame_range_keeps_render_range() {
        let comp = MockComp::new("c");
        update_frame_range(&*comp, 10, 20, None, None, false);
        let attrs = comp.get_attrs();
        assert_eq!(attrs.get_i64(COMPN_GLOBAL_START), Some(10));
        assert_eq!(attrs.get_i64(COMPN_GLOBAL_END), Some(20));
        assert_eq!(attrs.get_i64(COMPN_RENDER_START), Some(1001));
    }

    #[test]
    fn test_fps_mismatch_prompts_without_mutation() {
        let comp = MockComp::with_format(24.0, 1920, 1080, 1.0, 1.0);
        let comp_ref: CompRef = comp.clone();
        let context = StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0));
        let prompter = RecordingPrompter::answering(None);

        let diagnostics = validate_comp_prefs(&comp_ref, &*context, &*prompter, false);
        assert_eq!(diagnostics, vec!["FPS 24.0 should be 25.0"]);
        assert_eq!(comp.pref(PREF_RATE).and_then(|v| v.as_f64()), Some(24.0));
        assert_eq!(comp.prefs_writes.load(std::sync::atomic::Ordering::SeqCst), 0);

        let repairs = prompter.take_repairs();
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].title, REPAIR_TITLE);
        assert_eq!(
            repairs[0].message,
            "Comp preferences mismatches '/shots/sh010 > comp'\nFPS 24.0 should be 25.0"
        );
    }

    #[test]
    fn test_confirmed_repair_writes_batch() {
        let comp = MockComp::with_format(24.0, 2048, 1080, 1.0, 1.0);
        let comp_ref: CompRef = comp.clone();
        let context = StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0));
        let prompter = RecordingPrompter::answering(None);

        validate_comp_prefs(&comp_ref, &*context, &*prompter, false);
        for request in prompter.take_repairs() {
            (request.repair)();
        }
        assert_eq!(comp.prefs_writes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(comp.pref(PREF_RATE).and_then(|v| v.as_f64()), Some(25.0));
        assert_eq!(comp.pref(PREF_WIDTH).and_then(|v| v.as_i64()), Some(1920));
    }

    #[test]
    fn test_forced_repair_sets_fps_without_prompt() {
        let comp = MockComp::with_format(24.0, 1920, 1080, 1.0, 1.0);
        let comp_ref: CompRef = comp.clone();
        let context = StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0));
        let prompter = RecordingPrompter::answering(None);

        let diagnostics = validate_comp_prefs(&comp_ref, &*context, &*prompter, true);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(comp.pref(PREF_RATE).and_then(|v| v.as_f64()), Some(25.0));
        assert_eq!(prompter.repair_count(), 0);
        assert_eq!(comp.prefs_writes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_matching_prefs_report_nothing() {
        let comp = MockComp::with_format(25.0, 1920, 1080, 2.0, 1.0);
        let comp_ref: CompRef = comp.clone();
        let context = StaticTaskContext::new(task_entity(25.0, 1920, 1080, 2.0));
        let prompter = RecordingPrompter::answering(None);

        assert!(validate_comp_prefs(&comp_ref, &*context, &*prompter, false).is_empty());
        assert_eq!(prompter.repair_count(), 0);
    }

    #[test]
    fn test_aspect_y_pinned_to_one() {
        let comp = MockComp::with_format(25.0, 1920, 1080, 1.0, 2.0);
        let comp_ref: CompRef = comp.clone();
        let context = StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0));
        let prompter = RecordingPrompter::answering(None);

        let diagnostics = validate_comp_prefs(&comp_ref, &*context, &*prompter, false);
        assert_eq!(diagnostics, vec!["Pixel Aspect Ratio Y 2.0 should be 1.0"]);
    }

    #[test]
    fn test_context_change_moves_instances() {
        let creation = MemoryCreationContext::default();
        let mut unscoped = Instance::new("workfile", "workfileMain", "", "");
        unscoped.variant = "Main".to_string();
        creation.instances.lock().unwrap().extend([
            Instance::new("render", "renderMain", "/shots/sh020", "comp"),
            Instance::new("render", "renderBg", "/shots/sh010", "comp"),
            unscoped,
        ]);

        let changed = update_content_on_context_change(&creation, "/shots/sh010", "comp").unwrap();
        assert_eq!(changed, 1);
        let saved = creation.instances();
        assert_eq!(saved[0].folder_path, "/shots/sh010");
        assert_eq!(saved[2].folder_path, "");
        assert_eq!(creation.saves.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_context_applies_selection() {
        let comp = MockComp::with_format(24.0, 1280, 720, 1.0, 1.0);
        let context = StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0));
        let creation = MemoryCreationContext::default();
        let prompter = RecordingPrompter::answering(Some(ResetOptions {
            resolution: false,
            instances: false,
            ..ResetOptions::default()
        }));

        let options = prompt_reset_context(&*comp, &*context, &creation, &*prompter);
        assert!(options.is_some());
        assert_eq!(comp.pref(PREF_RATE).and_then(|v| v.as_f64()), Some(25.0));
        assert_eq!(comp.pref(PREF_WIDTH).and_then(|v| v.as_i64()), Some(1280));
        assert_eq!(comp.get_attrs().get_i64(COMPN_GLOBAL_START), Some(996));
        assert!(creation.saves.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reset_context_cancelled() {
        let comp = MockComp::with_format(24.0, 1280, 720, 1.0, 1.0);
        let context = StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0));
        let creation = MemoryCreationContext::default();
        let prompter = RecordingPrompter::answering(None);

        assert!(prompt_reset_context(&*comp, &*context, &creation, &*prompter).is_none());
        assert_eq!(comp.prefs_writes.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(comp.calls().is_empty());
    }
}
