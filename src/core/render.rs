//! Render instance materializer.
//!
//! Turns the active render/image instances of a publish run into
//! [`RenderWorkItem`]s: resolved frame range, resolution (read from the
//! Saver's input), frame rate, pixel aspect, output directory and the literal
//! list of expected files.

use std::path::Path;

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use super::undo::lock_and_undo_chunk;
use crate::entities::keys::*;
use crate::entities::{
    AttrValue, Comp, FrameRange, FrameRangeSource, Instance, RenderTarget, TaskEntity, Tool,
    ToolRef,
};
use crate::utils::sequences::{expected_files, pad_frame, split_frame_path};

/// Undo chunk name of the resolution read (discarded from history).
pub const RESOLUTION_UNDO_NAME: &str = "Read resolution";
const WIDTH_EXPRESSION: &str = "self.Input.OriginalWidth";
const HEIGHT_EXPRESSION: &str = "self.Input.OriginalHeight";

/// Frame used by image savers without an explicit frame.
pub const DEFAULT_IMAGE_FRAME: i64 = 0;

/// The Saver's input resolution could not be determined.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionError {
    /// The expression evaluated to nothing (no connected input)
    NoValue(&'static str),
    /// The expression evaluated to something that is not a number
    NotANumber(String),
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionError::NoValue(what) => write!(f, "Failed to read input {}", what),
            ResolutionError::NotANumber(v) => write!(f, "Resolution expression returned '{}'", v),
        }
    }
}

impl std::error::Error for ResolutionError {}

/// What a [`TempExpression`] has to put back.
enum SavedInput {
    Expression(String),
    Value(AttrValue),
}

/// Expression installed on a tool input for the lifetime of the guard.
///
/// A non-empty input is saved first (its expression if it has one, its value
/// otherwise) and cleared. On drop the temporary expression is removed and the
/// saved expression or value is put back, also when the read in between
/// failed.
pub struct TempExpression<'a> {
    tool: &'a dyn Tool,
    input: &'a str,
    frame: Option<i64>,
    saved: SavedInput,
}

pub fn temp_expression<'a>(
    tool: &'a dyn Tool,
    input: &'a str,
    frame: Option<i64>,
    expression: &str,
) -> TempExpression<'a> {
    let current = tool.input(input, frame);
    let is_empty = match &current {
        None => true,
        Some(AttrValue::Str(s)) => s.is_empty(),
        Some(_) => false,
    };

    let saved = if is_empty {
        SavedInput::Value(AttrValue::Str(String::new()))
    } else if let Some(old) = tool.expression(input) {
        tool.set_expression(input, None);
        SavedInput::Expression(old)
    } else {
        tool.set_input(input, frame, AttrValue::Str(String::new()));
        SavedInput::Value(current.unwrap_or_else(|| AttrValue::Str(String::new())))
    };

    tool.set_expression(input, Some(expression));
    TempExpression {
        tool,
        input,
        frame,
        saved,
    }
}

impl TempExpression<'_> {
    /// Evaluated input value while the expression is installed.
    pub fn value(&self) -> Option<AttrValue> {
        self.tool.input(self.input, self.frame)
    }
}

impl Drop for TempExpression<'_> {
    fn drop(&mut self) {
        self.tool.set_expression(self.input, None);
        match &self.saved {
            SavedInput::Expression(expr) => self.tool.set_expression(self.input, Some(expr)),
            SavedInput::Value(value) => self.tool.set_input(self.input, self.frame, value.clone()),
        }
    }
}

fn read_dimension(
    tool: &dyn Tool,
    frame: i64,
    expression: &str,
    what: &'static str,
) -> Result<i64, ResolutionError> {
    let temp = temp_expression(tool, INPUT_COMMENTS, Some(frame), expression);
    match temp.value() {
        None => Err(ResolutionError::NoValue(what)),
        Some(AttrValue::Int(v)) => Ok(v),
        Some(AttrValue::Float(v)) if v.is_finite() => Ok(v.trunc() as i64),
        Some(AttrValue::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map(|v| v.trunc() as i64)
            .map_err(|_| ResolutionError::NotANumber(s)),
        Some(other) => Err(ResolutionError::NotANumber(other.to_text())),
    }
}

/// Input resolution of `tool` at `frame`.
///
/// Works on tools that never rendered: an expression on the Comments input
/// reads the upstream image size. The read runs in a locked undo chunk that
/// is dropped from the undo history.
pub fn tool_resolution(
    comp: &dyn Comp,
    tool: &dyn Tool,
    frame: i64,
) -> Result<(i64, i64), ResolutionError> {
    let _chunk = lock_and_undo_chunk(comp, RESOLUTION_UNDO_NAME, false);
    let width = read_dimension(tool, frame, WIDTH_EXPRESSION, "width")?;
    let height = read_dimension(tool, frame, HEIGHT_EXPRESSION, "height")?;
    Ok((width, height))
}

/// Frame range of an instance according to its frame range source.
///
/// Image savers render the single creator-selected frame. Without a task,
/// `current_task` falls back to the comp timeline.
pub fn resolve_frame_range(
    comp: &dyn Comp,
    instance: &Instance,
    task: Option<&TaskEntity>,
) -> FrameRange {
    let attrs = &instance.creator_attributes;
    if instance.product_type == "image" {
        let frame = attrs.frame.unwrap_or(DEFAULT_IMAGE_FRAME);
        return FrameRange::new(frame, frame, 0, 0);
    }

    let comp_attrs = comp.get_attrs();
    let global_start = comp_attrs.get_i64(COMPN_GLOBAL_START).unwrap_or(0);
    let global_end = comp_attrs.get_i64(COMPN_GLOBAL_END).unwrap_or(0);
    let comp_range = FrameRange::new(global_start, global_end, 0, 0);

    match attrs.frame_range_source {
        FrameRangeSource::CurrentTask => match task {
            Some(task) => {
                let a = &task.attributes;
                FrameRange::new(
                    a.frame_start,
                    a.frame_end,
                    a.handle_start.unwrap_or(0),
                    a.handle_end.unwrap_or(0),
                )
            }
            None => {
                warn!("No task for {}, using comp range", instance.product_name);
                comp_range
            }
        },
        FrameRangeSource::RenderRange => {
            let start = comp_attrs.get_i64(COMPN_RENDER_START).unwrap_or(global_start);
            let end = comp_attrs.get_i64(COMPN_RENDER_END).unwrap_or(global_end);
            FrameRange::new(start, end, start - global_start, global_end - end)
        }
        FrameRangeSource::CompRange => comp_range,
        FrameRangeSource::CustomRange => FrameRange::new(
            attrs.custom_frame_start.unwrap_or(global_start),
            attrs.custom_frame_end.unwrap_or(global_end),
            attrs.custom_handle_start.unwrap_or(0),
            attrs.custom_handle_end.unwrap_or(0),
        ),
    }
}

/// Publishable file set of a `frames` target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Representation {
    pub name: String,
    pub ext: String,
    /// First frame with handles, zero padded like the file names
    pub frame_start: String,
    /// Base names
    pub files: Vec<String>,
    pub staging_dir: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Representation of frames that already exist on disk.
pub fn frames_representation(
    expected: &[String],
    range: &FrameRange,
    review: bool,
) -> Option<Representation> {
    let first = Path::new(expected.first()?);
    let basename = first.file_name()?.to_string_lossy().to_string();
    let staging_dir = first
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let frame_path = split_frame_path(&basename);
    let ext = frame_path.ext.trim_start_matches('.').to_string();

    Some(Representation {
        name: ext.clone(),
        ext,
        frame_start: pad_frame(range.start_with_handles(), frame_path.padding),
        files: expected
            .iter()
            .filter_map(|f| Path::new(f).file_name().map(|n| n.to_string_lossy().to_string()))
            .collect(),
        staging_dir,
        tags: if review { vec!["review".to_string()] } else { Vec::new() },
    })
}

/// Fully resolved render work of one instance.
#[derive(Clone)]
pub struct RenderWorkItem {
    pub product_type: String,
    pub product_name: String,
    pub label: String,
    pub folder_path: String,
    pub task: String,
    pub families: Vec<String>,
    pub render_target: RenderTarget,
    pub review: bool,
    /// Rendered and integrated remotely
    pub farm: bool,
    pub frame_range: FrameRange,
    pub resolution_width: i64,
    pub resolution_height: i64,
    pub pixel_aspect: f64,
    pub fps: Option<f64>,
    pub app_version: String,
    /// Comp file the render comes from
    pub source: Option<String>,
    pub output_dir: String,
    pub expected_files: Vec<String>,
    pub representations: Vec<Representation>,
    pub publish_attributes: Value,
    pub tool: ToolRef,
}

impl std::fmt::Debug for RenderWorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderWorkItem")
            .field("product_name", &self.product_name)
            .field("families", &self.families)
            .field("frame_range", &self.frame_range)
            .field("resolution", &(self.resolution_width, self.resolution_height))
            .field("output_dir", &self.output_dir)
            .field("expected_files", &self.expected_files.len())
            .field("tool", &self.tool.name())
            .finish()
    }
}

impl RenderWorkItem {
    pub fn has_family(&self, family: &str) -> bool {
        self.families.iter().any(|f| f == family)
    }

    /// Optional publish plugins are active unless switched off on the
    /// instance (`publish_attributes.<plugin>.active`).
    pub fn is_plugin_active(&self, plugin: &str) -> bool {
        self.publish_attributes
            .get(plugin)
            .and_then(|p| p.get("active"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

fn push_unique(families: &mut Vec<String>, family: &str) {
    if !families.iter().any(|f| f == family) {
        families.push(family.to_string());
    }
}

/// Materialize one instance. `None` for inactive, non-render or tool-less
/// instances.
pub fn materialize(
    comp: &dyn Comp,
    instance: &Instance,
    task: Option<&TaskEntity>,
) -> Option<RenderWorkItem> {
    if !instance.active || !instance.is_renderable() {
        return None;
    }
    let Some(tool) = instance.tool.clone() else {
        warn!("Instance {} has no Saver tool, skipping", instance.product_name);
        return None;
    };

    let frame_format = comp.frame_format();
    let frame_range = resolve_frame_range(comp, instance, task);

    let resolution = tool_resolution(comp, &*tool, frame_range.start);
    let (resolution_width, resolution_height) = match resolution {
        Ok(resolution) => resolution,
        Err(e) => {
            debug!(
                "Unable to get resolution from tool {} ({}). Falling back to comp frame format",
                tool.name(),
                e
            );
            (frame_format.width.unwrap_or(0), frame_format.height.unwrap_or(0))
        }
    };

    let render_target = instance.creator_attributes.render_target;
    let mut families = instance.families.clone();
    if instance.creator_attributes.review {
        push_unique(&mut families, "review");
    }
    push_unique(&mut families, &render_target.family());

    let farm = render_target == RenderTarget::Farm;
    if farm {
        families.retain(|f| f != "review");
    }
    let review = families.iter().any(|f| f == "review");

    let output = tool
        .input(INPUT_CLIP, None)
        .map(|v| v.to_text())
        .unwrap_or_default();
    let output = comp.map_path(&output);
    let output_dir = Path::new(&output)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let expected = expected_files(&output, &frame_range);

    let mut representations = Vec::new();
    if render_target == RenderTarget::Frames {
        representations.extend(frames_representation(&expected, &frame_range, review));
    }

    Some(RenderWorkItem {
        product_type: instance.product_type.clone(),
        product_name: instance.product_name.clone(),
        label: instance.display_label().to_string(),
        folder_path: instance.folder_path.clone(),
        task: instance.task.clone(),
        families,
        render_target,
        review,
        farm,
        frame_range,
        resolution_width,
        resolution_height,
        pixel_aspect: frame_format.pixel_aspect(),
        fps: frame_format.rate,
        app_version: comp.app_version(),
        source: comp.file_name().map(|p| p.to_string_lossy().to_string()),
        output_dir,
        expected_files: expected,
        representations,
        publish_attributes: instance
            .extra
            .get("publish_attributes")
            .cloned()
            .unwrap_or(Value::Null),
        tool,
    })
}

/// Render work for every active render/image instance, in instance order.
pub fn collect_render_instances(
    comp: &dyn Comp,
    instances: &[Instance],
    task: Option<&TaskEntity>,
) -> Vec<RenderWorkItem> {
    instances
        .iter()
        .filter_map(|instance| materialize(comp, instance, task))
        .collect()
}

/// Publish validation failures.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishValidationError {
    /// The Saver's input resolution could not be read
    ResolutionUnavailable { frame: i64 },
    ResolutionMismatch {
        expected: (i64, i64),
        actual: (i64, i64),
    },
}

impl std::fmt::Display for PublishValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishValidationError::ResolutionUnavailable { frame } => write!(
                f,
                "Cannot get resolution info for frame '{}'.\n\n \
                 Please check that saver has connected input.",
                frame
            ),
            PublishValidationError::ResolutionMismatch { expected, actual } => write!(
                f,
                "The input's resolution does not match the folder's resolution {}x{}.\n\n\
                 The input's resolution is {}x{}.",
                expected.0,
                expected.1,
                actual.0,
                actual.1
            ),
        }
    }
}

impl std::error::Error for PublishValidationError {}

pub const VALIDATE_SAVER_RESOLUTION: &str = "ValidateSaverResolution";

/// Check that the Saver's input resolution matches the task resolution at
/// the first frame including handles.
pub fn validate_saver_resolution(
    comp: &dyn Comp,
    item: &RenderWorkItem,
    task: &TaskEntity,
) -> Result<(), PublishValidationError> {
    if !item.is_plugin_active(VALIDATE_SAVER_RESOLUTION) {
        return Ok(());
    }

    let frame = item.frame_range.start_with_handles();
    let actual = tool_resolution(comp, &*item.tool, frame)
        .map_err(|_| PublishValidationError::ResolutionUnavailable { frame })?;
    let expected = (task.attributes.resolution_width, task.attributes.resolution_height);

    if actual != expected {
        return Err(PublishValidationError::ResolutionMismatch { expected, actual });
    }
    Ok(())
}
