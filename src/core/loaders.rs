//! Loaders: image sequences as Loader tools, and `.setting` files.
//!
//! Loaded sequences become containers (see `registry`). Fusion resets
//! several Loader inputs whenever the clip path changes; update keeps them
//! by snapshotting inputs and trim around the path change.

use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::Deserialize;

use super::registry::{RepresentationContext, imprint_container, update_container_representation};
use super::undo::lock_and_undo_chunk;
use crate::entities::keys::*;
use crate::entities::{AttrValue, Attrs, Comp, Container, HostError, Tool, ToolRef};

/// Loader identifier imprinted on sequence containers.
pub const SEQUENCE_LOADER: &str = "FusionLoadSequence";

/// Product types the sequence loader accepts.
pub const SEQUENCE_PRODUCT_TYPES: [&str; 6] =
    ["imagesequence", "review", "render", "plate", "image", "online"];

/// Inputs kept when the clip path of a Loader is replaced.
const UPDATE_PRESERVED_INPUTS: [&str; 6] = [
    INPUT_HOLD_FIRST_FRAME,
    INPUT_HOLD_LAST_FRAME,
    "Reverse",
    "Depth",
    "KeyCode",
    "TimeCodeOffset",
];

/// Inputs Fusion compensates when the global in moves.
const SHIFT_PRESERVED_INPUTS: [&str; 4] = [
    INPUT_CLIP_TIME_START,
    INPUT_CLIP_TIME_END,
    INPUT_HOLD_FIRST_FRAME,
    INPUT_HOLD_LAST_FRAME,
];

#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    Host(HostError),
    /// Container tool is not a Loader
    NotALoader(String),
    /// The file to load could not be read
    Read(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Host(e) => write!(f, "{}", e),
            LoadError::NotALoader(name) => write!(f, "Tool '{}' must be a Loader", name),
            LoadError::Read(e) => write!(f, "Failed to read file: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<HostError> for LoadError {
    fn from(e: HostError) -> Self {
        LoadError::Host(e)
    }
}

/// Frame attributes of the published version.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionAttributes {
    pub frame_start_handle: Option<i64>,
    pub frame_start: Option<i64>,
    pub handle_start: Option<i64>,
}

impl VersionAttributes {
    /// First published frame including handles. Missing data means 0.
    pub fn start(&self, tool_name: &str) -> i64 {
        if let Some(start) = self.frame_start_handle {
            return start;
        }
        match self.frame_start {
            Some(start) => start - self.handle_start.unwrap_or(0),
            None => {
                warn!(
                    "Missing start frame for version assuming starts at frame 0 for: {}",
                    tool_name
                );
                0
            }
        }
    }
}

/// Everything a loader needs about the representation to load.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub representation: RepresentationContext,
    pub folder_name: String,
    pub version: VersionAttributes,
    /// First file of the representation
    pub path: PathBuf,
}

fn input_i64(tool: &dyn Tool, input: &str) -> i64 {
    tool.input(input, None).and_then(|v| v.as_i64()).unwrap_or(0)
}

/// Input values (time undefined) restored on drop.
pub struct PreservedInputs<'a> {
    tool: &'a dyn Tool,
    values: Vec<(&'static str, Option<AttrValue>)>,
}

pub fn preserve_inputs<'a>(tool: &'a dyn Tool, inputs: &[&'static str]) -> PreservedInputs<'a> {
    let values = inputs.iter().map(|name| (*name, tool.input(name, None))).collect();
    PreservedInputs { tool, values }
}

impl Drop for PreservedInputs<'_> {
    fn drop(&mut self) {
        for (name, value) in self.values.drain(..) {
            if let Some(value) = value {
                self.tool.set_input(name, None, value);
            }
        }
    }
}

/// Frame count minus one of the Loader's clip.
fn clip_last_index(tool: &dyn Tool) -> i64 {
    let length = match tool.get_attrs().get(TOOLIT_CLIP_LENGTH) {
        Some(AttrValue::List(items)) => items.first().and_then(AttrValue::as_i64),
        Some(AttrValue::Map(map)) => map
            .get("1")
            .or_else(|| map.values().next())
            .and_then(AttrValue::as_i64),
        Some(other) => other.as_i64(),
        None => None,
    };
    length.unwrap_or(0) - 1
}

/// Keeps the amount trimmed from both ends of the clip. When the new clip
/// is shorter the trims are reduced to fit.
pub struct PreservedTrim<'a> {
    tool: &'a dyn Tool,
    trim_from_start: i64,
    trim_from_end: i64,
}

pub fn preserve_trim(tool: &dyn Tool) -> PreservedTrim<'_> {
    let length = clip_last_index(tool);
    PreservedTrim {
        tool,
        trim_from_start: input_i64(tool, INPUT_CLIP_TIME_START),
        trim_from_end: length - input_i64(tool, INPUT_CLIP_TIME_END),
    }
}

impl Drop for PreservedTrim<'_> {
    fn drop(&mut self) {
        let length = clip_last_index(self.tool);
        let mut trim_from_start = self.trim_from_start;
        let mut trim_from_end = self.trim_from_end;

        if trim_from_start > length {
            trim_from_start = length;
            warn!("Reducing trim in to {} (because of less frames)", trim_from_start);
        }
        let remainder = length - trim_from_start;
        if trim_from_end > remainder {
            trim_from_end = remainder;
            warn!("Reducing trim out to {} (because of less frames)", trim_from_end);
        }

        self.tool.set_input(INPUT_CLIP_TIME_START, None, trim_from_start.into());
        self.tool.set_input(INPUT_CLIP_TIME_END, None, (length - trim_from_end).into());
    }
}

/// Move the Loader's global in by `frame` (or to `frame` when not
/// relative) keeping its duration and trims. Returns the applied shift.
pub fn loader_shift(tool: &dyn Tool, frame: i64, relative: bool) -> i64 {
    let old_in = input_i64(tool, INPUT_GLOBAL_IN);
    let old_out = input_i64(tool, INPUT_GLOBAL_OUT);
    let shift = if relative { frame } else { frame - old_in };
    if shift == 0 {
        return 0;
    }

    let _preserved = preserve_inputs(tool, &SHIFT_PRESERVED_INPUTS);
    // In cannot pass out and vice versa: apply in shift direction
    if shift > 0 {
        tool.set_input(INPUT_GLOBAL_OUT, None, (old_out + shift).into());
        tool.set_input(INPUT_GLOBAL_IN, None, (old_in + shift).into());
    } else {
        tool.set_input(INPUT_GLOBAL_IN, None, (old_in + shift).into());
        tool.set_input(INPUT_GLOBAL_OUT, None, (old_out + shift).into());
    }
    shift
}

fn clip_path(comp: &dyn Comp, path: &Path) -> AttrValue {
    comp.reverse_map_path(&path.to_string_lossy()).into()
}

/// Create a Loader for the representation and imprint it as a container.
///
/// `namespace` falls back to the folder name.
pub fn load_sequence(
    comp: &dyn Comp,
    context: &LoadContext,
    name: &str,
    namespace: Option<&str>,
) -> Result<ToolRef, LoadError> {
    let namespace = namespace.unwrap_or(&context.folder_name);

    let _chunk = lock_and_undo_chunk(comp, "Create Loader", true);
    let tool = comp.add_tool(TOOL_LOADER)?;
    tool.set_input(INPUT_CLIP, None, clip_path(comp, &context.path));
    tool.set_attrs(&Attrs::new().with(TOOLB_NAME_SET, true).with(TOOLS_NAME, name));

    let start = context.version.start(&tool.name());
    loader_shift(&*tool, start, false);

    imprint_container(&*tool, name, namespace, &context.representation, SEQUENCE_LOADER);
    info!("Loaded {} into {}", context.path.display(), tool.name());
    Ok(tool)
}

/// Point the container's Loader at a new representation.
pub fn update_sequence(
    comp: &dyn Comp,
    container: &Container,
    context: &LoadContext,
) -> Result<(), LoadError> {
    let tool = &*container.tool;
    if tool.tool_type() != TOOL_LOADER {
        return Err(LoadError::NotALoader(tool.name()));
    }
    let start = context.version.start(&tool.name());

    let _chunk = lock_and_undo_chunk(comp, "Update Loader", true);
    {
        let _trim = preserve_trim(tool);
        let _inputs = preserve_inputs(tool, &UPDATE_PRESERVED_INPUTS);
        tool.set_input(INPUT_CLIP, None, clip_path(comp, &context.path));
    }

    if loader_shift(tool, start, false) != 0 {
        debug!("Changed '{}' global in: {}", tool.name(), start);
    }
    update_container_representation(container, &context.representation.representation_id);
    Ok(())
}

/// Same as update.
pub fn switch_sequence(
    comp: &dyn Comp,
    container: &Container,
    context: &LoadContext,
) -> Result<(), LoadError> {
    update_sequence(comp, container, context)
}

pub fn remove_sequence(comp: &dyn Comp, container: &Container) -> Result<(), LoadError> {
    if container.tool.tool_type() != TOOL_LOADER {
        return Err(LoadError::NotALoader(container.tool.name()));
    }
    let _chunk = lock_and_undo_chunk(comp, "Remove Loader", true);
    container.tool.delete();
    Ok(())
}

/// Options of the `.setting` loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoadSettingOptions {
    /// Apply the file to the selected tools instead of pasting it
    pub use_selection: bool,
}

/// Load a `.setting` file. Returns the number of tools it was applied to
/// (selection mode) or 1 when pasted.
pub fn load_setting(
    comp: &dyn Comp,
    path: &Path,
    options: LoadSettingOptions,
) -> Result<usize, LoadError> {
    if options.use_selection {
        let selection = comp.tools(true, None);
        if selection.is_empty() {
            error!("No selected tools to apply to.");
            return Ok(0);
        }
        for tool in &selection {
            info!("Loading setting to {}", tool.name());
            tool.load_settings(path)?;
        }
        return Ok(selection.len());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| LoadError::Read(format!("{}: {}", path.display(), e)))?;
    let _chunk = lock_and_undo_chunk(comp, "Load setting", true);
    comp.paste(&contents)?;
    Ok(1)
}
