//! Publish instances: declarations of what will be exported.
//!
//! Instances are owned by the external creation context. This crate reads
//! their fields, writes back product/folder/task updates and persists them
//! on the Saver tool they belong to (see `core::registry`).
//!
//! Field names follow the pipeline's stored keys (`productType`,
//! `creator_attributes`, ...) so an instance round-trips through a tool's
//! `openpype` bag unchanged; unknown keys are kept in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::host::ToolRef;
use super::keys::AYON_INSTANCE_ID;

/// Product types collected as render work.
pub const RENDER_PRODUCT_TYPES: [&str; 2] = ["render", "image"];

/// Where the frames of a render instance come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderTarget {
    /// Render on this machine during publish
    #[default]
    Local,
    /// Submit to the render farm
    Farm,
    /// Use frames that already exist on disk
    Frames,
}

impl RenderTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderTarget::Local => "local",
            RenderTarget::Farm => "farm",
            RenderTarget::Frames => "frames",
        }
    }

    /// Secondary family tag, e.g. `render.farm`.
    pub fn family(&self) -> String {
        format!("render.{}", self.as_str())
    }
}

/// Source of an instance's frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameRangeSource {
    /// Task attributes on the server
    #[default]
    #[serde(rename = "current_task", alias = "current_context")]
    CurrentTask,
    /// Comp render in/out
    #[serde(rename = "render_range")]
    RenderRange,
    /// Comp global timeline
    #[serde(rename = "comp_range")]
    CompRange,
    /// Values from `custom_*` creator attributes
    #[serde(rename = "custom_range")]
    CustomRange,
}

fn default_image_format() -> String {
    "exr".to_string()
}

/// Attributes chosen on the creator page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorAttributes {
    #[serde(default)]
    pub render_target: RenderTarget,
    #[serde(default)]
    pub review: bool,
    #[serde(default)]
    pub frame_range_source: FrameRangeSource,
    #[serde(default = "default_image_format")]
    pub image_format: String,
    #[serde(rename = "custom_frameStart", default, skip_serializing_if = "Option::is_none")]
    pub custom_frame_start: Option<i64>,
    #[serde(rename = "custom_frameEnd", default, skip_serializing_if = "Option::is_none")]
    pub custom_frame_end: Option<i64>,
    #[serde(rename = "custom_handleStart", default, skip_serializing_if = "Option::is_none")]
    pub custom_handle_start: Option<i64>,
    #[serde(rename = "custom_handleEnd", default, skip_serializing_if = "Option::is_none")]
    pub custom_handle_end: Option<i64>,
    /// Rendered frame of single-image savers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CreatorAttributes {
    fn default() -> Self {
        Self {
            render_target: RenderTarget::default(),
            review: false,
            frame_range_source: FrameRangeSource::default(),
            image_format: default_image_format(),
            custom_frame_start: None,
            custom_frame_end: None,
            custom_handle_start: None,
            custom_handle_end: None,
            frame: None,
            extra: Map::new(),
        }
    }
}

fn default_instance_id() -> String {
    AYON_INSTANCE_ID.to_string()
}

fn default_true() -> bool {
    true
}

/// A pending publish declaration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default = "default_instance_id")]
    pub id: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "productName")]
    pub product_name: String,
    #[serde(rename = "folderPath", default)]
    pub folder_path: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub creator_identifier: String,
    #[serde(default)]
    pub creator_attributes: CreatorAttributes,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub families: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Transient back-reference to the Saver tool (never persisted)
    #[serde(skip)]
    pub tool: Option<ToolRef>,
}

impl Instance {
    pub fn new(product_type: &str, product_name: &str, folder_path: &str, task: &str) -> Self {
        Self {
            id: default_instance_id(),
            product_type: product_type.to_string(),
            product_name: product_name.to_string(),
            folder_path: folder_path.to_string(),
            task: task.to_string(),
            variant: String::new(),
            creator_identifier: String::new(),
            creator_attributes: CreatorAttributes::default(),
            active: true,
            instance_id: None,
            label: None,
            families: Vec::new(),
            extra: Map::new(),
            tool: None,
        }
    }

    pub fn is_renderable(&self) -> bool {
        RENDER_PRODUCT_TYPES.contains(&self.product_type.as_str())
    }

    /// Label shown in the publisher, falls back to the product name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.product_name)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("product_type", &self.product_type)
            .field("product_name", &self.product_name)
            .field("folder_path", &self.folder_path)
            .field("task", &self.task)
            .field("active", &self.active)
            .field("creator_attributes", &self.creator_attributes)
            .field("tool", &self.tool.as_ref().map(|t| t.name()))
            .finish()
    }
}

/// Frame range with handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start: i64,
    pub end: i64,
    pub handle_start: i64,
    pub handle_end: i64,
}

impl FrameRange {
    pub fn new(start: i64, end: i64, handle_start: i64, handle_end: i64) -> Self {
        Self {
            start,
            end,
            handle_start,
            handle_end,
        }
    }

    /// First frame including handles
    pub fn start_with_handles(&self) -> i64 {
        self.start - self.handle_start
    }

    /// Last frame including handles
    pub fn end_with_handles(&self) -> i64 {
        self.end + self.handle_end
    }
}
