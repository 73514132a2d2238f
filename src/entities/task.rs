//! Task context and the external collaborators the core calls into.
//!
//! These traits stand in for the pipeline framework: the task-context
//! provider (authoritative project metadata), the creation context
//! (publish instances), the user-facing prompter and the scene inventory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::container::Container;
use super::instance::Instance;

/// Authoritative task attributes from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAttributes {
    pub frame_start: i64,
    pub frame_end: i64,
    #[serde(default)]
    pub handle_start: Option<i64>,
    #[serde(default)]
    pub handle_end: Option<i64>,
    #[serde(default)]
    pub fps: Option<f64>,
    pub resolution_width: i64,
    pub resolution_height: i64,
    #[serde(default = "default_pixel_aspect")]
    pub pixel_aspect: f64,
}

fn default_pixel_aspect() -> f64 {
    1.0
}

/// Task name plus attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntity {
    pub name: String,
    #[serde(rename = "attrib")]
    pub attributes: TaskAttributes,
}

/// Task context lookup errors
#[derive(Debug, Clone, PartialEq)]
pub enum ContextError {
    /// No task is set for the current session
    NoTask,
    /// The provider could not reach the server
    Unavailable(String),
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::NoTask => write!(f, "No current task in context"),
            ContextError::Unavailable(e) => write!(f, "Task context unavailable: {}", e),
        }
    }
}

impl std::error::Error for ContextError {}

/// Supplies the current folder/task and its attributes.
pub trait TaskContext: Send + Sync {
    fn current_task(&self) -> Result<TaskEntity, ContextError>;
    fn current_folder_path(&self) -> String;
    fn current_task_name(&self) -> String;
    /// Working directory root of the current context (`AYON_WORKDIR`).
    fn workdir(&self) -> Option<PathBuf>;
    /// Working directory of another folder/task, `None` when the pipeline
    /// cannot resolve it.
    fn workdir_for(&self, folder_path: &str, task: &str) -> Option<PathBuf>;
}

/// Creation context errors
#[derive(Debug, Clone, PartialEq)]
pub enum CreateError {
    Save(String),
}

impl std::fmt::Display for CreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreateError::Save(e) => write!(f, "Failed to save instance changes: {}", e),
        }
    }
}

impl std::error::Error for CreateError {}

/// Supplies and persists publish instances.
pub trait CreationContext: Send + Sync {
    /// Fresh instance list (equivalent of a reset context).
    fn instances(&self) -> Vec<Instance>;
    fn save_changes(&self, instances: &[Instance]) -> Result<(), CreateError>;
}

/// Answer of the "saving to a different context" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOptions {
    pub fps: bool,
    pub frame_range: bool,
    pub resolution: bool,
    pub instances: bool,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            fps: true,
            frame_range: true,
            resolution: true,
            instances: true,
        }
    }
}

/// A deferred repair offered to the user.
pub struct RepairRequest {
    pub title: String,
    /// Context line followed by one diagnostic per line
    pub message: String,
    pub diagnostics: Vec<String>,
    /// Performs the batched preference write when confirmed
    pub repair: Box<dyn FnOnce() + Send>,
}

impl std::fmt::Debug for RepairRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairRequest")
            .field("title", &self.title)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

/// User-facing prompts. Implementations decide whether and when to call
/// back (e.g. `RepairRequest::repair` on button click).
pub trait Prompter: Send + Sync {
    fn prompt_repair(&self, request: RepairRequest);
    /// `None` when the user cancelled.
    fn prompt_reset_context(&self) -> Option<ResetOptions>;
    fn show_outdated_containers(&self);
}

/// Scene inventory queries against the server.
pub trait Inventory: Send + Sync {
    fn any_outdated(&self, containers: &[Container]) -> bool;
}
