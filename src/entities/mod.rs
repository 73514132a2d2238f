//! Entities module - host capability traits and the pipeline data model.
//!
//! - `host`: the session handle (app, comp, tool, notification feed)
//! - `attrs`/`keys`: loosely typed host values and their key names
//! - `events`: raw notifications and canonical lifecycle events
//! - `container`/`instance`/`task`: pipeline records and collaborators

pub mod attrs;
pub mod container;
pub mod events;
pub mod host;
pub mod instance;
pub mod keys;
pub mod task;

pub use attrs::{AttrValue, Attrs};
pub use container::Container;
pub use events::{CanonicalEvent, HostNotification, NotificationKind, RawNotification, TaskChange};
pub use host::{Comp, CompRef, FrameFormat, FusionApp, HostError, NotificationSource, Tool, ToolRef};
pub use instance::{CreatorAttributes, FrameRange, FrameRangeSource, Instance, RenderTarget};
pub use task::{
    ContextError, CreateError, CreationContext, Inventory, Prompter, RepairRequest, ResetOptions,
    TaskAttributes, TaskContext, TaskEntity,
};
