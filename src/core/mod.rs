//! Core pipeline modules - registry, reconciliation, events, render collection
//!
//! Everything here talks to Fusion only through the `entities::host` traits.

pub mod bridge;
pub mod context_change;
pub mod creator;
pub mod event_bus;
pub mod loaders;
pub mod pipeline;
pub mod poller;
pub mod reconcile;
pub mod registry;
pub mod render;
pub mod undo;
pub mod workfile;

// Re-exports for convenience
pub use bridge::EventBridge;
pub use context_change::SaveContextState;
pub use creator::SaverCreator;
pub use event_bus::EventBus;
pub use pipeline::FusionPipeline;
pub use poller::Poller;
pub use undo::{lock_and_undo_chunk, maintained_comp_range};
