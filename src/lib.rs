//! fusion-sync - Fusion comp session sync for the AYON pipeline
//!
//! Re-exports all modules for use by the binary target.

// Core pipeline (registry, reconciliation, event bridge, render collection)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod logging;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types from core
pub use crate::core::bridge::EventBridge;
pub use crate::core::event_bus::{BoxedEvent, EventBus, downcast_event};
pub use crate::core::pipeline::FusionPipeline;

// Re-export entities
pub use entities::{AttrValue, Attrs, CanonicalEvent, Comp, FusionApp, Tool};
