// ABOUTME: Root library for the conductor host binary.
// ABOUTME: Exposes the CLI definition, application context, logging setup, and event rendering.

pub mod cli;
pub mod context;
pub mod logging;
pub mod render;

pub use context::{AppContext, ToolRow};
