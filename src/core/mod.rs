//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! trigger contexts, pipeline definitions, steps, and run results.

pub mod condition;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod trigger;

pub use condition::*;
pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use trigger::*;
