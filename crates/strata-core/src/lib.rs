//! Strata Core
//!
//! Shared utilities for the Strata synchronization engine: logging bootstrap,
//! profiling scopes, fast collections, a generational arena, math re-exports
//! and runtime configuration.

pub mod alloc;
pub mod config;
pub mod logging;
pub mod math;
pub mod profiling;
