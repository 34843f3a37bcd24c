//! Outbound sequence execution and adaptive call-priority scoring.
//!
//! The library exposes the two engines (`sequence`, `scoring`) over the
//! storage and dispatch seams, plus the workspace plumbing the CLI uses.
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod governor;
pub mod learning;
pub mod model;
pub mod scoring;
pub mod sequence;
pub mod status;
pub mod store;
pub mod templates;
pub mod util;
pub mod workflow;
pub mod workspace;
