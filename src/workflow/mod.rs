//! Upload-poll workflow
//!
//! This module provides:
//! - Object key derivation for uploads and derived objects
//! - The single-run workflow engine and its state machine
//! - Materialized result handles with explicit release
//! - An injected scheduler so polling cadence is testable

pub mod engine;
pub mod key;
pub mod result;
pub mod scheduler;

pub use engine::{StartRequest, StylePreference, WorkflowEngine, WorkflowError, WorkflowState};
pub use result::MaterializedObject;
pub use scheduler::{Scheduler, TokioScheduler};
