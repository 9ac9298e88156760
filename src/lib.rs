//! s3uplink - direct-to-S3 upload with from-scratch SigV4 signing and
//! polling for backend-derived objects

pub mod activity;
pub mod config;
pub mod s3;
pub mod workflow;

pub use config::Config;
pub use workflow::WorkflowEngine;
