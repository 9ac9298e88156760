//! S3 module with AWS SigV4 signing
//!
//! This module provides:
//! - AWS Signature Version 4 signing built from scratch
//! - Request descriptors for PUT/HEAD/GET object operations
//! - An async transport that signs and issues those operations

pub mod request;
pub mod sign;
pub mod transport;

// Re-export main types for convenience
pub use request::{RequestDescriptor, SignedRequest};
pub use sign::{RequestSigner, EMPTY_SHA256};
pub use transport::{
    GetResponse, HeadResponse, ObjectStore, Result, S3Transport, TransportError,
};
