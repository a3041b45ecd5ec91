//! Needle API types
//!
//! This library defines the types shared by the needle controller:
//! - Service: a logical service registered by an operator
//! - Dentry: a single routing rule within a delegation table
//! - DtabEntry: the rule shape namerd reads and writes
//! - proto: the generated NeedleService gRPC types

pub mod convert;
pub mod dtab;
pub mod model;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("needle.v1");
}

pub use dtab::{render_dtab, DtabEntry};
pub use model::{Dentry, DentrySpec, Service, ServiceSpec, ValidationError};
