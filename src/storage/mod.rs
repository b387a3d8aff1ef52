//! Object store clients.
//!
//! The [`backend::ObjectStore`] trait is all the paste handlers see.
//! [`s3::S3Store`] talks to any S3-compatible service through the AWS
//! SDK; [`memory::MemoryStore`] keeps objects in process for tests and
//! local development.

pub mod backend;
pub mod memory;
pub mod s3;
