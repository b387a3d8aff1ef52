//! HTTP handlers for the paste endpoint.

pub mod form;
pub mod paste;
