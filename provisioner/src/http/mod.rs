//! HTTP plumbing for the helper services

pub mod client;
pub mod handler;
