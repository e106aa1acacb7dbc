//! Release instance provisioner
//!
//! Stages a release archive, provisions its database from a template, hosts
//! it as a site or container, wires its connection strings, registers it and
//! waits for it to answer.

pub mod app;
pub mod artifact;
pub mod config;
pub mod database;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod host;
pub mod http;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
