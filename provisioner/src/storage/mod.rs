//! Persistent storage

pub mod environments;
pub mod layout;
pub mod settings;
