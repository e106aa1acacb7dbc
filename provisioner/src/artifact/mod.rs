//! Release artifact handling

pub mod detect;
pub mod stager;
pub mod tag;
