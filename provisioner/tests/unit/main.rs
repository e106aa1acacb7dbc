//! Integration tests for the provisioner

mod support;
mod test_database;
mod test_fsm;
mod test_probe;
