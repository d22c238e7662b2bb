//! Unit tests for the automation engine internals.

mod config_tests;
mod discovery_tests;
