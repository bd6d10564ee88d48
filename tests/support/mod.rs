//! Shared harness for container-backed integration tests.

pub mod postgres;
pub mod runtime;
