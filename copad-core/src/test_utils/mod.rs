//! Test utilities and helpers
//!
//! Shared fixtures and async helpers for the test suite: document row
//! builders, a scriptable editable surface, and channel receive timeouts.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;
