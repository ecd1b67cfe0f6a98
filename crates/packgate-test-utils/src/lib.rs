#![deny(unsafe_code)]

//! Shared test utilities for the Packgate workspace.
//!
//! Provides a sample policy, config builders, on-disk document fixtures and
//! tracing helpers so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! packgate-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod fixtures;
pub mod tracing_setup;
