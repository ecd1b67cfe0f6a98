//! Fuzz target for the policy and config TOML parsers.
//!
//! Run with: cargo +nightly fuzz run fuzz_policy_parser
//!
//! Arbitrary input must either parse or fail with an error, never panic.
//! Parsed policies are also evaluated against the input itself, which
//! drives regex deny patterns through user-supplied text.

#![no_main]

use libfuzzer_sys::fuzz_target;
use packgate_config::{AppConfig, PolicyEngine};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let _ = AppConfig::parse(s);
    if let Ok(policy) = PolicyEngine::parse(s) {
        let _ = policy.is_denied(s);
        let roles: Vec<String> = policy.roles().iter().map(|r| r.to_string()).collect();
        let _ = policy.allowed_packs(&roles);
        let _ = policy.allowed_tools(&roles);
    }
});
