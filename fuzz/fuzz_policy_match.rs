//! Fuzz target for deny-pattern, grant-pattern and glob matching, and for
//! answer redaction.
//!
//! Run with: cargo +nightly fuzz run fuzz_policy_match
//!
//! The first byte picks a split point dividing the rest of the input into a
//! pattern and a subject string.

#![no_main]

use libfuzzer_sys::fuzz_target;
use packgate_config::policy::{DenyPattern, matches_pattern, normalize_space};
use packgate_config::RedactionPolicy;
use packgate_core::redaction::apply_redaction;
use packgate_core::source::compile_globs;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let split = 1 + (data[0] as usize % (data.len() - 1));
    let (Ok(pattern), Ok(subject)) = (
        std::str::from_utf8(&data[1..split]),
        std::str::from_utf8(&data[split..]),
    ) else {
        return;
    };

    if let Ok(Some(deny)) = DenyPattern::compile(pattern) {
        let _ = deny.matches(subject, &normalize_space(subject));
    }
    let _ = matches_pattern(subject, pattern);
    if let Ok(set) = compile_globs(&[pattern.to_string()]) {
        let _ = set.is_match(subject);
    }

    let policy = RedactionPolicy {
        mask_emails: true,
        mask_long_ids: true,
        suppress_small_counts: Some(10),
    };
    let _ = apply_redaction(subject, &policy);
});
