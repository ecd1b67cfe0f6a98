//! On-disk document fixtures and a ready-made orchestrator.
//!
//! [`TestDataDir`] lays out `data/<org>/<pack>/...` in a temporary directory
//! that is removed when the value is dropped, even on panic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use packgate_config::PolicyEngine;
use packgate_core::audit::InMemoryAuditSink;
use packgate_core::packs::sample_service;
use packgate_core::{FilesystemSource, Orchestrator, PackRegistry};
use tempfile::TempDir;
use tracing::debug;

pub const DEMO_ORG: &str = "demo";

pub const ROTATE_API_KEY_DOC: &str = "\
# Rotate an API key

Use this guide when a key may have leaked or is due for its quarterly rotation.

## Steps

1. Open the sample service console and go to Settings > API keys.
2. Click Rotate key next to the key you want to replace.
3. Deploy the new key to every client, then revoke the old key.

Old keys stop working immediately after they are revoked.
";

pub const RATE_LIMITS_DOC: &str = "\
# Rate limits

The sample service allows 600 requests per minute per API key.

## When you hit the limit

Requests over the limit receive HTTP 429 with a Retry-After header.
Back off exponentially and retry after the indicated delay.
";

/// A temporary data directory with documents for the sample pack.
pub struct TestDataDir {
    dir: TempDir,
}

impl TestDataDir {
    /// An empty data directory.
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Data directory holding the two sample how-to documents for [`DEMO_ORG`].
    pub fn with_sample_docs() -> Self {
        let data = Self::empty();
        data.write(DEMO_ORG, sample_service::PACK_ID, "howto/rotate_api_key.md", ROTATE_API_KEY_DOC);
        data.write(DEMO_ORG, sample_service::PACK_ID, "howto/rate_limits.md", RATE_LIMITS_DOC);
        data
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `<org>/<pack>/<relative>`, creating directories.
    pub fn write(&self, org_id: &str, pack_id: &str, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(org_id).join(pack_id).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture dirs");
        }
        std::fs::write(&path, contents).expect("failed to write fixture doc");
        path
    }
}

/// An orchestrator over the built-in packs and a filesystem source, with
/// its audit sink exposed for inspection. Building one installs the test
/// tracing subscriber.
pub struct TestOrchestrator {
    pub orchestrator: Orchestrator,
    pub audit: Arc<InMemoryAuditSink>,
    pub data: TestDataDir,
}

impl TestOrchestrator {
    pub fn new(policy: PolicyEngine, data: TestDataDir) -> Self {
        crate::tracing_setup::init_test_tracing();
        debug!(data_dir = %data.path().display(), "building test orchestrator");
        let audit = Arc::new(InMemoryAuditSink::new());
        let orchestrator = Orchestrator::builder(PackRegistry::with_builtin(), Arc::new(policy))
            .source(Arc::new(FilesystemSource::new(data.path())))
            .audit(audit.clone())
            .build();
        Self {
            orchestrator,
            audit,
            data,
        }
    }

    /// Sample policy plus the sample documents.
    pub fn sample() -> Self {
        Self::new(crate::config::sample_policy(), TestDataDir::with_sample_docs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_docs_layout() {
        let data = TestDataDir::with_sample_docs();
        let howto = data.path().join("demo/sample_service/howto");
        assert!(howto.join("rotate_api_key.md").is_file());
        assert!(howto.join("rate_limits.md").is_file());
    }

    #[test]
    fn test_orchestrator_fixture_ingests_lazily() {
        let fixture = TestOrchestrator::sample();
        assert!(!fixture.orchestrator.is_ingested(DEMO_ORG, sample_service::PACK_ID));
        let added = fixture
            .orchestrator
            .ensure_ingested(DEMO_ORG, sample_service::PACK_ID)
            .unwrap();
        assert!(added >= 2);
        assert!(fixture.orchestrator.is_ingested(DEMO_ORG, sample_service::PACK_ID));
    }
}
