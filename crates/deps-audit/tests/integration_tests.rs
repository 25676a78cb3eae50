//! 의존성 분석 통합 테스트 — 공개 API만 사용

use std::sync::{Arc, Mutex};

use layerlens_core::types::Ecosystem;
use layerlens_deps_audit::{
    Advisory, AdvisoryClient, DependencyAnalyzer, DepsAuditError, GemAdvisoryDb, GemAdvisoryEntry,
    ProbeStatus, RegistryProbe, ScanContext,
};
use layerlens_deps_audit::version::VersionRange;

/// 로컬 gem DB 기반 advisory 클라이언트 — 네트워크 없이 동작
struct LocalAdvisories {
    gems: GemAdvisoryDb,
    npm_calls: Mutex<Vec<String>>,
}

impl AdvisoryClient for LocalAdvisories {
    async fn check_package(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
    ) -> Result<Vec<String>, DepsAuditError> {
        match ecosystem {
            Ecosystem::RubyGems => Ok(self.gems.search(name, version)),
            Ecosystem::Npm => {
                self.npm_calls
                    .lock()
                    .unwrap()
                    .push(format!("{name}@{version}"));
                Ok(Vec::new())
            }
        }
    }

    async fn advisory_details(&self, id: &str) -> Result<Advisory, DepsAuditError> {
        self.gems
            .find(id)
            .ok_or_else(|| DepsAuditError::Http(format!("unknown advisory {id}")))
    }
}

struct AllPresentProbe;

impl RegistryProbe for AllPresentProbe {
    async fn probe(
        &self,
        _ecosystem: Ecosystem,
        _name: &str,
    ) -> Result<ProbeStatus, DepsAuditError> {
        Ok(ProbeStatus::Present)
    }
}

fn gem_db() -> GemAdvisoryDb {
    GemAdvisoryDb::from_entries(vec![GemAdvisoryEntry {
        id: "GHSA-rexml-dos".to_owned(),
        gem: "rexml".to_owned(),
        title: "REXML ReDoS".to_owned(),
        url: "https://example.com/GHSA-rexml-dos".to_owned(),
        affected_ranges: vec![VersionRange {
            introduced: None,
            fixed: Some("3.2.7".to_owned()),
        }],
    }])
}

fn analyzer() -> (DependencyAnalyzer, Arc<LocalAdvisories>) {
    let advisories = Arc::new(LocalAdvisories {
        gems: gem_db(),
        npm_calls: Mutex::new(Vec::new()),
    });
    let analyzer = DependencyAnalyzer::new(advisories.clone(), Arc::new(AllPresentProbe));
    (analyzer, advisories)
}

const GEMFILE_LOCK: &str = "GEM
  remote: https://rubygems.org/
  specs:
    rake (13.1.0)
    rexml (3.2.6)
";

#[tokio::test]
async fn gemfile_lock_matched_against_local_db() {
    let (analyzer, _) = analyzer();
    let ctx = ScanContext::new();

    let outcome = analyzer
        .analyze("app/Gemfile.lock", GEMFILE_LOCK.as_bytes(), &ctx)
        .await
        .unwrap();

    assert_eq!(outcome.issues.len(), 1);
    let issue = &outcome.issues[0];
    assert_eq!(issue.package, "rexml");
    assert_eq!(issue.version, "3.2.6");
    assert_eq!(issue.ecosystem, Ecosystem::RubyGems);
    assert!(issue.title.contains("GHSA-rexml-dos"));
    assert!(outcome.errors.is_empty());
}

#[tokio::test]
async fn same_lockfile_in_two_layers_analyzed_once() {
    let lock = r#"{ "packages": { "node_modules/left-pad": { "version": "1.0.0" } } }"#;
    let (analyzer, advisories) = analyzer();
    let ctx = ScanContext::new();

    // 첫 번째 레이어
    analyzer
        .analyze("app/package-lock.json", lock.as_bytes(), &ctx)
        .await
        .unwrap();
    // 두 번째 레이어 — 같은 경로
    let err = analyzer
        .analyze("app/package-lock.json", lock.as_bytes(), &ctx)
        .await
        .unwrap_err();

    assert!(err.is_soft_skip());
    assert_eq!(
        advisories.npm_calls.lock().unwrap().as_slice(),
        ["left-pad@1.0.0"]
    );
}

#[tokio::test]
async fn yarn_v1_flows_through_npm_lookup() {
    let yarn = "lodash@^4.17.21:\n  version \"4.17.21\"\n";
    let (analyzer, advisories) = analyzer();
    let ctx = ScanContext::new();

    let outcome = analyzer
        .analyze("srv/yarn.lock", yarn.as_bytes(), &ctx)
        .await
        .unwrap();

    assert!(outcome.issues.is_empty());
    assert_eq!(
        advisories.npm_calls.lock().unwrap().as_slice(),
        ["lodash@4.17.21"]
    );
}

#[tokio::test]
async fn yarn_berry_is_rejected_with_parse_error() {
    let berry = "__metadata:\n  version: 6\n";
    let (analyzer, _) = analyzer();
    let ctx = ScanContext::new();

    let err = analyzer
        .analyze("srv/yarn.lock", berry.as_bytes(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, DepsAuditError::Parse { .. }));
    assert!(!err.is_soft_skip());
}
