//! 의존성 분석 오케스트레이션
//!
//! [`DependencyAnalyzer`]는 lockfile 하나를 받아 파싱, advisory 조회,
//! dependency confusion 점검을 수행합니다. 개별 의존성의 일시적 실패는
//! 수집되어 [`AnalysisOutcome::errors`]로 합산 보고되며, 파일의 나머지
//! 의존성 분석을 중단시키지 않습니다.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use layerlens_core::types::{Ecosystem, VulnIssue};

use crate::advisory::{Advisory, DynAdvisoryClient};
use crate::confusion::{DynRegistryProbe, ProbeStatus};
use crate::context::ScanContext;
use crate::error::DepsAuditError;
use crate::lockfile::{LockfileParser, default_parsers};
use crate::types::Dependency;
use crate::version::clean_version;

/// lockfile 하나의 분석 결과
#[derive(Debug, Default)]
pub struct AnalysisOutcome {
    /// 발견된 취약점/confusion 이슈
    pub issues: Vec<VulnIssue>,
    /// 수집된 개별 의존성 에러 메시지
    pub errors: Vec<String>,
}

impl AnalysisOutcome {
    /// 수집된 에러를 하나의 메시지로 합칩니다.
    pub fn joint_error(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(format!(
            "encountered {} error(s) while checking dependencies: {}",
            self.errors.len(),
            self.errors.join("; "),
        ))
    }
}

/// 의존성 분석기
///
/// advisory 클라이언트와 레지스트리 probe는 trait object로 받아
/// 운영 구현과 테스트 mock을 같은 경로로 사용합니다.
pub struct DependencyAnalyzer {
    parsers: Vec<Box<dyn LockfileParser>>,
    advisories: Arc<dyn DynAdvisoryClient>,
    probe: Arc<dyn DynRegistryProbe>,
    gem_confusion_enabled: bool,
}

impl DependencyAnalyzer {
    /// 기본 파서 집합으로 분석기를 생성합니다.
    pub fn new(advisories: Arc<dyn DynAdvisoryClient>, probe: Arc<dyn DynRegistryProbe>) -> Self {
        Self {
            parsers: default_parsers(),
            advisories,
            probe,
            gem_confusion_enabled: false,
        }
    }

    /// RubyGems dependency confusion 점검을 켜거나 끕니다 (기본: 꺼짐).
    pub fn gem_confusion_enabled(mut self, enabled: bool) -> Self {
        self.gem_confusion_enabled = enabled;
        self
    }

    /// lockfile 하나를 분석합니다.
    ///
    /// # Errors
    ///
    /// - [`DepsAuditError::Unsupported`] — 알 수 없는 파일 형식 (soft-skip)
    /// - [`DepsAuditError::AlreadySeen`] — 이 스캔에서 이미 분석한 경로 (soft-skip)
    /// - [`DepsAuditError::NodeModules`] — node_modules 내부 lockfile (soft-skip)
    /// - [`DepsAuditError::Parse`] — lockfile 파싱 실패
    pub async fn analyze(
        &self,
        path: &str,
        content: &[u8],
        ctx: &ScanContext,
    ) -> Result<AnalysisOutcome, DepsAuditError> {
        let parser = self
            .parsers
            .iter()
            .find(|p| p.can_parse(path))
            .ok_or_else(|| DepsAuditError::Unsupported {
                path: path.to_owned(),
            })?;

        let ecosystem = parser.ecosystem();

        if ecosystem == Ecosystem::Npm && path.contains("node_modules") {
            return Err(DepsAuditError::NodeModules {
                path: path.to_owned(),
            });
        }

        if !ctx.try_mark(path) {
            return Err(DepsAuditError::AlreadySeen {
                path: path.to_owned(),
            });
        }

        info!(path = %path, "analyzing dependency file");

        let text = String::from_utf8_lossy(content);
        let deps = dedup_dependencies(parser.parse(&text, path)?);
        info!(path = %path, count = deps.len(), "found dependencies");

        let mut outcome = AnalysisOutcome::default();

        for dep in &deps {
            if ctx.is_cancelled() {
                debug!(path = %path, "scan cancelled, stopping dependency checks");
                break;
            }
            self.check_dependency(dep, ecosystem, path, &mut outcome).await;
        }

        Ok(outcome)
    }

    /// 의존성 하나에 대해 advisory 조회와 confusion 점검을 수행합니다.
    ///
    /// 실패는 `outcome.errors`에 수집되고 다음 의존성으로 진행합니다.
    async fn check_dependency(
        &self,
        dep: &Dependency,
        ecosystem: Ecosystem,
        path: &str,
        outcome: &mut AnalysisOutcome,
    ) {
        if let Some(version) = clean_version(&dep.version) {
            match self
                .advisories
                .check_package(ecosystem, &dep.name, &version)
                .await
            {
                Ok(ids) => {
                    for id in ids {
                        match self.advisories.advisory_details(&id).await {
                            Ok(advisory) => {
                                outcome.issues.push(vuln_issue(
                                    &advisory, path, dep, &version, ecosystem,
                                ));
                            }
                            Err(e) => outcome.errors.push(format!("{id}: {e}")),
                        }
                    }
                }
                Err(e) => outcome.errors.push(e.to_string()),
            }
        } else {
            debug!(dependency = %dep, "version is not concrete, skipping advisory lookup");
        }

        let probe_wanted = match ecosystem {
            Ecosystem::Npm => true,
            Ecosystem::RubyGems => self.gem_confusion_enabled,
        };
        if !probe_wanted {
            return;
        }

        match self.probe.probe(ecosystem, &dep.name).await {
            Ok(ProbeStatus::Missing) => {
                outcome.issues.push(confusion_issue(path, dep, ecosystem));
            }
            Ok(ProbeStatus::Present) => {}
            Err(e) => outcome.errors.push(e.to_string()),
        }
    }
}

/// advisory 매칭을 보고용 이슈로 변환합니다.
fn vuln_issue(
    advisory: &Advisory,
    path: &str,
    dep: &Dependency,
    version: &str,
    ecosystem: Ecosystem,
) -> VulnIssue {
    let title = if advisory.title.is_empty() {
        advisory.id.clone()
    } else {
        format!("{}: {}", advisory.id, advisory.title)
    };
    let reference = if advisory.url.is_empty() {
        advisory.id.clone()
    } else {
        advisory.url.clone()
    };

    VulnIssue {
        title,
        issue: format!(
            "Package {}@{} is affected by {} ({})",
            dep.name, version, advisory.id, reference,
        ),
        file: path.to_owned(),
        package: dep.name.clone(),
        version: version.to_owned(),
        ecosystem,
    }
}

/// 공개 레지스트리 부재를 보고용 이슈로 변환합니다.
fn confusion_issue(path: &str, dep: &Dependency, ecosystem: Ecosystem) -> VulnIssue {
    VulnIssue {
        title: format!("Dependency Confusion: {}", dep.name),
        issue: format!(
            "Package {} is missing from public registry and the name may be claimable",
            dep.name,
        ),
        file: path.to_owned(),
        package: dep.name.clone(),
        version: dep.version.clone(),
        ecosystem,
    }
}

/// `(이름, 버전)` 기준으로 중복을 제거하되 순서는 유지합니다.
///
/// package-lock v2는 `packages`와 `dependencies` 트리에 같은 의존성이
/// 두 번 나타나므로 여기서 한 번만 남깁니다.
fn dedup_dependencies(deps: Vec<Dependency>) -> Vec<Dependency> {
    let mut seen = HashSet::new();
    deps.into_iter()
        .filter(|dep| seen.insert((dep.name.clone(), dep.version.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::AdvisoryClient;
    use crate::confusion::RegistryProbe;
    use std::sync::Mutex;

    /// 조회 호출을 기록하는 mock advisory 클라이언트
    #[derive(Default)]
    struct MockAdvisories {
        calls: Mutex<Vec<String>>,
        advisories: Vec<(String, String, Vec<String>)>, // (name, version, ids)
        fail_for: Option<String>,
    }

    impl AdvisoryClient for MockAdvisories {
        async fn check_package(
            &self,
            _ecosystem: Ecosystem,
            name: &str,
            version: &str,
        ) -> Result<Vec<String>, DepsAuditError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{name}@{version}"));
            if self.fail_for.as_deref() == Some(name) {
                return Err(DepsAuditError::Advisory {
                    package: name.to_owned(),
                    version: version.to_owned(),
                    reason: "HTTP status 502".to_owned(),
                });
            }
            Ok(self
                .advisories
                .iter()
                .find(|(n, v, _)| n == name && v == version)
                .map(|(_, _, ids)| ids.clone())
                .unwrap_or_default())
        }

        async fn advisory_details(&self, id: &str) -> Result<Advisory, DepsAuditError> {
            Ok(Advisory {
                id: id.to_owned(),
                title: "test advisory".to_owned(),
                url: format!("https://example.com/{id}"),
                cvss3_score: Some(7.5),
            })
        }
    }

    /// 지정된 패키지만 404로 응답하는 mock probe
    #[derive(Default)]
    struct MockProbe {
        missing: Vec<String>,
        calls: Mutex<usize>,
    }

    impl RegistryProbe for MockProbe {
        async fn probe(
            &self,
            _ecosystem: Ecosystem,
            name: &str,
        ) -> Result<ProbeStatus, DepsAuditError> {
            *self.calls.lock().unwrap() += 1;
            if self.missing.iter().any(|m| m == name) {
                Ok(ProbeStatus::Missing)
            } else {
                Ok(ProbeStatus::Present)
            }
        }
    }

    fn analyzer_with(
        advisories: MockAdvisories,
        probe: MockProbe,
    ) -> (DependencyAnalyzer, Arc<MockAdvisories>, Arc<MockProbe>) {
        let advisories = Arc::new(advisories);
        let probe = Arc::new(probe);
        let analyzer = DependencyAnalyzer::new(advisories.clone(), probe.clone());
        (analyzer, advisories, probe)
    }

    const LOCK: &str = r#"{
  "packages": {
    "node_modules/left-pad": { "version": "1.0.0" }
  }
}"#;

    #[tokio::test]
    async fn unsupported_file_is_soft_skip() {
        let (analyzer, _, _) = analyzer_with(MockAdvisories::default(), MockProbe::default());
        let ctx = ScanContext::new();
        let err = analyzer
            .analyze("app/Cargo.lock", b"", &ctx)
            .await
            .unwrap_err();
        assert!(err.is_soft_skip());
    }

    #[tokio::test]
    async fn node_modules_lockfile_triggers_no_lookups() {
        let (analyzer, advisories, probe) =
            analyzer_with(MockAdvisories::default(), MockProbe::default());
        let ctx = ScanContext::new();
        let err = analyzer
            .analyze("node_modules/x/package-lock.json", LOCK.as_bytes(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, DepsAuditError::NodeModules { .. }));
        assert!(advisories.calls.lock().unwrap().is_empty());
        assert_eq!(*probe.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn second_occurrence_is_already_seen() {
        let (analyzer, advisories, _) =
            analyzer_with(MockAdvisories::default(), MockProbe::default());
        let ctx = ScanContext::new();

        analyzer
            .analyze("app/package-lock.json", LOCK.as_bytes(), &ctx)
            .await
            .unwrap();
        let err = analyzer
            .analyze("app/package-lock.json", LOCK.as_bytes(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, DepsAuditError::AlreadySeen { .. }));
        // 첫 분석의 1회만 조회됨
        assert_eq!(advisories.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn advisory_hits_become_issues() {
        let advisories = MockAdvisories {
            advisories: vec![(
                "left-pad".to_owned(),
                "1.0.0".to_owned(),
                vec!["GHSA-test-0001".to_owned()],
            )],
            ..Default::default()
        };
        let (analyzer, _, _) = analyzer_with(advisories, MockProbe::default());
        let ctx = ScanContext::new();

        let outcome = analyzer
            .analyze("app/package-lock.json", LOCK.as_bytes(), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.issues.len(), 1);
        let issue = &outcome.issues[0];
        assert!(issue.title.contains("GHSA-test-0001"));
        assert_eq!(issue.package, "left-pad");
        assert_eq!(issue.ecosystem, Ecosystem::Npm);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn missing_package_reports_confusion() {
        let probe = MockProbe {
            missing: vec!["internal-co-utils".to_owned()],
            ..Default::default()
        };
        let lock = r#"{ "packages": { "node_modules/internal-co-utils": { "version": "1.0.0" } } }"#;
        let (analyzer, _, _) = analyzer_with(MockAdvisories::default(), probe);
        let ctx = ScanContext::new();

        let outcome = analyzer
            .analyze("app/package-lock.json", lock.as_bytes(), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.issues.len(), 1);
        let issue = &outcome.issues[0];
        assert!(issue.issue.contains("missing from public registry"));
        assert_eq!(issue.package, "internal-co-utils");
        assert_eq!(issue.ecosystem, Ecosystem::Npm);
    }

    #[tokio::test]
    async fn transient_failure_collected_and_scan_continues() {
        let lock = r#"{
  "packages": {
    "node_modules/flaky": { "version": "2.0.0" },
    "node_modules/steady": { "version": "1.0.0" }
  }
}"#;
        let advisories = MockAdvisories {
            fail_for: Some("flaky".to_owned()),
            advisories: vec![(
                "steady".to_owned(),
                "1.0.0".to_owned(),
                vec!["GHSA-ok".to_owned()],
            )],
            ..Default::default()
        };
        let (analyzer, mock, _) = analyzer_with(advisories, MockProbe::default());
        let ctx = ScanContext::new();

        let outcome = analyzer
            .analyze("app/package-lock.json", lock.as_bytes(), &ctx)
            .await
            .unwrap();
        // flaky 실패에도 steady는 조회/보고됨
        assert_eq!(mock.calls.lock().unwrap().len(), 2);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.joint_error().unwrap().contains("502"));
    }

    #[tokio::test]
    async fn non_concrete_version_skips_lookup() {
        let lock = r#"{
  "dependencies": {
    "wildcard": { "version": "1.x" }
  }
}"#;
        let (analyzer, advisories, _) =
            analyzer_with(MockAdvisories::default(), MockProbe::default());
        let ctx = ScanContext::new();

        let outcome = analyzer
            .analyze("app/package-lock.json", lock.as_bytes(), &ctx)
            .await
            .unwrap();
        assert!(advisories.calls.lock().unwrap().is_empty());
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn gem_confusion_disabled_by_default() {
        let gemfile = "GEM\n  remote: https://rubygems.org/\n  specs:\n    internal-gem (1.0.0)\n";
        let probe = MockProbe {
            missing: vec!["internal-gem".to_owned()],
            ..Default::default()
        };
        let (analyzer, _, probe_ref) = analyzer_with(MockAdvisories::default(), probe);
        let ctx = ScanContext::new();

        let outcome = analyzer
            .analyze("app/Gemfile.lock", gemfile.as_bytes(), &ctx)
            .await
            .unwrap();
        assert!(outcome.issues.is_empty());
        assert_eq!(*probe_ref.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn gem_confusion_flag_enables_probe() {
        let gemfile = "GEM\n  remote: https://rubygems.org/\n  specs:\n    internal-gem (1.0.0)\n";
        let probe = MockProbe {
            missing: vec!["internal-gem".to_owned()],
            ..Default::default()
        };
        let advisories = Arc::new(MockAdvisories::default());
        let probe = Arc::new(probe);
        let analyzer =
            DependencyAnalyzer::new(advisories, probe.clone()).gem_confusion_enabled(true);
        let ctx = ScanContext::new();

        let outcome = analyzer
            .analyze("app/Gemfile.lock", gemfile.as_bytes(), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].ecosystem, Ecosystem::RubyGems);
    }

    #[test]
    fn dedup_preserves_order() {
        let deps = vec![
            Dependency::new("a", "1"),
            Dependency::new("b", "2"),
            Dependency::new("a", "1"),
            Dependency::new("a", "3"),
        ];
        let deduped = dedup_dependencies(deps);
        assert_eq!(
            deduped,
            vec![
                Dependency::new("a", "1"),
                Dependency::new("b", "2"),
                Dependency::new("a", "3"),
            ]
        );
    }
}
