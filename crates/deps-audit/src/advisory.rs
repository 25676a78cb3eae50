//! Advisory 조회 — deps.dev HTTP API 및 로컬 RubyGems advisory DB
//!
//! [`AdvisoryClient`] trait이 조회 인터페이스입니다. 운영 구현은
//! [`DefaultAdvisories`](NPM은 deps.dev, RubyGems는 로컬 DB)이며,
//! 테스트는 mock 구현을 사용합니다.
//!
//! deps.dev 요청은 세마포어로 동시성을 제한하여 (기본 8)
//! 레이어 병렬 처리 중에도 서비스에 과도한 부하를 주지 않습니다.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use layerlens_core::config::ScanConfig;
use layerlens_core::types::Ecosystem;

use crate::error::DepsAuditError;
use crate::version::{VersionRange, is_affected};

/// dyn-compatible Future 타입 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// URL 경로 세그먼트 인코딩 집합
///
/// `/`, `;`, `,`, `?`는 이스케이프하고 `@`, `:`, `$`, `&`, `+`, `=`는
/// 경로 세그먼트에서 예약 의미가 없으므로 그대로 둡니다.
/// scoped 패키지(`@org/pkg`)는 `@org%2Fpkg`로 인코딩됩니다.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'@')
    .remove(b':')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'=');

/// 패키지 이름을 URL 경로 세그먼트로 인코딩합니다 (`@scope/name` 등).
fn escape_name(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// 조회된 advisory 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    /// Advisory ID (예: GHSA-xxxx-xxxx-xxxx)
    pub id: String,
    /// 제목
    pub title: String,
    /// 상세 페이지 URL
    pub url: String,
    /// CVSS v3 점수 (있을 경우)
    pub cvss3_score: Option<f64>,
}

/// Advisory 조회 인터페이스
///
/// `check_package`는 영향을 주는 advisory ID 목록을,
/// `advisory_details`는 개별 advisory 레코드를 반환합니다.
pub trait AdvisoryClient: Send + Sync {
    /// 패키지 버전에 영향을 주는 advisory ID를 조회합니다.
    fn check_package(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
    ) -> impl Future<Output = Result<Vec<String>, DepsAuditError>> + Send;

    /// advisory 상세 정보를 조회합니다.
    fn advisory_details(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Advisory, DepsAuditError>> + Send;
}

/// dyn-compatible advisory 클라이언트
///
/// `AdvisoryClient`는 RPITIT를 사용하므로 `dyn AdvisoryClient`가 불가합니다.
/// `AdvisoryClient` 구현 타입은 blanket impl으로 자동으로 이 trait도 구현하며,
/// `Arc<dyn DynAdvisoryClient>`로 동적 공유가 가능해집니다.
pub trait DynAdvisoryClient: Send + Sync {
    /// 패키지 버전에 영향을 주는 advisory ID를 조회합니다.
    fn check_package<'a>(
        &'a self,
        ecosystem: Ecosystem,
        name: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, DepsAuditError>>;

    /// advisory 상세 정보를 조회합니다.
    fn advisory_details<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Advisory, DepsAuditError>>;
}

impl<T: AdvisoryClient> DynAdvisoryClient for T {
    fn check_package<'a>(
        &'a self,
        ecosystem: Ecosystem,
        name: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, DepsAuditError>> {
        Box::pin(AdvisoryClient::check_package(self, ecosystem, name, version))
    }

    fn advisory_details<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Advisory, DepsAuditError>> {
        Box::pin(AdvisoryClient::advisory_details(self, id))
    }
}

// --- deps.dev HTTP 클라이언트 ---

/// deps.dev 패키지 버전 응답
#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(default)]
    advisories: Vec<AdvisoryKey>,
}

#[derive(Debug, Deserialize)]
struct AdvisoryKey {
    #[serde(default)]
    id: String,
}

/// deps.dev advisory 상세 응답
#[derive(Debug, Deserialize)]
struct AdvisoryDetail {
    #[serde(rename = "advisoryKey")]
    key: Option<AdvisoryKey>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default, rename = "cvss3Score")]
    cvss3_score: Option<f64>,
}

/// deps.dev API 클라이언트
///
/// 모든 요청에 per-request 타임아웃이 적용되고,
/// 동시 요청 수는 세마포어로 제한됩니다.
pub struct DepsDevClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Arc<Semaphore>,
}

impl DepsDevClient {
    /// 설정에서 클라이언트를 생성합니다.
    pub fn new(config: &ScanConfig) -> Result<Self, DepsAuditError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| DepsAuditError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: "https://api.deps.dev".to_owned(),
            limiter: Arc::new(Semaphore::new(config.advisory_concurrency)),
        })
    }

    /// API 기본 URL을 교체합니다 (테스트/프록시용).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 패키지 버전 조회 URL을 구성합니다.
    fn version_url(&self, ecosystem: Ecosystem, name: &str, version: &str) -> String {
        format!(
            "{}/v3/systems/{}/packages/{}/versions/{}",
            self.base_url,
            ecosystem.api_name(),
            escape_name(name),
            version,
        )
    }
}

impl AdvisoryClient for DepsDevClient {
    async fn check_package(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
    ) -> Result<Vec<String>, DepsAuditError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| DepsAuditError::Http("advisory limiter closed".to_owned()))?;

        let url = self.version_url(ecosystem, name, version);
        let advisory_err = |reason: String| DepsAuditError::Advisory {
            package: name.to_owned(),
            version: version.to_owned(),
            reason,
        };

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| advisory_err(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(advisory_err(format!("HTTP status {}", resp.status())));
        }

        let body: VersionResponse = resp
            .json()
            .await
            .map_err(|e| advisory_err(format!("invalid response: {e}")))?;

        Ok(body
            .advisories
            .into_iter()
            .map(|key| key.id)
            .filter(|id| !id.is_empty())
            .collect())
    }

    async fn advisory_details(&self, id: &str) -> Result<Advisory, DepsAuditError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| DepsAuditError::Http("advisory limiter closed".to_owned()))?;

        let url = format!("{}/v3/advisories/{}", self.base_url, escape_name(id));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DepsAuditError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DepsAuditError::Http(format!(
                "HTTP status {} for advisory {id}",
                resp.status()
            )));
        }

        let detail: AdvisoryDetail = resp
            .json()
            .await
            .map_err(|e| DepsAuditError::Http(format!("invalid advisory response: {e}")))?;

        Ok(Advisory {
            id: detail.key.map(|k| k.id).unwrap_or_else(|| id.to_owned()),
            title: detail.title,
            url: detail.url,
            cvss3_score: detail.cvss3_score,
        })
    }
}

// --- 로컬 RubyGems advisory DB ---

/// 로컬 advisory DB 엔트리
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GemAdvisoryEntry {
    /// Advisory ID
    pub id: String,
    /// 대상 gem 이름
    pub gem: String,
    /// 제목
    #[serde(default)]
    pub title: String,
    /// 상세 페이지 URL
    #[serde(default)]
    pub url: String,
    /// 영향받는 버전 범위
    #[serde(default)]
    pub affected_ranges: Vec<VersionRange>,
}

/// 로컬 RubyGems advisory 데이터베이스
///
/// JSON 배열 파일(`GemAdvisoryEntry[]`)에서 로드되며,
/// gem 이름으로 인덱싱되어 오프라인 조회가 가능합니다.
#[derive(Debug, Default)]
pub struct GemAdvisoryDb {
    entries: Vec<GemAdvisoryEntry>,
    index: HashMap<String, Vec<usize>>,
}

impl GemAdvisoryDb {
    /// 빈 데이터베이스를 생성합니다.
    pub fn empty() -> Self {
        Self::default()
    }

    /// 엔트리 목록으로 데이터베이스를 생성합니다.
    pub fn from_entries(entries: Vec<GemAdvisoryEntry>) -> Self {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            index.entry(entry.gem.clone()).or_default().push(idx);
        }
        Self { entries, index }
    }

    /// JSON 문자열에서 데이터베이스를 파싱합니다.
    pub fn from_json(json: &str) -> Result<Self, DepsAuditError> {
        let entries: Vec<GemAdvisoryEntry> =
            serde_json::from_str(json).map_err(|e| DepsAuditError::Db {
                path: "<inline>".to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Self::from_entries(entries))
    }

    /// 파일에서 데이터베이스를 로드합니다.
    ///
    /// 동기 I/O를 수행합니다. async 컨텍스트에서는 `spawn_blocking`으로 감싸세요.
    pub fn load(path: &std::path::Path) -> Result<Self, DepsAuditError> {
        let json = std::fs::read_to_string(path).map_err(|e| DepsAuditError::Db {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json).map_err(|e| match e {
            DepsAuditError::Db { reason, .. } => DepsAuditError::Db {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// 엔트리 수를 반환합니다.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// gem 버전에 영향을 주는 advisory ID를 검색합니다.
    pub fn search(&self, gem: &str, version: &str) -> Vec<String> {
        let Some(indices) = self.index.get(gem) else {
            return Vec::new();
        };
        indices
            .iter()
            .filter_map(|&idx| self.entries.get(idx))
            .filter(|entry| is_affected(version, &entry.affected_ranges))
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// ID로 advisory를 찾습니다.
    pub fn find(&self, id: &str) -> Option<Advisory> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| Advisory {
                id: entry.id.clone(),
                title: entry.title.clone(),
                url: entry.url.clone(),
                cvss3_score: None,
            })
    }
}

// --- 기본 라우팅 구현 ---

/// 운영용 advisory 라우터
///
/// NPM은 deps.dev HTTP API로, RubyGems는 로컬 advisory DB로 조회합니다.
pub struct DefaultAdvisories {
    deps_dev: DepsDevClient,
    gems: GemAdvisoryDb,
}

impl DefaultAdvisories {
    /// deps.dev 클라이언트와 gem DB로 라우터를 생성합니다.
    pub fn new(deps_dev: DepsDevClient, gems: GemAdvisoryDb) -> Self {
        Self { deps_dev, gems }
    }
}

impl AdvisoryClient for DefaultAdvisories {
    async fn check_package(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
    ) -> Result<Vec<String>, DepsAuditError> {
        match ecosystem {
            Ecosystem::Npm => AdvisoryClient::check_package(&self.deps_dev, ecosystem, name, version).await,
            Ecosystem::RubyGems => Ok(self.gems.search(name, version)),
        }
    }

    async fn advisory_details(&self, id: &str) -> Result<Advisory, DepsAuditError> {
        if let Some(advisory) = self.gems.find(id) {
            return Ok(advisory);
        }
        AdvisoryClient::advisory_details(&self.deps_dev, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_name_handles_scoped_packages() {
        assert_eq!(escape_name("lodash"), "lodash");
        // `@`는 경로 세그먼트에서 리터럴, `/`만 이스케이프
        assert_eq!(escape_name("@types/node"), "@types%2Fnode");
        assert_eq!(escape_name("a.b-c_d~e"), "a.b-c_d~e");
    }

    #[test]
    fn version_url_shape() {
        let config = ScanConfig::default();
        let client = DepsDevClient::new(&config).unwrap();
        let url = client.version_url(Ecosystem::Npm, "@types/node", "20.11.5");
        assert_eq!(
            url,
            "https://api.deps.dev/v3/systems/npm/packages/@types%2Fnode/versions/20.11.5"
        );
    }

    #[test]
    fn version_url_with_custom_base() {
        let config = ScanConfig::default();
        let client = DepsDevClient::new(&config)
            .unwrap()
            .with_base_url("http://127.0.0.1:9000");
        let url = client.version_url(Ecosystem::RubyGems, "rake", "13.1.0");
        assert!(url.starts_with("http://127.0.0.1:9000/v3/systems/rubygems/"));
    }

    fn sample_db() -> GemAdvisoryDb {
        GemAdvisoryDb::from_entries(vec![GemAdvisoryEntry {
            id: "GHSA-vvfq-8hwr-qm4m".to_owned(),
            gem: "rexml".to_owned(),
            title: "REXML denial of service".to_owned(),
            url: "https://github.com/advisories/GHSA-vvfq-8hwr-qm4m".to_owned(),
            affected_ranges: vec![VersionRange {
                introduced: None,
                fixed: Some("3.2.7".to_owned()),
            }],
        }])
    }

    #[test]
    fn gem_db_search_matches_affected_version() {
        let db = sample_db();
        assert_eq!(db.search("rexml", "3.2.6"), vec!["GHSA-vvfq-8hwr-qm4m"]);
        assert!(db.search("rexml", "3.2.7").is_empty());
        assert!(db.search("rake", "13.1.0").is_empty());
    }

    #[test]
    fn gem_db_find_by_id() {
        let db = sample_db();
        let advisory = db.find("GHSA-vvfq-8hwr-qm4m").unwrap();
        assert!(advisory.title.contains("REXML"));
        assert!(db.find("GHSA-none").is_none());
    }

    #[test]
    fn gem_db_from_json_roundtrip() {
        let json = r#"[{"id": "GHSA-x", "gem": "rake", "affected_ranges": [{"introduced": null, "fixed": "13.0.0"}]}]"#;
        let db = GemAdvisoryDb::from_json(json).unwrap();
        assert_eq!(db.entry_count(), 1);
        assert_eq!(db.search("rake", "12.0.0"), vec!["GHSA-x"]);
    }

    #[test]
    fn gem_db_invalid_json_fails() {
        assert!(GemAdvisoryDb::from_json("nope").is_err());
    }

    #[test]
    fn gem_db_loads_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "GHSA-y", "gem": "rexml", "affected_ranges": []}}]"#
        )
        .unwrap();
        let db = GemAdvisoryDb::load(file.path()).unwrap();
        assert_eq!(db.entry_count(), 1);
    }

    #[test]
    fn gem_db_missing_file_fails() {
        let err = GemAdvisoryDb::load(std::path::Path::new("/nonexistent/gems.json")).unwrap_err();
        assert!(matches!(err, DepsAuditError::Db { .. }));
    }

    #[tokio::test]
    async fn default_advisories_route_gems_locally() {
        let config = ScanConfig::default();
        let advisories = DefaultAdvisories::new(DepsDevClient::new(&config).unwrap(), sample_db());
        // 로컬 DB 조회 — 네트워크에 닿지 않음
        let ids = AdvisoryClient::check_package(&advisories, Ecosystem::RubyGems, "rexml", "3.2.6")
            .await
            .unwrap();
        assert_eq!(ids, vec!["GHSA-vvfq-8hwr-qm4m"]);

        let advisory = AdvisoryClient::advisory_details(&advisories, "GHSA-vvfq-8hwr-qm4m")
            .await
            .unwrap();
        assert!(advisory.url.contains("github.com/advisories"));
    }

    #[tokio::test]
    async fn dyn_advisory_client_can_be_shared() {
        let config = ScanConfig::default();
        let advisories: Arc<dyn DynAdvisoryClient> = Arc::new(DefaultAdvisories::new(
            DepsDevClient::new(&config).unwrap(),
            sample_db(),
        ));
        let ids = advisories
            .check_package(Ecosystem::RubyGems, "rexml", "3.2.0")
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
    }
}
