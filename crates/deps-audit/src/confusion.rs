//! Dependency confusion 점검 — 공개 레지스트리 부재 탐지
//!
//! lockfile이 참조하는 패키지가 공개 레지스트리에 존재하지 않으면(404)
//! 내부 패키지 이름이 공개 레지스트리에서 선점(squatting)될 수 있는
//! 신호로 보고합니다. 404 이외의 상태는 발견으로 이어지지 않습니다.

use std::future::Future;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use layerlens_core::config::ScanConfig;
use layerlens_core::types::Ecosystem;

use crate::advisory::BoxFuture;
use crate::error::DepsAuditError;

/// 공개 레지스트리 조회 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// 패키지가 공개 레지스트리에 존재함
    Present,
    /// 패키지가 공개 레지스트리에 없음 (404)
    Missing,
}

/// 공개 레지스트리 존재 여부 조회 인터페이스
pub trait RegistryProbe: Send + Sync {
    /// 패키지가 공개 레지스트리에 존재하는지 확인합니다.
    fn probe(
        &self,
        ecosystem: Ecosystem,
        name: &str,
    ) -> impl Future<Output = Result<ProbeStatus, DepsAuditError>> + Send;
}

/// dyn-compatible 레지스트리 probe
///
/// `RegistryProbe` 구현 타입은 blanket impl으로 자동으로 이 trait도 구현합니다.
pub trait DynRegistryProbe: Send + Sync {
    /// 패키지가 공개 레지스트리에 존재하는지 확인합니다.
    fn probe<'a>(
        &'a self,
        ecosystem: Ecosystem,
        name: &'a str,
    ) -> BoxFuture<'a, Result<ProbeStatus, DepsAuditError>>;
}

impl<T: RegistryProbe> DynRegistryProbe for T {
    fn probe<'a>(
        &'a self,
        ecosystem: Ecosystem,
        name: &'a str,
    ) -> BoxFuture<'a, Result<ProbeStatus, DepsAuditError>> {
        Box::pin(RegistryProbe::probe(self, ecosystem, name))
    }
}

/// URL 경로 세그먼트 인코딩 집합 — `@` 등 경로에서 예약 의미가 없는
/// 문자는 그대로 두고 `/`는 이스케이프합니다.
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

/// HTTP 기반 공개 레지스트리 probe
///
/// NPM은 `registry.npmjs.org`, RubyGems는 `rubygems.org` API를 조회합니다.
pub struct HttpRegistryProbe {
    http: reqwest::Client,
    npm_base: String,
    gems_base: String,
}

impl HttpRegistryProbe {
    /// 설정에서 probe를 생성합니다.
    pub fn new(config: &ScanConfig) -> Result<Self, DepsAuditError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| DepsAuditError::Http(e.to_string()))?;

        Ok(Self {
            http,
            npm_base: "https://registry.npmjs.org".to_owned(),
            gems_base: "https://rubygems.org".to_owned(),
        })
    }

    /// 레지스트리 기본 URL을 교체합니다 (테스트/미러용).
    pub fn with_bases(mut self, npm_base: impl Into<String>, gems_base: impl Into<String>) -> Self {
        self.npm_base = npm_base.into();
        self.gems_base = gems_base.into();
        self
    }

    /// 생태계별 패키지 조회 URL을 구성합니다.
    fn package_url(&self, ecosystem: Ecosystem, name: &str) -> String {
        let escaped = utf8_percent_encode(name, PATH_SEGMENT);
        match ecosystem {
            Ecosystem::Npm => format!("{}/{}", self.npm_base, escaped),
            Ecosystem::RubyGems => format!("{}/api/v1/gems/{}.json", self.gems_base, escaped),
        }
    }
}

impl RegistryProbe for HttpRegistryProbe {
    async fn probe(
        &self,
        ecosystem: Ecosystem,
        name: &str,
    ) -> Result<ProbeStatus, DepsAuditError> {
        let url = self.package_url(ecosystem, name);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DepsAuditError::Http(format!("registry probe failed for {name}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(package = %name, ecosystem = %ecosystem, "package missing from public registry");
            return Ok(ProbeStatus::Missing);
        }

        Ok(ProbeStatus::Present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npm_package_url_shape() {
        let probe = HttpRegistryProbe::new(&ScanConfig::default()).unwrap();
        assert_eq!(
            probe.package_url(Ecosystem::Npm, "@corp/internal-utils"),
            "https://registry.npmjs.org/@corp%2Finternal-utils"
        );
    }

    #[test]
    fn gems_package_url_shape() {
        let probe = HttpRegistryProbe::new(&ScanConfig::default()).unwrap();
        assert_eq!(
            probe.package_url(Ecosystem::RubyGems, "rexml"),
            "https://rubygems.org/api/v1/gems/rexml.json"
        );
    }

    #[test]
    fn custom_bases_are_used() {
        let probe = HttpRegistryProbe::new(&ScanConfig::default())
            .unwrap()
            .with_bases("http://127.0.0.1:1", "http://127.0.0.1:2");
        assert!(probe
            .package_url(Ecosystem::Npm, "x")
            .starts_with("http://127.0.0.1:1/"));
        assert!(probe
            .package_url(Ecosystem::RubyGems, "x")
            .starts_with("http://127.0.0.1:2/"));
    }
}
