//! 도메인 타입 — 스캐너 전역에서 사용되는 공통 타입
//!
//! 이미지 참조, 레이어 식별자, 스캔 범위(scope), 발견 항목 등
//! 모든 크레이트가 공유하는 데이터 구조를 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ImageError;

/// 컨테이너 이미지 참조
///
/// `repo[:tag]` 또는 `registry/repo[:tag]` 형식의 사용자 입력을 파싱한 결과입니다.
/// 레지스트리가 생략되면 Docker Hub(`index.docker.io`)로 간주합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// 레지스트리 호스트 (예: `index.docker.io`, `ghcr.io`)
    pub registry: String,
    /// 저장소 경로 (예: `nginx`, `owner/app`)
    pub repository: String,
    /// 태그 (지정된 경우)
    pub tag: Option<String>,
}

impl ImageRef {
    /// 이미지 참조 문자열을 파싱합니다.
    ///
    /// 첫 경로 세그먼트에 `.` 또는 `:`이 포함되거나 `localhost`인 경우에만
    /// 레지스트리 호스트로 해석합니다. 포트가 붙은 레지스트리(`reg:5000/app`)와
    /// 태그(`app:1.0`)를 구분하기 위해 마지막 `/` 뒤의 `:`만 태그 구분자로 봅니다.
    pub fn parse(reference: &str) -> Result<Self, ImageError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageError::InvalidReference {
                reference: reference.to_owned(),
                reason: "empty reference".to_owned(),
            });
        }

        let (path, tag) = match split_tag(reference) {
            Some((_, tag)) if tag.is_empty() => {
                return Err(ImageError::InvalidReference {
                    reference: reference.to_owned(),
                    reason: "empty tag".to_owned(),
                });
            }
            Some((path, tag)) => (path, Some(tag.to_owned())),
            None => (reference, None),
        };

        let mut segments = path.splitn(2, '/');
        let first = segments.next().unwrap_or_default();
        let rest = segments.next();

        // `aws`는 ECR 축약형 레지스트리 이름 (`aws/{account}/{name}`)
        let is_registry_host = first.contains('.')
            || first.contains(':')
            || first == "localhost"
            || first == "aws";
        let (registry, repository) = match rest {
            Some(rest) if is_registry_host => (first.to_owned(), rest.to_owned()),
            _ => ("index.docker.io".to_owned(), path.to_owned()),
        };

        if repository.is_empty() || repository.contains(char::is_whitespace) {
            return Err(ImageError::InvalidReference {
                reference: reference.to_owned(),
                reason: format!("invalid repository '{repository}'"),
            });
        }

        Ok(Self {
            registry,
            repository,
            tag,
        })
    }

    /// 특정 태그에 대한 보고서 대상 문자열(`repo:tag`)을 생성합니다.
    pub fn target_for(&self, tag: &str) -> String {
        format!("{}:{}", self.repository, tag)
    }

    /// AWS ECR 호스트인 경우 (계정 ID, 리전)을 반환합니다.
    ///
    /// 호스트 형식: `{account}.dkr.ecr.{region}.amazonaws.com`
    pub fn ecr_parts(&self) -> Option<(&str, &str)> {
        let rest = self.registry.strip_suffix(".amazonaws.com")?;
        let (account, rest) = rest.split_once(".dkr.ecr.")?;
        if account.is_empty() || rest.is_empty() {
            return None;
        }
        Some((account, rest))
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{tag}")?;
        }
        Ok(())
    }
}

/// 마지막 `/` 뒤에 오는 `:`만 태그 구분자로 취급합니다.
fn split_tag(reference: &str) -> Option<(&str, &str)> {
    let colon = reference.rfind(':')?;
    let slash = reference.rfind('/').map_or(0, |i| i + 1);
    if colon < slash {
        return None;
    }
    Some((&reference[..colon], &reference[colon + 1..]))
}

/// 레이어 식별자
///
/// 압축 레이어는 digest, 비압축 레이어는 diff ID를 사용합니다.
/// 보고서에서 레이어를 식별하는 키입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerId {
    /// 알고리즘 접두사가 붙은 16진수 digest (예: `sha256:ab12...`)
    pub digest: String,
    /// 압축 blob의 digest인지 여부 (false면 diff ID)
    pub compressed: bool,
}

impl LayerId {
    /// 압축 blob digest로 레이어 식별자를 생성합니다.
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            compressed: true,
        }
    }

    /// 비압축 diff ID로 레이어 식별자를 생성합니다.
    pub fn from_diff_id(diff_id: impl Into<String>) -> Self {
        Self {
            digest: diff_id.into(),
            compressed: false,
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest)
    }
}

/// 시크릿이 발견된 위치(scope)
///
/// 레이어 내부 파일, 이미지 히스토리 명령, 환경 변수 중 하나입니다.
/// 환경 변수는 루트 파일시스템의 첫 diff ID를 위치로 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// 특정 레이어의 파일
    Layer(LayerId),
    /// 이미지 히스토리 엔트리 (인덱스)
    History(usize),
    /// 이미지 설정의 환경 변수
    Env {
        /// 루트 파일시스템 첫 diff ID
        diff_id: String,
    },
}

impl Scope {
    /// 보고 문구에 들어가는 위치 분류를 반환합니다.
    pub fn place(&self) -> &'static str {
        match self {
            Self::Layer(_) | Self::Env { .. } => "Layer",
            Self::History(_) => "History",
        }
    }

    /// 보고 문구에 들어가는 위치 식별자를 반환합니다.
    pub fn location(&self) -> String {
        match self {
            Self::Layer(id) => id.digest.clone(),
            Self::History(index) => format!("history:{index}"),
            Self::Env { diff_id } => diff_id.clone(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.place(), self.location())
    }
}

/// 활성화된 스캔 종류 집합
///
/// secrets / vuln / assets 세 가지를 독립적으로 켜고 끌 수 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSet {
    secrets: bool,
    vuln: bool,
    assets: bool,
}

impl Default for ScanSet {
    fn default() -> Self {
        Self::all()
    }
}

impl ScanSet {
    /// 세 가지 스캔을 모두 활성화합니다.
    pub fn all() -> Self {
        Self {
            secrets: true,
            vuln: true,
            assets: true,
        }
    }

    /// 쉼표로 구분된 스캔 목록을 파싱합니다.
    ///
    /// 빈 문자열은 전체 활성화를 의미합니다. 알 수 없는 이름은 경고 후 무시합니다.
    pub fn from_csv(csv: &str) -> Self {
        if csv.trim().is_empty() {
            return Self::all();
        }

        let mut set = Self {
            secrets: false,
            vuln: false,
            assets: false,
        };
        for name in csv.split(',') {
            match name.trim() {
                "secrets" => set.secrets = true,
                "vuln" => set.vuln = true,
                "assets" => set.assets = true,
                "" => {}
                other => tracing::warn!(scan = %other, "unknown scan kind, ignoring"),
            }
        }
        set
    }

    /// 시크릿 스캔 활성화 여부
    pub fn secrets(&self) -> bool {
        self.secrets
    }

    /// 취약점 스캔 활성화 여부
    pub fn vuln(&self) -> bool {
        self.vuln
    }

    /// 자산 추출 활성화 여부
    pub fn assets(&self) -> bool {
        self.assets
    }
}

impl fmt::Display for ScanSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.secrets {
            names.push("secrets");
        }
        if self.vuln {
            names.push("vuln");
        }
        if self.assets {
            names.push("assets");
        }
        write!(f, "{}", names.join(","))
    }
}

/// 패키지 생태계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ecosystem {
    /// JavaScript/TypeScript (package-lock.json, yarn.lock)
    #[serde(rename = "NPM")]
    Npm,
    /// Ruby (Gemfile.lock)
    #[serde(rename = "GEM")]
    RubyGems,
}

impl Ecosystem {
    /// 외부 advisory API 경로에 쓰이는 소문자 이름을 반환합니다.
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::RubyGems => "rubygems",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npm => write!(f, "NPM"),
            Self::RubyGems => write!(f, "GEM"),
        }
    }
}

/// 발견된 시크릿
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretIssue {
    /// 사람이 읽는 발견 설명 (발견 위치 포함)
    #[serde(rename = "Issue")]
    pub issue: String,
    /// 파일 경로 (또는 `history:{n}` / `ENV`)
    #[serde(rename = "Path")]
    pub path: String,
    /// 매칭된 정규식 항목의 ID
    #[serde(rename = "Type")]
    pub kind: String,
    /// 매칭된 원문
    #[serde(rename = "Secret")]
    pub secret: String,
}

impl SecretIssue {
    /// 중복 제거 키: (종류, 트리밍된 시크릿, 경로)
    ///
    /// 시크릿 원문은 백틱과 큰따옴표를 제거한 뒤 비교합니다.
    pub fn dedup_key(&self) -> (String, String, String) {
        (
            self.kind.clone(),
            trim_secret(&self.secret).to_owned(),
            self.path.clone(),
        )
    }
}

/// 시크릿 비교용 트리밍 — 백틱 제거 후 큰따옴표 제거
pub fn trim_secret(secret: &str) -> &str {
    secret.trim_matches('`').trim_matches('"')
}

/// 발견된 의존성 취약점
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnIssue {
    /// 취약점 제목 (advisory ID 등)
    #[serde(rename = "Title")]
    pub title: String,
    /// 상세 설명
    #[serde(rename = "Issue")]
    pub issue: String,
    /// 취약점이 발견된 lockfile 경로
    #[serde(rename = "File")]
    pub file: String,
    /// 패키지 이름
    #[serde(rename = "Package")]
    pub package: String,
    /// 패키지 버전
    #[serde(rename = "Version")]
    pub version: String,
    /// 패키지 생태계
    #[serde(rename = "Ecosystem")]
    pub ecosystem: Ecosystem,
}

/// 등록 가능 도메인과 그 하위 도메인 목록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAndDom {
    /// 등록 가능(public suffix 기준) 도메인
    #[serde(rename = "Domain")]
    pub domain: String,
    /// 해당 도메인 아래에서 발견된 하위 도메인
    #[serde(rename = "Subdomains")]
    pub subdomains: Vec<String>,
}

/// 파일 내용에서 추출된 자산 (도메인, URL)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    /// 등록 가능 도메인별로 묶인 도메인 목록
    #[serde(rename = "Domains")]
    pub domains: Vec<SubAndDom>,
    /// 발견된 URL 목록
    #[serde(rename = "Urls")]
    pub urls: Vec<String>,
}

impl Assets {
    /// 다른 Assets의 내용을 흡수합니다. 중복 제거는 `make_unique`에서 수행합니다.
    pub fn merge(&mut self, other: Assets) {
        self.domains.extend(other.domains);
        self.urls.extend(other.urls);
    }

    /// 도메인과 URL을 중복 제거하고 정렬합니다.
    ///
    /// 도메인은 등록 가능 도메인 기준으로 병합되며 하위 도메인 집합을 합집합합니다.
    /// 부모 도메인과 동일한 하위 도메인은 제외됩니다.
    pub fn make_unique(&mut self) {
        use std::collections::{BTreeMap, BTreeSet};

        let mut by_domain: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in self.domains.drain(..) {
            let subs = by_domain.entry(entry.domain.clone()).or_default();
            for sub in entry.subdomains {
                if sub != entry.domain {
                    subs.insert(sub);
                }
            }
        }
        self.domains = by_domain
            .into_iter()
            .map(|(domain, subs)| SubAndDom {
                domain,
                subdomains: subs.into_iter().collect(),
            })
            .collect();

        let urls: BTreeSet<String> = self.urls.drain(..).collect();
        self.urls = urls.into_iter().collect();
    }

    /// 도메인도 URL도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.urls.is_empty()
    }
}

/// 태그 하나의 스캔 결과
///
/// 스캔 완료 후에는 불변으로 취급합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalOutput {
    /// 스캔 대상 (`repo:tag`)
    #[serde(rename = "Target")]
    pub target: String,
    /// 발견된 시크릿 목록
    #[serde(rename = "Secrets")]
    pub secrets: Vec<SecretIssue>,
    /// 발견된 취약점 목록
    #[serde(rename = "Vulnerability")]
    pub vulnerabilities: Vec<VulnIssue>,
    /// 추출된 자산
    #[serde(rename = "Assets")]
    pub assets: Assets,
}

impl FinalOutput {
    /// 대상 문자열로 빈 결과를 생성합니다.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }
}
