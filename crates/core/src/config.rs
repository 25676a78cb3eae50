//! 설정 — 정규식 코퍼스, 제외 패턴, 스캔 파라미터
//!
//! [`RegexCorpus`]와 [`ExcludedPatterns`]는 시작 시 한 번 로드되어
//! 모든 태그 스캔에서 읽기 전용으로 공유됩니다.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 이름이 붙은 컴파일된 시크릿 탐지 패턴
///
/// 그룹 1이 있으면 중복 제거용 정규화 시크릿으로 사용됩니다.
#[derive(Debug)]
pub struct RegexEntry {
    /// 패턴 식별자 (보고서의 `Type` 필드)
    pub id: String,
    /// 컴파일된 패턴 — 파일 내용이 UTF-8이 아닐 수 있어 바이트 단위로 매칭합니다
    pub pattern: regex::bytes::Regex,
}

/// 시크릿 탐지 정규식 코퍼스
///
/// JSON 오브젝트 `{id: pattern}`에서 로드되며, 로드 후 불변입니다.
/// 결과 재현성을 위해 ID 순으로 정렬된 순서로 순회합니다.
#[derive(Debug, Default)]
pub struct RegexCorpus {
    entries: Vec<RegexEntry>,
}

impl RegexCorpus {
    /// JSON 문자열에서 코퍼스를 빌드합니다.
    ///
    /// 첫 번째 컴파일 실패에서 전체 로드가 실패합니다.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        // BTreeMap이라 id 정렬이 공짜로 따라옵니다
        let raw: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseFailed {
                path: "<inline>".to_owned(),
                reason: e.to_string(),
            })?;

        let mut entries = Vec::with_capacity(raw.len());
        for (id, pattern) in raw {
            let pattern = regex::bytes::Regex::new(&pattern).map_err(|e| {
                ConfigError::InvalidPattern {
                    id: id.clone(),
                    reason: e.to_string(),
                }
            })?;
            entries.push(RegexEntry { id, pattern });
        }

        Ok(Self { entries })
    }

    /// 파일에서 코퍼스를 로드합니다.
    ///
    /// 동기 I/O를 수행합니다. async 컨텍스트에서는 `spawn_blocking`으로 감싸세요.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_json_str(&json).map_err(|e| match e {
            ConfigError::ParseFailed { reason, .. } => ConfigError::ParseFailed {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// 패턴 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 코퍼스가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// ID 정렬 순서로 패턴을 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &RegexEntry> {
        self.entries.iter()
    }
}

/// 스캔에서 제외할 경로 패턴 목록
///
/// 하나라도 매칭되면 해당 tar 엔트리는 내용 읽기 전에 건너뜁니다.
#[derive(Debug, Default)]
pub struct ExcludedPatterns {
    patterns: Vec<regex::Regex>,
}

impl ExcludedPatterns {
    /// 패턴 문자열 목록을 컴파일합니다.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let raw = raw.as_ref();
            let regex = regex::Regex::new(raw).map_err(|e| ConfigError::InvalidPattern {
                id: raw.to_owned(),
                reason: e.to_string(),
            })?;
            compiled.push(regex);
        }
        Ok(Self { patterns: compiled })
    }

    /// JSON 배열 파일에서 제외 패턴을 로드합니다.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let raw: Vec<String> = serde_json::from_str(&json).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_patterns(&raw)
    }

    /// 바이너리/미디어 파일과 가상 파일시스템을 거르는 기본 패턴입니다.
    pub fn default_patterns() -> Self {
        // 기본 패턴은 항상 컴파일 가능해야 합니다
        Self::from_patterns(&[
            r"^proc/",
            r"^sys/",
            r"^dev/",
            r"\.(png|jpe?g|gif|ico|svg|woff2?|ttf|eot|mp4|so(\.\d+)*)$",
        ])
        .unwrap_or_default()
    }

    /// 경로가 제외 대상인지 확인합니다.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(path))
    }
}

/// 스캔 파이프라인 파라미터
///
/// # 필드
///
/// - **max_file_size**: 이 크기를 넘는 파일은 임시 파일로 내려 mmap으로 스캔
/// - **max_layer_concurrency**: 동시에 처리할 레이어 수
/// - **worker_count**: 스캔 워커 수 (기본: 가용 병렬성)
/// - **http_timeout_secs**: 모든 외부 HTTP 요청의 타임아웃
/// - **advisory_concurrency**: advisory API 동시 요청 상한
/// - **ecr_region**: ECR 태그 조회에 쓰이는 기본 리전
/// - **gem_confusion_enabled**: RubyGems dependency confusion 점검 (기본 비활성)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// 메모리에 담을 파일 크기 상한 (바이트)
    pub max_file_size: u64,
    /// 레이어 동시 처리 상한
    pub max_layer_concurrency: usize,
    /// 스캔 워커 수
    pub worker_count: usize,
    /// 외부 HTTP 요청 타임아웃 (초)
    pub http_timeout_secs: u64,
    /// advisory API 동시 요청 상한
    pub advisory_concurrency: usize,
    /// ECR 기본 리전
    pub ecr_region: String,
    /// RubyGems dependency confusion 점검 활성화 여부
    pub gem_confusion_enabled: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            max_layer_concurrency: 4,
            worker_count: workers,
            http_timeout_secs: 15,
            advisory_concurrency: 8,
            ecr_region: "us-west-2".to_owned(),
            gem_confusion_enabled: false,
        }
    }
}

/// 설정 상한값 상수
const MAX_FILE_SIZE_LIMIT: u64 = 1024 * 1024 * 1024; // 1 GiB
const MAX_LAYER_CONCURRENCY_LIMIT: usize = 64;
const MAX_WORKER_LIMIT: usize = 256;

impl ScanConfig {
    /// 태스크 큐 깊이 — 생산자 기아를 피하기 위해 워커 수의 2배를 사용합니다.
    pub fn queue_depth(&self) -> usize {
        self.worker_count.saturating_mul(2).max(2)
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 || self.max_file_size > MAX_FILE_SIZE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "max_file_size".to_owned(),
                reason: format!("must be 1-{MAX_FILE_SIZE_LIMIT}"),
            });
        }

        if self.max_layer_concurrency == 0
            || self.max_layer_concurrency > MAX_LAYER_CONCURRENCY_LIMIT
        {
            return Err(ConfigError::InvalidValue {
                field: "max_layer_concurrency".to_owned(),
                reason: format!("must be 1-{MAX_LAYER_CONCURRENCY_LIMIT}"),
            });
        }

        if self.worker_count == 0 || self.worker_count > MAX_WORKER_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "worker_count".to_owned(),
                reason: format!("must be 1-{MAX_WORKER_LIMIT}"),
            });
        }

        if self.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "http_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.advisory_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "advisory_concurrency".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.ecr_region.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ecr_region".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// [`ScanConfig`] 빌더
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 메모리 보관 파일 크기 상한을 설정합니다.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    /// 레이어 동시 처리 상한을 설정합니다.
    pub fn max_layer_concurrency(mut self, n: usize) -> Self {
        self.config.max_layer_concurrency = n;
        self
    }

    /// 스캔 워커 수를 설정합니다.
    pub fn worker_count(mut self, n: usize) -> Self {
        self.config.worker_count = n;
        self
    }

    /// HTTP 타임아웃(초)을 설정합니다.
    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    /// advisory API 동시 요청 상한을 설정합니다.
    pub fn advisory_concurrency(mut self, n: usize) -> Self {
        self.config.advisory_concurrency = n;
        self
    }

    /// ECR 기본 리전을 설정합니다.
    pub fn ecr_region(mut self, region: impl Into<String>) -> Self {
        self.config.ecr_region = region.into();
        self
    }

    /// RubyGems dependency confusion 점검을 켜거나 끕니다.
    pub fn gem_confusion_enabled(mut self, enabled: bool) -> Self {
        self.config.gem_confusion_enabled = enabled;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    pub fn build(self) -> Result<ScanConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn corpus_loads_and_sorts_by_id() {
        let corpus = RegexCorpus::from_json_str(
            r#"{"zz-token": "zz[0-9]+", "aws-key": "AKIA[0-9A-Z]{16}"}"#,
        )
        .unwrap();
        assert_eq!(corpus.len(), 2);
        let ids: Vec<&str> = corpus.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["aws-key", "zz-token"]);
    }

    #[test]
    fn corpus_fails_on_first_invalid_pattern() {
        let err = RegexCorpus::from_json_str(r#"{"bad": "[unclosed"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { id, .. } if id == "bad"));
    }

    #[test]
    fn corpus_fails_on_invalid_json() {
        let err = RegexCorpus::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
    }

    #[test]
    fn corpus_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"gh-token": "ghp_[A-Za-z0-9]{{36}}"}}"#).unwrap();
        let corpus = RegexCorpus::load(file.path()).unwrap();
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn corpus_missing_file_fails() {
        let err = RegexCorpus::load(Path::new("/nonexistent/regexes.json")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn excluded_matches_any_pattern() {
        let excluded = ExcludedPatterns::from_patterns(&[r"^usr/share/", r"\.png$"]).unwrap();
        assert!(excluded.is_excluded("usr/share/doc/README"));
        assert!(excluded.is_excluded("app/logo.png"));
        assert!(!excluded.is_excluded("app/.env"));
    }

    #[test]
    fn excluded_invalid_pattern_fails() {
        assert!(ExcludedPatterns::from_patterns(&["[bad"]).is_err());
    }

    #[test]
    fn default_excluded_skips_virtual_fs() {
        let excluded = ExcludedPatterns::default_patterns();
        assert!(excluded.is_excluded("proc/1/cmdline"));
        assert!(excluded.is_excluded("lib/libssl.so.3"));
        assert!(!excluded.is_excluded("etc/passwd"));
    }

    #[test]
    fn default_scan_config_is_valid() {
        ScanConfig::default().validate().unwrap();
    }

    #[test]
    fn queue_depth_is_twice_workers() {
        let config = ScanConfigBuilder::new().worker_count(3).build().unwrap();
        assert_eq!(config.queue_depth(), 6);
    }

    #[test]
    fn validate_rejects_zero_file_size() {
        let result = ScanConfigBuilder::new().max_file_size(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let result = ScanConfigBuilder::new().worker_count(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_empty_ecr_region() {
        let result = ScanConfigBuilder::new().ecr_region("").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_all_setters() {
        let config = ScanConfigBuilder::new()
            .max_file_size(1024)
            .max_layer_concurrency(2)
            .worker_count(8)
            .http_timeout_secs(30)
            .advisory_concurrency(4)
            .ecr_region("ap-northeast-2")
            .gem_confusion_enabled(true)
            .build()
            .unwrap();
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(config.max_layer_concurrency, 2);
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.advisory_concurrency, 4);
        assert_eq!(config.ecr_region, "ap-northeast-2");
        assert!(config.gem_confusion_enabled);
    }

    #[test]
    fn scan_config_serialize_roundtrip() {
        let config = ScanConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ScanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.max_file_size, deserialized.max_file_size);
        assert_eq!(config.ecr_region, deserialized.ecr_region);
    }
}
