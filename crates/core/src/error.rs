//! 에러 타입 — 도메인별 에러 정의

/// Layerlens 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LayerlensError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 레지스트리 API 에러
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 이미지 접근/파싱 에러
    #[error("image error: {0}")]
    Image(#[from] ImageError),

    /// 스캔 파이프라인 에러
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    /// 정규식 컴파일 실패 — 코퍼스 로딩은 첫 실패에서 중단됩니다
    #[error("invalid pattern '{id}': {reason}")]
    InvalidPattern { id: String, reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 레지스트리 API 에러
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// 태그 목록을 지원하지 않는 레지스트리
    #[error("unsupported registry: {0}")]
    Unsupported(String),

    /// 태그 목록 조회 실패 (non-200 응답 포함)
    #[error("failed to fetch tags for {repository}: {reason}")]
    TagListFailed { repository: String, reason: String },

    /// 태그가 하나도 없음
    #[error("no tags found for {repository}")]
    NoTags { repository: String },
}

/// 이미지 접근/파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// 이미지 참조 파싱 실패
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// 로컬 아카이브 열기 실패
    #[error("failed to open image archive {path}: {reason}")]
    ArchiveOpen { path: String, reason: String },

    /// 원격 이미지 풀 실패
    #[error("failed to pull image {reference}: {reason}")]
    PullFailed { reference: String, reason: String },

    /// 레이어 읽기 실패
    #[error("failed to read layer {digest}: {reason}")]
    LayerRead { digest: String, reason: String },

    /// 이미지 설정(config) 읽기 실패
    #[error("failed to read image config: {0}")]
    ConfigRead(String),
}

/// 스캔 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 스캔이 취소됨
    #[error("scan cancelled")]
    Cancelled,

    /// 태스크 채널 통신 실패
    #[error("task channel error: {0}")]
    Channel(String),

    /// 워커 태스크 실패
    #[error("worker task failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidPattern {
            id: "aws-key".to_owned(),
            reason: "unclosed group".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aws-key"));
        assert!(msg.contains("unclosed group"));
    }

    #[test]
    fn registry_error_display() {
        let err = RegistryError::TagListFailed {
            repository: "library/nginx".to_owned(),
            reason: "received status 503".to_owned(),
        };
        assert!(err.to_string().contains("library/nginx"));
    }

    #[test]
    fn image_error_display() {
        let err = ImageError::InvalidReference {
            reference: String::new(),
            reason: "empty reference".to_owned(),
        };
        assert!(err.to_string().contains("empty reference"));
    }

    #[test]
    fn errors_convert_to_top_level() {
        let err: LayerlensError = ConfigError::FileNotFound {
            path: "regexes.json".to_owned(),
        }
        .into();
        assert!(matches!(err, LayerlensError::Config(_)));

        let err: LayerlensError = ScanError::Cancelled.into();
        assert!(matches!(err, LayerlensError::Scan(_)));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: LayerlensError = io.into();
        assert!(matches!(err, LayerlensError::Io(_)));
    }
}
