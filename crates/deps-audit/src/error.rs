//! 의존성 분석 에러 타입
//!
//! "이미 본 파일"과 "지원하지 않는 형식"은 정상 흐름에 가까운 soft-skip으로,
//! 호출 측에서 [`DepsAuditError::is_soft_skip`]으로 구분하여 조용히 넘깁니다.

/// 의존성 분석 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DepsAuditError {
    /// 지원하지 않는 의존성 파일 형식
    #[error("unsupported dependency file type: {path}")]
    Unsupported { path: String },

    /// 같은 이미지 스캔에서 이미 분석한 파일 (다른 레이어의 동일 경로)
    #[error("already analyzed {path}")]
    AlreadySeen { path: String },

    /// node_modules 내부의 lockfile — 분석 대상에서 제외
    #[error("skipping dependency file in node_modules: {path}")]
    NodeModules { path: String },

    /// lockfile 파싱 실패
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    /// 개별 의존성의 advisory 조회 실패 (일시적 — 수집 후 계속 진행)
    #[error("advisory lookup failed for {package}@{version}: {reason}")]
    Advisory {
        package: String,
        version: String,
        reason: String,
    },

    /// HTTP 클라이언트 에러
    #[error("http error: {0}")]
    Http(String),

    /// 로컬 advisory DB 로딩/파싱 실패
    #[error("advisory db error: {path}: {reason}")]
    Db { path: String, reason: String },
}

impl DepsAuditError {
    /// 조용히 건너뛰어도 되는 에러인지 확인합니다.
    pub fn is_soft_skip(&self) -> bool {
        matches!(
            self,
            Self::Unsupported { .. } | Self::AlreadySeen { .. } | Self::NodeModules { .. }
        )
    }
}
