//! 이미지 스캔 에러 타입
//!
//! `From<ImageScanError> for LayerlensError` 구현으로 `?` 연산자를 통해
//! 상위 에러 타입으로 자연스럽게 전파됩니다.

use layerlens_core::error::{ImageError, LayerlensError, RegistryError, ScanError};

/// 이미지 스캔 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ImageScanError {
    /// 이미지 참조 파싱 실패
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// 태그 목록을 지원하지 않는 레지스트리
    #[error("unsupported registry: {0}")]
    UnsupportedRegistry(String),

    /// 태그 목록 조회 실패
    #[error("failed to fetch tags for {repository}: {reason}")]
    TagList { repository: String, reason: String },

    /// 태그가 하나도 없음
    #[error("no tags found for {repository}")]
    NoTags { repository: String },

    /// 로컬 아카이브 열기/검증 실패
    #[error("failed to open image archive {path}: {reason}")]
    Archive { path: String, reason: String },

    /// 원격 이미지 풀 실패
    #[error("failed to pull image {reference}: {reason}")]
    Pull { reference: String, reason: String },

    /// 레이어 읽기/디코딩 실패
    #[error("failed to read layer {digest}: {reason}")]
    LayerRead { digest: String, reason: String },

    /// 이미지 설정(config) 읽기 실패
    #[error("failed to read image config: {0}")]
    ConfigRead(String),

    /// 백그라운드 태스크 join 실패
    #[error("task failed: {0}")]
    Task(String),

    /// 태스크 채널 통신 실패
    #[error("task channel error: {0}")]
    Channel(String),

    /// HTTP 클라이언트 구성 에러
    #[error("http error: {0}")]
    Http(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ImageScanError> for LayerlensError {
    fn from(err: ImageScanError) -> Self {
        match err {
            ImageScanError::InvalidReference { reference, reason } => {
                LayerlensError::Image(ImageError::InvalidReference { reference, reason })
            }
            ImageScanError::UnsupportedRegistry(registry) => {
                LayerlensError::Registry(RegistryError::Unsupported(registry))
            }
            ImageScanError::TagList { repository, reason } => {
                LayerlensError::Registry(RegistryError::TagListFailed { repository, reason })
            }
            ImageScanError::NoTags { repository } => {
                LayerlensError::Registry(RegistryError::NoTags { repository })
            }
            ImageScanError::Archive { path, reason } => {
                LayerlensError::Image(ImageError::ArchiveOpen { path, reason })
            }
            ImageScanError::Pull { reference, reason } => {
                LayerlensError::Image(ImageError::PullFailed { reference, reason })
            }
            ImageScanError::LayerRead { digest, reason } => {
                LayerlensError::Image(ImageError::LayerRead { digest, reason })
            }
            ImageScanError::ConfigRead(reason) => {
                LayerlensError::Image(ImageError::ConfigRead(reason))
            }
            ImageScanError::Task(reason) => LayerlensError::Scan(ScanError::Worker(reason)),
            ImageScanError::Channel(reason) => LayerlensError::Scan(ScanError::Channel(reason)),
            ImageScanError::Http(reason) => LayerlensError::Scan(ScanError::Worker(reason)),
            ImageScanError::Io(err) => LayerlensError::Io(err),
        }
    }
}
