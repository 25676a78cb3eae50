//! 이미지 소스 추상화 — 원격 레지스트리와 로컬 아카이브의 공통 인터페이스
//!
//! [`ImageSource`]는 이미지 하나(레이어 blob, config)에 대한 접근을,
//! [`ImageProvider`]는 태그 열거와 태그별 소스 생성을 추상화합니다.
//! 운영 구현은 [`RemoteProvider`](crate::remote::RemoteProvider)와
//! [`TarballProvider`](crate::tarball::TarballProvider)이며,
//! 테스트는 인메모리 구현을 사용합니다.

use std::future::Future;

use serde::{Deserialize, Serialize};

use layerlens_core::types::LayerId;

use crate::error::ImageScanError;

/// 이미지 레이어 디스크립터
///
/// blob을 내려받기 전에 알 수 있는 메타데이터입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// 레이어 식별자 (digest 또는 diff ID)
    pub id: LayerId,
    /// OCI media type — gzip 여부 판별에 사용
    pub media_type: String,
    /// 아카이브 내 엔트리 경로 (로컬 tarball 소스 전용)
    pub archive_path: Option<String>,
}

/// 이미지 config의 히스토리 엔트리
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 레이어를 생성한 명령
    #[serde(default)]
    pub created_by: String,
    /// 파일시스템 변경이 없는 엔트리인지 여부
    #[serde(default)]
    pub empty_layer: bool,
}

/// 이미지 config의 런타임 설정 (필요한 필드만)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 환경 변수 (`KEY=value` 문자열)
    #[serde(default, rename = "Env")]
    pub env: Vec<String>,
}

/// 루트 파일시스템 정보
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootFs {
    /// 비압축 레이어 diff ID 목록
    #[serde(default)]
    pub diff_ids: Vec<String>,
}

/// 이미지 config 오브젝트 (필요한 필드만)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfigFile {
    /// 빌드 히스토리
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// 런타임 설정
    #[serde(default)]
    pub config: RuntimeConfig,
    /// 루트 파일시스템
    #[serde(default)]
    pub rootfs: RootFs,
}

/// 이미지 하나에 대한 접근 인터페이스
pub trait ImageSource: Send + Sync {
    /// 이 소스가 가리키는 이미지 참조 문자열 (로그용)
    fn reference(&self) -> &str;

    /// 레이어 디스크립터 목록을 반환합니다.
    fn layers(&self) -> impl Future<Output = Result<Vec<LayerDescriptor>, ImageScanError>> + Send;

    /// 레이어 blob 전체를 읽습니다 (압축된 형태 그대로).
    fn layer_bytes(
        &self,
        layer: &LayerDescriptor,
    ) -> impl Future<Output = Result<Vec<u8>, ImageScanError>> + Send;

    /// 이미지 config(히스토리, 환경 변수, diff ID)를 읽습니다.
    fn config_file(&self) -> impl Future<Output = Result<ImageConfigFile, ImageScanError>> + Send;
}

/// 태그 열거와 태그별 이미지 소스 생성 인터페이스
pub trait ImageProvider: Send + Sync {
    /// 이 provider가 생성하는 소스 타입
    type Source: ImageSource + Send + Sync + 'static;

    /// 이미지 이름 (로그용)
    fn name(&self) -> &str;

    /// 특정 태그에 대한 보고서 대상 문자열(`repo:tag`)을 반환합니다.
    fn target(&self, tag: &str) -> String;

    /// 사용 가능한 태그를 열거합니다.
    fn list_tags(&self) -> impl Future<Output = Result<Vec<String>, ImageScanError>> + Send;

    /// 특정 태그의 이미지 소스를 엽니다.
    fn image(
        &self,
        tag: &str,
    ) -> impl Future<Output = Result<Self::Source, ImageScanError>> + Send;
}
