//! 레지스트리 태그 열거 — 호스트별 엔드포인트 선택
//!
//! 태그 목록 API는 레지스트리마다 경로와 응답 형태가 다릅니다.
//! Docker Hub는 `{results:[{name}]}`, 나머지(ghcr/gcr/ECR)는
//! `{tags:[...]}` 형태를 반환합니다. non-200 응답은 해당 이미지의
//! 태그 열거 단계에서 치명적 에러로 처리됩니다.
//!
//! 인증은 현재 익명이며, 사설 레지스트리는 401이 예상됩니다.
//! [`RegistryAuthHook`]으로 bearer 토큰을 주입할 수 있습니다.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use layerlens_core::config::ScanConfig;
use layerlens_core::types::ImageRef;

use crate::error::ImageScanError;

/// 레지스트리 bearer 토큰 주입 훅
pub trait RegistryAuthHook: Send + Sync {
    /// 주어진 레지스트리에 쓸 bearer 토큰을 반환합니다 (없으면 익명).
    fn bearer_token(&self, registry: &str) -> Option<String>;
}

/// 항상 익명으로 접근하는 기본 훅
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuth;

impl RegistryAuthHook for AnonymousAuth {
    fn bearer_token(&self, _registry: &str) -> Option<String> {
        None
    }
}

/// 태그 목록 응답 형태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagShape {
    /// Docker Hub: `{"results": [{"name": "..."}]}`
    DockerHub,
    /// v2 API: `{"tags": ["..."]}`
    TagsList,
}

#[derive(Debug, Deserialize)]
struct DockerHubResponse {
    #[serde(default)]
    results: Vec<DockerHubTag>,
}

#[derive(Debug, Deserialize)]
struct DockerHubTag {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct TagsListResponse {
    #[serde(default)]
    tags: Vec<String>,
}

/// 레지스트리 태그 열거 클라이언트
pub struct TagClient {
    http: reqwest::Client,
    ecr_region: String,
    auth: Arc<dyn RegistryAuthHook>,
}

impl TagClient {
    /// 설정에서 클라이언트를 생성합니다.
    pub fn new(config: &ScanConfig) -> Result<Self, ImageScanError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| ImageScanError::Http(e.to_string()))?;

        Ok(Self {
            http,
            ecr_region: config.ecr_region.clone(),
            auth: Arc::new(AnonymousAuth),
        })
    }

    /// 인증 훅을 교체합니다.
    pub fn with_auth_hook(mut self, hook: Arc<dyn RegistryAuthHook>) -> Self {
        self.auth = hook;
        self
    }

    /// 태그를 열거합니다.
    pub async fn fetch_tags(&self, image: &ImageRef) -> Result<Vec<String>, ImageScanError> {
        let (url, shape) = self.endpoint(image)?;
        debug!(url = %url, "fetching tag list");

        let mut request = self.http.get(&url);
        if let Some(token) = self.auth.bearer_token(&image.registry) {
            request = request.bearer_auth(token);
        }

        let tag_err = |reason: String| ImageScanError::TagList {
            repository: image.repository.clone(),
            reason,
        };

        let resp = request.send().await.map_err(|e| tag_err(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(tag_err(format!("received status {}", resp.status())));
        }

        let tags = match shape {
            TagShape::DockerHub => {
                let body: DockerHubResponse =
                    resp.json().await.map_err(|e| tag_err(e.to_string()))?;
                body.results
                    .into_iter()
                    .map(|t| t.name)
                    .filter(|name| !name.is_empty())
                    .collect()
            }
            TagShape::TagsList => {
                let body: TagsListResponse =
                    resp.json().await.map_err(|e| tag_err(e.to_string()))?;
                body.tags
            }
        };

        Ok(tags)
    }

    /// 레지스트리 호스트에 맞는 태그 목록 엔드포인트를 선택합니다.
    fn endpoint(&self, image: &ImageRef) -> Result<(String, TagShape), ImageScanError> {
        let repo = &image.repository;

        match image.registry.as_str() {
            "index.docker.io" => {
                let url = match repo.split_once('/') {
                    // 공식 이미지는 library 네임스페이스 아래에 있음
                    None => format!(
                        "https://registry.hub.docker.com/v2/repositories/library/{repo}/tags"
                    ),
                    Some((owner, name)) => format!(
                        "https://registry.hub.docker.com/v2/repositories/{owner}/{name}/tags"
                    ),
                };
                Ok((url, TagShape::DockerHub))
            }
            "ghcr.io" => Ok((
                format!("https://ghcr.io/v2/{repo}/tags/list"),
                TagShape::TagsList,
            )),
            "gcr.io" => Ok((
                format!("https://gcr.io/v2/{repo}/tags/list"),
                TagShape::TagsList,
            )),
            // `aws` 축약형: 저장소가 `{account}/{name}`, 리전은 설정값 사용
            "aws" => {
                let (account, name) =
                    repo.split_once('/')
                        .ok_or_else(|| ImageScanError::InvalidReference {
                            reference: image.to_string(),
                            reason: "ECR reference must be aws/{account}/{name}".to_owned(),
                        })?;
                Ok((
                    format!(
                        "https://{account}.dkr.ecr.{region}.amazonaws.com/v2/{name}/tags/list",
                        region = self.ecr_region,
                    ),
                    TagShape::TagsList,
                ))
            }
            other => {
                // 전체 ECR 호스트가 참조에 직접 들어온 경우
                if let Some((account, region)) = image.ecr_parts() {
                    return Ok((
                        format!(
                            "https://{account}.dkr.ecr.{region}.amazonaws.com/v2/{repo}/tags/list"
                        ),
                        TagShape::TagsList,
                    ));
                }
                Err(ImageScanError::UnsupportedRegistry(other.to_owned()))
            }
        }
    }
}
