//! 원격 레지스트리 이미지 소스 — OCI distribution API
//!
//! 태그 열거는 [`TagClient`](crate::registry::TagClient)가, 이미지 풀은
//! `oci-distribution`이 담당합니다. 풀은 익명 인증으로 수행됩니다.

use std::sync::Arc;

use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol, ImageData};
use oci_distribution::manifest;
use oci_distribution::secrets::RegistryAuth;
use tracing::{debug, info};

use layerlens_core::config::ScanConfig;
use layerlens_core::types::{ImageRef, LayerId};

use crate::error::ImageScanError;
use crate::registry::{RegistryAuthHook, TagClient};
use crate::source::{ImageConfigFile, ImageProvider, ImageSource, LayerDescriptor};

/// 원격 레지스트리 provider
pub struct RemoteProvider {
    image_ref: ImageRef,
    tag_client: TagClient,
}

impl RemoteProvider {
    /// 이미지 참조와 설정으로 provider를 생성합니다.
    pub fn new(image_ref: ImageRef, config: &ScanConfig) -> Result<Self, ImageScanError> {
        let tag_client = TagClient::new(config)?;
        Ok(Self {
            image_ref,
            tag_client,
        })
    }

    /// 태그 열거에 쓸 인증 훅을 교체합니다.
    pub fn with_auth_hook(mut self, hook: Arc<dyn RegistryAuthHook>) -> Self {
        self.tag_client = self.tag_client.with_auth_hook(hook);
        self
    }
}

impl ImageProvider for RemoteProvider {
    type Source = RemoteImageSource;

    fn name(&self) -> &str {
        &self.image_ref.repository
    }

    fn target(&self, tag: &str) -> String {
        self.image_ref.target_for(tag)
    }

    async fn list_tags(&self) -> Result<Vec<String>, ImageScanError> {
        self.tag_client.fetch_tags(&self.image_ref).await
    }

    async fn image(&self, tag: &str) -> Result<RemoteImageSource, ImageScanError> {
        let reference_str = format!(
            "{}/{}:{}",
            self.image_ref.registry, self.image_ref.repository, tag,
        );
        let reference =
            Reference::try_from(reference_str.as_str()).map_err(|e| ImageScanError::Pull {
                reference: reference_str.clone(),
                reason: e.to_string(),
            })?;

        info!(reference = %reference_str, "pulling remote image");

        let client_config = ClientConfig {
            protocol: ClientProtocol::HttpsExcept(vec!["localhost".to_owned()]),
            ..Default::default()
        };
        let mut client = Client::new(client_config);

        let data = client
            .pull(
                &reference,
                &RegistryAuth::Anonymous,
                vec![
                    manifest::IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE,
                    manifest::IMAGE_LAYER_GZIP_MEDIA_TYPE,
                    manifest::IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
                    manifest::IMAGE_LAYER_MEDIA_TYPE,
                ],
            )
            .await
            .map_err(|e| ImageScanError::Pull {
                reference: reference_str.clone(),
                reason: e.to_string(),
            })?;

        debug!(layers = data.layers.len(), "image pulled");

        Ok(RemoteImageSource {
            reference: reference_str,
            data,
        })
    }
}

/// 풀 완료된 원격 이미지
pub struct RemoteImageSource {
    reference: String,
    data: ImageData,
}

impl RemoteImageSource {
    /// 레이어 인덱스의 digest를 구합니다 — manifest가 있으면 그 값을,
    /// 없으면 blob 내용의 sha256을 사용합니다.
    fn layer_digest(&self, index: usize) -> Option<(String, String)> {
        if let Some(ref manifest) = self.data.manifest {
            let descriptor = manifest.layers.get(index)?;
            return Some((descriptor.digest.clone(), descriptor.media_type.clone()));
        }
        let layer = self.data.layers.get(index)?;
        Some((layer.sha256_digest(), layer.media_type.clone()))
    }
}

impl ImageSource for RemoteImageSource {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn layers(&self) -> Result<Vec<LayerDescriptor>, ImageScanError> {
        let mut descriptors = Vec::with_capacity(self.data.layers.len());
        for index in 0..self.data.layers.len() {
            let Some((digest, media_type)) = self.layer_digest(index) else {
                continue;
            };
            let mut id = LayerId::from_digest(digest);
            id.compressed = media_type.contains("gzip");
            descriptors.push(LayerDescriptor {
                id,
                media_type,
                archive_path: None,
            });
        }
        Ok(descriptors)
    }

    async fn layer_bytes(&self, layer: &LayerDescriptor) -> Result<Vec<u8>, ImageScanError> {
        for index in 0..self.data.layers.len() {
            if let Some((digest, _)) = self.layer_digest(index) {
                if digest == layer.id.digest {
                    return Ok(self.data.layers[index].data.clone());
                }
            }
        }
        Err(ImageScanError::LayerRead {
            digest: layer.id.digest.clone(),
            reason: "layer not present in pulled image".to_owned(),
        })
    }

    async fn config_file(&self) -> Result<ImageConfigFile, ImageScanError> {
        serde_json::from_slice(&self.data.config.data)
            .map_err(|e| ImageScanError::ConfigRead(e.to_string()))
    }
}
