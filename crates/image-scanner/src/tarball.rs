//! 로컬 이미지 아카이브 소스 — `docker save` 형식
//!
//! 아카이브 루트의 `manifest.json`이 config 경로와 레이어 경로 목록을
//! 제공합니다. 열 때 manifest를 검증하므로 깨진 아카이브는
//! 스캔 시작 전에 치명적 에러로 드러납니다.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use layerlens_core::types::LayerId;

use crate::error::ImageScanError;
use crate::source::{ImageConfigFile, ImageProvider, ImageSource, LayerDescriptor};

/// `manifest.json`의 이미지 엔트리
#[derive(Debug, Clone, Deserialize)]
struct ManifestEntry {
    /// config JSON의 아카이브 내 경로
    #[serde(rename = "Config")]
    config: String,
    /// `repo:tag` 목록
    #[serde(default, rename = "RepoTags")]
    repo_tags: Vec<String>,
    /// 레이어 tar의 아카이브 내 경로 목록
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

/// 로컬 이미지 아카이브 provider
#[derive(Debug)]
pub struct TarballProvider {
    display: String,
    archive: Arc<Vec<u8>>,
    manifest: Vec<ManifestEntry>,
}

impl TarballProvider {
    /// 아카이브를 열고 manifest를 검증합니다.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ImageScanError> {
        let path = path.into();
        let display_str = path.display().to_string();
        let archive_err = |reason: String| ImageScanError::Archive {
            path: display_str.clone(),
            reason,
        };

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| archive_err(e.to_string()))?;
        let archive = Arc::new(bytes);

        let manifest = {
            let archive = Arc::clone(&archive);
            tokio::task::spawn_blocking(move || parse_manifest(&archive))
                .await
                .map_err(|e| ImageScanError::Task(e.to_string()))?
                .map_err(archive_err)?
        };

        info!(path = %display_str, images = manifest.len(), "opened image archive");

        Ok(Self {
            display: display_str,
            archive,
            manifest,
        })
    }

    fn entry_for_tag(&self, tag: &str) -> &ManifestEntry {
        self.manifest
            .iter()
            .find(|entry| {
                entry
                    .repo_tags
                    .iter()
                    .any(|repo_tag| repo_tag.rsplit(':').next() == Some(tag))
            })
            .unwrap_or(&self.manifest[0])
    }
}

impl ImageProvider for TarballProvider {
    type Source = TarballImageSource;

    fn name(&self) -> &str {
        &self.display
    }

    fn target(&self, tag: &str) -> String {
        self.entry_for_tag(tag)
            .repo_tags
            .iter()
            .find(|repo_tag| repo_tag.rsplit(':').next() == Some(tag))
            .cloned()
            .unwrap_or_else(|| {
                let stem = Path::new(&self.display)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.display.clone());
                format!("{stem}:{tag}")
            })
    }

    async fn list_tags(&self) -> Result<Vec<String>, ImageScanError> {
        let mut tags: Vec<String> = self
            .manifest
            .iter()
            .flat_map(|entry| entry.repo_tags.iter())
            .filter_map(|repo_tag| repo_tag.rsplit(':').next())
            .map(str::to_owned)
            .collect();
        if tags.is_empty() {
            tags.push("latest".to_owned());
        }
        Ok(tags)
    }

    async fn image(&self, tag: &str) -> Result<TarballImageSource, ImageScanError> {
        let entry = self.entry_for_tag(tag).clone();
        Ok(TarballImageSource {
            reference: self.target(tag),
            archive: Arc::clone(&self.archive),
            entry,
        })
    }
}

/// 아카이브 내 이미지 하나
pub struct TarballImageSource {
    reference: String,
    archive: Arc<Vec<u8>>,
    entry: ManifestEntry,
}

impl ImageSource for TarballImageSource {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn layers(&self) -> Result<Vec<LayerDescriptor>, ImageScanError> {
        let config = self.config_file().await?;
        let diff_ids = config.rootfs.diff_ids;

        let descriptors = self
            .entry
            .layers
            .iter()
            .enumerate()
            .map(|(index, layer_path)| {
                // diff ID가 있으면 그것이 레이어 식별자, 없으면 경로로 대체
                let id = diff_ids
                    .get(index)
                    .map(LayerId::from_diff_id)
                    .unwrap_or_else(|| LayerId::from_diff_id(layer_path.clone()));
                let media_type = if layer_path.ends_with(".tar.gz") || layer_path.ends_with(".tgz")
                {
                    "application/vnd.docker.image.rootfs.diff.tar+gzip".to_owned()
                } else {
                    "application/vnd.docker.image.rootfs.diff.tar".to_owned()
                };
                LayerDescriptor {
                    id,
                    media_type,
                    archive_path: Some(layer_path.clone()),
                }
            })
            .collect();

        Ok(descriptors)
    }

    async fn layer_bytes(&self, layer: &LayerDescriptor) -> Result<Vec<u8>, ImageScanError> {
        let Some(archive_path) = layer.archive_path.clone() else {
            return Err(ImageScanError::LayerRead {
                digest: layer.id.digest.clone(),
                reason: "layer has no archive path".to_owned(),
            });
        };

        let archive = Arc::clone(&self.archive);
        let digest = layer.id.digest.clone();
        tokio::task::spawn_blocking(move || {
            read_entry(&archive, &archive_path).ok_or_else(|| ImageScanError::LayerRead {
                digest,
                reason: format!("archive entry {archive_path} not found"),
            })
        })
        .await
        .map_err(|e| ImageScanError::Task(e.to_string()))?
    }

    async fn config_file(&self) -> Result<ImageConfigFile, ImageScanError> {
        let archive = Arc::clone(&self.archive);
        let config_path = self.entry.config.clone();
        let bytes = tokio::task::spawn_blocking(move || read_entry(&archive, &config_path))
            .await
            .map_err(|e| ImageScanError::Task(e.to_string()))?
            .ok_or_else(|| {
                ImageScanError::ConfigRead(format!(
                    "config entry {} not found in archive",
                    self.entry.config
                ))
            })?;

        serde_json::from_slice(&bytes).map_err(|e| ImageScanError::ConfigRead(e.to_string()))
    }
}

/// 아카이브에서 `manifest.json`을 찾아 파싱하고 검증합니다 (동기).
fn parse_manifest(archive: &[u8]) -> Result<Vec<ManifestEntry>, String> {
    let bytes =
        read_entry(archive, "manifest.json").ok_or_else(|| "manifest.json not found".to_owned())?;
    let manifest: Vec<ManifestEntry> =
        serde_json::from_slice(&bytes).map_err(|e| format!("invalid manifest.json: {e}"))?;

    if manifest.is_empty() {
        return Err("manifest.json contains no images".to_owned());
    }
    for entry in &manifest {
        if read_entry(archive, &entry.config).is_none() {
            return Err(format!("config entry {} not found", entry.config));
        }
    }
    Ok(manifest)
}

/// 아카이브에서 이름이 일치하는 엔트리의 내용을 읽습니다 (동기).
fn read_entry(archive: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut tar = tar::Archive::new(std::io::Cursor::new(archive));
    for entry in tar.entries().ok()? {
        let mut entry = entry.ok()?;
        let path = {
            let path = entry.path().ok()?;
            let path = path.to_string_lossy();
            path.strip_prefix("./").unwrap_or(&path).to_owned()
        };
        if path == name {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).ok()?;
            return Some(bytes);
        }
    }
    None
}
