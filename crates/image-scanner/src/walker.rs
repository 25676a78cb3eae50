//! 레이어 워커 — tar 순회와 태스크 분배
//!
//! 레이어들은 세마포어로 제한된 병렬로 처리되고, 한 레이어 안의 tar 순회는
//! 순차적입니다(tar는 random access가 불가). 일반 파일만 대상이며
//! 제외 패턴에 걸린 경로는 내용을 읽기 전에 건너뜁니다.
//!
//! 알려진 의존성 파일은 레이어 walk가 끝난 뒤 비동기로 분석되어
//! 발견된 취약점이 워커 join 전에 공유 출력에 기록됩니다.
//! 그 외 파일은 내용을 읽어 태스크 버스로 보냅니다.

use std::io::{Read, Write};
use std::sync::Arc;

use memmap2::Mmap;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use layerlens_core::types::Scope;
use layerlens_deps_audit::is_known_dependency_file;

use crate::error::ImageScanError;
use crate::scanner::ScanShared;
use crate::source::{ImageSource, LayerDescriptor};
use crate::worker::{FileContent, ScanTask};

/// 레이어 walk 중 수집된 의존성 파일
struct LockfileJob {
    path: String,
    content: Vec<u8>,
}

/// 이미지의 모든 레이어를 처리합니다.
///
/// 레이어 하나의 실패는 로그만 남기고 다른 레이어 처리를 계속합니다.
pub(crate) async fn process_layers<S: ImageSource + 'static>(
    source: Arc<S>,
    shared: ScanShared,
    task_tx: mpsc::Sender<ScanTask>,
) -> Result<(), ImageScanError> {
    let layers = source.layers().await?;
    info!(layers = layers.len(), "processing image layers");

    let semaphore = Arc::new(Semaphore::new(shared.config.max_layer_concurrency));
    let mut tasks = JoinSet::new();

    for descriptor in layers {
        if shared.cancel.is_cancelled() {
            break;
        }

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let source = Arc::clone(&source);
        let shared = shared.clone();
        let task_tx = task_tx.clone();

        tasks.spawn(async move {
            let _permit = permit;
            if let Err(e) = process_layer(&*source, &descriptor, &shared, &task_tx).await {
                warn!(layer = %descriptor.id, error = %e, "failed to process layer");
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "layer task aborted");
        }
    }

    Ok(())
}

/// 레이어 하나를 처리합니다: blob 다운로드 -> tar walk -> 의존성 분석.
async fn process_layer<S: ImageSource>(
    source: &S,
    descriptor: &LayerDescriptor,
    shared: &ScanShared,
    task_tx: &mpsc::Sender<ScanTask>,
) -> Result<(), ImageScanError> {
    info!(layer = %descriptor.id, "scanning layer");
    let blob = source.layer_bytes(descriptor).await?;

    let jobs = {
        let descriptor = descriptor.clone();
        let shared = shared.clone();
        let task_tx = task_tx.clone();
        tokio::task::spawn_blocking(move || walk_layer_tar(blob, &descriptor, &shared, &task_tx))
            .await
            .map_err(|e| ImageScanError::Task(e.to_string()))??
    };

    for job in jobs {
        if shared.cancel.is_cancelled() {
            break;
        }
        analyze_lockfile(&job, shared).await;
    }

    Ok(())
}

/// 의존성 파일 하나를 분석하고 취약점을 공유 출력에 기록합니다.
async fn analyze_lockfile(job: &LockfileJob, shared: &ScanShared) {
    match shared
        .analyzer
        .analyze(&job.path, &job.content, &shared.dep_ctx)
        .await
    {
        Ok(outcome) => {
            if let Some(joint) = outcome.joint_error() {
                warn!(path = %job.path, "{joint}");
            }
            if !outcome.issues.is_empty() {
                let mut output = shared.output.lock().await;
                output.vulnerabilities.extend(outcome.issues);
            }
        }
        Err(e) if e.is_soft_skip() => {
            debug!(path = %job.path, reason = %e, "skipping dependency file");
        }
        Err(e) => {
            warn!(path = %job.path, error = %e, "dependency analysis failed");
        }
    }
}

/// 레이어 tar를 순차 순회합니다 (동기 — `spawn_blocking` 안에서 호출).
///
/// 의존성 파일은 반환 목록에 모으고, 나머지 일반 파일은 내용을 읽어
/// 태스크 버스에 `blocking_send`로 넣습니다 (워커 포화 시 backpressure).
fn walk_layer_tar(
    blob: Vec<u8>,
    descriptor: &LayerDescriptor,
    shared: &ScanShared,
    task_tx: &mpsc::Sender<ScanTask>,
) -> Result<Vec<LockfileJob>, ImageScanError> {
    let data = decode_layer(descriptor, blob)?;
    let mut archive = tar::Archive::new(std::io::Cursor::new(data));
    let mut jobs = Vec::new();

    let entries = archive.entries().map_err(|e| ImageScanError::LayerRead {
        digest: descriptor.id.digest.clone(),
        reason: e.to_string(),
    })?;

    for entry in entries {
        if shared.cancel.is_cancelled() {
            break;
        }

        let mut entry = entry.map_err(|e| ImageScanError::LayerRead {
            digest: descriptor.id.digest.clone(),
            reason: e.to_string(),
        })?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = match entry.path() {
            Ok(path) => normalize_entry_path(&path.to_string_lossy()),
            Err(e) => {
                debug!(error = %e, "skipping entry with invalid path");
                continue;
            }
        };

        if shared.excluded.is_excluded(&path) {
            continue;
        }

        if shared.scans.vuln() && is_known_dependency_file(&path) {
            let mut content = Vec::new();
            if let Err(e) = entry.read_to_end(&mut content) {
                warn!(path = %path, error = %e, "failed to read dependency file");
                continue;
            }
            jobs.push(LockfileJob { path, content });
            continue;
        }

        if !shared.scans.secrets() && !shared.scans.assets() {
            continue;
        }

        let size = entry.header().size().unwrap_or(0);
        let content = match read_file_content(&mut entry, size, shared.config.max_file_size) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to read file content");
                continue;
            }
        };

        let task = ScanTask {
            path,
            content,
            scope: Scope::Layer(descriptor.id.clone()),
        };
        if task_tx.blocking_send(task).is_err() {
            // 버스가 닫힘 — 스캔 종료 중
            break;
        }
    }

    Ok(jobs)
}

/// 필요 시 gzip을 풀어 비압축 tar 바이트를 반환합니다.
pub(crate) fn decode_layer(
    descriptor: &LayerDescriptor,
    blob: Vec<u8>,
) -> Result<Vec<u8>, ImageScanError> {
    let gzipped = descriptor.media_type.contains("gzip") || blob.starts_with(&[0x1f, 0x8b]);
    if !gzipped {
        return Ok(blob);
    }

    let mut decoder = flate2::read::GzDecoder::new(blob.as_slice());
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| ImageScanError::LayerRead {
            digest: descriptor.id.digest.clone(),
            reason: format!("gzip decode failed: {e}"),
        })?;
    Ok(decoded)
}

/// tar 엔트리 경로의 `./` 접두사를 제거합니다.
fn normalize_entry_path(path: &str) -> String {
    path.strip_prefix("./").unwrap_or(path).to_owned()
}

/// 파일 내용을 읽습니다 — 크기 상한을 넘으면 임시 파일로 spill 후 mmap.
fn read_file_content<R: Read>(
    reader: &mut R,
    size: u64,
    max_file_size: u64,
) -> std::io::Result<FileContent> {
    if size > max_file_size {
        let mut spill = tempfile::NamedTempFile::new()?;
        std::io::copy(reader, &mut spill)?;
        spill.flush()?;
        // SAFETY: 임시 파일은 이 프로세스가 소유하며 mmap 동안 수정되지 않음
        let map = unsafe { Mmap::map(spill.as_file())? };
        Ok(FileContent::Mapped { map, _spill: spill })
    } else {
        let mut content = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        reader.read_to_end(&mut content)?;
        Ok(FileContent::InMemory(content))
    }
}
