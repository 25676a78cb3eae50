//! 히스토리/환경 변수 스캔 — 이미지 config에서 태스크 생성
//!
//! 빌드 히스토리의 `created_by` 명령과 런타임 환경 변수는 레이어 파일처럼
//! 시크릿/자산 태스크로 버스에 들어갑니다. 레이어 워커와 동시에 실행됩니다.

use tokio::sync::mpsc;
use tracing::debug;

use layerlens_core::types::Scope;

use crate::error::ImageScanError;
use crate::scanner::ScanShared;
use crate::source::ImageSource;
use crate::worker::{FileContent, ScanTask};

/// 이미지 config의 히스토리와 환경 변수를 태스크로 만듭니다.
///
/// - 히스토리: `created_by`가 비어있지 않은 엔트리마다 `history:{index}` 태스크
/// - 환경 변수: 루트 파일시스템 첫 diff ID를 위치로 하는 `ENV` 태스크
pub(crate) async fn process_history_and_env<S: ImageSource>(
    source: &S,
    shared: &ScanShared,
    task_tx: &mpsc::Sender<ScanTask>,
) -> Result<(), ImageScanError> {
    let config = source.config_file().await?;
    debug!(
        history = config.history.len(),
        env = config.config.env.len(),
        "scanning image history and environment"
    );

    for (index, entry) in config.history.iter().enumerate() {
        if shared.cancel.is_cancelled() {
            return Ok(());
        }
        if entry.created_by.is_empty() {
            continue;
        }

        let task = ScanTask {
            path: format!("history:{index}"),
            content: FileContent::InMemory(entry.created_by.clone().into_bytes()),
            scope: Scope::History(index),
        };
        if task_tx.send(task).await.is_err() {
            return Ok(());
        }
    }

    let diff_id = config
        .rootfs
        .diff_ids
        .first()
        .cloned()
        .unwrap_or_default();

    for env_var in &config.config.env {
        if shared.cancel.is_cancelled() {
            return Ok(());
        }

        let task = ScanTask {
            path: "ENV".to_owned(),
            content: FileContent::InMemory(env_var.clone().into_bytes()),
            scope: Scope::Env {
                diff_id: diff_id.clone(),
            },
        };
        if task_tx.send(task).await.is_err() {
            return Ok(());
        }
    }

    Ok(())
}
