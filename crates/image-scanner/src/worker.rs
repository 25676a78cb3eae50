//! 태스크 버스와 워커 풀
//!
//! bounded mpsc 채널 하나를 여러 워커가 공유 수신합니다. 각 워커는
//! 시크릿/자산 결과를 로컬에 모았다가 채널이 닫히면 로컬 자산을
//! 중복 제거한 뒤 공유 [`FinalOutput`]에 단일 락으로 병합합니다.
//! 취소 시 워커는 스캔 없이 큐를 빠르게 비웁니다.

use std::sync::Arc;

use memmap2::Mmap;
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use layerlens_core::types::{Assets, Scope};

use crate::assets::add_domains_and_urls;
use crate::scanner::ScanShared;
use crate::secrets::SecretScanner;

/// 스캔 대상 파일 내용
///
/// 작은 파일은 메모리에, 큰 파일은 임시 파일로 내려 mmap으로 접근합니다.
/// 태스크가 드랍되면 임시 파일도 함께 정리됩니다.
#[derive(Debug)]
pub(crate) enum FileContent {
    /// 메모리에 보관된 내용
    InMemory(Vec<u8>),
    /// 임시 파일로 spill 후 mmap된 내용
    Mapped {
        map: Mmap,
        /// mmap이 살아있는 동안 임시 파일을 붙잡아 둡니다
        _spill: NamedTempFile,
    },
}

impl FileContent {
    /// 내용의 바이트 뷰를 반환합니다.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            Self::InMemory(bytes) => bytes,
            Self::Mapped { map, .. } => map,
        }
    }
}

/// 워커가 소비하는 스캔 태스크 — 정확히 한 번 소비됩니다.
#[derive(Debug)]
pub(crate) struct ScanTask {
    /// tar 내부 경로 (또는 `history:{n}` / `ENV`)
    pub path: String,
    /// 파일 내용
    pub content: FileContent,
    /// 발견 위치
    pub scope: Scope,
}

/// 실행 중인 워커 풀 핸들
pub(crate) struct WorkerPool {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// 모든 워커가 종료할 때까지 기다립니다.
    pub(crate) async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "scan worker panicked");
            }
        }
    }
}

/// 워커 풀을 시작합니다.
///
/// 수신측은 `Arc<Mutex<Receiver>>`로 공유되어 여러 워커가 같은 큐를
/// 소비합니다. 송신측이 모두 드랍되면 워커들이 차례로 종료합니다.
pub(crate) fn spawn_workers(shared: &ScanShared, rx: mpsc::Receiver<ScanTask>) -> WorkerPool {
    let rx = Arc::new(Mutex::new(rx));
    let handles = (0..shared.config.worker_count)
        .map(|worker_id| {
            let shared = shared.clone();
            let rx = Arc::clone(&rx);
            tokio::spawn(worker_loop(worker_id, shared, rx))
        })
        .collect();

    WorkerPool { handles }
}

async fn worker_loop(
    worker_id: usize,
    shared: ScanShared,
    rx: Arc<Mutex<mpsc::Receiver<ScanTask>>>,
) {
    let scanner = SecretScanner::new(Arc::clone(&shared.corpus));
    let mut secrets = Vec::new();
    let mut assets = Assets::default();

    loop {
        // 락은 recv 동안만 유지 — 태스크 처리 중에는 다른 워커가 수신 가능
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else {
            break;
        };

        if shared.cancel.is_cancelled() {
            // 취소: 새 발견 없이 큐만 비움
            continue;
        }

        if shared.scans.secrets() {
            secrets.extend(scanner.scan(&task.path, task.content.as_bytes(), &task.scope));
        }

        if shared.scans.assets() {
            let text = String::from_utf8_lossy(task.content.as_bytes());
            add_domains_and_urls(&mut assets, &text);
        }
    }

    // 로컬 집계 후 단일 락으로 병합
    assets.make_unique();
    let found_secrets = secrets.len();
    let mut output = shared.output.lock().await;
    output.secrets.extend(secrets);
    output.assets.merge(assets);
    drop(output);

    debug!(worker = worker_id, secrets = found_secrets, "scan worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_content_bytes() {
        let content = FileContent::InMemory(b"hello".to_vec());
        assert_eq!(content.as_bytes(), b"hello");
    }

    #[test]
    fn mapped_content_bytes() {
        use std::io::Write;

        let mut spill = NamedTempFile::new().unwrap();
        spill.write_all(b"spilled content").unwrap();
        spill.flush().unwrap();
        // SAFETY: 임시 파일은 이 프로세스가 소유하며 mmap 동안 수정되지 않음
        let map = unsafe { Mmap::map(spill.as_file()).unwrap() };
        let content = FileContent::Mapped { map, _spill: spill };
        assert_eq!(content.as_bytes(), b"spilled content");
    }
}
