//! 스캔 컨텍스트 — 이미지 스캔 단위의 lockfile 중복 제거와 취소 전파
//!
//! 같은 경로의 lockfile이 여러 레이어에 존재할 수 있습니다.
//! [`ScanContext`]는 이미지 스캔마다 새로 생성되어 레이어 워커들 사이에
//! 공유되며, 한 경로를 한 번만 분석하도록 보장합니다.
//! 전역 상태가 아니므로 태그 간 스캔은 서로 독립적입니다.
//!
//! 스캔 전체 취소 토큰도 함께 실려, 취소 후에는 남은 의존성에 대한
//! 새 advisory 요청이 시작되지 않습니다.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// 이미지 스캔 하나의 분석 컨텍스트
#[derive(Debug, Default)]
pub struct ScanContext {
    seen: Mutex<HashSet<String>>,
    cancel: CancellationToken,
}

impl ScanContext {
    /// 빈 컨텍스트를 생성합니다 (취소되지 않는 기본 토큰).
    pub fn new() -> Self {
        Self::default()
    }

    /// 스캔 취소 토큰을 공유하는 컨텍스트를 생성합니다.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            cancel,
        }
    }

    /// 경로를 분석 완료로 표시합니다.
    ///
    /// 처음 보는 경로면 `true`, 이미 표시된 경로면 `false`를 반환합니다.
    pub fn try_mark(&self, path: &str) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(path.to_owned()),
            Err(poisoned) => poisoned.into_inner().insert(path.to_owned()),
        }
    }

    /// 지금까지 표시된 경로 수를 반환합니다.
    pub fn seen_count(&self) -> usize {
        match self.seen.lock() {
            Ok(seen) => seen.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// 스캔이 취소되었는지 확인합니다.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
