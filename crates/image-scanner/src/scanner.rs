//! 스캔 오케스트레이터 — 태그 열거와 태그별 파이프라인 실행
//!
//! [`ImageScanner`]는 provider에서 태그를 열거한 뒤 태그마다
//! 레이어 워커와 히스토리/환경 스캔을 동시에 실행하고, 버스를 닫고
//! 워커를 join한 뒤 결과를 집계합니다.
//!
//! # 태그 상태 흐름
//!
//! ```text
//! New -> Scanning -> Draining -> Aggregating -> Done
//!            |
//!            +-> Failed (부분 결과 + 에러 로그)
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use layerlens_core::config::{ExcludedPatterns, RegexCorpus, ScanConfig};
use layerlens_core::error::LayerlensError;
use layerlens_core::types::{FinalOutput, ScanSet};
use layerlens_deps_audit::{DependencyAnalyzer, ScanContext};

use crate::error::ImageScanError;
use crate::history::process_history_and_env;
use crate::source::ImageProvider;
use crate::walker::process_layers;
use crate::worker::spawn_workers;

/// 스캔 실행 옵션
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// 활성화할 스캔 종류
    pub scans: ScanSet,
    /// 전체 태그 스캔 여부 (false면 첫 태그만)
    pub all_tags: bool,
}

/// 태그 스캔 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagScanState {
    /// 생성됨, 아직 시작하지 않음
    New,
    /// 레이어/히스토리 처리 중
    Scanning,
    /// 버스가 닫히고 워커 큐를 비우는 중
    Draining,
    /// 결과 집계 중
    Aggregating,
    /// 완료
    Done,
    /// 일부 단계 실패 — 부분 결과 유지
    Failed,
}

/// 태그 스캔 하나가 공유하는 읽기 전용 컨텍스트와 출력 핸들
#[derive(Clone)]
pub(crate) struct ScanShared {
    /// 스캔 파라미터
    pub config: Arc<ScanConfig>,
    /// 활성화된 스캔 종류
    pub scans: ScanSet,
    /// 시크릿 정규식 코퍼스
    pub corpus: Arc<RegexCorpus>,
    /// 경로 제외 패턴
    pub excluded: Arc<ExcludedPatterns>,
    /// 의존성 분석기
    pub analyzer: Arc<DependencyAnalyzer>,
    /// 이 태그 스캔의 lockfile 중복 제거 컨텍스트
    pub dep_ctx: Arc<ScanContext>,
    /// 공유 출력 — 유일한 공유 쓰기 자원
    pub output: Arc<Mutex<FinalOutput>>,
    /// 스캔 전체 취소 토큰
    pub cancel: CancellationToken,
}

/// 이미지 스캐너 오케스트레이터
pub struct ImageScanner<P: ImageProvider> {
    provider: P,
    config: Arc<ScanConfig>,
    corpus: Arc<RegexCorpus>,
    excluded: Arc<ExcludedPatterns>,
    analyzer: Arc<DependencyAnalyzer>,
    cancel: CancellationToken,
}

impl<P: ImageProvider> ImageScanner<P> {
    /// 스캐너를 생성합니다.
    pub fn new(
        provider: P,
        config: ScanConfig,
        corpus: Arc<RegexCorpus>,
        excluded: Arc<ExcludedPatterns>,
        analyzer: Arc<DependencyAnalyzer>,
    ) -> Self {
        Self {
            provider,
            config: Arc::new(config),
            corpus,
            excluded,
            analyzer,
            cancel: CancellationToken::new(),
        }
    }

    /// 취소 토큰을 반환합니다.
    ///
    /// 취소되면 새 태스크 생성과 HTTP 요청이 중단되고 부분 결과가 반환됩니다.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 이미지를 스캔하여 태그별 결과 목록을 반환합니다.
    ///
    /// `all_tags`가 꺼져 있으면 첫 태그만 스캔합니다. 개별 태그의 실패는
    /// 기록하고 다음 태그로 진행하며, 모든 태그가 실패한 경우에만
    /// 에러를 반환합니다. 취소 시 지금까지의 부분 결과를 반환합니다.
    pub async fn scan(&self, options: ScanOptions) -> Result<Vec<FinalOutput>, LayerlensError> {
        info!(
            image = %self.provider.name(),
            scans = %options.scans,
            all_tags = options.all_tags,
            "starting image scan"
        );

        let tags = self.provider.list_tags().await.map_err(LayerlensError::from)?;
        if tags.is_empty() {
            return Err(ImageScanError::NoTags {
                repository: self.provider.name().to_owned(),
            }
            .into());
        }

        let selected: Vec<String> = if options.all_tags {
            tags
        } else {
            tags.into_iter().take(1).collect()
        };

        let mut results = Vec::with_capacity(selected.len());
        let mut first_failure: Option<ImageScanError> = None;

        for tag in &selected {
            if self.cancel.is_cancelled() {
                info!("scan cancelled, returning partial results");
                break;
            }

            match self.scan_tag(tag, options.scans).await {
                Ok(output) => results.push(output),
                Err(e) => {
                    error!(tag = %tag, error = %e, "tag scan failed");
                    first_failure.get_or_insert(e);
                }
            }
        }

        if results.is_empty() {
            if let Some(failure) = first_failure {
                return Err(failure.into());
            }
        }

        info!(tags = results.len(), "image scan completed");
        Ok(results)
    }

    /// 태그 하나를 스캔합니다.
    async fn scan_tag(&self, tag: &str, scans: ScanSet) -> Result<FinalOutput, ImageScanError> {
        let mut state = TagScanState::New;
        let target = self.provider.target(tag);
        info!(target = %target, state = ?state, "scanning tag");

        let source = Arc::new(self.provider.image(tag).await?);
        let output = Arc::new(Mutex::new(FinalOutput::new(&target)));

        let shared = ScanShared {
            config: Arc::clone(&self.config),
            scans,
            corpus: Arc::clone(&self.corpus),
            excluded: Arc::clone(&self.excluded),
            analyzer: Arc::clone(&self.analyzer),
            dep_ctx: Arc::new(ScanContext::with_cancellation(self.cancel.clone())),
            output: Arc::clone(&output),
            cancel: self.cancel.clone(),
        };

        let (task_tx, task_rx) = mpsc::channel(self.config.queue_depth());
        let pool = spawn_workers(&shared, task_rx);

        state = TagScanState::Scanning;
        debug!(target = %target, state = ?state, "tag state");

        let (layers_result, history_result) = tokio::join!(
            process_layers(Arc::clone(&source), shared.clone(), task_tx.clone()),
            process_history_and_env(&*source, &shared, &task_tx),
        );

        // 버스를 닫아 워커 종료를 유도
        drop(task_tx);
        state = TagScanState::Draining;
        debug!(target = %target, state = ?state, "tag state");
        pool.join().await;

        // 실패한 단계가 있어도 워커가 이미 병합한 부분 결과는 보존합니다
        let mut failed = false;
        if let Err(e) = &layers_result {
            warn!(target = %target, error = %e, "layer processing failed");
            failed = true;
        }
        if let Err(e) = &history_result {
            warn!(target = %target, error = %e, "history/env processing failed");
            failed = true;
        }

        state = TagScanState::Aggregating;
        debug!(target = %target, state = ?state, "tag state");

        let mut final_output = {
            let mut guard = output.lock().await;
            std::mem::take(&mut *guard)
        };
        crate::aggregate::finalize(&mut final_output);

        state = if failed {
            TagScanState::Failed
        } else {
            TagScanState::Done
        };
        info!(
            target = %target,
            state = ?state,
            secrets = final_output.secrets.len(),
            vulnerabilities = final_output.vulnerabilities.len(),
            domains = final_output.assets.domains.len(),
            urls = final_output.assets.urls.len(),
            "tag scan finished"
        );

        Ok(final_output)
    }
}
