//! 계좌 스냅샷 조정기.
//!
//! 푸시와 조회 두 경로로 들어오는 업데이트를 하나의 스냅샷으로 합칩니다.
//!
//! # 신선도 규칙
//!
//! - 푸시 업데이트는 항상 반영합니다.
//! - 조회 결과는 마지막 반영이 푸시였고 그 시각이 신선도 구간 `W` 안이면 버립니다.
//! - 조회 실패는 스냅샷을 건드리지 않습니다.
//!
//! 반영 여부 판단과 교체는 하나의 짧은 임계 구역 안에서 끝나며, 그 사이에
//! `.await`가 없습니다.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use trader_core::{AccountSnapshot, SnapshotPatch, SyncConfig, TraderResult};
use trader_exchange::{PullClient, PushEvent};

use crate::error::ReconcileError;

/// 마지막으로 반영된 업데이트의 출처.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// 푸시 채널
    Push,
    /// 조회 요청
    Pull,
}

#[derive(Debug, Clone, Copy)]
struct Provenance {
    at: Instant,
    recorded_at: DateTime<Utc>,
    source: UpdateSource,
}

impl Provenance {
    fn now(source: UpdateSource) -> Self {
        Self {
            at: Instant::now(),
            recorded_at: Utc::now(),
            source,
        }
    }
}

/// 푸시 업데이트 처리 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// 새 스냅샷으로 교체됨
    Applied(Arc<AccountSnapshot>),
    /// 스냅샷을 바꾸지 않는 이벤트
    Ignored,
}

/// 조회 업데이트 처리 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// 새 스냅샷으로 교체됨
    Admitted(Arc<AccountSnapshot>),
    /// 최근 푸시보다 오래된 데이터로 간주되어 버려짐
    Skipped,
}

impl PullOutcome {
    /// 반영되었는지 확인.
    pub fn is_admitted(&self) -> bool {
        matches!(self, PullOutcome::Admitted(_))
    }
}

struct ReconcilerInner {
    snapshot: Arc<AccountSnapshot>,
    provenance: Option<Provenance>,
}

/// 계좌 스냅샷 조정기.
///
/// 스냅샷의 유일한 작성자입니다. 모든 쓰기는 문서 전체 교체이며,
/// 교체된 스냅샷은 `subscribe()` 구독자에게 순서대로 전달됩니다.
pub struct StateReconciler {
    pull: Arc<dyn PullClient>,
    window: Duration,
    inner: Mutex<ReconcilerInner>,
    snapshots_tx: broadcast::Sender<Arc<AccountSnapshot>>,
}

impl StateReconciler {
    /// 새 조정기를 생성합니다.
    pub fn new(pull: Arc<dyn PullClient>, config: &SyncConfig) -> Self {
        let (snapshots_tx, _) = broadcast::channel(config.snapshot_buffer.max(1));

        Self {
            pull,
            window: config.freshness_window(),
            inner: Mutex::new(ReconcilerInner {
                snapshot: Arc::new(AccountSnapshot::empty()),
                provenance: None,
            }),
            snapshots_tx,
        }
    }

    /// 현재 스냅샷.
    pub fn current(&self) -> Arc<AccountSnapshot> {
        Arc::clone(&self.lock().snapshot)
    }

    /// 반영된 스냅샷을 구독합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AccountSnapshot>> {
        self.snapshots_tx.subscribe()
    }

    /// 신선도 구간.
    pub fn freshness_window(&self) -> Duration {
        self.window
    }

    /// 마지막 반영의 출처와 시각.
    pub fn last_update(&self) -> Option<(UpdateSource, DateTime<Utc>)> {
        self.lock()
            .provenance
            .map(|p| (p.source, p.recorded_at))
    }

    /// 푸시 이벤트를 반영합니다.
    ///
    /// 포트폴리오/잔고 이벤트는 항상 반영합니다. 실려 온 필드만 이전 스냅샷에
    /// 덮어써 새 스냅샷을 만들므로 잔고 이벤트는 포지션을 보존합니다.
    /// 주문 알림 등 나머지 이벤트는 `Ignored`.
    ///
    /// # Errors
    /// 병합 결과가 검증에 실패하면 `InvalidSnapshot`이며 스냅샷은 그대로입니다.
    pub fn apply_push_update(&self, event: &PushEvent) -> Result<PushOutcome, ReconcileError> {
        let Some(patch) = event.snapshot_patch() else {
            debug!(kind = event.kind(), "스냅샷과 무관한 이벤트");
            return Ok(PushOutcome::Ignored);
        };

        let mut inner = self.lock();
        let next = inner.snapshot.merged(&patch).map_err(|e| {
            warn!(kind = event.kind(), error = %e, "푸시 업데이트 거부");
            ReconcileError::from(e)
        })?;

        let next = self.replace(&mut inner, next, UpdateSource::Push);
        debug!(kind = event.kind(), source = "push", "스냅샷 교체");
        Ok(PushOutcome::Applied(next))
    }

    /// 대시보드를 조회해 반영합니다.
    ///
    /// # Errors
    /// 조회가 실패하거나 타임아웃되면 `PullFailed`이며 스냅샷은 그대로입니다.
    pub async fn request_pull_update(&self) -> Result<PullOutcome, ReconcileError> {
        let fetched = self.pull.fetch_dashboard().await.map_err(|e| {
            warn!(error = %e, "대시보드 조회 실패");
            ReconcileError::PullFailed(e)
        })?;

        self.admit_pull("dashboard", |_| fetched.normalized())
    }

    /// 잔고를 조회해 현재 스냅샷에 병합합니다. 신선도 규칙은 동일합니다.
    pub async fn request_balance_pull(&self) -> Result<PullOutcome, ReconcileError> {
        let balance = self.pull.fetch_balance().await.map_err(|e| {
            warn!(error = %e, "잔고 조회 실패");
            ReconcileError::PullFailed(e)
        })?;

        let patch = SnapshotPatch::from(&balance);
        self.admit_pull("balance", |current| current.merged(&patch))
    }

    /// 저장소를 비웁니다 (로그아웃).
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.snapshot = Arc::new(AccountSnapshot::empty());
        inner.provenance = None;
        let _ = self.snapshots_tx.send(Arc::clone(&inner.snapshot));
        info!("계좌 스냅샷 초기화");
    }

    /// 조회 결과의 반영 여부를 결정합니다.
    ///
    /// 마지막 반영이 푸시이고 경과 시간이 구간 `W` 미만이면 `Skipped`.
    /// 판단과 교체는 같은 잠금 안에서 이루어집니다.
    fn admit_pull(
        &self,
        what: &'static str,
        build: impl FnOnce(&AccountSnapshot) -> TraderResult<AccountSnapshot>,
    ) -> Result<PullOutcome, ReconcileError> {
        let mut inner = self.lock();

        if let Some(provenance) = inner.provenance {
            let elapsed = Instant::now().saturating_duration_since(provenance.at);
            if provenance.source == UpdateSource::Push && elapsed < self.window {
                debug!(
                    what,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "최근 푸시보다 오래된 조회 결과 무시"
                );
                return Ok(PullOutcome::Skipped);
            }
        }

        let next = build(&inner.snapshot).map_err(|e| {
            warn!(what, error = %e, "조회 결과 거부");
            ReconcileError::from(e)
        })?;

        let next = self.replace(&mut inner, next, UpdateSource::Pull);
        debug!(what, source = "pull", "스냅샷 교체");
        Ok(PullOutcome::Admitted(next))
    }

    /// 스냅샷을 교체하고 구독자에게 알립니다. 잠금 안에서 호출해야 합니다.
    fn replace(
        &self,
        inner: &mut ReconcilerInner,
        snapshot: AccountSnapshot,
        source: UpdateSource,
    ) -> Arc<AccountSnapshot> {
        let snapshot = Arc::new(snapshot);
        inner.snapshot = Arc::clone(&snapshot);
        inner.provenance = Some(Provenance::now(source));
        // 구독자가 없어도 괜찮음
        let _ = self.snapshots_tx.send(Arc::clone(&snapshot));
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, ReconcilerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
