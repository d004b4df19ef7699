//! 대시보드 단건 조회.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use trader_account::{PullOutcome, ReconcileError, StateReconciler};
use trader_core::{AccountSnapshot, SyncConfig};
use trader_exchange::PullClient;

use crate::output::{render_snapshot, OutputFormat};

/// 스냅샷 조회 설정.
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// 출력 형식
    pub format: OutputFormat,
    /// 잔고만 조회
    pub balance_only: bool,
}

/// 일시적 오류 시 최대 시도 횟수.
const MAX_ATTEMPTS: u32 = 3;

/// 재시도 간 기본 대기 시간.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// 조회 후 조정기를 거친 스냅샷을 반환합니다.
///
/// 네트워크 오류나 타임아웃 같은 일시적 오류는 최대 `MAX_ATTEMPTS`번까지 다시 시도합니다.
pub async fn fetch_snapshot(
    pull: Arc<dyn PullClient>,
    sync: &SyncConfig,
    balance_only: bool,
) -> Result<Arc<AccountSnapshot>> {
    let reconciler = StateReconciler::new(pull, sync);
    let mut attempt = 1;
    let outcome = loop {
        let result = if balance_only {
            reconciler.request_balance_pull().await
        } else {
            reconciler.request_pull_update().await
        };
        match result {
            Err(ReconcileError::PullFailed(e)) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %e, "조회 실패, 재시도");
                tokio::time::sleep(RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            result => break result.context("조회 실패")?,
        }
    };

    match outcome {
        PullOutcome::Admitted(snapshot) => Ok(snapshot),
        // 새 조정기에는 푸시 이력이 없음
        PullOutcome::Skipped => Ok(reconciler.current()),
    }
}

/// `snapshot` 명령 실행.
pub async fn run_snapshot(
    pull: Arc<dyn PullClient>,
    sync: &SyncConfig,
    options: SnapshotOptions,
) -> Result<()> {
    let snapshot = fetch_snapshot(pull, sync, options.balance_only).await?;
    info!(positions = snapshot.positions.len(), "스냅샷 조회 완료");

    match options.format {
        OutputFormat::Table => print!("{}", render_snapshot(&snapshot)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&*snapshot)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::demo_portfolio;
    use rust_decimal_macros::dec;
    use trader_exchange::{ExchangeError, SimulatedPullClient};

    #[tokio::test]
    async fn test_fetch_snapshot() {
        let pull = SimulatedPullClient::new().with_snapshot(demo_portfolio());
        let snapshot = fetch_snapshot(Arc::new(pull), &SyncConfig::default(), false)
            .await
            .unwrap();
        assert_eq!(snapshot.positions.len(), 3);
    }

    #[tokio::test]
    async fn test_balance_only() {
        let pull = SimulatedPullClient::new().with_snapshot(demo_portfolio());
        let snapshot = fetch_snapshot(Arc::new(pull), &SyncConfig::default(), true)
            .await
            .unwrap();
        assert_eq!(snapshot.cash_balance, dec!(5000));
        assert!(snapshot.positions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let pull = SimulatedPullClient::new().with_snapshot(demo_portfolio());
        pull.fail_next(ExchangeError::Timeout("slow".to_string()));
        pull.fail_next(ExchangeError::NetworkError("reset".to_string()));

        let snapshot = fetch_snapshot(Arc::new(pull.clone()), &SyncConfig::default(), false)
            .await
            .unwrap();
        assert_eq!(snapshot.positions.len(), 3);
        assert_eq!(pull.dashboard_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let pull = SimulatedPullClient::new().with_snapshot(demo_portfolio());
        for _ in 0..MAX_ATTEMPTS {
            pull.fail_next(ExchangeError::Timeout("slow".to_string()));
        }

        assert!(fetch_snapshot(Arc::new(pull.clone()), &SyncConfig::default(), false)
            .await
            .is_err());
        assert_eq!(pull.dashboard_calls(), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_pull_failure_is_reported() {
        let pull = SimulatedPullClient::new();
        pull.fail_next(ExchangeError::Unauthorized("expired".to_string()));
        let err = fetch_snapshot(Arc::new(pull), &SyncConfig::default(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("조회 실패"));
    }
}
