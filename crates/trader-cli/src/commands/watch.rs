//! 실시간 동기화 세션 실행.
//!
//! 세션을 시작하고 반영된 스냅샷, 연결 상태 전이, 알림을 출력합니다.
//! Ctrl+C 또는 지정한 시간이 지나면 로그아웃하고 종료합니다.

use anyhow::{bail, Context, Result};
use chrono::Local;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use trader_account::SyncSession;
use trader_core::{AggregatedLevel, AppConfig};
use trader_exchange::ConnectionState;

use crate::backend::Backend;
use crate::output::{notice_line, snapshot_line};

/// watch 설정.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// 실행 시간 (없으면 Ctrl+C까지)
    pub duration: Option<Duration>,
    /// 모의 시세 간격 (시뮬레이션 백엔드 전용)
    pub tick_interval: Duration,
    /// 호가 갱신도 출력
    pub show_depth: bool,
}

/// `watch` 명령 실행.
pub async fn run_watch(backend: Backend, config: &AppConfig, options: WatchOptions) -> Result<()> {
    let session = SyncSession::new(
        backend.transport.clone(),
        backend.pull.clone(),
        backend.credentials.clone(),
        config,
    );

    let mut snapshots = session.subscribe();
    let mut notices = session.notices();
    let mut depth = session.depth_feed();
    let mut state = session.watch_state();

    session.start().await.context("세션 시작 실패")?;
    println!("{} [state] {}", stamp(), session.channel().state());
    info!(session = %session.id(), simulated = backend.is_simulated(), "계좌 동기화 감시 시작");

    let feed = backend.start_feed(options.tick_interval);

    let stop = async {
        match options.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Ctrl+C 핸들러 등록 실패");
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(stop);

    let result = loop {
        tokio::select! {
            _ = &mut stop => break Ok(()),
            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *state.borrow_and_update();
                println!("{} [state] {}", stamp(), current);
                if current == ConnectionState::Failed {
                    let reason = session
                        .channel()
                        .last_error()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    break Err(reason);
                }
            }
            received = snapshots.recv() => match received {
                Ok(snapshot) => println!("{} [snapshot] {}", stamp(), snapshot_line(&snapshot)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "스냅샷 출력 지연, 일부 누락"),
                Err(RecvError::Closed) => break Ok(()),
            },
            received = notices.recv() => match received {
                Ok(notice) => println!("{} [notice] {}", stamp(), notice_line(&notice)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "알림 출력 지연, 일부 누락"),
                Err(RecvError::Closed) => break Ok(()),
            },
            received = depth.recv() => match received {
                Ok(update) if options.show_depth => {
                    let best = |level: Option<&AggregatedLevel>| {
                        level.map(|l| l.price.to_string()).unwrap_or_else(|| "-".to_string())
                    };
                    println!(
                        "{} [depth] {} bid={} ask={}",
                        stamp(),
                        update.ticker,
                        best(update.depth.best_bid()),
                        best(update.depth.best_ask()),
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    if let Some(feed) = feed {
        feed.cancel();
    }
    session.logout().await;

    if let Err(reason) = result {
        bail!("채널 연결 실패: {}", reason);
    }
    Ok(())
}

fn stamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_watch_runs_and_logs_out() {
        let mut config = AppConfig::default();
        config.sync.poll_interval_secs = 0;

        let options = WatchOptions {
            duration: Some(Duration::from_millis(200)),
            tick_interval: Duration::from_millis(20),
            show_depth: true,
        };

        run_watch(Backend::simulated(), &config, options)
            .await
            .unwrap();
    }
}
