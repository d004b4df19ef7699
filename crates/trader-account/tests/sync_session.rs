//! 시뮬레이션 백엔드를 사용한 세션 통합 테스트.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use trader_account::SyncSession;
use trader_core::{AccountBalance, AccountSnapshot, AppConfig, Position};
use trader_exchange::{
    start_market_feed, ClientRequest, ConnectionState, PushEvent, SimulatedPullClient,
    SimulatedTransport, StaticCredentials,
};

const WAIT: Duration = Duration::from_secs(5);

fn config(poll_interval_secs: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.sync.poll_interval_secs = poll_interval_secs;
    config.channel.reconnect_delay_ms = 10;
    config.channel.max_reconnect_delay_ms = 50;
    config.channel.reconnect_jitter_ms = 0;
    config
}

fn portfolio() -> AccountSnapshot {
    AccountSnapshot {
        cash_balance: dec!(1000),
        positions: vec![
            Position::new("AAPL", dec!(10), dec!(150), dec!(150)),
            Position::new("MSFT", dec!(5), dec!(400), dec!(410)),
        ],
        ..Default::default()
    }
}

async fn next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_reconnect_resyncs_without_duplicate_delivery() {
    let transport = SimulatedTransport::new().with_portfolio(portfolio());
    let session = SyncSession::new(
        Arc::new(transport.clone()),
        Arc::new(SimulatedPullClient::new()),
        Arc::new(StaticCredentials::new("tok-1", "user-1")),
        &config(0),
    );
    let mut snapshots = session.subscribe();
    let mut state = session.watch_state();

    session.start().await.unwrap();
    assert_eq!(next(&mut snapshots).await.positions.len(), 2);

    transport.drop_connection("server restart");

    // 재연결 후 다시 전체 포트폴리오 요청
    assert_eq!(next(&mut snapshots).await.positions.len(), 2);
    assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);
    let requests = transport.sent_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| matches!(r, ClientRequest::RequestPortfolio { user_id } if user_id == "user-1")));
    assert_eq!(transport.listener_registrations(), 2);

    transport.emit(PushEvent::BalanceUpdate(AccountBalance {
        cash_balance: dec!(1),
        total_portfolio_value: None,
    }));
    assert_eq!(next(&mut snapshots).await.cash_balance, dec!(1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(snapshots.try_recv().is_err());

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_pulls_periodically() {
    let pull = SimulatedPullClient::new().with_snapshot(AccountSnapshot {
        cash_balance: dec!(10),
        ..Default::default()
    });
    let session = SyncSession::new(
        Arc::new(SimulatedTransport::new()),
        Arc::new(pull.clone()),
        Arc::new(StaticCredentials::new("tok-1", "user-1")),
        &config(1),
    );
    let mut snapshots = session.subscribe();

    session.start().await.unwrap();
    assert_eq!(next(&mut snapshots).await.cash_balance, dec!(10));

    pull.set_snapshot(AccountSnapshot {
        cash_balance: dec!(20),
        ..Default::default()
    });
    assert_eq!(next(&mut snapshots).await.cash_balance, dec!(20));
    assert!(pull.dashboard_calls() >= 2);

    session.logout().await;
}

#[tokio::test]
async fn test_session_without_user_id_syncs_by_pull() {
    let pull = SimulatedPullClient::new().with_snapshot(portfolio());
    let session = SyncSession::new(
        Arc::new(SimulatedTransport::new()),
        Arc::new(pull.clone()),
        Arc::new(StaticCredentials::new("tok-1", "")),
        &config(0),
    );
    let mut snapshots = session.subscribe();

    session.start().await.unwrap();
    let snapshot = next(&mut snapshots).await;
    assert_eq!(snapshot.position("MSFT").unwrap().unrealized_pnl, dec!(50));
    assert_eq!(pull.dashboard_calls(), 1);

    // 마지막 반영이 조회였으므로 다음 조회도 반영
    assert!(session.refresh().await.unwrap().is_admitted());
    session.logout().await;
}

#[tokio::test]
async fn test_market_feed_drives_snapshot_and_depth() {
    let transport = SimulatedTransport::new().with_portfolio(portfolio());
    let session = SyncSession::new(
        Arc::new(transport.clone()),
        Arc::new(SimulatedPullClient::new()),
        Arc::new(StaticCredentials::new("tok-1", "user-1")),
        &config(0),
    );
    let mut snapshots = session.subscribe();
    let mut depth = session.depth_feed();

    session.start().await.unwrap();
    next(&mut snapshots).await;

    let feed = start_market_feed(transport.clone(), Duration::from_millis(20));
    let update = next(&mut depth).await;
    assert!(update.depth.spread.is_some());

    let snapshot = next(&mut snapshots).await;
    assert!(snapshot.positions.iter().all(|p| p.is_consistent()));

    feed.cancel();
    session.logout().await;
    assert!(session.depth("AAPL").is_none());
    assert!(session.snapshot().is_empty());
}
