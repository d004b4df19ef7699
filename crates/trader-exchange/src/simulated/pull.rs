//! 시뮬레이션 조회 클라이언트.
//!
//! 메모리 상의 스냅샷/주문 목록을 반환하며, 지연과 실패를 주입할 수 있습니다.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;
use trader_core::{AccountBalance, AccountSnapshot, RawOrder};

use crate::error::{ExchangeError, ExchangeResult};
use crate::pull::PullClient;

#[derive(Default)]
struct PullState {
    snapshot: AccountSnapshot,
    balance: Option<AccountBalance>,
    books: HashMap<String, Vec<RawOrder>>,
    orders: Vec<RawOrder>,
    failures: VecDeque<ExchangeError>,
    latency: Duration,
    dashboard_calls: usize,
    balance_calls: usize,
    book_calls: usize,
}

/// 시뮬레이션 조회 클라이언트.
///
/// 복제본은 같은 상태를 공유합니다.
#[derive(Clone, Default)]
pub struct SimulatedPullClient {
    state: Arc<Mutex<PullState>>,
}

impl SimulatedPullClient {
    /// 빈 스냅샷을 반환하는 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 대시보드 응답을 설정합니다.
    pub fn with_snapshot(self, snapshot: AccountSnapshot) -> Self {
        self.set_snapshot(snapshot);
        self
    }

    /// 응답 지연을 설정합니다.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// 대시보드 응답을 교체합니다.
    pub fn set_snapshot(&self, snapshot: AccountSnapshot) {
        self.lock().snapshot = snapshot;
    }

    /// 잔고 응답을 설정합니다. 설정하지 않으면 스냅샷에서 계산합니다.
    pub fn set_balance(&self, balance: AccountBalance) {
        self.lock().balance = Some(balance);
    }

    /// 종목의 원시 주문 목록을 설정합니다.
    pub fn set_order_book(&self, ticker: impl Into<String>, orders: Vec<RawOrder>) {
        self.lock().books.insert(ticker.into(), orders);
    }

    /// 사용자 주문 목록을 설정합니다.
    pub fn set_orders(&self, orders: Vec<RawOrder>) {
        self.lock().orders = orders;
    }

    /// 다음 조회 한 번을 실패시킵니다. 여러 번 호출하면 순서대로 쌓입니다.
    pub fn fail_next(&self, error: ExchangeError) {
        self.lock().failures.push_back(error);
    }

    /// 대시보드 조회 횟수.
    pub fn dashboard_calls(&self) -> usize {
        self.lock().dashboard_calls
    }

    /// 잔고 조회 횟수.
    pub fn balance_calls(&self) -> usize {
        self.lock().balance_calls
    }

    /// 호가 조회 횟수.
    pub fn book_calls(&self) -> usize {
        self.lock().book_calls
    }

    /// 지연을 적용하고 주입된 실패가 있으면 꺼냅니다.
    async fn begin(&self) -> ExchangeResult<()> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failures.pop_front() {
            Some(error) => {
                debug!(error = %error, "주입된 조회 실패");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PullState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PullClient for SimulatedPullClient {
    async fn fetch_dashboard(&self) -> ExchangeResult<AccountSnapshot> {
        self.lock().dashboard_calls += 1;
        self.begin().await?;
        Ok(self.lock().snapshot.clone())
    }

    async fn fetch_balance(&self) -> ExchangeResult<AccountBalance> {
        self.lock().balance_calls += 1;
        self.begin().await?;
        let state = self.lock();
        Ok(state.balance.clone().unwrap_or_else(|| AccountBalance {
            cash_balance: state.snapshot.cash_balance,
            total_portfolio_value: Some(state.snapshot.total_portfolio_value),
        }))
    }

    async fn fetch_order_book(&self, ticker: &str) -> ExchangeResult<Vec<RawOrder>> {
        self.lock().book_calls += 1;
        self.begin().await?;
        self.lock()
            .books
            .get(ticker)
            .cloned()
            .ok_or_else(|| ExchangeError::NotFound(format!("order book {}", ticker)))
    }

    async fn fetch_orders(&self) -> ExchangeResult<Vec<RawOrder>> {
        self.begin().await?;
        Ok(self.lock().orders.clone())
    }
}
