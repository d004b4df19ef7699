//! 조회(pull) 클라이언트 trait.

use async_trait::async_trait;
use trader_core::{AccountBalance, AccountSnapshot, RawOrder};

use crate::error::ExchangeResult;

/// 원격 서비스에 대한 요청-응답 조회.
///
/// 구현체는 자체적으로 자격증명을 조회하고, HTTP 클라이언트 타임아웃을 적용합니다.
#[async_trait]
pub trait PullClient: Send + Sync {
    /// 대시보드 스냅샷을 조회합니다.
    async fn fetch_dashboard(&self) -> ExchangeResult<AccountSnapshot>;

    /// 잔고를 조회합니다.
    async fn fetch_balance(&self) -> ExchangeResult<AccountBalance>;

    /// 종목의 원시 주문 목록을 조회합니다.
    async fn fetch_order_book(&self, ticker: &str) -> ExchangeResult<Vec<RawOrder>>;

    /// 세션 사용자의 주문 목록을 조회합니다.
    async fn fetch_orders(&self) -> ExchangeResult<Vec<RawOrder>>;
}
