//! 사용자 주문 내역 조회.

use anyhow::{Context, Result};
use std::sync::Arc;
use trader_core::RawOrder;
use trader_exchange::PullClient;

use crate::output::{render_orders, OutputFormat};

/// 주문 조회 설정.
#[derive(Debug, Clone)]
pub struct OrdersOptions {
    /// 체결/취소된 주문까지 포함
    pub include_closed: bool,
    /// 출력 형식
    pub format: OutputFormat,
}

/// 주문 내역을 조회합니다. 최신 주문이 먼저 옵니다.
pub async fn fetch_orders(pull: &dyn PullClient, include_closed: bool) -> Result<Vec<RawOrder>> {
    let mut orders = pull.fetch_orders().await.context("주문 내역 조회 실패")?;
    if !include_closed {
        orders.retain(|o| o.status.is_active());
    }
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(orders)
}

/// `orders` 명령 실행.
pub async fn run_orders(pull: Arc<dyn PullClient>, options: OrdersOptions) -> Result<()> {
    let orders = fetch_orders(pull.as_ref(), options.include_closed).await?;

    match options.format {
        OutputFormat::Table => print!("{}", render_orders(&orders)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&orders)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::demo_orders;
    use trader_exchange::{ExchangeError, SimulatedPullClient};

    #[tokio::test]
    async fn test_active_orders_only_by_default() {
        let pull = SimulatedPullClient::new();
        pull.set_orders(demo_orders());

        let active = fetch_orders(&pull, false).await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|o| o.status.is_active()));

        let all = fetch_orders(&pull, true).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_pull_failure_is_reported() {
        let pull = SimulatedPullClient::new();
        pull.fail_next(ExchangeError::Unauthorized("expired".to_string()));

        let err = fetch_orders(&pull, true).await.unwrap_err();
        assert!(err.to_string().contains("주문 내역 조회 실패"));
    }
}
