//! 원격/시뮬레이션 백엔드 구성.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trader_core::{AccountSnapshot, AppConfig, OrderStatus, Position, RawOrder, Side};
use trader_exchange::{
    start_market_feed, CredentialProvider, PullClient, PushTransport, RestConfig,
    RestPullClient, SimulatedPullClient, SimulatedTransport, StaticCredentials,
    WebSocketTransport,
};

/// 세션 구성 요소 묶음.
pub struct Backend {
    pub transport: Arc<dyn PushTransport>,
    pub pull: Arc<dyn PullClient>,
    pub credentials: Arc<dyn CredentialProvider>,
    simulated: Option<SimulatedTransport>,
}

impl Backend {
    /// 설정의 REST/WebSocket 엔드포인트를 사용합니다.
    ///
    /// 자격증명은 `TRADER_TOKEN`, `TRADER_USER_ID` 환경 변수에서 읽습니다.
    pub fn remote(config: &AppConfig) -> Result<Self> {
        let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticCredentials::from_env());
        let pull = RestPullClient::new(RestConfig::from(&config.api), Arc::clone(&credentials))
            .context("REST 클라이언트 생성 실패")?;

        Ok(Self {
            transport: Arc::new(WebSocketTransport::from_config(config)),
            pull: Arc::new(pull),
            credentials,
            simulated: None,
        })
    }

    /// 데모 포트폴리오를 가진 시뮬레이션 백엔드.
    pub fn simulated() -> Self {
        let portfolio = demo_portfolio();
        let transport = SimulatedTransport::new().with_portfolio(portfolio.clone());
        let pull = SimulatedPullClient::new().with_snapshot(portfolio.clone());
        pull.set_orders(demo_orders());
        for position in &portfolio.positions {
            pull.set_order_book(
                position.ticker.clone(),
                demo_order_book(&position.ticker, position.current_price),
            );
        }

        Self {
            transport: Arc::new(transport.clone()),
            pull: Arc::new(pull),
            credentials: Arc::new(StaticCredentials::new("simulated-token", "demo-user")),
            simulated: Some(transport),
        }
    }

    /// 시뮬레이션 백엔드인지 확인.
    pub fn is_simulated(&self) -> bool {
        self.simulated.is_some()
    }

    /// 시뮬레이션 백엔드라면 모의 시세 피드를 시작합니다.
    pub fn start_feed(&self, every: Duration) -> Option<CancellationToken> {
        self.simulated
            .as_ref()
            .map(|transport| start_market_feed(transport.clone(), every))
    }
}

/// 데모 포트폴리오.
pub fn demo_portfolio() -> AccountSnapshot {
    let positions = vec![
        Position::new("AAPL", dec!(10), dec!(150), dec!(165)),
        Position::new("MSFT", dec!(5), dec!(400), dec!(410)),
        Position::new("NVDA", dec!(8), dec!(120), dec!(112.5)),
    ];
    let cash_balance = dec!(5000);
    let total_unrealized_pnl: Decimal = positions.iter().map(|p| p.unrealized_pnl).sum();
    let market_value: Decimal = positions.iter().map(|p| p.market_value).sum();
    let total_realized_pnl = dec!(320);

    AccountSnapshot {
        cash_balance,
        total_portfolio_value: cash_balance + market_value,
        total_pnl: total_realized_pnl + total_unrealized_pnl,
        total_realized_pnl,
        total_unrealized_pnl,
        positions,
    }
}

/// 현재가 주변의 고정 호가.
pub fn demo_order_book(ticker: &str, price: Decimal) -> Vec<RawOrder> {
    let tick = dec!(0.05);
    let order = |n: u32, side: Side, offset: u32, quantity: Decimal| {
        let step = tick * Decimal::from(offset);
        let level = match side {
            Side::Buy => price - step,
            Side::Sell => price + step,
        };
        RawOrder::limit(format!("{}-{}", ticker, n), side, level, quantity)
    };

    vec![
        order(1, Side::Buy, 1, dec!(12)),
        order(2, Side::Buy, 1, dec!(8)),
        order(3, Side::Buy, 2, dec!(25)),
        order(4, Side::Buy, 4, dec!(40)),
        order(5, Side::Sell, 1, dec!(10)),
        order(6, Side::Sell, 3, dec!(18)),
        order(7, Side::Sell, 3, dec!(7)),
        order(8, Side::Sell, 5, dec!(30)),
    ]
}

/// 데모 사용자의 주문 내역.
pub fn demo_orders() -> Vec<RawOrder> {
    vec![
        RawOrder::limit("demo-1", Side::Buy, dec!(160), dec!(5)),
        RawOrder::limit("demo-2", Side::Sell, dec!(420), dec!(2))
            .with_status(OrderStatus::PartiallyFilled),
        RawOrder::limit("demo-3", Side::Buy, dec!(110), dec!(8)).with_status(OrderStatus::Filled),
        RawOrder::limit("demo-4", Side::Sell, dec!(180), dec!(3))
            .with_status(OrderStatus::Cancelled),
    ]
}
