//! 모의 시세 피드.
//!
//! 시뮬레이션 서버 포트폴리오의 보유 종목 가격을 무작위로 움직이고,
//! 변경분과 가상 호가(원시 주문 목록)를 푸시합니다.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trader_core::{RawOrder, Side};

use super::transport::SimulatedTransport;
use crate::channel::{OrderBookUpdate, PushEvent};

/// 호가 한쪽에 생성할 가격 단계 수.
const BOOK_LEVELS: u32 = 5;

/// health probe 간격 (틱 수).
const PROBE_EVERY: u64 = 10;

/// 모의 시세 피드.
pub struct MarketSimulator {
    transport: SimulatedTransport,
    prices: BTreeMap<String, Decimal>,
    ticks: u64,
}

impl MarketSimulator {
    /// 서버 포트폴리오의 현재가로 초기화합니다.
    pub fn new(transport: SimulatedTransport) -> Self {
        let prices = transport
            .portfolio()
            .map(|snapshot| {
                snapshot
                    .positions
                    .iter()
                    .map(|p| (p.ticker.clone(), p.current_price))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            transport,
            prices,
            ticks: 0,
        }
    }

    /// 취소될 때까지 주기적으로 시세를 움직입니다.
    pub async fn run(mut self, update_interval: Duration, cancel: CancellationToken) {
        info!(
            tickers = self.prices.len(),
            "모의 시세 피드 시작 (간격 {:?})", update_interval
        );

        let mut ticker = interval(update_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("모의 시세 피드 종료");
                    return;
                }
                _ = ticker.tick() => self.step(),
            }
        }
    }

    /// 한 번의 시세 변동을 적용하고 푸시합니다.
    pub fn step(&mut self) {
        self.ticks += 1;
        self.update_prices();

        for (symbol, price) in &self.prices {
            if !self.transport.push_tick(symbol, *price) {
                debug!(symbol = %symbol, "푸시 실패 (연결 없음)");
            }
            self.transport.emit(PushEvent::OrderBookUpdate(OrderBookUpdate {
                ticker: symbol.clone(),
                orders: synthetic_book(symbol, *price),
            }));
        }

        if self.ticks % PROBE_EVERY == 0 {
            self.transport.emit(PushEvent::HealthProbe);
        }
    }

    /// 현재 가격.
    pub fn price(&self, ticker: &str) -> Option<Decimal> {
        self.prices.get(ticker).copied()
    }

    fn update_prices(&mut self) {
        let mut rng = rand::thread_rng();

        for (symbol, price) in self.prices.iter_mut() {
            // 랜덤 가격 변동 (-0.5% ~ +0.5%)
            let change_pct = rng.gen_range(-0.005..0.005);
            let change = *price * Decimal::try_from(change_pct).unwrap_or(Decimal::ZERO);
            *price = (*price + change).round_dp(2).max(dec!(0.01));

            debug!(symbol = %symbol, price = %price, "모의 가격 갱신");
        }
    }
}

/// 현재가 주변의 가상 지정가 주문 목록.
fn synthetic_book(ticker: &str, price: Decimal) -> Vec<RawOrder> {
    let mut rng = rand::thread_rng();
    let tick = (price * dec!(0.001)).round_dp(2).max(dec!(0.01));
    let now = Utc::now();

    let mut orders = Vec::with_capacity((BOOK_LEVELS * 2) as usize);
    for level in 1..=BOOK_LEVELS {
        let offset = tick * Decimal::from(level);
        for (side, level_price) in [(Side::Buy, price - offset), (Side::Sell, price + offset)] {
            if level_price <= Decimal::ZERO {
                continue;
            }
            let quantity = Decimal::from(rng.gen_range(1..=50u32));
            orders.push(
                RawOrder::limit(
                    format!("{}-{}-{}", ticker, side, level),
                    side,
                    level_price,
                    quantity,
                )
                .with_created_at(now),
            );
        }
    }
    orders
}

/// 시뮬레이터를 백그라운드로 시작합니다. 반환된 토큰으로 중지합니다.
pub fn start_market_feed(transport: SimulatedTransport, update_interval: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let simulator = MarketSimulator::new(transport);
    tokio::spawn(simulator.run(update_interval, cancel.clone()));
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Handshake, LinkFrame, PushTransport};
    use trader_core::{aggregate, AccountSnapshot, Position, SessionCredential};

    fn portfolio() -> AccountSnapshot {
        AccountSnapshot {
            cash_balance: dec!(1000),
            positions: vec![Position::new("AAPL", dec!(10), dec!(150), dec!(150))],
            ..Default::default()
        }
    }

    #[test]
    fn test_synthetic_book_is_two_sided() {
        let depth = aggregate(&synthetic_book("AAPL", dec!(150)));

        assert_eq!(depth.bid_levels.len(), BOOK_LEVELS as usize);
        assert_eq!(depth.ask_levels.len(), BOOK_LEVELS as usize);
        assert!(depth.best_bid().unwrap().price < dec!(150));
        assert!(depth.best_ask().unwrap().price > dec!(150));
    }

    #[tokio::test]
    async fn test_step_pushes_portfolio_and_book() {
        let transport = SimulatedTransport::new().with_portfolio(portfolio());
        let link = transport
            .open(&Handshake::new(SessionCredential::new("t"), 0))
            .await
            .unwrap();
        let mut frames = link.take_receiver().unwrap();

        let mut simulator = MarketSimulator::new(transport.clone());
        simulator.step();

        let Some(LinkFrame::Event(PushEvent::PortfolioUpdate(patch))) = frames.recv().await else {
            panic!("expected portfolio update");
        };
        let price = simulator.price("AAPL").unwrap();
        assert_eq!(patch.positions.unwrap()[0].current_price, price);

        assert!(matches!(
            frames.recv().await,
            Some(LinkFrame::Event(PushEvent::OrderBookUpdate(_)))
        ));
    }

    #[test]
    fn test_empty_portfolio_has_no_prices() {
        let simulator = MarketSimulator::new(SimulatedTransport::new());
        assert_eq!(simulator.price("AAPL"), None);
    }
}
