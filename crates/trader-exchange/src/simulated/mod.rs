//! 오프라인 실행과 테스트를 위한 시뮬레이션 백엔드.
//!
//! - `SimulatedTransport`: 핸드셰이크 결과 스크립트, 이벤트 주입, 연결 끊김 재현
//! - `SimulatedPullClient`: 메모리 상의 조회 응답, 지연/실패 주입
//! - `MarketSimulator`: 보유 종목 시세 랜덤 워크
//!
//! # 예제
//!
//! ```ignore
//! use trader_exchange::simulated::{SimulatedTransport, start_market_feed};
//!
//! let transport = SimulatedTransport::new().with_portfolio(snapshot);
//! let feed = start_market_feed(transport.clone(), Duration::from_secs(1));
//! // ...
//! feed.cancel();
//! ```

mod feed;
mod pull;
mod transport;

pub use feed::{start_market_feed, MarketSimulator};
pub use pull::SimulatedPullClient;
pub use transport::{HandshakeOutcome, SimulatedLink, SimulatedTransport};
