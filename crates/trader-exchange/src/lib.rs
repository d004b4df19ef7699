//! 원격 계좌 서비스 연결.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `ConnectionManager`: 인증된 푸시 채널의 단일 연결, 제한된 재연결
//! - WebSocket 전송 계층 (tokio-tungstenite)
//! - REST 조회 클라이언트 (대시보드, 잔고, 호가)
//! - 시뮬레이션 백엔드 (오프라인 실행 및 테스트용)

pub mod auth;
pub mod channel;
pub mod connector;
pub mod error;
pub mod pull;
pub mod simulated;
pub mod websocket;

pub use auth::{CredentialProvider, StaticCredentials};
pub use channel::*;
pub use connector::{RestConfig, RestPullClient};
pub use error::*;
pub use pull::PullClient;
pub use simulated::{
    start_market_feed, HandshakeOutcome, MarketSimulator, SimulatedLink, SimulatedPullClient,
    SimulatedTransport,
};
pub use websocket::WebSocketTransport;
