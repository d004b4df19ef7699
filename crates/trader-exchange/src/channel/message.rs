//! 푸시 채널 와이어 메시지.
//!
//! 모든 메시지는 `{"type": "...", "data": {...}}` 형태의 JSON입니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trader_core::{AccountBalance, OrderStatus, RawOrder, Side, SnapshotPatch};

/// 서버 → 클라이언트 이벤트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// 포트폴리오 변경 (실려 온 필드만 갱신)
    PortfolioUpdate(SnapshotPatch),
    /// 잔고 변경
    BalanceUpdate(AccountBalance),
    /// 주문 체결/취소 알림. 스냅샷을 바꾸지 않습니다.
    OrderUpdate(OrderNotice),
    /// 가격 알림
    PriceAlert(PriceAlert),
    /// 종목별 원시 주문 목록
    OrderBookUpdate(OrderBookUpdate),
    /// 서버 생존 확인
    HealthProbe,
}

impl PushEvent {
    /// 로그용 이벤트 종류.
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::PortfolioUpdate(_) => "portfolio_update",
            PushEvent::BalanceUpdate(_) => "balance_update",
            PushEvent::OrderUpdate(_) => "order_update",
            PushEvent::PriceAlert(_) => "price_alert",
            PushEvent::OrderBookUpdate(_) => "order_book_update",
            PushEvent::HealthProbe => "health_probe",
        }
    }

    /// 스냅샷에 병합할 부분 업데이트를 반환합니다.
    pub fn snapshot_patch(&self) -> Option<SnapshotPatch> {
        match self {
            PushEvent::PortfolioUpdate(patch) => Some(patch.clone()),
            PushEvent::BalanceUpdate(balance) => Some(SnapshotPatch::from(balance)),
            _ => None,
        }
    }
}

/// 주문 수명주기 알림.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotice {
    pub order_id: String,
    pub ticker: String,
    pub side: Side,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 가격 알림.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    pub ticker: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
}

/// 종목 하나의 원시 주문 목록.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookUpdate {
    pub ticker: String,
    #[serde(default)]
    pub orders: Vec<RawOrder>,
}

/// 클라이언트 → 서버 요청.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    /// 포트폴리오 전체 전송 요청
    RequestPortfolio {
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// 모의 시세 주입 (테스트용)
    SubmitMockTick { ticker: String, price: Decimal },
}

/// 전송 계층이 관리자에게 넘기는 프레임.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkFrame {
    /// 해석된 서버 이벤트
    Event(PushEvent),
    /// 전송 계층이 끊어짐 (사유)
    Closed(String),
}

/// 연결 관리자가 구독자에게 내보내는 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// 서버 이벤트 (수신 순서 유지)
    Push(PushEvent),
    /// 연결/재연결 직후 초기 동기화 요청
    SyncRequested,
}
