//! 호가창에 표시되는 원시 주문 타입.
//!
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderType` - 주문 유형
//! - `OrderStatus` - 주문 상태
//! - `TimeInForce` - 주문 유효 기간
//! - `RawOrder` - 서버가 내려주는 불변 주문 레코드

use crate::types::{Price, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    #[serde(alias = "BUY")]
    Buy,
    /// 매도
    #[serde(alias = "SELL")]
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// 시장가 주문
    #[serde(alias = "MARKET")]
    Market,
    /// 지정가 주문
    #[serde(alias = "LIMIT")]
    Limit,
    /// 스톱 주문
    #[serde(alias = "STOP")]
    Stop,
    /// 지정가 스톱 주문
    #[serde(alias = "STOP_LIMIT")]
    StopLimit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// 주문 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// 접수 대기
    #[serde(alias = "PENDING")]
    Pending,
    /// 호가창에 걸려 있음
    #[serde(alias = "OPEN")]
    Open,
    /// 부분 체결됨
    #[serde(alias = "PARTIALLY_FILLED")]
    PartiallyFilled,
    /// 전량 체결됨
    #[serde(alias = "FILLED")]
    Filled,
    /// 취소됨
    #[serde(alias = "CANCELLED", alias = "canceled")]
    Cancelled,
    /// 거부됨
    #[serde(alias = "REJECTED")]
    Rejected,
    /// 유효 기간 만료
    #[serde(alias = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    /// 주문이 최종 상태인지 확인합니다.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// 주문이 여전히 활성 상태인지 확인합니다.
    pub fn is_active(&self) -> bool {
        !self.is_final()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

/// 주문 유효 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// 취소될 때까지 유효 (Good Till Cancelled)
    #[serde(alias = "gtc")]
    GTC,
    /// 즉시 체결 또는 취소 (Immediate Or Cancel)
    #[serde(alias = "ioc")]
    IOC,
    /// 전량 체결 또는 취소 (Fill Or Kill)
    #[serde(alias = "fok")]
    FOK,
    /// 당일 유효
    #[serde(alias = "day")]
    DAY,
}

/// 서버가 내려주는 원시 주문.
///
/// 불변이며, 새 목록이 도착하면 통째로 교체됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    /// 주문 ID
    pub id: String,
    /// 주문 가격
    pub price: Price,
    /// 잔여 수량
    pub quantity: Quantity,
    /// 주문 방향
    pub side: Side,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 주문 상태
    pub status: OrderStatus,
    /// 주문 유형
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// 유효 기간
    pub time_in_force: TimeInForce,
}

impl RawOrder {
    /// 지정가 GTC 주문을 생성합니다.
    pub fn limit(id: impl Into<String>, side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            id: id.into(),
            price,
            quantity,
            side,
            created_at: Utc::now(),
            status: OrderStatus::Open,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GTC,
        }
    }

    /// 상태를 설정합니다.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    /// 생성 시각을 설정합니다.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// 매수 주문인지 확인합니다.
    pub fn is_bid(&self) -> bool {
        self.side == Side::Buy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_raw_order_wire_format() {
        let json = r#"{
            "id": "o-1",
            "price": 100.5,
            "quantity": "3",
            "side": "BUY",
            "createdAt": "2024-05-01T09:30:00Z",
            "status": "PARTIALLY_FILLED",
            "type": "limit",
            "timeInForce": "GTC"
        }"#;

        let order: RawOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.price, dec!(100.5));
        assert_eq!(order.quantity, dec!(3));
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.time_in_force, TimeInForce::GTC);
    }

    #[test]
    fn test_order_status_classification() {
        assert!(OrderStatus::Open.is_active());
        assert!(OrderStatus::PartiallyFilled.is_active());
        assert!(OrderStatus::Filled.is_final());
        assert!(OrderStatus::Cancelled.is_final());
        assert_eq!(OrderStatus::PartiallyFilled.to_string(), "PARTIALLY_FILLED");
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(Side::Sell.to_string(), "SELL");
    }
}
