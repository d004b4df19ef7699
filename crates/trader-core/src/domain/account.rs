//! 계좌 대시보드 스냅샷.
//!
//! `AccountSnapshot`은 항상 통째로 교체되는 단일 문서입니다.
//! 부분 업데이트(`SnapshotPatch`)는 이전 스냅샷에 병합되어 새 스냅샷을 만들고,
//! 교체 전에 모든 포지션의 파생 필드를 다시 계산합니다.

use crate::error::{TraderError, TraderResult};
use crate::types::{percent_of, Percentage, Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 종목별 보유 포지션.
///
/// 불변식:
/// - `market_value = quantity × current_price`
/// - `unrealized_pnl = market_value − quantity × average_price`
/// - `unrealized_pnl_percent = unrealized_pnl / (quantity × average_price) × 100` (원가 0이면 0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// 종목 코드 (스냅샷 내 고유)
    pub ticker: String,
    /// 보유 수량
    pub quantity: Quantity,
    /// 평균 매입가
    pub average_price: Price,
    /// 현재가
    pub current_price: Price,
    /// 평가 금액
    #[serde(default)]
    pub market_value: Decimal,
    /// 미실현 손익
    #[serde(default, rename = "unrealizedPnL")]
    pub unrealized_pnl: Decimal,
    /// 미실현 손익률 (%)
    #[serde(default, rename = "unrealizedPnLPercent")]
    pub unrealized_pnl_percent: Percentage,
}

impl Position {
    /// 새 포지션을 생성합니다. 파생 필드는 계산되어 채워집니다.
    ///
    /// 값이 `Decimal` 범위를 벗어나면 파생 필드는 0으로 남고,
    /// 이 포지션은 [`Position::normalized`]에서 거부됩니다.
    pub fn new(
        ticker: impl Into<String>,
        quantity: Quantity,
        average_price: Price,
        current_price: Price,
    ) -> Self {
        let mut position = Self {
            ticker: ticker.into(),
            quantity,
            average_price,
            current_price,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_percent: Decimal::ZERO,
        };
        if let Some((market_value, unrealized_pnl, percent)) = position.derived() {
            position.market_value = market_value;
            position.unrealized_pnl = unrealized_pnl;
            position.unrealized_pnl_percent = percent;
        }
        position
    }

    /// 매입 원가 (`quantity × average_price`). 범위를 벗어나면 `None`.
    pub fn cost_basis(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.average_price)
    }

    /// 파생 필드 (평가 금액, 미실현 손익, 손익률). 연산이 넘치면 `None`.
    fn derived(&self) -> Option<(Decimal, Decimal, Percentage)> {
        let market_value = self.quantity.checked_mul(self.current_price)?;
        let cost_basis = self.cost_basis()?;
        let unrealized_pnl = market_value.checked_sub(cost_basis)?;
        let percent = if cost_basis.is_zero() {
            Decimal::ZERO
        } else {
            percent_of(unrealized_pnl, cost_basis)?
        };
        Some((market_value, unrealized_pnl, percent))
    }

    /// 파생 필드를 다시 계산한 포지션을 반환합니다.
    pub fn normalized(mut self) -> TraderResult<Self> {
        let (market_value, unrealized_pnl, percent) = self.derived().ok_or_else(|| {
            TraderError::InvalidSnapshot(format!("values out of range for {}", self.ticker))
        })?;
        self.market_value = market_value;
        self.unrealized_pnl = unrealized_pnl;
        self.unrealized_pnl_percent = percent;
        Ok(self)
    }

    /// 파생 필드가 불변식을 만족하는지 확인합니다.
    pub fn is_consistent(&self) -> bool {
        match self.derived() {
            Some((market_value, unrealized_pnl, percent)) => {
                self.market_value == market_value
                    && self.unrealized_pnl == unrealized_pnl
                    && self.unrealized_pnl_percent == percent
            }
            None => false,
        }
    }
}

/// 계좌 대시보드 스냅샷.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountSnapshot {
    /// 현금 잔고
    pub cash_balance: Decimal,
    /// 총 평가 금액
    pub total_portfolio_value: Decimal,
    /// 총 손익
    #[serde(rename = "totalPnL")]
    pub total_pnl: Decimal,
    /// 실현 손익 합계
    #[serde(rename = "totalRealizedPnL")]
    pub total_realized_pnl: Decimal,
    /// 미실현 손익 합계
    #[serde(rename = "totalUnrealizedPnL")]
    pub total_unrealized_pnl: Decimal,
    /// 보유 포지션 (서버가 보낸 순서 유지)
    pub positions: Vec<Position>,
}

impl AccountSnapshot {
    /// 빈 스냅샷을 생성합니다.
    pub fn empty() -> Self {
        Self::default()
    }

    /// 값이 하나도 채워지지 않은 스냅샷인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// 종목 코드로 포지션을 찾습니다.
    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.ticker == ticker)
    }

    /// 포지션 평가 금액 합계. 범위를 벗어나면 `None`.
    pub fn positions_market_value(&self) -> Option<Decimal> {
        self.positions
            .iter()
            .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.market_value))
    }

    /// 중복 종목과 음수 수량을 검사합니다.
    pub fn validate(&self) -> TraderResult<()> {
        let mut seen = HashSet::with_capacity(self.positions.len());
        for position in &self.positions {
            if !seen.insert(position.ticker.as_str()) {
                return Err(TraderError::InvalidSnapshot(format!(
                    "duplicate ticker {}",
                    position.ticker
                )));
            }
            if position.quantity < Decimal::ZERO {
                return Err(TraderError::InvalidSnapshot(format!(
                    "negative quantity {} for {}",
                    position.quantity, position.ticker
                )));
            }
        }
        Ok(())
    }

    /// 검증 후 모든 포지션의 파생 필드를 다시 계산합니다.
    ///
    /// 저장소에 들어가는 모든 스냅샷은 이 함수를 통과합니다.
    pub fn normalized(mut self) -> TraderResult<Self> {
        self.validate()?;
        self.positions = self
            .positions
            .into_iter()
            .map(Position::normalized)
            .collect::<TraderResult<_>>()?;
        Ok(self)
    }

    /// 부분 업데이트를 병합한 새 스냅샷을 만듭니다.
    ///
    /// 패치에 없는 필드는 이전 값을 유지합니다 (잔고만 바뀐 경우 포지션 보존).
    pub fn merged(&self, patch: &SnapshotPatch) -> TraderResult<Self> {
        let merged = Self {
            cash_balance: patch.cash_balance.unwrap_or(self.cash_balance),
            total_portfolio_value: patch
                .total_portfolio_value
                .unwrap_or(self.total_portfolio_value),
            total_pnl: patch.total_pnl.unwrap_or(self.total_pnl),
            total_realized_pnl: patch.total_realized_pnl.unwrap_or(self.total_realized_pnl),
            total_unrealized_pnl: patch
                .total_unrealized_pnl
                .unwrap_or(self.total_unrealized_pnl),
            positions: patch
                .positions
                .clone()
                .unwrap_or_else(|| self.positions.clone()),
        };
        merged.normalized()
    }
}

/// 스냅샷 부분 업데이트.
///
/// 푸시 이벤트가 실어 온 필드만 `Some`입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_portfolio_value: Option<Decimal>,
    #[serde(rename = "totalPnL", skip_serializing_if = "Option::is_none")]
    pub total_pnl: Option<Decimal>,
    #[serde(rename = "totalRealizedPnL", skip_serializing_if = "Option::is_none")]
    pub total_realized_pnl: Option<Decimal>,
    #[serde(rename = "totalUnrealizedPnL", skip_serializing_if = "Option::is_none")]
    pub total_unrealized_pnl: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<Position>>,
}

impl SnapshotPatch {
    /// 아무 필드도 담지 않은 패치인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&AccountSnapshot> for SnapshotPatch {
    /// 모든 필드를 채운 패치 (전체 교체).
    fn from(snapshot: &AccountSnapshot) -> Self {
        Self {
            cash_balance: Some(snapshot.cash_balance),
            total_portfolio_value: Some(snapshot.total_portfolio_value),
            total_pnl: Some(snapshot.total_pnl),
            total_realized_pnl: Some(snapshot.total_realized_pnl),
            total_unrealized_pnl: Some(snapshot.total_unrealized_pnl),
            positions: Some(snapshot.positions.clone()),
        }
    }
}

/// 잔고 조회/이벤트 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    /// 현금 잔고
    pub cash_balance: Decimal,
    /// 총 평가 금액 (서버가 함께 보낸 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_portfolio_value: Option<Decimal>,
}

impl From<&AccountBalance> for SnapshotPatch {
    fn from(balance: &AccountBalance) -> Self {
        Self {
            cash_balance: Some(balance.cash_balance),
            total_portfolio_value: balance.total_portfolio_value,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_derived_fields() {
        let position = Position::new("AAPL", dec!(10), dec!(150), dec!(165));

        assert_eq!(position.market_value, dec!(1650));
        assert_eq!(position.unrealized_pnl, dec!(150));
        assert_eq!(position.unrealized_pnl_percent, dec!(10));
        assert!(position.is_consistent());
    }

    #[test]
    fn test_zero_cost_basis_percent_is_zero() {
        let position = Position::new("GIFT", dec!(5), Decimal::ZERO, dec!(20));

        assert_eq!(position.unrealized_pnl, dec!(100));
        assert_eq!(position.unrealized_pnl_percent, Decimal::ZERO);
    }

    #[test]
    fn test_stale_derived_fields_are_recomputed() {
        let json = r#"{
            "cashBalance": "1000",
            "positions": [{
                "ticker": "MSFT",
                "quantity": "2",
                "averagePrice": "300",
                "currentPrice": "310",
                "marketValue": "1",
                "unrealizedPnL": "2",
                "unrealizedPnLPercent": "3"
            }]
        }"#;
        let raw: AccountSnapshot = serde_json::from_str(json).unwrap();
        assert!(!raw.positions[0].is_consistent());

        let snapshot = raw.normalized().unwrap();
        let msft = snapshot.position("MSFT").unwrap();
        assert_eq!(msft.market_value, dec!(620));
        assert_eq!(msft.unrealized_pnl, dec!(20));
        assert!(msft.is_consistent());
    }

    #[test]
    fn test_duplicate_ticker_rejected() {
        let snapshot = AccountSnapshot {
            positions: vec![
                Position::new("AAPL", dec!(1), dec!(100), dec!(100)),
                Position::new("AAPL", dec!(2), dec!(100), dec!(100)),
            ],
            ..Default::default()
        };
        assert!(matches!(
            snapshot.validate(),
            Err(TraderError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let snapshot = AccountSnapshot {
            positions: vec![Position::new("TSLA", dec!(-1), dec!(200), dec!(210))],
            ..Default::default()
        };
        assert!(snapshot.normalized().is_err());
    }

    #[test]
    fn test_out_of_range_position_rejected() {
        let huge = Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 0);
        let position = Position::new("BIG", huge, Decimal::ONE, huge);
        assert!(!position.is_consistent());
        assert!(position.clone().normalized().is_err());

        let previous = AccountSnapshot {
            cash_balance: dec!(10),
            ..Default::default()
        };
        let patch = SnapshotPatch {
            positions: Some(vec![position]),
            ..Default::default()
        };
        assert!(matches!(
            previous.merged(&patch),
            Err(TraderError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_balance_merge_preserves_positions() {
        let previous = AccountSnapshot {
            cash_balance: dec!(500),
            total_portfolio_value: dec!(2150),
            positions: vec![Position::new("AAPL", dec!(10), dec!(150), dec!(165))],
            ..Default::default()
        };
        let balance = AccountBalance {
            cash_balance: dec!(750),
            total_portfolio_value: None,
        };

        let merged = previous.merged(&SnapshotPatch::from(&balance)).unwrap();
        assert_eq!(merged.cash_balance, dec!(750));
        assert_eq!(merged.total_portfolio_value, dec!(2150));
        assert_eq!(merged.positions, previous.positions);
    }

    #[test]
    fn test_snapshot_wire_names() {
        let snapshot = AccountSnapshot {
            total_pnl: dec!(12.5),
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value.get("totalPnL").is_some());
        assert!(value.get("totalUnrealizedPnL").is_some());
        assert!(value.get("cashBalance").is_some());
        assert!(AccountSnapshot::empty().is_empty());
        assert!(!snapshot.is_empty());
    }
}
