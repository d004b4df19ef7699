//! 정밀한 금융 계산을 위한 Decimal 유틸리티.
//!
//! 금액과 수량은 모두 `rust_decimal::Decimal`로 표현하므로
//! 파생 필드 검증은 부동소수점 오차 없이 정확히 비교됩니다.

use rust_decimal::Decimal;

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문/보유 수량을 위한 타입.
pub type Quantity = Decimal;

/// 퍼센트 타입 (1 = 1%).
pub type Percentage = Decimal;

/// `part / base × 100`을 계산합니다.
///
/// `base`가 0이면 `None`을 반환합니다.
pub fn percent_of(part: Decimal, base: Decimal) -> Option<Percentage> {
    if base.is_zero() {
        return None;
    }
    part.checked_div(base)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 퍼센트 문자열로 변환합니다 (예: `1.5` → "1.50%").
    fn to_percentage_string(&self) -> String;

    /// 표시용으로 지정된 소수점 자릿수로 반올림합니다.
    fn round_display(&self, dp: u32) -> Decimal;
}

impl DecimalExt for Decimal {
    fn to_percentage_string(&self) -> String {
        format!("{:.2}%", self)
    }

    fn round_display(&self, dp: u32) -> Decimal {
        self.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
    }
}
