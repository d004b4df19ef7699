//! 호가 깊이 집계.
//!
//! 원시 주문 목록을 가격별로 묶어 매수/매도 호가 사다리를 만듭니다.
//! 결과는 입력 순서, 해시 순회 순서, 현재 시각과 무관하게 항상 같습니다.

use crate::domain::{RawOrder, Side};
use crate::types::{percent_of, Percentage, Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// 가격별로 묶인 호가 단계.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedLevel {
    /// 가격 (정규화된 표기)
    pub price: Price,
    /// 해당 가격의 잔량 합계
    pub total_quantity: Quantity,
    /// 묶인 주문 수
    pub order_count: usize,
}

/// 표시용 호가 사다리.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthView {
    /// 매수 호가 (가격 내림차순)
    pub bid_levels: Vec<AggregatedLevel>,
    /// 매도 호가 (가격 오름차순)
    pub ask_levels: Vec<AggregatedLevel>,
    /// 최우선 매도 − 최우선 매수. 한쪽이 비어 있으면 `None`.
    pub spread: Option<Price>,
    /// `spread / best_bid × 100`. 스프레드가 없거나 최우선 매수가 0이면 `None`.
    pub spread_percent: Option<Percentage>,
}

impl DepthView {
    /// 최우선 매수 호가.
    pub fn best_bid(&self) -> Option<&AggregatedLevel> {
        self.bid_levels.first()
    }

    /// 최우선 매도 호가.
    pub fn best_ask(&self) -> Option<&AggregatedLevel> {
        self.ask_levels.first()
    }

    /// 중간 가격. 양쪽 호가가 모두 있어야 합니다.
    pub fn mid_price(&self) -> Option<Price> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        bid.checked_add(ask)?
            .checked_div(Decimal::TWO)
            .map(|mid| mid.normalize())
    }

    /// 양쪽 사다리를 `levels` 단계로 자른 뷰를 반환합니다.
    ///
    /// 최우선 호가가 유지되는 한 스프레드는 그대로입니다.
    pub fn top(&self, levels: usize) -> DepthView {
        let bid_levels: Vec<_> = self.bid_levels.iter().take(levels).cloned().collect();
        let ask_levels: Vec<_> = self.ask_levels.iter().take(levels).cloned().collect();
        let (spread, spread_percent) = spread_metrics(&bid_levels, &ask_levels);
        DepthView {
            bid_levels,
            ask_levels,
            spread,
            spread_percent,
        }
    }

    /// 양쪽 호가가 모두 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.bid_levels.is_empty() && self.ask_levels.is_empty()
    }
}

/// 원시 주문 목록을 호가 사다리로 집계합니다.
///
/// - 방향별로 나눈 뒤 가격이 수치상 같은 주문(`100` == `100.00`)을 한 단계로 묶습니다.
/// - 같은 ID가 여러 번 들어오면 한 주문으로 셉니다. 내용이 다르면
///   가장 최근 `created_at`(동률이면 가격·수량이 큰 쪽)을 사용합니다.
/// - 상태 필터링은 하지 않습니다. 넘겨받은 주문은 모두 호가에 반영됩니다.
/// - 잔량 합계가 `Decimal` 범위를 넘게 만드는 주문은 경고 후 건너뜁니다.
///   주문은 ID 순으로 더해지므로 결과는 여전히 입력 순서와 무관합니다.
pub fn aggregate(orders: &[RawOrder]) -> DepthView {
    let mut distinct: BTreeMap<&str, &RawOrder> = BTreeMap::new();
    for order in orders {
        distinct
            .entry(order.id.as_str())
            .and_modify(|current| {
                if revision_key(order) > revision_key(current) {
                    *current = order;
                }
            })
            .or_insert(order);
    }

    let mut bids: BTreeMap<Price, (Quantity, usize)> = BTreeMap::new();
    let mut asks: BTreeMap<Price, (Quantity, usize)> = BTreeMap::new();

    for order in distinct.values() {
        let book = match order.side {
            Side::Buy => &mut bids,
            Side::Sell => &mut asks,
        };
        let level = book
            .entry(order.price.normalize())
            .or_insert((Decimal::ZERO, 0));
        match level.0.checked_add(order.quantity) {
            Some(total) => {
                level.0 = total;
                level.1 += 1;
            }
            None => warn!(
                order_id = %order.id,
                price = %order.price,
                quantity = %order.quantity,
                "호가 잔량 합계 범위 초과, 주문 제외"
            ),
        }
    }

    let bid_levels: Vec<_> = bids.into_iter().rev().map(into_level).collect();
    let ask_levels: Vec<_> = asks.into_iter().map(into_level).collect();
    let (spread, spread_percent) = spread_metrics(&bid_levels, &ask_levels);

    DepthView {
        bid_levels,
        ask_levels,
        spread,
        spread_percent,
    }
}

fn revision_key(order: &RawOrder) -> (chrono::DateTime<chrono::Utc>, Side, Price, Quantity) {
    (order.created_at, order.side, order.price.normalize(), order.quantity.normalize())
}

fn into_level((price, (total_quantity, order_count)): (Price, (Quantity, usize))) -> AggregatedLevel {
    AggregatedLevel {
        price,
        total_quantity: total_quantity.normalize(),
        order_count,
    }
}

fn spread_metrics(
    bids: &[AggregatedLevel],
    asks: &[AggregatedLevel],
) -> (Option<Price>, Option<Percentage>) {
    let (Some(best_bid), Some(best_ask)) = (bids.first(), asks.first()) else {
        return (None, None);
    };
    let Some(spread) = best_ask.price.checked_sub(best_bid.price).map(|s| s.normalize()) else {
        return (None, None);
    };
    let spread_percent = percent_of(spread, best_bid.price).map(|p| p.normalize());
    (Some(spread), spread_percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderStatus;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn bid(id: &str, price: Decimal, qty: Decimal) -> RawOrder {
        RawOrder::limit(id, Side::Buy, price, qty)
    }

    fn ask(id: &str, price: Decimal, qty: Decimal) -> RawOrder {
        RawOrder::limit(id, Side::Sell, price, qty)
    }

    #[test]
    fn test_aggregate_ladder() {
        let orders = vec![
            bid("b1", dec!(100), dec!(5)),
            bid("b2", dec!(100), dec!(3)),
            bid("b3", dec!(99), dec!(10)),
            ask("a1", dec!(101), dec!(2)),
        ];

        let view = aggregate(&orders);

        assert_eq!(
            view.bid_levels,
            vec![
                AggregatedLevel { price: dec!(100), total_quantity: dec!(8), order_count: 2 },
                AggregatedLevel { price: dec!(99), total_quantity: dec!(10), order_count: 1 },
            ]
        );
        assert_eq!(
            view.ask_levels,
            vec![AggregatedLevel { price: dec!(101), total_quantity: dec!(2), order_count: 1 }]
        );
        assert_eq!(view.spread, Some(dec!(1)));
        assert_eq!(view.spread_percent, Some(dec!(1)));
        assert_eq!(view.mid_price(), Some(dec!(100.5)));
    }

    #[test]
    fn test_one_sided_book_has_no_spread() {
        let view = aggregate(&[bid("b1", dec!(50), dec!(1))]);
        assert_eq!(view.spread, None);
        assert_eq!(view.spread_percent, None);
        assert_eq!(view.mid_price(), None);

        let empty = aggregate(&[]);
        assert!(empty.is_empty());
        assert_eq!(empty.spread, None);
    }

    #[test]
    fn test_zero_best_bid_has_no_spread_percent() {
        let view = aggregate(&[bid("b1", dec!(0), dec!(1)), ask("a1", dec!(0.5), dec!(1))]);
        assert_eq!(view.spread, Some(dec!(0.5)));
        assert_eq!(view.spread_percent, None);
    }

    #[test]
    fn test_numeric_price_equality() {
        let view = aggregate(&[bid("b1", dec!(100), dec!(1)), bid("b2", dec!(100.00), dec!(2))]);
        assert_eq!(view.bid_levels.len(), 1);
        assert_eq!(view.bid_levels[0].order_count, 2);
        assert_eq!(view.bid_levels[0].price.to_string(), "100");
    }

    #[test]
    fn test_duplicate_ids_counted_once() {
        let early = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 0).unwrap();
        let orders = vec![
            bid("b1", dec!(100), dec!(5)).with_created_at(early),
            bid("b1", dec!(100), dec!(4)).with_created_at(late),
            bid("b2", dec!(100), dec!(1)).with_created_at(early),
        ];

        let view = aggregate(&orders);
        assert_eq!(view.bid_levels[0].order_count, 2);
        assert_eq!(view.bid_levels[0].total_quantity, dec!(5));
    }

    #[test]
    fn test_status_is_not_filtered() {
        let view = aggregate(&[
            ask("a1", dec!(10), dec!(1)).with_status(OrderStatus::Filled),
            ask("a2", dec!(10), dec!(1)),
        ]);
        assert_eq!(view.ask_levels[0].order_count, 2);
    }

    #[test]
    fn test_overflowing_quantity_is_skipped() {
        let orders = vec![
            bid("b1", dec!(100), Decimal::MAX),
            bid("b2", dec!(100), Decimal::MAX),
            bid("b3", dec!(99), dec!(1)),
        ];

        let view = aggregate(&orders);
        assert_eq!(view.bid_levels[0].order_count, 1);
        assert_eq!(view.bid_levels[0].total_quantity, Decimal::MAX);
        assert_eq!(view.bid_levels[1].total_quantity, dec!(1));
    }

    #[test]
    fn test_extreme_prices_do_not_panic() {
        let view = aggregate(&[bid("b1", Decimal::MAX, dec!(1)), ask("a1", Decimal::MAX, dec!(1))]);
        assert_eq!(view.spread, Some(Decimal::ZERO));
        assert_eq!(view.mid_price(), None);

        let view = aggregate(&[bid("b1", Decimal::MIN, dec!(1)), ask("a1", Decimal::MAX, dec!(1))]);
        assert_eq!(view.spread, None);
        assert_eq!(view.spread_percent, None);
    }

    #[test]
    fn test_top_truncates_levels() {
        let orders: Vec<_> = (0..5)
            .map(|i| bid(&format!("b{i}"), Decimal::from(100 - i), dec!(1)))
            .chain((0..5).map(|i| ask(&format!("a{i}"), Decimal::from(101 + i), dec!(1))))
            .collect();

        let view = aggregate(&orders).top(2);
        assert_eq!(view.bid_levels.len(), 2);
        assert_eq!(view.ask_levels.len(), 2);
        assert_eq!(view.bid_levels[0].price, dec!(100));
        assert_eq!(view.spread, Some(dec!(1)));

        let none = aggregate(&orders).top(0);
        assert!(none.is_empty());
        assert_eq!(none.spread, None);
    }

    fn order_strategy() -> impl Strategy<Value = RawOrder> {
        (0u32..40, 0i64..20, 1i64..500, any::<bool>()).prop_map(|(id, tick, qty, is_bid)| {
            let side = if is_bid { Side::Buy } else { Side::Sell };
            RawOrder::limit(
                format!("o{id}"),
                side,
                Decimal::new(9_900 + tick * 10, 2),
                Decimal::new(qty, 1),
            )
            .with_created_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        })
    }

    proptest! {
        #[test]
        fn aggregation_is_independent_of_input_order(
            (orders, shuffled) in prop::collection::vec(order_strategy(), 0..60)
                .prop_flat_map(|orders| {
                    let shuffled = Just(orders.clone()).prop_shuffle();
                    (Just(orders), shuffled)
                })
        ) {
            prop_assert_eq!(aggregate(&orders), aggregate(&shuffled));
        }

        #[test]
        fn ladders_are_strictly_ordered(orders in prop::collection::vec(order_strategy(), 0..60)) {
            let view = aggregate(&orders);
            prop_assert!(view.bid_levels.windows(2).all(|w| w[0].price > w[1].price));
            prop_assert!(view.ask_levels.windows(2).all(|w| w[0].price < w[1].price));
            let counted: usize = view
                .bid_levels
                .iter()
                .chain(view.ask_levels.iter())
                .map(|l| l.order_count)
                .sum();
            let distinct: std::collections::BTreeSet<_> = orders.iter().map(|o| o.id.as_str()).collect();
            prop_assert_eq!(counted, distinct.len());
        }
    }
}
