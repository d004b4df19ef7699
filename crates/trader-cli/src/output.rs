//! 터미널 출력 형식.

use anyhow::Result;
use std::fmt::Write;
use trader_account::Notice;
use trader_core::{AccountSnapshot, DecimalExt, DepthView, RawOrder};

/// 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(anyhow::anyhow!("Invalid format: {}. Use: table, json", s)),
        }
    }
}

/// 스냅샷을 표 형식으로 렌더링합니다.
pub fn render_snapshot(snapshot: &AccountSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<18}{:>14}", "Cash", snapshot.cash_balance);
    let _ = writeln!(out, "{:<18}{:>14}", "Portfolio value", snapshot.total_portfolio_value);
    let _ = writeln!(out, "{:<18}{:>14}", "Total PnL", snapshot.total_pnl);
    let _ = writeln!(out, "{:<18}{:>14}", "  realized", snapshot.total_realized_pnl);
    let _ = writeln!(out, "{:<18}{:>14}", "  unrealized", snapshot.total_unrealized_pnl);

    if snapshot.positions.is_empty() {
        let _ = writeln!(out, "\n(보유 종목 없음)");
        return out;
    }

    let _ = writeln!(
        out,
        "\n{:<8} {:>10} {:>12} {:>12} {:>14} {:>12} {:>9}",
        "TICKER", "QTY", "AVG", "CURRENT", "VALUE", "PNL", "PNL%"
    );
    let _ = writeln!(out, "{}", "-".repeat(83));
    for p in &snapshot.positions {
        let _ = writeln!(
            out,
            "{:<8} {:>10} {:>12} {:>12} {:>14} {:>12} {:>9}",
            p.ticker,
            p.quantity,
            p.average_price,
            p.current_price,
            p.market_value,
            p.unrealized_pnl,
            p.unrealized_pnl_percent.to_percentage_string(),
        );
    }
    out
}

/// `watch` 출력용 한 줄 요약.
pub fn snapshot_line(snapshot: &AccountSnapshot) -> String {
    let tickers: Vec<String> = snapshot
        .positions
        .iter()
        .map(|p| format!("{}@{}", p.ticker, p.current_price))
        .collect();
    format!(
        "value={} cash={} pnl={} [{}]",
        snapshot.total_portfolio_value,
        snapshot.cash_balance,
        snapshot.total_pnl,
        tickers.join(" ")
    )
}

/// 호가 래더를 표 형식으로 렌더링합니다. 매도 호가가 위, 매수 호가가 아래입니다.
pub fn render_depth(ticker: &str, depth: &DepthView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} order book", ticker);
    let _ = writeln!(out, "{:>14} {:>14} {:>8}", "PRICE", "QUANTITY", "ORDERS");
    for level in depth.ask_levels.iter().rev() {
        let _ = writeln!(
            out,
            "{:>14} {:>14} {:>8}  ask",
            level.price, level.total_quantity, level.order_count
        );
    }
    let _ = writeln!(out, "{}", "-".repeat(44));
    for level in &depth.bid_levels {
        let _ = writeln!(
            out,
            "{:>14} {:>14} {:>8}  bid",
            level.price, level.total_quantity, level.order_count
        );
    }

    match (depth.spread, depth.spread_percent) {
        (Some(spread), Some(percent)) => {
            let _ = writeln!(out, "spread {} ({}%)", spread, percent.round_display(4));
        }
        (Some(spread), None) => {
            let _ = writeln!(out, "spread {}", spread);
        }
        _ => {
            let _ = writeln!(out, "spread -");
        }
    }
    out
}

/// 주문 내역 표.
pub fn render_orders(orders: &[RawOrder]) -> String {
    let mut out = String::new();
    if orders.is_empty() {
        let _ = writeln!(out, "(주문 없음)");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<12} {:<5} {:>12} {:>10} {:<17} {}",
        "ID", "SIDE", "PRICE", "QTY", "STATUS", "CREATED"
    );
    for o in orders {
        let _ = writeln!(
            out,
            "{:<12} {:<5} {:>12} {:>10} {:<17} {}",
            o.id,
            o.side,
            o.price,
            o.quantity,
            o.status,
            o.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    out
}

/// 알림 한 줄.
pub fn notice_line(notice: &Notice) -> String {
    match notice {
        Notice::Order(n) => {
            let mut line = format!("order {} {} {} {}", n.order_id, n.ticker, n.side, n.status);
            if let Some(quantity) = n.filled_quantity {
                let _ = write!(line, " filled={}", quantity);
            }
            if let Some(price) = n.price {
                let _ = write!(line, " @{}", price);
            }
            line
        }
        Notice::Price(a) => match &a.message {
            Some(message) => format!("alert {} {} - {}", a.ticker, a.price, message),
            None => format!("alert {} {}", a.ticker, a.price),
        },
    }
}
