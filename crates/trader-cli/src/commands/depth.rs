//! 호가 래더 조회.

use anyhow::{Context, Result};
use std::sync::Arc;
use trader_core::{aggregate, DepthView};
use trader_exchange::PullClient;

use crate::output::{render_depth, OutputFormat};

/// 호가 조회 설정.
#[derive(Debug, Clone)]
pub struct DepthOptions {
    /// 종목 코드
    pub ticker: String,
    /// 한쪽당 표시할 가격 단계 수
    pub levels: usize,
    /// 출력 형식
    pub format: OutputFormat,
}

/// 원시 주문을 조회해 상위 `levels` 단계로 집계합니다.
pub async fn fetch_depth(pull: &dyn PullClient, ticker: &str, levels: usize) -> Result<DepthView> {
    let orders = pull
        .fetch_order_book(ticker)
        .await
        .with_context(|| format!("{} 호가 조회 실패", ticker))?;
    Ok(aggregate(&orders).top(levels))
}

/// `depth` 명령 실행.
pub async fn run_depth(pull: Arc<dyn PullClient>, options: DepthOptions) -> Result<()> {
    let depth = fetch_depth(pull.as_ref(), &options.ticker, options.levels).await?;

    match options.format {
        OutputFormat::Table => {
            print!("{}", render_depth(&options.ticker, &depth));
            if let Some(mid) = depth.mid_price() {
                println!("mid {}", mid);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&depth)?),
    }
    Ok(())
}
