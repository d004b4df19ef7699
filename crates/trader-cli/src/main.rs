//! 계좌 동기화 클라이언트 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 시뮬레이션 백엔드로 실시간 동기화
//! trader watch --simulate
//!
//! # 30초 동안 원격 서버와 동기화 (TRADER_TOKEN 필요)
//! trader watch --duration 30
//!
//! # 대시보드 단건 조회
//! trader snapshot --format json
//!
//! # 호가 래더 상위 5단계
//! trader depth -t AAPL -l 5
//!
//! # 체결/취소 포함 주문 내역
//! trader orders --all
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;
use trader_cli::backend::Backend;
use trader_cli::commands::config::render_config;
use trader_cli::commands::depth::{run_depth, DepthOptions};
use trader_cli::commands::orders::{run_orders, OrdersOptions};
use trader_cli::commands::snapshot::{run_snapshot, SnapshotOptions};
use trader_cli::commands::watch::{run_watch, WatchOptions};
use trader_cli::output::OutputFormat;
use trader_core::{init_logging, AppConfig, LogConfig};

#[derive(Parser)]
#[command(name = "trader")]
#[command(about = "Account sync CLI - 실시간 계좌 상태 동기화 클라이언트", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: String,

    /// 원격 서버 대신 시뮬레이션 백엔드 사용
    #[arg(long, global = true, default_value = "false")]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 세션을 실행하고 스냅샷/상태 변화를 출력
    Watch {
        /// 실행 시간 (초, 생략하면 Ctrl+C까지)
        #[arg(short, long)]
        duration: Option<u64>,

        /// 모의 시세 간격 (밀리초, --simulate 전용)
        #[arg(long, default_value = "1000")]
        tick_ms: u64,

        /// 호가 갱신도 출력
        #[arg(long, default_value = "false")]
        depth: bool,
    },

    /// 대시보드 스냅샷 단건 조회
    Snapshot {
        /// 출력 형식 (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// 잔고만 조회
        #[arg(long, default_value = "false")]
        balance: bool,
    },

    /// 종목 호가 래더 조회
    Depth {
        /// 종목 코드 (예: AAPL)
        #[arg(short, long)]
        ticker: String,

        /// 한쪽당 표시할 가격 단계 수
        #[arg(short, long, default_value = "10")]
        levels: usize,

        /// 출력 형식 (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// 주문 내역 조회
    Orders {
        /// 체결/취소된 주문까지 포함
        #[arg(short, long, default_value = "false")]
        all: bool,

        /// 출력 형식 (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// 적용된 설정 출력
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    init_logging(LogConfig::from(&config.logging))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    let backend = || -> Result<Backend> {
        if cli.simulate {
            info!("시뮬레이션 백엔드 사용");
            Ok(Backend::simulated())
        } else {
            Backend::remote(&config)
        }
    };

    match cli.command {
        Commands::Watch {
            duration,
            tick_ms,
            depth,
        } => {
            let options = WatchOptions {
                duration: duration.map(Duration::from_secs),
                tick_interval: Duration::from_millis(tick_ms.max(10)),
                show_depth: depth,
            };
            run_watch(backend()?, &config, options).await?;
        }
        Commands::Snapshot { format, balance } => {
            let options = SnapshotOptions {
                format: OutputFormat::parse(&format)?,
                balance_only: balance,
            };
            run_snapshot(backend()?.pull, &config.sync, options).await?;
        }
        Commands::Depth {
            ticker,
            levels,
            format,
        } => {
            let options = DepthOptions {
                ticker,
                levels,
                format: OutputFormat::parse(&format)?,
            };
            run_depth(backend()?.pull, options).await?;
        }
        Commands::Orders { all, format } => {
            let options = OrdersOptions {
                include_closed: all,
                format: OutputFormat::parse(&format)?,
            };
            run_orders(backend()?.pull, options).await?;
        }
        Commands::Config => {
            print!("{}", render_config(&config)?);
        }
    }

    Ok(())
}
