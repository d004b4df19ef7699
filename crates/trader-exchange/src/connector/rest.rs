//! REST 조회 클라이언트.
//!
//! - `GET /api/portfolio/dashboard`
//! - `GET /api/portfolio/balance`
//! - `GET /api/orders/book/{ticker}`
//! - `GET /api/orders`

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use rust_decimal::Decimal;
use trader_core::{AccountBalance, AccountSnapshot, ApiConfig, Position, RawOrder};

use crate::auth::CredentialProvider;
use crate::error::{ExchangeError, ExchangeResult};
use crate::pull::PullClient;

/// REST 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// API 기본 URL
    pub base_url: String,
    /// 요청 타임아웃
    pub timeout: Duration,
}

impl RestConfig {
    /// 새 설정을 생성합니다.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl From<&ApiConfig> for RestConfig {
    fn from(config: &ApiConfig) -> Self {
        Self::new(config.rest_base_url.clone(), config.request_timeout())
    }
}

/// 응답 본문. `{"data": ...}`로 감싸져 있거나 그대로 올 수 있습니다.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}

/// 대시보드 응답.
///
/// 잔고, 평가 금액, 포지션은 필수입니다. 오류 본문(`{"success":false,...}`)이나
/// `{"data":null}`이 빈 스냅샷으로 해석되지 않도록 `AccountSnapshot`의
/// 기본값 규칙 대신 이 구조체로 먼저 읽습니다.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardBody {
    cash_balance: Decimal,
    total_portfolio_value: Decimal,
    #[serde(default, rename = "totalPnL")]
    total_pnl: Decimal,
    #[serde(default, rename = "totalRealizedPnL")]
    total_realized_pnl: Decimal,
    #[serde(default, rename = "totalUnrealizedPnL")]
    total_unrealized_pnl: Decimal,
    positions: Vec<Position>,
}

impl From<DashboardBody> for AccountSnapshot {
    fn from(body: DashboardBody) -> Self {
        Self {
            cash_balance: body.cash_balance,
            total_portfolio_value: body.total_portfolio_value,
            total_pnl: body.total_pnl,
            total_realized_pnl: body.total_realized_pnl,
            total_unrealized_pnl: body.total_unrealized_pnl,
            positions: body.positions,
        }
    }
}

/// 주문 목록 응답. 배열 또는 `{"orders": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrderList {
    Keyed { orders: Vec<RawOrder> },
    List(Vec<RawOrder>),
}

impl OrderList {
    fn into_orders(self) -> Vec<RawOrder> {
        match self {
            OrderList::Keyed { orders } => orders,
            OrderList::List(orders) => orders,
        }
    }
}

/// REST 조회 클라이언트.
pub struct RestPullClient {
    config: RestConfig,
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl RestPullClient {
    /// 새 REST 클라이언트를 생성합니다.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(
        config: RestConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> ExchangeResult<T> {
        let credential = self
            .credentials
            .credential()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ExchangeError::Unauthorized("session credential missing".to_string()))?;

        let url = self.url(path);
        debug!(url = %url, "GET 요청");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, credential.bearer_header())
            .send()
            .await?;

        let envelope: Envelope<T> = self.handle_response(response).await?;
        Ok(envelope.into_inner())
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| {
                error!("응답 파싱 실패: {} - Body: {}", e, body);
                ExchangeError::ParseError(e.to_string())
            })
        } else {
            Err(ExchangeError::from_status(status.as_u16(), body))
        }
    }
}

#[async_trait]
impl PullClient for RestPullClient {
    async fn fetch_dashboard(&self) -> ExchangeResult<AccountSnapshot> {
        let body: DashboardBody = self.get("/api/portfolio/dashboard").await?;
        Ok(body.into())
    }

    async fn fetch_balance(&self) -> ExchangeResult<AccountBalance> {
        self.get("/api/portfolio/balance").await
    }

    async fn fetch_order_book(&self, ticker: &str) -> ExchangeResult<Vec<RawOrder>> {
        let list: OrderList = self.get(&format!("/api/orders/book/{}", ticker)).await?;
        Ok(list.into_orders())
    }

    async fn fetch_orders(&self) -> ExchangeResult<Vec<RawOrder>> {
        let list: OrderList = self.get("/api/orders").await?;
        Ok(list.into_orders())
    }
}
