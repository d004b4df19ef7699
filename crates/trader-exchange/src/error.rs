//! 원격 서비스 및 채널 에러 타입.

use std::time::Duration;
use thiserror::Error;

/// 원격 서비스 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 원격 서비스(REST/WebSocket 전송 계층) 관련 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded")]
    RateLimited,

    /// API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: i32, message: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 리소스를 찾을 수 없음
    #[error("Not found: {0}")]
    NotFound(String),

    /// WebSocket 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 알 수 없는 에러
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExchangeError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::NetworkError(_)
                | ExchangeError::Disconnected(_)
                | ExchangeError::RateLimited
                | ExchangeError::Timeout(_)
                | ExchangeError::WebSocket(_)
        )
    }

    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ExchangeError::Unauthorized(_))
    }

    /// HTTP 상태 코드와 응답 본문으로 에러를 분류합니다.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ExchangeError::Unauthorized(body),
            404 => ExchangeError::NotFound(body),
            408 => ExchangeError::Timeout(body),
            429 => ExchangeError::RateLimited,
            _ => ExchangeError::ApiError {
                code: i32::from(status),
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() {
            ExchangeError::NetworkError(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ExchangeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Http(response) => {
                let status = response.status().as_u16();
                let body = response
                    .body()
                    .as_deref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                ExchangeError::from_status(status, body)
            }
            WsError::Io(e) => ExchangeError::NetworkError(e.to_string()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                ExchangeError::Disconnected("connection closed".to_string())
            }
            other => ExchangeError::WebSocket(other.to_string()),
        }
    }
}

/// 푸시 채널 연결 관리 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// 자격증명이 없거나 비어 있음 (재시도하지 않음)
    #[error("세션 자격증명이 없습니다")]
    AuthMissing,

    /// 핸드셰이크가 제한 시간 안에 끝나지 않음
    #[error("핸드셰이크 타임아웃 ({0:?})")]
    ConnectTimeout(Duration),

    /// 서버가 핸드셰이크를 거부함
    #[error("핸드셰이크 거부: {0}")]
    ConnectRejected(String),

    /// 연결된 뒤 전송 계층이 끊어짐
    #[error("전송 계층 끊김: {0}")]
    TransportDrop(String),

    /// 재연결 시도를 모두 소진함
    #[error("재연결 {attempts}회 모두 실패")]
    ReconnectExhausted { attempts: u32 },

    /// `disconnect()`로 연결 시도가 중단됨
    #[error("연결 시도가 중단되었습니다")]
    Aborted,

    /// 연결되지 않은 상태에서 요청을 보냄
    #[error("채널이 연결되어 있지 않습니다")]
    NotConnected,

    /// 요청 전송 실패
    #[error("요청 전송 실패: {0}")]
    SendFailed(String),
}

impl ChannelError {
    /// 핸드셰이크 단계의 실패인지 확인.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            ChannelError::ConnectTimeout(_) | ChannelError::ConnectRejected(_)
        )
    }
}
