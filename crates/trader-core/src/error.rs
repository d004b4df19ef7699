//! 핵심 에러 타입.
//!
//! 도메인 검증과 설정 로딩에서 발생하는 에러를 정의합니다.

use thiserror::Error;

/// 핵심 도메인 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TraderError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 스냅샷 검증 실패
    #[error("잘못된 스냅샷: {0}")]
    InvalidSnapshot(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),
}

/// 핵심 작업을 위한 Result 타입.
pub type TraderResult<T> = Result<T, TraderError>;

impl From<serde_json::Error> for TraderError {
    fn from(err: serde_json::Error) -> Self {
        TraderError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for TraderError {
    fn from(err: config::ConfigError) -> Self {
        TraderError::Config(err.to_string())
    }
}
