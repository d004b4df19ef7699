//! 동기화 에러 타입.

use thiserror::Error;
use trader_core::TraderError;
use trader_exchange::{ChannelError, ExchangeError};

/// 스냅샷 조정 에러.
///
/// 어떤 에러도 저장된 스냅샷을 바꾸지 않습니다.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// 조회 실패 또는 타임아웃. 이전 스냅샷이 유지됩니다.
    #[error("조회 실패: {0}")]
    PullFailed(#[source] ExchangeError),

    /// 중복 종목, 음수 수량 등 잘못된 업데이트
    #[error("잘못된 스냅샷: {0}")]
    InvalidSnapshot(String),
}

impl From<TraderError> for ReconcileError {
    fn from(err: TraderError) -> Self {
        match err {
            TraderError::InvalidSnapshot(reason) => ReconcileError::InvalidSnapshot(reason),
            other => ReconcileError::InvalidSnapshot(other.to_string()),
        }
    }
}

/// 세션 에러.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// 채널 연결 에러
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// 조정 에러
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// 이미 실행 중인 세션
    #[error("이미 시작된 세션입니다")]
    AlreadyStarted,
}

impl SessionError {
    /// 인증 정보 부족으로 실패했는지 확인.
    pub fn is_auth_missing(&self) -> bool {
        matches!(self, SessionError::Channel(ChannelError::AuthMissing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_snapshot_passthrough() {
        let err: ReconcileError =
            TraderError::InvalidSnapshot("duplicate ticker AAPL".to_string()).into();
        assert_eq!(
            err,
            ReconcileError::InvalidSnapshot("duplicate ticker AAPL".to_string())
        );
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::from(ChannelError::AuthMissing);
        assert!(err.is_auth_missing());
        assert_eq!(err.to_string(), "세션 자격증명이 없습니다");

        let err = SessionError::from(ReconcileError::PullFailed(ExchangeError::Timeout(
            "15s".to_string(),
        )));
        assert_eq!(err.to_string(), "조회 실패: Request timeout: 15s");
    }
}
