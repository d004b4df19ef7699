//! 푸시 채널 연결 상태.

use serde::Serialize;
use std::fmt;

/// 푸시 채널 연결 상태.
///
/// ```text
/// Disconnected --connect--> Connecting --success--> Connected
/// Connected --drop--> Reconnecting --success--> Connected
/// Connecting --failure/timeout--> Failed
/// Reconnecting --exhausted--> Failed
/// (any) --disconnect()--> Disconnected
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// 연결 없음
    #[default]
    Disconnected,
    /// 최초 핸드셰이크 진행 중
    Connecting,
    /// 연결됨
    Connected,
    /// 끊어진 연결 복구 중
    Reconnecting,
    /// 연결 실패. 명시적인 `connect()` 전까지 자동 재시도 없음
    Failed,
}

impl ConnectionState {
    /// 더 이상 자동 전이가 일어나지 않는 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }

    /// 핸드셰이크가 진행 중인 상태인지 확인합니다.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }

    /// 연결된 상태인지 확인합니다.
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }

    /// `from → to` 전이가 상태 기계에서 허용되는지 확인합니다.
    pub fn can_transition_to(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;

        match (*self, to) {
            (_, Disconnected) => true,
            (Disconnected | Failed | Reconnecting, Connecting) => true,
            (Connecting | Reconnecting, Connected) => true,
            (Connected, Reconnecting) => true,
            (Connecting | Reconnecting, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_terminal());
        assert!(ConnectionState::Reconnecting.is_transitioning());
    }

    #[test]
    fn test_transitions() {
        use ConnectionState::*;

        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Connecting));
        assert!(Connected.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Reconnecting));
    }
}
