//! 세션 자격증명.
//!
//! 외부 인증 모듈이 발급한 bearer 토큰을 감싸는 불투명 타입입니다.
//! 이 크레이트는 토큰을 읽기만 하며 어디에도 저장하지 않습니다.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// 푸시 채널 핸드셰이크와 조회 요청에 사용하는 bearer 자격증명.
///
/// # 보안
/// - `Debug` 구현은 토큰을 마스킹합니다.
/// - `Serialize`를 구현하지 않습니다.
pub struct SessionCredential {
    token: SecretString,
}

impl SessionCredential {
    /// 토큰 문자열로 자격증명을 생성합니다.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into().into_boxed_str()),
        }
    }

    /// 토큰이 비어 있는지 확인합니다 (공백만 있는 경우 포함).
    pub fn is_empty(&self) -> bool {
        self.token.expose_secret().trim().is_empty()
    }

    /// 원본 토큰을 반환합니다.
    ///
    /// 전송 계층에서만 호출해야 합니다.
    pub fn expose(&self) -> &str {
        self.token.expose_secret()
    }

    /// `Authorization` 헤더 값을 반환합니다.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.expose())
    }
}

impl Clone for SessionCredential {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"***REDACTED***")
            .finish()
    }
}
