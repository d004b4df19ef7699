//! 자격증명 공급자.

use std::sync::{PoisonError, RwLock};
use trader_core::SessionCredential;

/// 현재 세션의 자격증명과 사용자 ID를 제공하는 외부 인증 모듈.
pub trait CredentialProvider: Send + Sync {
    /// 현재 bearer 자격증명.
    fn credential(&self) -> Option<SessionCredential>;

    /// 현재 사용자 ID.
    fn user_id(&self) -> Option<String>;
}

/// 메모리에 보관하는 고정 자격증명.
///
/// 토큰을 디스크에 쓰지 않습니다.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    inner: RwLock<Option<(SessionCredential, String)>>,
}

impl StaticCredentials {
    /// 토큰과 사용자 ID로 생성합니다.
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Some((SessionCredential::new(token), user_id.into()))),
        }
    }

    /// 자격증명 없이 생성합니다.
    pub fn empty() -> Self {
        Self::default()
    }

    /// 환경 변수(`TRADER_TOKEN`, `TRADER_USER_ID`)에서 생성합니다.
    pub fn from_env() -> Self {
        match (std::env::var("TRADER_TOKEN"), std::env::var("TRADER_USER_ID")) {
            (Ok(token), Ok(user_id)) => Self::new(token, user_id),
            (Ok(token), Err(_)) => Self::new(token, ""),
            _ => Self::empty(),
        }
    }

    /// 자격증명을 교체합니다.
    pub fn set(&self, token: impl Into<String>, user_id: impl Into<String>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) =
            Some((SessionCredential::new(token), user_id.into()));
    }

    /// 자격증명을 지웁니다.
    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self) -> Option<SessionCredential> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(credential, _)| credential.clone())
    }

    fn user_id(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, user_id)| user_id.clone())
            .filter(|id| !id.is_empty())
    }
}
