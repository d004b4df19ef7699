//! 푸시 채널 전송 계층 trait.
//!
//! `ConnectionManager`는 전송 계층을 주입받으므로 실제 WebSocket 대신
//! 시뮬레이션 구현으로 테스트할 수 있습니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use trader_core::SessionCredential;

use super::message::{ClientRequest, LinkFrame};
use crate::error::ExchangeResult;

/// 핸드셰이크 요청 정보.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// bearer 자격증명
    pub credential: SessionCredential,
    /// 재연결 시도 번호 (최초 연결은 0)
    pub attempt: u32,
}

impl Handshake {
    /// 새 핸드셰이크를 생성합니다.
    pub fn new(credential: SessionCredential, attempt: u32) -> Self {
        Self { credential, attempt }
    }
}

/// 인증된 양방향 연결을 여는 전송 계층.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// 핸드셰이크를 수행하고 연결을 엽니다.
    ///
    /// 반환된 링크는 이미 인증된 상태입니다.
    async fn open(&self, handshake: &Handshake) -> ExchangeResult<Arc<dyn PushLink>>;
}

/// 열린 연결 하나.
#[async_trait]
pub trait PushLink: Send + Sync {
    /// 수신 프레임 채널을 가져옵니다.
    ///
    /// 링크당 한 번만 `Some`을 반환합니다. 리스너 중복 등록이 구조적으로 불가능합니다.
    fn take_receiver(&self) -> Option<mpsc::Receiver<LinkFrame>>;

    /// 서버로 요청을 보냅니다.
    async fn send(&self, request: &ClientRequest) -> ExchangeResult<()>;

    /// 연결을 닫습니다. 여러 번 호출해도 안전해야 합니다.
    async fn close(&self);
}

/// 연결 성공 시 반환되는 핸들.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub(crate) link_id: u64,
    pub(crate) connected_at: DateTime<Utc>,
    pub(crate) link: Arc<dyn PushLink>,
}

impl ConnectionHandle {
    pub(crate) fn new(link_id: u64, link: Arc<dyn PushLink>) -> Self {
        Self {
            link_id,
            connected_at: Utc::now(),
            link,
        }
    }

    /// 링크 식별자. 재연결할 때마다 바뀝니다.
    pub fn link_id(&self) -> u64 {
        self.link_id
    }

    /// 연결 시각.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("link_id", &self.link_id)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}
