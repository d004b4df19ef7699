//! 푸시 채널 연결 관리자.
//!
//! 세션당 하나의 인증된 연결을 유지합니다.
//!
//! - 동시에 들어온 `connect()`는 하나의 핸드셰이크를 공유합니다 (single-flight).
//! - 이벤트 리스너는 `Connecting|Reconnecting → Connected` 전이에서 링크당 한 번만 붙습니다.
//! - 예기치 않은 끊김은 제한된 횟수만큼 백오프하며 재연결합니다.
//! - `disconnect()`는 진행 중인 시도와 재연결 타이머를 모두 취소합니다.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trader_core::{ChannelConfig, SessionCredential};

use super::message::{ChannelEvent, ClientRequest, LinkFrame, PushEvent};
use super::state::ConnectionState;
use super::transport::{ConnectionHandle, Handshake, PushLink, PushTransport};
use crate::error::ChannelError;

type ConnectAttempt = Shared<BoxFuture<'static, Result<ConnectionHandle, ChannelError>>>;

/// 푸시 채널 연결 관리자.
///
/// 복제해도 같은 연결을 공유하는 핸들입니다.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
}

struct ManagerShared {
    transport: Arc<dyn PushTransport>,
    config: ChannelConfig,
    inner: Mutex<ManagerInner>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ChannelEvent>,
}

#[derive(Default)]
struct ManagerInner {
    state: ConnectionState,
    /// `connect()`/`disconnect()`마다 증가. 이전 세대의 시도 결과는 버려집니다.
    generation: u64,
    next_link_id: u64,
    credential: Option<SessionCredential>,
    live: Option<LiveLink>,
    in_flight: Option<ConnectAttempt>,
    /// 진행 중인 최초 연결 시도 또는 재연결 루프
    cancel: Option<CancellationToken>,
    reconnect_attempts: u32,
    last_error: Option<ChannelError>,
    last_heartbeat: Option<DateTime<Utc>>,
}

struct LiveLink {
    handle: ConnectionHandle,
    pump: CancellationToken,
}

impl ConnectionManager {
    /// 새 연결 관리자를 생성합니다.
    pub fn new(transport: Arc<dyn PushTransport>, config: ChannelConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            shared: Arc::new(ManagerShared {
                transport,
                config,
                inner: Mutex::new(ManagerInner::default()),
                state_tx,
                events_tx,
            }),
        }
    }

    /// 채널에 연결합니다.
    ///
    /// - 자격증명이 없거나 비어 있으면 `AuthMissing`.
    /// - 이미 연결되어 있으면 현재 핸들을 즉시 반환합니다.
    /// - 연결 시도가 진행 중이면 그 결과를 함께 기다립니다.
    /// - `Failed`/`Reconnecting` 상태에서 호출하면 재시도 횟수를 초기화하고 새로 시작합니다.
    ///
    /// 호출자가 기다리기를 멈춰도 시도 자체는 별도 태스크에서 끝까지 진행됩니다.
    pub async fn connect(
        &self,
        credential: Option<SessionCredential>,
    ) -> Result<ConnectionHandle, ChannelError> {
        let credential = match credential {
            Some(credential) if !credential.is_empty() => credential,
            _ => {
                warn!("세션 자격증명 없이 연결 요청");
                return Err(ChannelError::AuthMissing);
            }
        };

        let attempt = {
            let mut inner = self.shared.lock();
            if let (ConnectionState::Connected, Some(live)) = (inner.state, inner.live.as_ref()) {
                debug!(link_id = live.handle.link_id, "이미 연결됨");
                return Ok(live.handle.clone());
            }
            match inner.in_flight.clone() {
                Some(attempt) => {
                    debug!("진행 중인 연결 시도에 합류");
                    attempt
                }
                None => self.shared.start_attempt(&mut inner, credential),
            }
        };

        attempt.await
    }

    /// 연결을 해제합니다.
    ///
    /// 진행 중인 연결 시도는 `Aborted`로 끝나고 재연결 타이머는 취소됩니다.
    /// 이미 해제된 상태라면 아무것도 하지 않습니다.
    pub async fn disconnect(&self) {
        let live = {
            let mut inner = self.shared.lock();
            if inner.state == ConnectionState::Disconnected
                && inner.live.is_none()
                && inner.in_flight.is_none()
            {
                debug!("이미 연결 해제됨");
                return;
            }

            inner.generation += 1;
            inner.in_flight = None;
            if let Some(cancel) = inner.cancel.take() {
                cancel.cancel();
            }
            inner.credential = None;
            inner.reconnect_attempts = 0;
            inner.last_error = None;
            inner.last_heartbeat = None;
            self.shared.transition(&mut inner, ConnectionState::Disconnected);
            inner.live.take()
        };

        if let Some(live) = live {
            live.pump.cancel();
            live.handle.link.close().await;
        }
        info!("푸시 채널 연결 해제");
    }

    /// 현재 연결 상태.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// 연결 상태 변화를 구독합니다.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// 채널 이벤트를 구독합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events_tx.subscribe()
    }

    /// 연결되어 있는지 확인합니다.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// 마지막 `health_probe` 수신 시각.
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().last_heartbeat
    }

    /// 마지막 연결 에러.
    pub fn last_error(&self) -> Option<ChannelError> {
        self.shared.lock().last_error.clone()
    }

    /// 현재 재연결 루프의 시도 번호.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect_attempts
    }

    /// 연결된 채널로 요청을 보냅니다.
    pub async fn send(&self, request: ClientRequest) -> Result<(), ChannelError> {
        let link = {
            let inner = self.shared.lock();
            match (inner.state, inner.live.as_ref()) {
                (ConnectionState::Connected, Some(live)) => Arc::clone(&live.handle.link),
                _ => return Err(ChannelError::NotConnected),
            }
        };

        link.send(&request)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    /// 서버에 포트폴리오 전체 전송을 요청합니다.
    pub async fn request_portfolio_snapshot(&self, user_id: &str) -> Result<(), ChannelError> {
        self.send(ClientRequest::RequestPortfolio {
            user_id: user_id.to_string(),
        })
        .await
    }

    /// 모의 시세를 주입합니다.
    pub async fn submit_mock_tick(&self, ticker: &str, price: Decimal) -> Result<(), ChannelError> {
        self.send(ClientRequest::SubmitMockTick {
            ticker: ticker.to_string(),
            price,
        })
        .await
    }
}

impl ManagerShared {
    fn lock(&self) -> MutexGuard<'_, ManagerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut ManagerInner, next: ConnectionState) {
        let prev = inner.state;
        if prev == next {
            return;
        }
        if !prev.can_transition_to(next) {
            warn!(from = %prev, to = %next, "예상하지 못한 상태 전이");
        }
        inner.state = next;
        self.state_tx.send_replace(next);
        info!(from = %prev, to = %next, "연결 상태 변경");
    }

    fn fail(&self, inner: &mut ManagerInner, err: ChannelError) {
        error!(error = %err, "푸시 채널 실패");
        inner.last_error = Some(err);
        self.transition(inner, ConnectionState::Failed);
    }

    /// 새 연결 시도를 시작합니다. 잠금을 쥔 채로 호출해야 합니다.
    fn start_attempt(
        self: &Arc<Self>,
        inner: &mut ManagerInner,
        credential: SessionCredential,
    ) -> ConnectAttempt {
        if let Some(previous) = inner.cancel.take() {
            previous.cancel();
        }
        inner.generation += 1;
        inner.reconnect_attempts = 0;
        inner.last_error = None;
        inner.credential = Some(credential.clone());

        let generation = inner.generation;
        let cancel = CancellationToken::new();
        inner.cancel = Some(cancel.clone());
        self.transition(inner, ConnectionState::Connecting);

        let task = tokio::spawn(Arc::clone(self).establish(generation, credential, cancel));
        let attempt = async move {
            task.await.unwrap_or_else(|e| {
                error!(error = %e, "연결 태스크 비정상 종료");
                Err(ChannelError::Aborted)
            })
        }
        .boxed()
        .shared();

        inner.in_flight = Some(attempt.clone());
        attempt
    }

    async fn establish(
        self: Arc<Self>,
        generation: u64,
        credential: SessionCredential,
        cancel: CancellationToken,
    ) -> Result<ConnectionHandle, ChannelError> {
        let timeout = self.config.connect_timeout();
        let handshake = Handshake::new(credential, 0);
        info!(generation, "푸시 채널 연결 시도");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, self.transport.open(&handshake)) => Some(result),
        };

        let (result, orphan) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                debug!(generation, "연결 시도가 무효화됨");
                let orphan = outcome.and_then(|r| r.ok()).and_then(|r| r.ok());
                (Err(ChannelError::Aborted), orphan)
            } else {
                inner.in_flight = None;
                inner.cancel = None;
                match outcome {
                    None => (Err(ChannelError::Aborted), None),
                    Some(Ok(Ok(link))) => match self.attach_link(&mut inner, Arc::clone(&link)) {
                        Ok(handle) => (Ok(handle), None),
                        Err(err) => {
                            self.fail(&mut inner, err.clone());
                            (Err(err), Some(link))
                        }
                    },
                    Some(Ok(Err(e))) => {
                        let err = ChannelError::ConnectRejected(e.to_string());
                        self.fail(&mut inner, err.clone());
                        (Err(err), None)
                    }
                    Some(Err(_)) => {
                        let err = ChannelError::ConnectTimeout(timeout);
                        self.fail(&mut inner, err.clone());
                        (Err(err), None)
                    }
                }
            }
        };

        if let Some(link) = orphan {
            link.close().await;
        }
        result
    }

    /// 링크를 붙이고 `Connected`로 전이합니다.
    ///
    /// 이벤트 리스너는 여기서만 등록됩니다.
    fn attach_link(
        self: &Arc<Self>,
        inner: &mut ManagerInner,
        link: Arc<dyn PushLink>,
    ) -> Result<ConnectionHandle, ChannelError> {
        if !inner.state.is_transitioning() {
            return Err(ChannelError::Aborted);
        }
        let frames = link.take_receiver().ok_or_else(|| {
            ChannelError::ConnectRejected("link receiver already taken".to_string())
        })?;

        inner.next_link_id += 1;
        let handle = ConnectionHandle::new(inner.next_link_id, link);
        let pump = CancellationToken::new();
        tokio::spawn(Arc::clone(self).pump(handle.link_id, frames, pump.clone()));

        inner.live = Some(LiveLink {
            handle: handle.clone(),
            pump,
        });
        inner.cancel = None;
        inner.reconnect_attempts = 0;
        inner.last_error = None;
        self.transition(inner, ConnectionState::Connected);
        info!(link_id = handle.link_id, "푸시 채널 연결 완료");

        let _ = self.events_tx.send(ChannelEvent::SyncRequested);
        Ok(handle)
    }

    /// 링크의 수신 프레임을 구독자에게 전달합니다.
    async fn pump(
        self: Arc<Self>,
        link_id: u64,
        mut frames: mpsc::Receiver<LinkFrame>,
        cancel: CancellationToken,
    ) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                frame = frames.recv() => frame,
            };

            match frame {
                Some(LinkFrame::Event(event)) => {
                    if matches!(event, PushEvent::HealthProbe) {
                        self.lock().last_heartbeat = Some(Utc::now());
                    }
                    debug!(link_id, kind = event.kind(), "푸시 이벤트 수신");
                    let _ = self.events_tx.send(ChannelEvent::Push(event));
                }
                Some(LinkFrame::Closed(reason)) => {
                    self.on_transport_drop(link_id, reason);
                    return;
                }
                None => {
                    self.on_transport_drop(link_id, "frame channel closed".to_string());
                    return;
                }
            }
        }
    }

    fn on_transport_drop(self: &Arc<Self>, link_id: u64, reason: String) {
        let (live, credential, cancel, generation) = {
            let mut inner = self.lock();
            let is_current = inner
                .live
                .as_ref()
                .is_some_and(|live| live.handle.link_id == link_id);
            if !is_current || inner.state != ConnectionState::Connected {
                return;
            }

            warn!(link_id, reason = %reason, "푸시 채널 끊김, 재연결 시작");
            inner.last_error = Some(ChannelError::TransportDrop(reason));
            let live = inner.live.take();
            self.transition(&mut inner, ConnectionState::Reconnecting);

            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());
            inner.reconnect_attempts = 0;
            (live, inner.credential.clone(), cancel, inner.generation)
        };

        if let Some(live) = live {
            live.pump.cancel();
            tokio::spawn(async move { live.handle.link.close().await });
        }

        match credential {
            Some(credential) => {
                tokio::spawn(Arc::clone(self).reconnect_loop(generation, credential, cancel));
            }
            None => {
                let mut inner = self.lock();
                if inner.generation == generation {
                    self.fail(&mut inner, ChannelError::AuthMissing);
                }
            }
        }
    }

    async fn reconnect_loop(
        self: Arc<Self>,
        generation: u64,
        credential: SessionCredential,
        cancel: CancellationToken,
    ) {
        let max_attempts = self.config.max_reconnect_attempts;

        for attempt in 1..=max_attempts {
            {
                let mut inner = self.lock();
                if inner.generation != generation || cancel.is_cancelled() {
                    return;
                }
                inner.reconnect_attempts = attempt;
            }

            let delay = self.reconnect_delay(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "재연결 대기"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let handshake = Handshake::new(credential.clone(), attempt);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(
                    self.config.connect_timeout(),
                    self.transport.open(&handshake),
                ) => result,
            };

            match outcome {
                Ok(Ok(link)) => {
                    let attached = {
                        let mut inner = self.lock();
                        if inner.generation != generation || cancel.is_cancelled() {
                            Err(None)
                        } else {
                            self.attach_link(&mut inner, Arc::clone(&link)).map_err(Some)
                        }
                    };
                    match attached {
                        Ok(handle) => {
                            info!(attempt, link_id = handle.link_id, "재연결 성공");
                            return;
                        }
                        Err(None) => {
                            link.close().await;
                            return;
                        }
                        Err(Some(err)) => {
                            warn!(attempt, error = %err, "재연결 링크 부착 실패");
                            link.close().await;
                        }
                    }
                }
                Ok(Err(e)) => warn!(attempt, error = %e, "재연결 핸드셰이크 거부"),
                Err(_) => warn!(attempt, "재연결 핸드셰이크 타임아웃"),
            }
        }

        let mut inner = self.lock();
        if inner.generation != generation || cancel.is_cancelled() {
            return;
        }
        inner.cancel = None;
        self.fail(
            &mut inner,
            ChannelError::ReconnectExhausted {
                attempts: max_attempts,
            },
        );
    }

    fn reconnect_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.config.reconnect_jitter_ms;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.config.backoff_delay(attempt) + Duration::from_millis(jitter)
    }
}
