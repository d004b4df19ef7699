//! 시뮬레이션 푸시 채널.
//!
//! 핸드셰이크 결과를 스크립트로 지정하고, 이벤트 주입과 연결 끊김을
//! 재현할 수 있는 `PushTransport` 구현입니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use trader_core::{AccountSnapshot, SnapshotPatch};

use crate::channel::{ClientRequest, Handshake, LinkFrame, PushEvent, PushLink, PushTransport};
use crate::error::{ExchangeError, ExchangeResult};

/// 링크별 프레임 버퍼 크기.
const LINK_BUFFER: usize = 256;

/// 핸드셰이크 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// 연결 수락
    Accept,
    /// 인증 거부 (사유)
    Reject(String),
    /// 응답 없음 (타임아웃 유도)
    Hang,
}

#[derive(Default)]
struct TransportState {
    script: VecDeque<HandshakeOutcome>,
    fallback: Option<HandshakeOutcome>,
    latency: Duration,
    open_calls: usize,
    tokens: Vec<String>,
    links: Vec<Arc<SimulatedLink>>,
}

/// 시뮬레이션 전송 계층.
///
/// 복제본은 같은 상태를 공유하므로 관리자에 넘긴 뒤에도 테스트에서 조작할 수 있습니다.
#[derive(Clone, Default)]
pub struct SimulatedTransport {
    state: Arc<Mutex<TransportState>>,
    portfolio: Arc<Mutex<Option<AccountSnapshot>>>,
}

impl SimulatedTransport {
    /// 모든 핸드셰이크를 수락하는 전송 계층을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 핸드셰이크 지연을 설정합니다.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// 서버 측 포트폴리오를 설정합니다.
    ///
    /// 설정되어 있으면 `request_portfolio`에 전체 스냅샷으로 응답하고,
    /// `submit_mock_tick`은 해당 종목 현재가를 바꾼 뒤 변경분을 푸시합니다.
    pub fn with_portfolio(self, snapshot: AccountSnapshot) -> Self {
        *lock(&self.portfolio) = Some(snapshot);
        self
    }

    /// 다음 핸드셰이크 결과들을 순서대로 지정합니다.
    pub fn script(&self, outcomes: impl IntoIterator<Item = HandshakeOutcome>) {
        self.lock().script.extend(outcomes);
    }

    /// 스크립트가 비었을 때 사용할 결과를 지정합니다 (기본: 수락).
    pub fn set_fallback(&self, outcome: HandshakeOutcome) {
        self.lock().fallback = Some(outcome);
    }

    /// `open()` 호출 횟수.
    pub fn open_calls(&self) -> usize {
        self.lock().open_calls
    }

    /// 모든 링크에서 수신 채널을 가져간 횟수 (= 등록된 리스너 수).
    pub fn listener_registrations(&self) -> usize {
        self.lock()
            .links
            .iter()
            .map(|link| link.receiver_takes())
            .sum()
    }

    /// 마지막 핸드셰이크에 실린 토큰.
    pub fn last_token(&self) -> Option<String> {
        self.lock().tokens.last().cloned()
    }

    /// 가장 최근에 열린 링크.
    pub fn current_link(&self) -> Option<Arc<SimulatedLink>> {
        self.lock().links.last().cloned()
    }

    /// 현재 링크로 서버 이벤트를 보냅니다.
    pub fn emit(&self, event: PushEvent) -> bool {
        self.current_link().is_some_and(|link| link.emit(event))
    }

    /// 현재 링크를 서버 쪽에서 끊습니다.
    pub fn drop_connection(&self, reason: &str) {
        if let Some(link) = self.current_link() {
            link.drop_connection(reason);
        }
    }

    /// 모든 링크로 전송된 요청.
    pub fn sent_requests(&self) -> Vec<ClientRequest> {
        self.lock()
            .links
            .iter()
            .flat_map(|link| link.sent())
            .collect()
    }

    /// 서버 측 포트폴리오의 현재 값.
    pub fn portfolio(&self) -> Option<AccountSnapshot> {
        lock(&self.portfolio).clone()
    }

    /// 서버 측 포트폴리오에 시세를 반영하고 변경분을 푸시합니다.
    ///
    /// 포트폴리오가 없거나 보유하지 않은 종목이면 `false`.
    pub fn push_tick(&self, ticker: &str, price: Decimal) -> bool {
        let patch = {
            let mut portfolio = lock(&self.portfolio);
            let Some(snapshot) = portfolio.as_mut() else {
                return false;
            };
            if !apply_tick(snapshot, ticker, price) {
                return false;
            }
            SnapshotPatch::from(&*snapshot)
        };
        self.emit(PushEvent::PortfolioUpdate(patch))
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        lock(&self.state)
    }
}

#[async_trait]
impl PushTransport for SimulatedTransport {
    async fn open(&self, handshake: &Handshake) -> ExchangeResult<Arc<dyn PushLink>> {
        let (outcome, latency) = {
            let mut state = self.lock();
            state.open_calls += 1;
            state.tokens.push(handshake.credential.expose().to_string());
            let outcome = state
                .script
                .pop_front()
                .or_else(|| state.fallback.clone())
                .unwrap_or(HandshakeOutcome::Accept);
            (outcome, state.latency)
        };
        debug!(attempt = handshake.attempt, ?outcome, "시뮬레이션 핸드셰이크");

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match outcome {
            HandshakeOutcome::Accept => {
                let link = Arc::new(SimulatedLink::new(Arc::clone(&self.portfolio)));
                self.lock().links.push(Arc::clone(&link));
                Ok(link as Arc<dyn PushLink>)
            }
            HandshakeOutcome::Reject(reason) => Err(ExchangeError::Unauthorized(reason)),
            HandshakeOutcome::Hang => std::future::pending().await,
        }
    }
}

/// 시뮬레이션 링크.
pub struct SimulatedLink {
    frames_tx: mpsc::Sender<LinkFrame>,
    frames_rx: Mutex<Option<mpsc::Receiver<LinkFrame>>>,
    takes: AtomicUsize,
    closed: AtomicBool,
    sent: Mutex<Vec<ClientRequest>>,
    portfolio: Arc<Mutex<Option<AccountSnapshot>>>,
}

impl SimulatedLink {
    fn new(portfolio: Arc<Mutex<Option<AccountSnapshot>>>) -> Self {
        let (frames_tx, frames_rx) = mpsc::channel(LINK_BUFFER);
        Self {
            frames_tx,
            frames_rx: Mutex::new(Some(frames_rx)),
            takes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            portfolio,
        }
    }

    /// 서버 이벤트를 보냅니다. 닫힌 링크면 `false`.
    pub fn emit(&self, event: PushEvent) -> bool {
        !self.is_closed() && self.frames_tx.try_send(LinkFrame::Event(event)).is_ok()
    }

    /// 서버 쪽에서 연결을 끊습니다.
    pub fn drop_connection(&self, reason: &str) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.frames_tx.try_send(LinkFrame::Closed(reason.to_string()));
        }
    }

    /// 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 수신 채널을 가져간 횟수.
    pub fn receiver_takes(&self) -> usize {
        self.takes.load(Ordering::SeqCst)
    }

    /// 이 링크로 전송된 요청.
    pub fn sent(&self) -> Vec<ClientRequest> {
        lock(&self.sent).clone()
    }

    fn respond(&self, request: &ClientRequest) {
        let patch = {
            let mut portfolio = lock(&self.portfolio);
            let Some(snapshot) = portfolio.as_mut() else {
                return;
            };
            match request {
                ClientRequest::RequestPortfolio { .. } => SnapshotPatch::from(&*snapshot),
                ClientRequest::SubmitMockTick { ticker, price } => {
                    if !apply_tick(snapshot, ticker, *price) {
                        return;
                    }
                    SnapshotPatch::from(&*snapshot)
                }
            }
        };
        self.emit(PushEvent::PortfolioUpdate(patch));
    }
}

#[async_trait]
impl PushLink for SimulatedLink {
    fn take_receiver(&self) -> Option<mpsc::Receiver<LinkFrame>> {
        let receiver = lock(&self.frames_rx).take();
        if receiver.is_some() {
            self.takes.fetch_add(1, Ordering::SeqCst);
        }
        receiver
    }

    async fn send(&self, request: &ClientRequest) -> ExchangeResult<()> {
        if self.is_closed() {
            return Err(ExchangeError::Disconnected("simulated link closed".to_string()));
        }
        lock(&self.sent).push(request.clone());
        self.respond(request);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// 종목 현재가를 바꾸고 합계를 다시 계산합니다.
///
/// 보유하지 않은 종목이거나 계산이 범위를 벗어나면 스냅샷을 건드리지 않고 `false`.
pub(crate) fn apply_tick(snapshot: &mut AccountSnapshot, ticker: &str, price: Decimal) -> bool {
    let mut next = snapshot.clone();
    let Some(position) = next.positions.iter_mut().find(|p| p.ticker == ticker) else {
        return false;
    };
    position.current_price = price;
    match position.clone().normalized() {
        Ok(updated) => *position = updated,
        Err(e) => {
            warn!(ticker, error = %e, "모의 시세 반영 실패");
            return false;
        }
    }
    if revalue(&mut next).is_none() {
        warn!(ticker, "모의 시세 합계 계산 범위 초과");
        return false;
    }
    *snapshot = next;
    true
}

/// 포지션 평가액으로 합계 필드를 다시 계산합니다. 범위를 벗어나면 `None`.
pub(crate) fn revalue(snapshot: &mut AccountSnapshot) -> Option<()> {
    let total_unrealized_pnl = snapshot
        .positions
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.unrealized_pnl))?;
    let total_portfolio_value = snapshot
        .cash_balance
        .checked_add(snapshot.positions_market_value()?)?;
    let total_pnl = snapshot.total_realized_pnl.checked_add(total_unrealized_pnl)?;

    snapshot.total_unrealized_pnl = total_unrealized_pnl;
    snapshot.total_portfolio_value = total_portfolio_value;
    snapshot.total_pnl = total_pnl;
    Some(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trader_core::{Position, SessionCredential};

    fn handshake() -> Handshake {
        Handshake::new(SessionCredential::new("t"), 0)
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let transport = SimulatedTransport::new();
        transport.script([HandshakeOutcome::Reject("nope".to_string())]);

        assert!(transport.open(&handshake()).await.is_err());
        assert!(transport.open(&handshake()).await.is_ok());
        assert_eq!(transport.open_calls(), 2);
        assert_eq!(transport.last_token().as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_receiver_taken_once() {
        let transport = SimulatedTransport::new();
        let link = transport.open(&handshake()).await.unwrap();

        assert!(link.take_receiver().is_some());
        assert!(link.take_receiver().is_none());
        assert_eq!(transport.listener_registrations(), 1);
    }

    #[tokio::test]
    async fn test_mock_tick_revalues_portfolio() {
        let snapshot = AccountSnapshot {
            cash_balance: dec!(100),
            positions: vec![Position::new("AAPL", dec!(10), dec!(150), dec!(150))],
            ..Default::default()
        };
        let transport = SimulatedTransport::new().with_portfolio(snapshot);
        let link = transport.open(&handshake()).await.unwrap();
        let mut frames = link.take_receiver().unwrap();

        link.send(&ClientRequest::SubmitMockTick {
            ticker: "AAPL".to_string(),
            price: dec!(160),
        })
        .await
        .unwrap();

        let Some(LinkFrame::Event(PushEvent::PortfolioUpdate(patch))) = frames.recv().await else {
            panic!("expected portfolio update");
        };
        assert_eq!(patch.total_portfolio_value, Some(dec!(1700)));
        assert_eq!(patch.total_unrealized_pnl, Some(dec!(100)));
        assert_eq!(transport.portfolio().unwrap().positions[0].current_price, dec!(160));
    }

    #[tokio::test]
    async fn test_closed_link_rejects_send() {
        let transport = SimulatedTransport::new();
        let link = transport.open(&handshake()).await.unwrap();
        link.close().await;

        let request = ClientRequest::RequestPortfolio {
            user_id: "u".to_string(),
        };
        assert!(link.send(&request).await.is_err());
        assert!(!transport.emit(PushEvent::HealthProbe));
    }
}
