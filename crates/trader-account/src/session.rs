//! 동기화 세션.
//!
//! 연결 관리자, 스냅샷 조정기, 호가 집계를 하나의 세션으로 묶습니다.
//!
//! - `start()`: 자격증명으로 연결하고 이벤트 펌프와 주기적 조회 루프를 띄웁니다.
//! - 이벤트 펌프: 포트폴리오/잔고 → 조정기, 호가 → 집계 후 발행,
//!   주문/가격 알림 → `notices()`, 초기 동기화 요청 → `request_portfolio` 전송.
//! - `logout()`: 태스크 취소, 연결 해제, 저장소 비우기.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use trader_core::{aggregate, session_span, AccountSnapshot, AppConfig, DepthView, SyncConfig};
use trader_exchange::{
    ChannelEvent, ConnectionManager, ConnectionState, CredentialProvider, OrderNotice,
    PriceAlert, PullClient, PushEvent, PushTransport,
};
use uuid::Uuid;

use crate::error::{ReconcileError, SessionError};
use crate::reconciler::{PullOutcome, StateReconciler};

/// 스냅샷을 바꾸지 않는 알림.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// 주문 체결/취소
    Order(OrderNotice),
    /// 가격 알림
    Price(PriceAlert),
}

/// 종목별 호가 래더 갱신.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthUpdate {
    /// 종목 코드
    pub ticker: String,
    /// 집계된 호가
    pub depth: Arc<DepthView>,
}

/// 실행 중인 백그라운드 태스크.
struct SessionTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

struct SessionShared {
    id: Uuid,
    sync: SyncConfig,
    channel: ConnectionManager,
    reconciler: StateReconciler,
    pull: Arc<dyn PullClient>,
    credentials: Arc<dyn CredentialProvider>,
    tasks: Mutex<Option<SessionTasks>>,
    books: Mutex<HashMap<String, Arc<DepthView>>>,
    depth_tx: broadcast::Sender<DepthUpdate>,
    notices_tx: broadcast::Sender<Notice>,
}

/// 계좌 동기화 세션.
///
/// 복제해도 같은 세션을 가리킵니다.
#[derive(Clone)]
pub struct SyncSession {
    shared: Arc<SessionShared>,
}

impl SyncSession {
    /// 새 세션을 생성합니다. 연결은 `start()`에서 시작됩니다.
    pub fn new(
        transport: Arc<dyn PushTransport>,
        pull: Arc<dyn PullClient>,
        credentials: Arc<dyn CredentialProvider>,
        config: &AppConfig,
    ) -> Self {
        let buffer = config.sync.snapshot_buffer.max(1);
        let (depth_tx, _) = broadcast::channel(buffer);
        let (notices_tx, _) = broadcast::channel(buffer);

        Self {
            shared: Arc::new(SessionShared {
                id: Uuid::new_v4(),
                sync: config.sync.clone(),
                channel: ConnectionManager::new(transport, config.channel.clone()),
                reconciler: StateReconciler::new(Arc::clone(&pull), &config.sync),
                pull,
                credentials,
                tasks: Mutex::new(None),
                books: Mutex::new(HashMap::new()),
                depth_tx,
                notices_tx,
            }),
        }
    }

    /// 세션 식별자.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// 세션을 시작합니다.
    ///
    /// # Errors
    /// - 자격증명이 없으면 `Channel(AuthMissing)`
    /// - 최초 연결이 실패하면 해당 `ChannelError` (자동 재시도하지 않음)
    /// - 이미 실행 중이면 `AlreadyStarted`
    pub async fn start(&self) -> Result<(), SessionError> {
        let span = session_span!("sync_session", self.shared.id);

        let cancel = {
            let mut tasks = self.shared.lock_tasks();
            if tasks.is_some() {
                return Err(SessionError::AlreadyStarted);
            }
            let cancel = CancellationToken::new();
            *tasks = Some(SessionTasks {
                cancel: cancel.clone(),
                handles: Vec::new(),
            });
            cancel
        };

        // 첫 연결의 동기화 요청을 놓치지 않도록 연결 전에 구독합니다.
        let events = self.shared.channel.subscribe();
        let credential = self.shared.credentials.credential();

        if let Err(e) = self
            .shared
            .channel
            .connect(credential)
            .instrument(span.clone())
            .await
        {
            warn!(session = %self.shared.id, error = %e, "세션 시작 실패");
            self.shared.lock_tasks().take();
            return Err(e.into());
        }

        let mut handles = vec![tokio::spawn(
            Arc::clone(&self.shared)
                .run_event_pump(events, cancel.clone())
                .instrument(span.clone()),
        )];
        if let Some(every) = self.shared.sync.poll_interval() {
            handles.push(tokio::spawn(
                Arc::clone(&self.shared)
                    .run_poll_loop(every, cancel.clone())
                    .instrument(span.clone()),
            ));
        }

        match self.shared.lock_tasks().as_mut() {
            Some(tasks) if !tasks.cancel.is_cancelled() => tasks.handles.extend(handles),
            // 시작 도중 logout
            _ => cancel.cancel(),
        }

        info!(session = %self.shared.id, "동기화 세션 시작");
        Ok(())
    }

    /// 즉시 대시보드를 조회합니다 (화면 포커스 등).
    pub async fn refresh(&self) -> Result<PullOutcome, SessionError> {
        Ok(self.shared.reconciler.request_pull_update().await?)
    }

    /// 잔고만 조회해 병합합니다.
    pub async fn refresh_balance(&self) -> Result<PullOutcome, SessionError> {
        Ok(self.shared.reconciler.request_balance_pull().await?)
    }

    /// 종목 호가를 조회해 집계하고 발행합니다.
    pub async fn refresh_depth(&self, ticker: &str) -> Result<Arc<DepthView>, SessionError> {
        let orders = self.shared.pull.fetch_order_book(ticker).await.map_err(|e| {
            warn!(ticker, error = %e, "호가 조회 실패");
            ReconcileError::PullFailed(e)
        })?;
        Ok(self.shared.publish_depth(ticker, aggregate(&orders)))
    }

    /// 세션을 종료합니다.
    ///
    /// 태스크를 멈추고 연결을 해제한 뒤 스냅샷과 호가를 비웁니다.
    /// 여러 번 호출해도 안전합니다.
    pub async fn logout(&self) {
        let tasks = self.shared.lock_tasks().take();
        if let Some(tasks) = tasks {
            tasks.cancel.cancel();
            for handle in tasks.handles {
                let _ = handle.await;
            }
        }

        self.shared.channel.disconnect().await;
        self.shared.reconciler.clear();
        self.shared.lock_books().clear();
        info!(session = %self.shared.id, "세션 로그아웃 완료");
    }

    /// 실행 중인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.shared.lock_tasks().is_some()
    }

    /// 현재 스냅샷.
    pub fn snapshot(&self) -> Arc<AccountSnapshot> {
        self.shared.reconciler.current()
    }

    /// 반영된 스냅샷을 구독합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AccountSnapshot>> {
        self.shared.reconciler.subscribe()
    }

    /// 호가 갱신을 구독합니다.
    pub fn depth_feed(&self) -> broadcast::Receiver<DepthUpdate> {
        self.shared.depth_tx.subscribe()
    }

    /// 종목의 최근 호가.
    pub fn depth(&self, ticker: &str) -> Option<Arc<DepthView>> {
        self.shared.lock_books().get(ticker).cloned()
    }

    /// 주문/가격 알림을 구독합니다.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.shared.notices_tx.subscribe()
    }

    /// 연결 상태를 구독합니다.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.channel.watch_state()
    }

    /// 연결 관리자.
    pub fn channel(&self) -> &ConnectionManager {
        &self.shared.channel
    }

    /// 스냅샷 조정기.
    pub fn reconciler(&self) -> &StateReconciler {
        &self.shared.reconciler
    }
}

impl SessionShared {
    async fn run_event_pump(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ChannelEvent>,
        cancel: CancellationToken,
    ) {
        debug!("이벤트 펌프 시작");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(ChannelEvent::Push(event)) => self.handle_push(event),
                    Ok(ChannelEvent::SyncRequested) => self.request_initial_sync().await,
                    Err(RecvError::Lagged(skipped)) => {
                        // 놓친 업데이트는 조회로 보충
                        warn!(skipped, "이벤트 펌프 지연, 대시보드 재조회");
                        self.pull_logged().await;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("이벤트 펌프 종료");
    }

    async fn run_poll_loop(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.pull_logged().await,
            }
        }
        debug!("주기 조회 루프 종료");
    }

    fn handle_push(&self, event: PushEvent) {
        match event {
            PushEvent::PortfolioUpdate(_) | PushEvent::BalanceUpdate(_) => {
                if let Err(e) = self.reconciler.apply_push_update(&event) {
                    warn!(kind = event.kind(), error = %e, "푸시 업데이트 반영 실패");
                }
            }
            PushEvent::OrderUpdate(notice) => {
                info!(
                    order_id = %notice.order_id,
                    ticker = %notice.ticker,
                    status = %notice.status,
                    is_final = notice.status.is_final(),
                    "주문 상태 변경"
                );
                let _ = self.notices_tx.send(Notice::Order(notice));
            }
            PushEvent::PriceAlert(alert) => {
                info!(ticker = %alert.ticker, price = %alert.price, "가격 알림");
                let _ = self.notices_tx.send(Notice::Price(alert));
            }
            PushEvent::OrderBookUpdate(book) => {
                self.publish_depth(&book.ticker, aggregate(&book.orders));
            }
            PushEvent::HealthProbe => debug!("서버 헬스 체크 수신"),
        }
    }

    /// 연결/재연결 직후 전체 포트폴리오를 요청합니다.
    ///
    /// 사용자 ID가 없으면 조회로 대신합니다.
    async fn request_initial_sync(&self) {
        match self.credentials.user_id() {
            Some(user_id) => {
                if let Err(e) = self.channel.request_portfolio_snapshot(&user_id).await {
                    warn!(error = %e, "포트폴리오 요청 실패, 조회로 대체");
                    self.pull_logged().await;
                }
            }
            None => {
                debug!("사용자 ID 없음, 조회로 동기화");
                self.pull_logged().await;
            }
        }
    }

    async fn pull_logged(&self) {
        match self.reconciler.request_pull_update().await {
            Ok(PullOutcome::Admitted(_)) => debug!(source = "pull", "대시보드 조회 반영"),
            Ok(PullOutcome::Skipped) => debug!(source = "pull", "대시보드 조회 무시 (최근 푸시 우선)"),
            Err(e) => warn!(error = %e, "대시보드 조회 실패"),
        }
    }

    fn publish_depth(&self, ticker: &str, depth: DepthView) -> Arc<DepthView> {
        let depth = Arc::new(depth);
        self.lock_books()
            .insert(ticker.to_string(), Arc::clone(&depth));
        debug!(
            ticker,
            bids = depth.bid_levels.len(),
            asks = depth.ask_levels.len(),
            "호가 갱신"
        );
        let _ = self.depth_tx.send(DepthUpdate {
            ticker: ticker.to_string(),
            depth: Arc::clone(&depth),
        });
        depth
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Option<SessionTasks>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_books(&self) -> MutexGuard<'_, HashMap<String, Arc<DepthView>>> {
        self.books.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
