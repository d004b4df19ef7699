//! tokio-tungstenite 기반 푸시 채널.
//!
//! bearer 토큰을 `token` 쿼리 파라미터와 `Authorization` 헤더 양쪽에 실어
//! 핸드셰이크합니다. 연결 후에는 별도 태스크가 수신/송신/ping을 처리합니다.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Interval;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trader_core::{AppConfig, ChannelConfig, SessionCredential};

use crate::channel::{ClientRequest, Handshake, LinkFrame, PushEvent, PushLink, PushTransport};
use crate::error::{ExchangeError, ExchangeResult};

/// 송신 대기열 크기.
const OUTBOUND_BUFFER: usize = 64;

/// WebSocket 전송 계층.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    ping_interval: Option<Duration>,
    buffer: usize,
}

impl WebSocketTransport {
    /// 새 WebSocket 전송 계층을 생성합니다.
    pub fn new(url: impl Into<String>, channel: &ChannelConfig) -> Self {
        Self {
            url: url.into(),
            ping_interval: channel.ping_interval(),
            buffer: channel.event_buffer.max(1),
        }
    }

    /// 애플리케이션 설정에서 생성합니다.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.api.ws_url.clone(), &config.channel)
    }

    /// 인증 정보가 포함된 핸드셰이크 요청을 만듭니다.
    fn build_request(&self, credential: &SessionCredential) -> ExchangeResult<Request> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| ExchangeError::WebSocket(format!("invalid url {}: {}", self.url, e)))?;
        url.query_pairs_mut().append_pair("token", credential.expose());

        let mut request = url.as_str().into_client_request()?;
        let header = HeaderValue::from_str(&credential.bearer_header())
            .map_err(|e| ExchangeError::Unauthorized(format!("invalid token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, header);
        Ok(request)
    }

    /// 텍스트 프레임을 서버 이벤트로 해석합니다.
    fn parse_frame(text: &str) -> Option<PushEvent> {
        match serde_json::from_str::<PushEvent>(text) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, "알 수 없는 메시지 무시: {}", text);
                None
            }
        }
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn open(&self, handshake: &Handshake) -> ExchangeResult<Arc<dyn PushLink>> {
        let request = self.build_request(&handshake.credential)?;
        info!(attempt = handshake.attempt, "WebSocket 연결 시도: {}", self.url);

        let (ws, _response) = connect_async(request).await?;
        info!("WebSocket 핸드셰이크 완료");

        let (frames_tx, frames_rx) = mpsc::channel(self.buffer);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let close = CancellationToken::new();

        tokio::spawn(run_socket(
            ws,
            frames_tx,
            outbound_rx,
            close.clone(),
            self.ping_interval,
        ));

        Ok(Arc::new(WebSocketLink {
            frames: Mutex::new(Some(frames_rx)),
            outbound: outbound_tx,
            close,
        }))
    }
}

/// 열린 WebSocket 연결.
struct WebSocketLink {
    frames: Mutex<Option<mpsc::Receiver<LinkFrame>>>,
    outbound: mpsc::Sender<Message>,
    close: CancellationToken,
}

#[async_trait]
impl PushLink for WebSocketLink {
    fn take_receiver(&self) -> Option<mpsc::Receiver<LinkFrame>> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn send(&self, request: &ClientRequest) -> ExchangeResult<()> {
        let json = serde_json::to_string(request)?;
        self.outbound
            .send(Message::Text(json))
            .await
            .map_err(|_| ExchangeError::Disconnected("socket task stopped".to_string()))
    }

    async fn close(&self) {
        self.close.cancel();
    }
}

/// 소켓 수신/송신/ping 루프.
///
/// 서버가 끊으면 `LinkFrame::Closed`를 보내고, `close`가 취소되면 조용히 종료합니다.
async fn run_socket(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    frames: mpsc::Sender<LinkFrame>,
    mut outbound: mpsc::Receiver<Message>,
    close: CancellationToken,
    ping_every: Option<Duration>,
) {
    let (mut write, mut read) = ws.split();
    let mut ping = ping_every
        .map(|every| tokio::time::interval_at(tokio::time::Instant::now() + every, every));

    let reason = loop {
        tokio::select! {
            biased;
            _ = close.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                debug!("클라이언트 요청으로 WebSocket 종료");
                return;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = WebSocketTransport::parse_frame(&text) {
                        if frames.send(LinkFrame::Event(event)).await.is_err() {
                            debug!("프레임 수신자 해제됨");
                            return;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    debug!("Ping 수신, Pong 응답");
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    break format!("closed by server: {:?}", frame);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            },
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        break e.to_string();
                    }
                }
                None => return,
            },
            _ = next_ping(&mut ping) => {
                if let Err(e) = write.send(Message::Ping(vec![])).await {
                    break e.to_string();
                }
            }
        }
    };

    warn!(reason = %reason, "WebSocket 연결 끊김");
    let _ = frames.send(LinkFrame::Closed(reason)).await;
}

/// 다음 ping 시각까지 대기합니다. ping이 꺼져 있으면 영원히 대기합니다.
async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_token_twice() {
        let transport =
            WebSocketTransport::new("ws://127.0.0.1:3000/ws", &ChannelConfig::default());
        let request = transport
            .build_request(&SessionCredential::new("abc 123"))
            .unwrap();

        assert_eq!(request.uri().query(), Some("token=abc+123"));
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer abc 123"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let transport = WebSocketTransport::new("not a url", &ChannelConfig::default());
        assert!(transport
            .build_request(&SessionCredential::new("t"))
            .is_err());
    }

    #[test]
    fn test_parse_frame() {
        let event = WebSocketTransport::parse_frame(
            r#"{"type":"price_alert","data":{"ticker":"AAPL","price":"180"}}"#,
        );
        assert!(matches!(event, Some(PushEvent::PriceAlert(_))));
        assert!(WebSocketTransport::parse_frame(r#"{"type":"welcome"}"#).is_none());
        assert!(WebSocketTransport::parse_frame("not json").is_none());
    }
}
