//! 로컬 WebSocket 서버를 상대로 한 푸시 채널 통합 테스트.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use trader_core::{ChannelConfig, SessionCredential};
use trader_exchange::{
    ChannelError, ChannelEvent, ClientRequest, ConnectionManager, ConnectionState, PushEvent,
    WebSocketTransport,
};

const WAIT: Duration = Duration::from_secs(10);

fn fast_config() -> ChannelConfig {
    ChannelConfig {
        connect_timeout_secs: 2,
        max_reconnect_attempts: 2,
        reconnect_delay_ms: 10,
        max_reconnect_delay_ms: 50,
        reconnect_jitter_ms: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_handshake_auth_and_event_delivery() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut seen = None;
        let mut ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
            let auth = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            seen = Some((req.uri().to_string(), auth));
            Ok(resp)
        })
        .await
        .unwrap();

        ws.send(Message::Text(
            r#"{"type":"portfolio_update","data":{"cashBalance":"700"}}"#.to_string(),
        ))
        .await
        .unwrap();

        let request = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    break serde_json::from_str::<ClientRequest>(&text).unwrap();
                }
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        };
        (seen.unwrap(), request)
    });

    let transport = Arc::new(WebSocketTransport::new(
        format!("ws://{}/ws", addr),
        &fast_config(),
    ));
    let manager = ConnectionManager::new(transport, fast_config());
    let mut events = manager.subscribe();

    manager
        .connect(Some(SessionCredential::new("tok-1")))
        .await
        .unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);

    let push = timeout(WAIT, async {
        loop {
            if let ChannelEvent::Push(event) = events.recv().await.unwrap() {
                break event;
            }
        }
    })
    .await
    .unwrap();
    assert!(matches!(push, PushEvent::PortfolioUpdate(ref p) if p.cash_balance.is_some()));

    manager.request_portfolio_snapshot("user-1").await.unwrap();

    let ((uri, auth), request) = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(uri, "/ws?token=tok-1");
    assert_eq!(auth.as_deref(), Some("Bearer tok-1"));
    assert_eq!(
        request,
        ClientRequest::RequestPortfolio {
            user_id: "user-1".to_string()
        }
    );

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_server_close_exhausts_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        // listener가 drop되므로 이후 재연결은 거부됩니다.
    });

    let transport = Arc::new(WebSocketTransport::new(
        format!("ws://{}/ws", addr),
        &fast_config(),
    ));
    let manager = ConnectionManager::new(transport, fast_config());
    let mut state = manager.watch_state();

    manager
        .connect(Some(SessionCredential::new("tok-1")))
        .await
        .unwrap();

    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Failed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        manager.last_error(),
        Some(ChannelError::ReconnectExhausted { attempts: 2 })
    );
}

#[tokio::test]
async fn test_refused_connection_fails_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = Arc::new(WebSocketTransport::new(
        format!("ws://{}/ws", addr),
        &fast_config(),
    ));
    let manager = ConnectionManager::new(transport, fast_config());

    let result = manager.connect(Some(SessionCredential::new("tok-1"))).await;
    assert!(matches!(result, Err(ChannelError::ConnectRejected(_))));
    assert_eq!(manager.state(), ConnectionState::Failed);
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test]
async fn test_disabled_ping_keeps_link_alive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"balance_update","data":{"cashBalance":"42"}}"#.to_string(),
        ))
        .await
        .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = ChannelConfig {
        ping_interval_secs: 0,
        ..fast_config()
    };
    let transport = Arc::new(WebSocketTransport::new(format!("ws://{}/ws", addr), &config));
    let manager = ConnectionManager::new(transport, config);
    let mut events = manager.subscribe();

    manager
        .connect(Some(SessionCredential::new("tok-1")))
        .await
        .unwrap();

    let push = timeout(WAIT, async {
        loop {
            if let ChannelEvent::Push(event) = events.recv().await.unwrap() {
                break event;
            }
        }
    })
    .await
    .unwrap();
    assert!(matches!(push, PushEvent::BalanceUpdate(_)));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.last_error(), None);

    manager.disconnect().await;
}
