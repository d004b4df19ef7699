//! WebSocket 푸시 채널 전송 계층.

mod transport;

pub use transport::WebSocketTransport;
