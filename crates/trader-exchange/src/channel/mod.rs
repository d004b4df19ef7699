//! 서버 푸시 채널.
//!
//! - `ConnectionManager`: 연결 수명주기 (single-flight 연결, 재연결, 해제)
//! - `PushTransport` / `PushLink`: 주입 가능한 전송 계층
//! - 와이어 메시지 (`PushEvent`, `ClientRequest`)

mod manager;
mod message;
mod state;
mod transport;

pub use manager::ConnectionManager;
pub use message::*;
pub use state::ConnectionState;
pub use transport::*;
