//! 계좌 상태 동기화.
//!
//! 이 crate는 다음을 제공합니다:
//! - `StateReconciler`: 푸시/조회 업데이트를 신선도 규칙에 따라 단일 스냅샷으로 병합
//! - `SyncSession`: 연결 관리자, 조정기, 호가 집계를 묶는 세션 오케스트레이션
//!
//! # 예제
//!
//! ```rust,ignore
//! use trader_account::SyncSession;
//!
//! let session = SyncSession::new(transport, pull, credentials, &config);
//! session.start().await?;
//!
//! let mut snapshots = session.subscribe();
//! while let Ok(snapshot) = snapshots.recv().await {
//!     println!("{}", snapshot.total_portfolio_value);
//! }
//! ```

pub mod error;
pub mod reconciler;
pub mod session;

pub use error::{ReconcileError, SessionError};
pub use reconciler::{PullOutcome, PushOutcome, StateReconciler, UpdateSource};
pub use session::{DepthUpdate, Notice, SyncSession};
