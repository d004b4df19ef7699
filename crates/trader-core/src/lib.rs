//! # Trader Core
//!
//! 계좌 동기화 클라이언트의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 계좌 스냅샷 및 포지션
//! - 원시 주문 및 호가 래더 집계
//! - 세션 자격증명
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod credential;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use credential::SessionCredential;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
