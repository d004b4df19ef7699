//! CLI 도구 모음.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 실시간 계좌 동기화 세션 실행 (`watch`)
//! - 대시보드/잔고 단건 조회 (`snapshot`)
//! - 호가 래더 조회 (`depth`)
//! - 설정 확인 (`config`)

pub mod backend;
pub mod commands;
pub mod output;
