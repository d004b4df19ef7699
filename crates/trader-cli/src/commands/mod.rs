//! CLI 명령어 구현 모듈.

pub mod config;
pub mod depth;
pub mod orders;
pub mod snapshot;
pub mod watch;
