//! 계좌 동기화를 위한 도메인 모델.

mod account;
mod depth;
mod order;

pub use account::*;
pub use depth::*;
pub use order::*;
