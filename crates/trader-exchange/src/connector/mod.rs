//! 원격 서비스 커넥터.

pub mod rest;

pub use rest::{RestConfig, RestPullClient};
