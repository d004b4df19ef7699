//! 설정 관리.
//!
//! 기본값 → TOML 파일 → `TRADER__` 접두사 환경 변수 순서로 덮어씁니다.
//!
//! ```text
//! TRADER__SYNC__FRESHNESS_WINDOW_MS=5000
//! TRADER__CHANNEL__MAX_RECONNECT_ATTEMPTS=3
//! ```

use crate::error::{TraderError, TraderResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 원격 API 엔드포인트
    pub api: ApiConfig,
    /// 푸시 채널 설정
    pub channel: ChannelConfig,
    /// 상태 동기화 설정
    pub sync: SyncConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 원격 API 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST API 기본 URL
    pub rest_base_url: String,
    /// WebSocket URL
    pub ws_url: String,
    /// 조회 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rest_base_url: "http://127.0.0.1:3000".to_string(),
            ws_url: "ws://127.0.0.1:3000/ws".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl ApiConfig {
    /// 조회 요청 타임아웃.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 푸시 채널 연결 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// 핸드셰이크 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// 최대 재연결 시도 횟수
    pub max_reconnect_attempts: u32,
    /// 첫 재연결 대기 시간 (밀리초)
    pub reconnect_delay_ms: u64,
    /// 재연결 대기 시간 상한 (밀리초)
    pub max_reconnect_delay_ms: u64,
    /// 재연결 대기 시간에 더할 무작위 지터 상한 (밀리초)
    pub reconnect_jitter_ms: u64,
    /// 이벤트 브로드캐스트 버퍼 크기
    pub event_buffer: usize,
    /// WebSocket ping 간격 (초, 0이면 ping 비활성화)
    pub ping_interval_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 20,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            reconnect_jitter_ms: 250,
            event_buffer: 256,
            ping_interval_secs: 30,
        }
    }
}

impl ChannelConfig {
    /// 핸드셰이크 타임아웃.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// ping 간격. 0이면 `None` (ping 비활성화).
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    /// `attempt`번째(1부터) 재연결 전 대기 시간 (지터 제외).
    ///
    /// 지수 백오프: `delay × 2^(attempt-1)`, 상한 `max_reconnect_delay_ms`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .reconnect_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_reconnect_delay_ms);
        Duration::from_millis(delay)
    }
}

/// 상태 동기화 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 푸시 업데이트 이후 조회 결과를 무시하는 구간 (밀리초)
    pub freshness_window_ms: u64,
    /// 주기적 조회 간격 (초, 0이면 비활성화)
    pub poll_interval_secs: u64,
    /// 스냅샷/호가 브로드캐스트 버퍼 크기
    pub snapshot_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            freshness_window_ms: 10_000,
            poll_interval_secs: 30,
            snapshot_buffer: 64,
        }
    }
}

impl SyncConfig {
    /// 신선도 구간.
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    /// 주기적 조회 간격. 비활성화되어 있으면 `None`.
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> TraderResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("TRADER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> TraderResult<Self> {
        Self::load("config/default.toml")
    }

    /// 값 범위를 검증합니다.
    pub fn validate(&self) -> TraderResult<()> {
        if self.sync.freshness_window_ms == 0 {
            return Err(TraderError::Config(
                "sync.freshness_window_ms must be positive".to_string(),
            ));
        }
        if self.channel.connect_timeout_secs == 0 {
            return Err(TraderError::Config(
                "channel.connect_timeout_secs must be positive".to_string(),
            ));
        }
        if self.channel.event_buffer == 0 || self.sync.snapshot_buffer == 0 {
            return Err(TraderError::Config(
                "broadcast buffers must be non-zero".to_string(),
            ));
        }
        if self.channel.reconnect_delay_ms > self.channel.max_reconnect_delay_ms {
            return Err(TraderError::Config(
                "channel.reconnect_delay_ms exceeds max_reconnect_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
