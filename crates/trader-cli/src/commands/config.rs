//! 적용된 설정 출력.

use anyhow::{Context, Result};
use trader_core::AppConfig;

/// 파일과 환경 변수가 반영된 최종 설정을 TOML로 렌더링합니다.
pub fn render_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).context("설정 직렬화 실패")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_default_config() {
        let rendered = render_config(&AppConfig::default()).unwrap();
        assert!(rendered.contains("[sync]"));
        assert!(rendered.contains("freshness_window_ms = 10000"));

        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.channel.max_reconnect_attempts, 5);
    }
}
