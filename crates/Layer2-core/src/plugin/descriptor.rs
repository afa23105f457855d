//! Plugin Descriptor - 플러그인 상태 기록

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// PluginState - 라이프사이클 상태
// ============================================================================

/// 플러그인 라이프사이클 상태
///
/// `Discovered → Loaded → Enabled`, `Enabled ↔ Disabled`, 어디서든 `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// 발견됨 (코드 미로드)
    Discovered,
    /// import 완료, 마운트 전
    Loaded,
    /// 마운트되어 서비스 중
    Enabled,
    /// 비활성화됨
    Disabled,
    /// 실패 (last_error 참고)
    Failed,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Discovered => "discovered",
            PluginState::Loaded => "loaded",
            PluginState::Enabled => "enabled",
            PluginState::Disabled => "disabled",
            PluginState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PluginDescriptor
// ============================================================================

/// 플러그인 디스크립터 (로더 소유)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// 플러그인 이름 (고유)
    pub name: String,

    /// 플러그인 디렉토리
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    pub state: PluginState,

    #[serde(default)]
    pub last_error: Option<String>,

    /// 성공한 로드 횟수
    #[serde(default)]
    pub mount_generation: u64,

    pub updated_at: DateTime<Utc>,

    /// 영속화되는 희망 상태
    #[serde(default)]
    pub enabled: bool,

    /// 현재 라이브 버전이 마운트되어 있는지
    #[serde(default)]
    pub mounted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PluginDescriptor {
    /// 새로 발견된 플러그인
    pub fn discovered(name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path,
            state: PluginState::Discovered,
            last_error: None,
            mount_generation: 0,
            updated_at: Utc::now(),
            enabled: false,
            mounted: false,
            version: None,
            description: None,
        }
    }

    /// 상태 전이
    pub(crate) fn transition(&mut self, state: PluginState) {
        self.state = state;
        self.updated_at = Utc::now();
        if state != PluginState::Failed {
            self.last_error = None;
        }
    }

    /// 실패 기록
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.state = PluginState::Failed;
        self.last_error = Some(message.into());
        self.updated_at = Utc::now();
    }

    pub fn is_failed(&self) -> bool {
        self.state == PluginState::Failed
    }
}

/// 플러그인 이름 검증: `[a-z0-9_-]+`
///
/// 권한 owner 는 소문자로 정규화되므로 대문자 이름은 받지 않는다.
/// (`Quiz` 와 `quiz` 가 같은 owner 를 공유하게 됨)
pub fn is_valid_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_names() {
        assert!(is_valid_plugin_name("quiz"));
        assert!(is_valid_plugin_name("quiz_v2-beta"));
        assert!(!is_valid_plugin_name(""));
        assert!(!is_valid_plugin_name("quiz/../admin"));
        assert!(!is_valid_plugin_name("퀴즈"));
        assert!(!is_valid_plugin_name("Quiz"));
        assert!(!is_valid_plugin_name("QUIZ2"));
    }

    #[test]
    fn test_transition_clears_error() {
        let mut descriptor = PluginDescriptor::discovered("quiz", None);
        descriptor.fail("boom");
        assert!(descriptor.is_failed());
        assert_eq!(descriptor.last_error.as_deref(), Some("boom"));

        descriptor.transition(PluginState::Enabled);
        assert!(descriptor.last_error.is_none());
    }
}
