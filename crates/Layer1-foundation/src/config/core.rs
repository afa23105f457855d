//! Core Config - 통합 설정
//!
//! 기본값 -> `aranes.json` -> 환경 변수 순서로 덮어쓴다.
//! secret key, database URL, SQL 로깅 플래그는 외부 협력자(Auth Service, DB 세션)가
//! 소비하는 값이며 코어는 전달만 한다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 설정 파일명
pub const CORE_CONFIG_FILE: &str = "aranes.json";

/// 플러그인 상태 파일명 (plugins 디렉토리 기준)
pub const PLUGIN_STATE_FILE: &str = "plugins_registry.json";

/// 개발용 기본 secret key
pub const DEFAULT_SECRET_KEY: &str = "change-me-change-me-change-me-change-me";

// ============================================================================
// Core Config
// ============================================================================

/// AraNES 코어 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    /// 토큰 서명 키 (Auth Service 용)
    #[serde(default = "default_secret_key")]
    pub secret_key: String,

    /// 데이터베이스 URL (DB 세션 관리자 용)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// SQL 로깅 여부
    #[serde(default)]
    pub sql_echo: bool,

    /// 액세스 토큰 유효 시간 (분)
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: u64,

    /// 플러그인 디렉토리
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,

    /// 플러그인 상태 파일 (없으면 plugins_dir/plugins_registry.json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// in-process 호출 타임아웃 (밀리초, 0 이면 무제한)
    #[serde(default)]
    pub dispatch_timeout_ms: u64,

    /// in-process 응답 본문 최대 크기 (바이트)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_secret_key() -> String {
    DEFAULT_SECRET_KEY.to_string()
}

fn default_database_url() -> String {
    "sqlite+aiosqlite:///./aranes.db".to_string()
}

fn default_token_ttl_minutes() -> u64 {
    60
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("services")
}

fn default_body_limit() -> usize {
    16 * 1024 * 1024
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            database_url: default_database_url(),
            sql_echo: false,
            token_ttl_minutes: default_token_ttl_minutes(),
            plugins_dir: default_plugins_dir(),
            state_file: None,
            dispatch_timeout_ms: 0,
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// 디렉토리의 `aranes.json` + 프로세스 환경 변수로 로드
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let store = JsonStore::new(dir.as_ref());
        let mut config = store
            .load_optional::<CoreConfig>(CORE_CONFIG_FILE)?
            .unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 환경 변수 덮어쓰기
    ///
    /// 조회 함수를 주입받으므로 테스트에서 프로세스 환경을 건드리지 않는다.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("ARANES_SECRET_KEY") {
            self.secret_key = secret;
        }
        if let Some(url) = lookup("ARANES_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(echo) = lookup("ARANES_SQL_ECHO") {
            self.sql_echo = parse_flag(&echo);
        }
        if let Some(ttl) = lookup("ACCESS_TOKEN_EXPIRE_MINUTES") {
            self.token_ttl_minutes = ttl.trim().parse().map_err(|_| {
                Error::Config(format!("ACCESS_TOKEN_EXPIRE_MINUTES is not a number: {}", ttl))
            })?;
        }
        if let Some(dir) = lookup("ARANES_PLUGINS_DIR") {
            self.plugins_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("ARANES_STATE_FILE") {
            self.state_file = Some(PathBuf::from(file));
        }
        self.validate()
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.token_ttl_minutes == 0 {
            return Err(Error::Config("token TTL must be positive".to_string()));
        }
        if self.secret_key.len() < 16 {
            return Err(Error::Config(
                "secret key must be at least 16 characters".to_string(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Derived values
    // ========================================================================

    /// 플러그인 상태 파일 경로
    pub fn state_file_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.plugins_dir.join(PLUGIN_STATE_FILE))
    }

    /// 토큰 TTL
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.token_ttl_minutes as i64)
    }

    /// in-process 호출 타임아웃
    pub fn dispatch_timeout(&self) -> Option<Duration> {
        (self.dispatch_timeout_ms > 0).then(|| Duration::from_millis(self.dispatch_timeout_ms))
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn plugins_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugins_dir = dir.into();
        self
    }

    pub fn state_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.state_file = Some(file.into());
        self
    }

    pub fn token_ttl_minutes(mut self, minutes: u64) -> Self {
        self.token_ttl_minutes = minutes;
        self
    }

    pub fn dispatch_timeout_ms(mut self, millis: u64) -> Self {
        self.dispatch_timeout_ms = millis;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
