//! Error types for AraNES
//!
//! 모든 에러를 중앙에서 관리

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// AraNES 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Store corrupt: {path}: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("Store I/O error: {path}: {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ========================================================================
    // 플러그인 관련
    // ========================================================================
    #[error("Plugin import failed: {plugin} - {message}")]
    PluginImport { plugin: String, message: String },

    #[error("Plugin mount failed: {plugin} - {message}")]
    PluginMount { plugin: String, message: String },

    // ========================================================================
    // 권한 스키마 관련
    // ========================================================================
    #[error("Duplicate permission field key: {key} (owned by {existing_owner}, requested by {owner})")]
    DuplicateFieldKey {
        key: String,
        owner: String,
        existing_owner: String,
    },

    #[error("Unknown permission field key: {0}")]
    UnknownFieldKey(String),

    // ========================================================================
    // 접근 경계 관련
    // ========================================================================
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    // ========================================================================
    // 전송 관련
    // ========================================================================
    #[error("Internal dispatch error: {0}")]
    InternalDispatch(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 응답 본문에 실리는 안정적인 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::StoreCorrupt { .. } => "StoreCorrupt",
            Error::StoreIo { .. } => "StoreIOError",
            Error::PluginImport { .. } => "PluginImportError",
            Error::PluginMount { .. } => "PluginMountError",
            Error::DuplicateFieldKey { .. } => "DuplicateFieldKey",
            Error::UnknownFieldKey(_) => "UnknownFieldKey",
            Error::Unauthorized(_) => "Unauthorized",
            Error::Expired => "Expired",
            Error::InvalidCredentials => "InvalidCredentials",
            Error::InternalDispatch(_) => "InternalDispatchError",
            Error::NotFound(_) => "NotFound",
            Error::Validation(_) => "ValidationError",
            Error::Io(_) => "IOError",
            Error::Json(_) => "JSONError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// 인증 실패 계열인지 확인
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized(_) | Error::Expired | Error::InvalidCredentials
        )
    }

    /// 플러그인 로딩 실패인지 확인 (플러그인 단위로 격리되는 에러)
    pub fn is_plugin_failure(&self) -> bool {
        matches!(
            self,
            Error::PluginImport { .. }
                | Error::PluginMount { .. }
                | Error::DuplicateFieldKey { .. }
                | Error::Validation(_)
        )
    }

    /// Plugin import 에러 생성 헬퍼
    pub fn plugin_import(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::PluginImport {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Plugin mount 에러 생성 헬퍼
    pub fn plugin_mount(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::PluginMount {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Store I/O 에러 생성 헬퍼
    pub fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::StoreIo {
            path: path.into(),
            source,
        }
    }

    /// Store 손상 에러 생성 헬퍼
    pub fn store_corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::StoreCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
