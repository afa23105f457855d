//! # aranes-foundation
//!
//! Foundation layer for AraNES:
//! - Error: 중앙 에러 타입 (Error, Result)
//! - Config: 통합 설정 (CoreConfig)
//! - Storage: JsonStore, 원자적 파일 쓰기
//! - Permission: 권한 스키마 병합 (PermissionRegistry)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  aranes-core (Loader, Transport, AccessBoundary)         │
//! │                     │                                   │
//! │                     ▼                                   │
//! │  ┌──────────────┬──────────────┬────────────────────┐   │
//! │  │ CoreConfig   │ JsonStore    │ PermissionRegistry │   │
//! │  │ (env, json)  │ (tmp+rename) │ (ArcSwap snapshot) │   │
//! │  └──────────────┴──────────────┴────────────────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod permission;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{CoreConfig, CORE_CONFIG_FILE, DEFAULT_SECRET_KEY, PLUGIN_STATE_FILE};

// ============================================================================
// Permission (권한 스키마)
// ============================================================================
pub use permission::{
    FieldSet, FieldSource, FieldSpec, FieldType, PermissionField, PermissionRegistry,
    PermissionSchema, SchemaEvent, SchemaTxn,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{temp_path_for, write_atomic, write_atomic_sync, JsonStore};
