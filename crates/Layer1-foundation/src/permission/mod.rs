//! Permission schema for AraNES
//!
//! - `types`: 필드 선언 (FieldSource, FieldSpec, FieldType) 과 키 조합
//! - `schema`: 불변 스냅샷 (PermissionSchema)
//! - `registry`: 병합/충돌 검사/발행 (PermissionRegistry, SchemaTxn)
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! let registry = PermissionRegistry::new();
//! let quiz = FieldSet::new()
//!     .field(FieldSpec::int("timer", 60))
//!     .field(FieldSpec::int("attempts", 3));
//!
//! registry.register(&quiz, "plugins/quiz")?;
//! assert_eq!(registry.snapshot().defaults()["plugins:quiz:timer"], 60);
//! ```

mod registry;
mod schema;
mod types;

pub use registry::{PermissionRegistry, SchemaEvent, SchemaTxn};
pub use schema::{PermissionField, PermissionSchema};
pub use types::{
    build_key, normalize_prefix, owner_for, FieldSet, FieldSource, FieldSpec, FieldType,
    CORE_OWNER,
};
