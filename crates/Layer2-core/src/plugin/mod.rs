//! # Plugin System
//!
//! AraNES 확장 플러그인 시스템
//!
//! ## 개요
//!
//! 독립적으로 빌드된 플러그인을 런타임에 발견/활성화/비활성화/교체한다:
//! - 라우터를 `/plugins/<name>` 아래에 마운트
//! - 권한 스키마 조각을 `plugins:<name>:` 네임스페이스로 병합
//! - 실패는 플러그인 단위로 격리
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PluginLoader                           │
//! │  ┌──────────────┐   ┌──────────────┐   ┌────────────────┐  │
//! │  │ PluginSource │   │ RegistryStore│   │  EventBus      │  │
//! │  │ (dir, memory)│   │ (json, atomic│   │  (broadcast)   │  │
//! │  └──────┬───────┘   └──────────────┘   └────────────────┘  │
//! │         │ import                                            │
//! │         ▼                                                   │
//! │  Plugin ──routes()──▶ RouteTable.stage ──┐                 │
//! │         ──permissions()─▶ SchemaTxn ─────┴─▶ commit        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! struct Quiz;
//!
//! #[async_trait]
//! impl Plugin for Quiz {
//!     fn routes(&self, _ctx: &PluginContext) -> Result<Routes> {
//!         Ok(Routes::new().open("/ping", get(|| async { "pong" })))
//!     }
//!
//!     fn permissions(&self) -> Vec<Arc<dyn FieldSource>> {
//!         vec![Arc::new(FieldSet::new().field(FieldSpec::int("timer", 60)))]
//!     }
//! }
//!
//! let source = MemorySource::new().with_plugin("quiz", |_: &Value| {
//!     Ok(Arc::new(Quiz) as Arc<dyn Plugin>)
//! });
//! ```

mod descriptor;
mod discovery;
mod events;
mod loader;
mod manifest;
mod store;
mod traits;

pub use descriptor::{is_valid_plugin_name, PluginDescriptor, PluginState};
pub use discovery::{Candidate, DirectorySource, ImportedPlugin, MemorySource, PluginSource};
pub use events::{EventBus, LoaderEvent};
pub use loader::{LoaderSummary, PluginLoader, RefreshOutcome, RefreshReport, SOURCE_MISSING};
pub use manifest::{PluginManifest, MANIFEST_FILE};
pub use store::{PluginMetadata, PluginRecord, PluginRegistryStore, STORE_FORMAT_VERSION};
pub use traits::{permission_prefix, Plugin, PluginContext, PluginFactory};
