//! aranes-core: Core Runtime for AraNES
//!
//! Layer2 - 플러그인 호스트 레이어
//!
//! # 주요 모듈
//!
//! - `kernel`: 프로세스 단위 코어 상태 (Kernel, KernelBuilder)
//! - `plugin`: 플러그인 발견/활성화/비활성화/hot reload
//! - `routing`: Open/Closed 라우트 선언과 라이브 라우트 테이블
//! - `boundary`: Bearer 토큰 접근 경계
//! - `transport`: 리스너를 거치지 않는 in-process 호출
//! - `api`: 코어 관리 API (/health, /auth/token, /api/...)
//!
//! # 사용 예시
//!
//! ```ignore
//! use aranes_core::{Kernel, MemorySource, Plugin};
//!
//! let source = MemorySource::new().with_plugin("quiz", |_: &Value| {
//!     Ok(Arc::new(Quiz) as Arc<dyn Plugin>)
//! });
//!
//! let kernel = Kernel::builder(CoreConfig::new())
//!     .with_source(Arc::new(source))
//!     .build()?;
//! kernel.start().await?;
//!
//! // 플러그인 활성화 후 in-process 호출
//! kernel.loader().enable("quiz").await?;
//! let response = kernel.transport().get("/plugins/quiz/ping").await;
//! ```

pub mod api;
pub mod boundary;
pub mod kernel;
pub mod plugin;
pub mod routing;
pub mod transport;

// Re-exports: Kernel
pub use kernel::{Kernel, KernelBuilder};

// Re-exports: Plugin
pub use plugin::{
    permission_prefix, Candidate, DirectorySource, ImportedPlugin, LoaderEvent, LoaderSummary,
    MemorySource, Plugin, PluginContext, PluginDescriptor, PluginFactory, PluginLoader,
    PluginManifest, PluginRecord, PluginRegistryStore, PluginSource, PluginState, RefreshOutcome,
    RefreshReport,
};

// Re-exports: Routing / Boundary
pub use boundary::{
    AccessBoundary, AuthService, IdentityStore, MemoryIdentityStore, Principal, RouteGroup,
    TokenAuthService,
};
pub use routing::{LiveService, RouteInfo, RouteTable, Routes};

// Re-exports: Transport
pub use transport::{InProcessTransport, InternalRequest, InternalResponse};

// Re-exports: API
pub use api::{core_routes, ApiError, ApiState};
