//! Kernel - 프로세스 단위 코어 상태
//!
//! 컴포넌트마다 하나의 인스턴스를 소유하고 코어 라우트를 설치한다.
//!
//! ## 사용 예시
//! ```ignore
//! let kernel = Kernel::builder(CoreConfig::load(".")?)
//!     .with_source(Arc::new(DirectorySource::new("services").with_factory("quiz", quiz)))
//!     .build()?;
//!
//! kernel.start().await?;
//! axum::serve(listener, kernel.router()).await?;
//! ```

use crate::api::{core_routes, ApiState};
use crate::boundary::{AccessBoundary, AuthService, IdentityStore, MemoryIdentityStore, TokenAuthService};
use crate::plugin::{DirectorySource, LoaderSummary, PluginLoader, PluginRegistryStore, PluginSource};
use crate::routing::{LiveService, RouteTable};
use crate::transport::InProcessTransport;
use aranes_foundation::{CoreConfig, FieldSource, PermissionRegistry, Result};
use axum::Router;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Kernel
// ============================================================================

/// 코어 커널
pub struct Kernel {
    config: CoreConfig,
    permissions: Arc<PermissionRegistry>,
    auth: Arc<dyn AuthService>,
    routes: Arc<RouteTable>,
    transport: InProcessTransport,
    loader: Arc<PluginLoader>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("plugins_dir", &self.config.plugins_dir)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    pub fn builder(config: CoreConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    /// 저장된 상태 로드 후 플러그인 활성화
    pub async fn start(&self) -> Result<LoaderSummary> {
        let summary = self.loader.start().await?;
        info!(
            "[Kernel] started: {} plugins ({} enabled, {} failed)",
            summary.total, summary.enabled, summary.failed
        );
        Ok(summary)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn permissions(&self) -> &Arc<PermissionRegistry> {
        &self.permissions
    }

    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.auth
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn transport(&self) -> &InProcessTransport {
        &self.transport
    }

    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    /// 라이브 서비스 (in-process 전송과 동일)
    pub fn service(&self) -> LiveService {
        self.routes.service()
    }

    /// 리스너용 Router
    pub fn router(&self) -> Router {
        self.service().into_router()
    }
}

// ============================================================================
// KernelBuilder
// ============================================================================

/// Kernel 빌더
pub struct KernelBuilder {
    config: CoreConfig,
    auth: Option<Arc<dyn AuthService>>,
    identities: Option<Arc<dyn IdentityStore>>,
    source: Option<Arc<dyn PluginSource>>,
    core_fields: Vec<Arc<dyn FieldSource>>,
}

impl KernelBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            auth: None,
            identities: None,
            source: None,
            core_fields: Vec::new(),
        }
    }

    /// Auth Service 설정 (기본: TokenAuthService)
    pub fn with_auth(mut self, auth: Arc<dyn AuthService>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// 기본 TokenAuthService 가 사용할 사용자 저장소
    pub fn with_identities(mut self, identities: Arc<dyn IdentityStore>) -> Self {
        self.identities = Some(identities);
        self
    }

    /// 플러그인 소스 (기본: plugins_dir 의 DirectorySource)
    pub fn with_source(mut self, source: Arc<dyn PluginSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 코어 소유 권한 필드
    pub fn with_core_fields(mut self, fields: Arc<dyn FieldSource>) -> Self {
        self.core_fields.push(fields);
        self
    }

    /// 빌드
    pub fn build(self) -> Result<Kernel> {
        self.config.validate()?;

        let auth = match self.auth {
            Some(auth) => auth,
            None => {
                let identities = self
                    .identities
                    .unwrap_or_else(|| Arc::new(MemoryIdentityStore::new()));
                Arc::new(TokenAuthService::new(identities, self.config.token_ttl()))
            }
        };

        let permissions = Arc::new(PermissionRegistry::new());
        if !self.core_fields.is_empty() {
            permissions.register_many(self.core_fields.iter().map(|f| (f.as_ref(), "")))?;
        }

        let routes = Arc::new(RouteTable::new(AccessBoundary::new(Arc::clone(&auth))));
        let transport = InProcessTransport::new(routes.service())
            .with_timeout(self.config.dispatch_timeout())
            .with_body_limit(self.config.body_limit_bytes);

        let source = self
            .source
            .unwrap_or_else(|| Arc::new(DirectorySource::new(&self.config.plugins_dir)));
        let store = PluginRegistryStore::new(self.config.state_file_path());

        let loader = Arc::new(PluginLoader::new(
            source,
            store,
            Arc::clone(&permissions),
            Arc::clone(&routes),
            transport.clone(),
        ));

        let state = ApiState::new(&loader, Arc::clone(&permissions), Arc::clone(&auth));
        routes.install_core(core_routes(state))?;

        info!(
            "[Kernel] built (plugins dir {:?}, state file {:?})",
            self.config.plugins_dir,
            self.config.state_file_path()
        );

        Ok(Kernel {
            config: self.config,
            permissions,
            auth,
            routes,
            transport,
            loader,
        })
    }
}
