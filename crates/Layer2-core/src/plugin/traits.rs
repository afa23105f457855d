//! Plugin traits - 핵심 플러그인 인터페이스

use crate::routing::Routes;
use crate::transport::InProcessTransport;
use async_trait::async_trait;
use aranes_foundation::{FieldSource, PermissionRegistry, PermissionSchema, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// PluginContext - 플러그인에 제공되는 컨텍스트
// ============================================================================

/// 플러그인 컨텍스트 - 플러그인이 코어와 상호작용하는 인터페이스
#[derive(Clone)]
pub struct PluginContext {
    name: String,
    path: Option<PathBuf>,
    settings: Value,
    transport: InProcessTransport,
    permissions: Arc<PermissionRegistry>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    pub fn new(
        name: impl Into<String>,
        path: Option<PathBuf>,
        settings: Value,
        transport: InProcessTransport,
        permissions: Arc<PermissionRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            path,
            settings,
            transport,
            permissions,
        }
    }

    /// 플러그인 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 플러그인 디렉토리 (메모리 소스면 None)
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// plugin.json 의 settings
    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// 설정 값 조회
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// 다른 컴포넌트 API 호출용
    pub fn transport(&self) -> &InProcessTransport {
        &self.transport
    }

    /// 현재 권한 스키마
    pub fn permissions(&self) -> Arc<PermissionSchema> {
        self.permissions.snapshot()
    }

    /// 권한 필드 prefix (`plugins/<name>`)
    pub fn permission_prefix(&self) -> String {
        permission_prefix(&self.name)
    }
}

/// 플러그인 권한 prefix
pub fn permission_prefix(name: &str) -> String {
    format!("plugins/{}", name)
}

// ============================================================================
// Plugin - 메인 플러그인 트레이트
// ============================================================================

/// 플러그인 트레이트
///
/// 라우터는 `/plugins/<name>` 아래에 마운트되고, 권한 필드는
/// `plugins:<name>:` 네임스페이스로 병합된다.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 라우트 선언
    fn routes(&self, ctx: &PluginContext) -> Result<Routes>;

    /// 권한 스키마 조각
    fn permissions(&self) -> Vec<Arc<dyn FieldSource>> {
        Vec::new()
    }

    /// 마운트 직전 호출. 실패하면 마운트되지 않는다.
    async fn on_enable(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// 언마운트(또는 새 버전으로 교체) 후 호출
    async fn on_disable(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// PluginFactory - entry 이름으로 플러그인 생성
// ============================================================================

/// 플러그인 생성기. import 할 때마다 새 인스턴스를 만든다.
pub trait PluginFactory: Send + Sync {
    fn create(&self, settings: &Value) -> Result<Arc<dyn Plugin>>;
}

impl<F> PluginFactory for F
where
    F: Fn(&Value) -> Result<Arc<dyn Plugin>> + Send + Sync,
{
    fn create(&self, settings: &Value) -> Result<Arc<dyn Plugin>> {
        self(settings)
    }
}
