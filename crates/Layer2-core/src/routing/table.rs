//! Route Table - 현재 활성 라우터
//!
//! 코어 라우트 + 플러그인별 라우터(`/plugins/<name>`)를 합성한 `Router` 를
//! `ArcSwap` 으로 발행한다. 변경은 stage(실패 가능) → publish(포인터 교체) 두 단계.
//! 진행 중인 요청은 시작할 때 잡은 라우터 세대를 끝까지 사용한다.

use super::routes::Routes;
use crate::api::error_response;
use crate::boundary::{AccessBoundary, RouteGroup};
use aranes_foundation::{Error, Result};
use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Request, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// 플러그인 라우트 마운트 위치
pub const PLUGIN_ROUTE_PREFIX: &str = "/plugins";

/// 코어 라우트 owner
pub const CORE_ROUTE_OWNER: &str = "core";

/// 플러그인 마운트 경로 (`/plugins/<name>`)
pub fn mount_path(name: &str) -> String {
    format!("{}/{}", PLUGIN_ROUTE_PREFIX, name)
}

/// 활성 라우트 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub path: String,
    pub group: RouteGroup,
    pub owner: String,
}

#[derive(Clone)]
struct Mounted {
    router: Router,
    routes: Vec<RouteInfo>,
}

#[derive(Clone)]
struct Layout {
    core: Option<Mounted>,
    plugins: BTreeMap<String, Mounted>,
}

/// 발행 대기 중인 라우트 테이블
pub struct StagedRoutes {
    layout: Layout,
    router: Router,
    changed: String,
}

// ============================================================================
// RouteTable
// ============================================================================

/// 라이브 라우트 테이블
pub struct RouteTable {
    boundary: AccessBoundary,
    layout: Mutex<Layout>,
    live: Arc<ArcSwap<Router>>,
    generation: Mutex<u64>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layout = self.layout.lock();
        f.debug_struct("RouteTable")
            .field("plugins", &layout.plugins.keys().collect::<Vec<_>>())
            .field("generation", &*self.generation.lock())
            .finish()
    }
}

impl RouteTable {
    pub fn new(boundary: AccessBoundary) -> Self {
        let layout = Layout {
            core: None,
            plugins: BTreeMap::new(),
        };
        let router = finish(Router::new());
        Self {
            boundary,
            layout: Mutex::new(layout),
            live: Arc::new(ArcSwap::from_pointee(router)),
            generation: Mutex::new(0),
        }
    }

    pub fn boundary(&self) -> &AccessBoundary {
        &self.boundary
    }

    /// 코어 라우트 설치 (즉시 발행)
    pub fn install_core(&self, routes: Routes) -> Result<()> {
        for (_, path) in routes.declared() {
            if path == PLUGIN_ROUTE_PREFIX || path.starts_with(&format!("{}/", PLUGIN_ROUTE_PREFIX)) {
                return Err(Error::plugin_mount(
                    CORE_ROUTE_OWNER,
                    format!("core routes cannot live under {}: {}", PLUGIN_ROUTE_PREFIX, path),
                ));
            }
        }

        let mounted = self.build(CORE_ROUTE_OWNER, "", routes)?;
        let mut layout = self.layout.lock().clone();
        layout.core = Some(mounted);
        let staged = self.stage(layout, CORE_ROUTE_OWNER.to_string())?;
        self.publish(staged);
        Ok(())
    }

    /// 플러그인 라우터 교체/추가 준비. 라이브 테이블은 건드리지 않는다.
    pub fn stage_mount(&self, name: &str, routes: Routes) -> Result<StagedRoutes> {
        let mounted = self.build(name, &mount_path(name), routes)?;
        let mut layout = self.layout.lock().clone();
        layout.plugins.insert(name.to_string(), mounted);
        self.stage(layout, name.to_string())
    }

    /// 플러그인 라우터 제거 준비
    pub fn stage_unmount(&self, name: &str) -> Result<StagedRoutes> {
        let mut layout = self.layout.lock().clone();
        layout.plugins.remove(name);
        self.stage(layout, name.to_string())
    }

    /// 준비된 테이블 발행 (한 번의 포인터 교체)
    pub fn publish(&self, staged: StagedRoutes) {
        let mut layout = self.layout.lock();
        *layout = staged.layout;
        self.live.store(Arc::new(staged.router));

        let mut generation = self.generation.lock();
        *generation += 1;
        info!(
            "[RouteTable] generation {} published ({} changed, {} plugins mounted)",
            *generation,
            staged.changed,
            layout.plugins.len()
        );
    }

    pub fn is_mounted(&self, name: &str) -> bool {
        self.layout.lock().plugins.contains_key(name)
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// 모든 활성 라우트 (그룹, owner 포함)
    pub fn describe(&self) -> Vec<RouteInfo> {
        let layout = self.layout.lock();
        layout
            .core
            .iter()
            .chain(layout.plugins.values())
            .flat_map(|m| m.routes.iter().cloned())
            .collect()
    }

    /// 리스너와 in-process 전송이 공유하는 서비스
    pub fn service(&self) -> LiveService {
        LiveService {
            live: Arc::clone(&self.live),
        }
    }

    fn build(&self, owner: &str, base: &str, routes: Routes) -> Result<Mounted> {
        let infos = routes
            .declared()
            .into_iter()
            .map(|(group, path)| RouteInfo {
                path: join_path(base, &path),
                group,
                owner: owner.to_string(),
            })
            .collect();

        let boundary = &self.boundary;
        let router = std::panic::catch_unwind(AssertUnwindSafe(|| {
            routes.into_router(owner, boundary)
        }))
        .map_err(|panic| Error::plugin_mount(owner, panic_message(&panic)))??;

        Ok(Mounted {
            router,
            routes: infos,
        })
    }

    fn stage(&self, layout: Layout, changed: String) -> Result<StagedRoutes> {
        let router = std::panic::catch_unwind(AssertUnwindSafe(|| compose(&layout)))
            .map_err(|panic| Error::plugin_mount(&changed, panic_message(&panic)))?;
        debug!("[RouteTable] staged routes for {}", changed);
        Ok(StagedRoutes {
            layout,
            router,
            changed,
        })
    }
}

fn join_path(base: &str, path: &str) -> String {
    if base.is_empty() {
        path.to_string()
    } else if path == "/" {
        base.to_string()
    } else {
        format!("{}{}", base, path)
    }
}

fn compose(layout: &Layout) -> Router {
    let mut router = layout
        .core
        .as_ref()
        .map(|core| core.router.clone())
        .unwrap_or_default();

    for (name, mounted) in &layout.plugins {
        // nesting a router without routes is a no-op
        if mounted.routes.is_empty() {
            continue;
        }
        router = router.nest(&mount_path(name), mounted.router.clone());
    }

    finish(router)
}

/// 공통 미들웨어 체인: trace → panic 격리 → (라우트별 접근 경계) → 핸들러
fn finish(router: Router) -> Router {
    router
        .fallback(route_not_found)
        .layer(CatchPanicLayer::custom(dispatch_panic))
        .layer(TraceLayer::new_for_http())
}

async fn route_not_found(uri: Uri) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "NotFound",
        &format!("no route for {}", uri.path()),
    )
}

fn dispatch_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(&panic);
    error!("[RouteTable] handler panicked: {}", message);
    let err = Error::InternalDispatch(message);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.code(), &err.to_string())
}

/// panic payload 에서 메시지 추출
pub fn panic_message(panic: &Box<dyn Any + Send + 'static>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

// ============================================================================
// LiveService
// ============================================================================

/// 요청마다 현재 라우터 세대를 잡아 처리하는 tower 서비스
#[derive(Clone)]
pub struct LiveService {
    live: Arc<ArcSwap<Router>>,
}

impl LiveService {
    /// 현재 라우터 세대
    pub fn current(&self) -> Arc<Router> {
        self.live.load_full()
    }

    /// `axum::serve` 에 넘길 수 있는 Router
    pub fn into_router(self) -> Router {
        Router::new().fallback_service(self)
    }
}

impl Service<Request<Body>> for LiveService {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, std::result::Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let router = self.live.load_full();
        Box::pin(async move { Router::clone(&router).oneshot(request).await })
    }
}
