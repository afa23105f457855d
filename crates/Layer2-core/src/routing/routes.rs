//! Routes - Open/Closed 라우트 선언
//!
//! axum 은 잘못된/중복 라우트에서 panic 하므로 선언을 먼저 기록하고
//! 검증을 통과한 뒤에만 `Router` 를 만든다.

use crate::boundary::{enforce, AccessBoundary, RouteGroup};
use aranes_foundation::{Error, Result};
use axum::middleware::from_fn_with_state;
use axum::routing::MethodRouter;
use axum::Router;
use std::collections::HashMap;

struct RouteEntry {
    group: RouteGroup,
    path: String,
    handler: MethodRouter,
}

/// 라우트 선언 묶음
#[derive(Default)]
pub struct Routes {
    entries: Vec<RouteEntry>,
}

impl std::fmt::Debug for Routes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.group, &e.path)))
            .finish()
    }
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 인증 없이 접근 가능한 라우트
    pub fn open(mut self, path: impl Into<String>, handler: MethodRouter) -> Self {
        self.entries.push(RouteEntry {
            group: RouteGroup::Open,
            path: path.into(),
            handler,
        });
        self
    }

    /// Bearer 토큰이 필요한 라우트
    pub fn closed(mut self, path: impl Into<String>, handler: MethodRouter) -> Self {
        self.entries.push(RouteEntry {
            group: RouteGroup::Closed,
            path: path.into(),
            handler,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 선언된 (그룹, 경로)
    pub fn declared(&self) -> Vec<(RouteGroup, String)> {
        self.entries
            .iter()
            .map(|e| (e.group, e.path.clone()))
            .collect()
    }

    /// 선언 검증: 경로 형식, 중복, 두 그룹 동시 선언
    pub fn validate(&self, owner: &str) -> Result<()> {
        let mut seen: HashMap<&str, RouteGroup> = HashMap::new();
        for entry in &self.entries {
            if !entry.path.starts_with('/') {
                return Err(Error::plugin_mount(
                    owner,
                    format!("route path must start with '/': {}", entry.path),
                ));
            }
            if let Some(previous) = seen.insert(&entry.path, entry.group) {
                let message = if previous == entry.group {
                    format!("route declared twice: {}", entry.path)
                } else {
                    format!("route declared in both Open and Closed groups: {}", entry.path)
                };
                return Err(Error::plugin_mount(owner, message));
            }
        }
        Ok(())
    }

    /// 검증 후 Router 생성. Closed 그룹에는 인증 미들웨어를 붙인다.
    pub(crate) fn into_router(self, owner: &str, boundary: &AccessBoundary) -> Result<Router> {
        self.validate(owner)?;

        let mut open = Router::new();
        let mut closed = Router::new();
        let mut has_closed = false;

        for entry in self.entries {
            match entry.group {
                RouteGroup::Open => open = open.route(&entry.path, entry.handler),
                RouteGroup::Closed => {
                    closed = closed.route(&entry.path, entry.handler);
                    has_closed = true;
                }
            }
        }

        // route_layer on an empty router panics
        if has_closed {
            closed = closed.route_layer(from_fn_with_state(boundary.clone(), enforce));
        }
        Ok(open.merge(closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};

    #[test]
    fn test_validate_ok() {
        let routes = Routes::new()
            .open("/ping", get(|| async { "pong" }))
            .closed("/start", post(|| async { "started" }));
        assert!(routes.validate("quiz").is_ok());
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn test_validate_both_groups() {
        let routes = Routes::new()
            .open("/ping", get(|| async { "pong" }))
            .closed("/ping", post(|| async { "pong" }));
        let err = routes.validate("quiz").unwrap_err();
        assert!(err.to_string().contains("both Open and Closed"));
    }

    #[test]
    fn test_validate_duplicate_and_relative() {
        let dup = Routes::new()
            .open("/a", get(|| async { "a" }))
            .open("/a", post(|| async { "a" }));
        assert!(matches!(dup.validate("quiz"), Err(Error::PluginMount { .. })));

        let relative = Routes::new().open("a", get(|| async { "a" }));
        assert!(matches!(relative.validate("quiz"), Err(Error::PluginMount { .. })));
    }
}
