//! Boundary - 인증 계약과 Open/Closed 접근 경계
//!
//! - `auth`: AuthService / IdentityStore 계약과 메모리 참조 구현
//! - `access`: RouteGroup, AccessBoundary, Closed 라우트 미들웨어

mod access;
mod auth;

pub use access::{bearer_token, enforce, AccessBoundary, RouteGroup};
pub use auth::{
    AuthService, IdentityStore, MemoryIdentityStore, Principal, TokenAuthService,
};
