//! Routing - 라우트 선언과 라이브 라우트 테이블
//!
//! - `routes`: Open/Closed 라우트 선언 (Routes)
//! - `table`: 합성 라우터 발행 (RouteTable, LiveService)

mod routes;
mod table;

pub use routes::Routes;
pub use table::{
    mount_path, panic_message, LiveService, RouteInfo, RouteTable, StagedRoutes,
    CORE_ROUTE_OWNER, PLUGIN_ROUTE_PREFIX,
};
