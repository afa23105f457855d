//! Config - 통합 설정 관리
//!
//! - `core.rs` - CoreConfig (플러그인 경로, 토큰 TTL, 외부 협력자 설정)

mod core;

pub use self::core::{CoreConfig, CORE_CONFIG_FILE, DEFAULT_SECRET_KEY, PLUGIN_STATE_FILE};
