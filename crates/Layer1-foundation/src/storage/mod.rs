//! Storage module for AraNES
//!
//! - `atomic`: 임시 파일 + rename 방식의 원자적 쓰기
//! - `json`: JSON - 범용 파일 저장/로드

mod atomic;
mod json;

pub use atomic::{temp_path_for, write_atomic, write_atomic_sync};

// JSON Storage (범용)
pub use json::JsonStore;
