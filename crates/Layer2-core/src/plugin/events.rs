//! Loader Events - 로더 상태 변경 알림

use super::descriptor::PluginState;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 128;

/// 로더 이벤트
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoaderEvent {
    Enabled { name: String, generation: u64 },
    Disabled { name: String },
    Failed { name: String, error: String },
    Forgotten { name: String },
    Refreshed { outcomes: BTreeMap<String, PluginState> },
}

impl LoaderEvent {
    /// 관련 플러그인 이름 (Refreshed 는 None)
    pub fn plugin(&self) -> Option<&str> {
        match self {
            LoaderEvent::Enabled { name, .. }
            | LoaderEvent::Disabled { name }
            | LoaderEvent::Failed { name, .. }
            | LoaderEvent::Forgotten { name } => Some(name),
            LoaderEvent::Refreshed { .. } => None,
        }
    }
}

/// 이벤트 버스 (broadcast)
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LoaderEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.sender.subscribe()
    }

    /// 구독자가 없어도 무시
    pub fn emit(&self, event: LoaderEvent) {
        let _ = self.sender.send(event);
    }
}
