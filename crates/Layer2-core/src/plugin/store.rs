//! Plugin Registry Store - 플러그인 상태 영속화
//!
//! `plugins_registry.json` 에 알려진 플러그인과 활성화 여부를 기록한다.
//! 저장은 `<file>.tmp` 작성 → fsync → rename 으로 원자적이다.

use super::descriptor::{PluginDescriptor, PluginState};
use aranes_foundation::{write_atomic, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 파일 포맷 버전
pub const STORE_FORMAT_VERSION: u32 = 1;

// ============================================================================
// 파일 구조
// ============================================================================

/// 플러그인별 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    #[serde(default)]
    pub path: Option<PathBuf>,

    pub state: PluginState,

    #[serde(default)]
    pub last_error: Option<String>,

    #[serde(default)]
    pub mount_generation: u64,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub version: Option<String>,
}

/// 플러그인 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// 희망 상태 (재시작/refresh 시 활성화 여부)
    pub enabled: bool,

    pub metadata: PluginMetadata,
}

impl From<&PluginDescriptor> for PluginRecord {
    fn from(d: &PluginDescriptor) -> Self {
        Self {
            enabled: d.enabled,
            metadata: PluginMetadata {
                path: d.path.clone(),
                state: d.state,
                last_error: d.last_error.clone(),
                mount_generation: d.mount_generation,
                updated_at: d.updated_at,
                version: d.version.clone(),
            },
        }
    }
}

impl PluginRecord {
    /// 재시작 시 디스크립터 복원 (아직 아무것도 마운트되지 않음)
    pub fn to_descriptor(&self, name: &str) -> PluginDescriptor {
        let state = match self.metadata.state {
            // live state does not survive a restart
            PluginState::Enabled | PluginState::Loaded => PluginState::Discovered,
            other => other,
        };
        PluginDescriptor {
            name: name.to_string(),
            path: self.metadata.path.clone(),
            state,
            last_error: self.metadata.last_error.clone(),
            mount_generation: self.metadata.mount_generation,
            updated_at: self.metadata.updated_at,
            enabled: self.enabled,
            mounted: false,
            version: self.metadata.version.clone(),
            description: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    #[serde(default)]
    plugins: BTreeMap<String, PluginRecord>,
}

// ============================================================================
// PluginRegistryStore
// ============================================================================

/// 플러그인 상태 저장소
#[derive(Debug, Clone)]
pub struct PluginRegistryStore {
    path: PathBuf,
}

impl PluginRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 상태 로드. 파일이 없으면 빈 상태, 손상되었으면 `StoreCorrupt`.
    pub async fn load(&self) -> Result<BTreeMap<String, PluginRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[PluginStore] no state file at {:?}", self.path);
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(Error::store_io(&self.path, e)),
        };

        let file: RegistryFile =
            serde_json::from_str(&content).map_err(|e| Error::store_corrupt(&self.path, e))?;
        if file.version != STORE_FORMAT_VERSION {
            return Err(Error::store_corrupt(
                &self.path,
                format!("unsupported format version {}", file.version),
            ));
        }

        info!(
            "[PluginStore] loaded {} plugin records from {:?}",
            file.plugins.len(),
            self.path
        );
        Ok(file.plugins)
    }

    /// 원자적 저장
    pub async fn save(&self, plugins: &BTreeMap<String, PluginRecord>) -> Result<()> {
        #[derive(Serialize)]
        struct RegistryFileRef<'a> {
            version: u32,
            plugins: &'a BTreeMap<String, PluginRecord>,
        }

        let content = serde_json::to_vec_pretty(&RegistryFileRef {
            version: STORE_FORMAT_VERSION,
            plugins,
        })?;
        write_atomic(&self.path, &content).await?;
        debug!("[PluginStore] saved {} plugin records", plugins.len());
        Ok(())
    }
}
