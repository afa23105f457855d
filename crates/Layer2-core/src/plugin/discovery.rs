//! Plugin Sources - 플러그인 발견 및 import
//!
//! - `DirectorySource`: plugins 디렉토리의 하위 디렉토리(plugin.json) 스캔
//! - `MemorySource`: 코드로 등록한 플러그인 (임베딩, 테스트)

use super::descriptor::is_valid_plugin_name;
use super::manifest::{PluginManifest, MANIFEST_FILE};
use super::traits::{Plugin, PluginFactory};
use async_trait::async_trait;
use aranes_foundation::{Error, FieldSource, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Candidate / ImportedPlugin
// ============================================================================

/// 발견된 플러그인 후보 (코드 미로드)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub path: Option<PathBuf>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

/// import 결과
pub struct ImportedPlugin {
    pub plugin: Arc<dyn Plugin>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub settings: Value,
    /// 매니페스트에 선언된 권한 필드
    pub permissions: Vec<Arc<dyn FieldSource>>,
}

impl ImportedPlugin {
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            plugin,
            version: None,
            description: None,
            settings: Value::Null,
            permissions: Vec::new(),
        }
    }
}

/// 플러그인 소스
#[async_trait]
pub trait PluginSource: Send + Sync {
    /// 후보 목록 (코드를 로드하지 않는다)
    async fn scan(&self) -> Result<Vec<Candidate>>;

    /// 후보를 새로 import. 호출할 때마다 새 인스턴스.
    async fn import(&self, candidate: &Candidate) -> Result<ImportedPlugin>;
}

type FactoryMap = HashMap<String, Arc<dyn PluginFactory>>;

fn create_with(
    factory: &Arc<dyn PluginFactory>,
    name: &str,
    settings: &Value,
) -> Result<Arc<dyn Plugin>> {
    factory.create(settings).map_err(|e| match e {
        e @ Error::PluginImport { .. } => e,
        other => Error::plugin_import(name, other.to_string()),
    })
}

// ============================================================================
// DirectorySource
// ============================================================================

/// plugins 디렉토리 소스
pub struct DirectorySource {
    root: PathBuf,
    factories: RwLock<FactoryMap>,
}

impl std::fmt::Debug for DirectorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySource")
            .field("root", &self.root)
            .field("factories", &self.factories.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            factories: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// entry 이름으로 factory 등록
    pub fn with_factory(self, entry: impl Into<String>, factory: impl PluginFactory + 'static) -> Self {
        self.register_factory(entry, factory);
        self
    }

    pub fn register_factory(&self, entry: impl Into<String>, factory: impl PluginFactory + 'static) {
        self.factories.write().insert(entry.into(), Arc::new(factory));
    }

    fn is_hidden(name: &str) -> bool {
        name.starts_with('.') || name.starts_with("__")
    }

    /// 매니페스트의 name (읽을 수 있으면), 아니면 디렉토리 이름
    async fn candidate_name(dir_name: &str, path: &Path) -> String {
        match tokio::fs::read_to_string(path.join(MANIFEST_FILE)).await {
            Ok(content) => serde_json::from_str::<Value>(&content)
                .ok()
                .and_then(|v| v.get("name").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| dir_name.to_string()),
            Err(_) => dir_name.to_string(),
        }
    }
}

#[async_trait]
impl PluginSource for DirectorySource {
    async fn scan(&self) -> Result<Vec<Candidate>> {
        if !self.root.exists() {
            warn!("[PluginSource] plugins directory not found: {:?}", self.root);
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_hidden(&dir_name) {
                continue;
            }
            dirs.push((dir_name, path));
        }
        dirs.sort();

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (dir_name, path) in dirs {
            let name = Self::candidate_name(&dir_name, &path).await;
            if !is_valid_plugin_name(&name) {
                warn!("[PluginSource] skipping {:?}: invalid plugin name '{}'", path, name);
                continue;
            }
            if !seen.insert(name.clone()) {
                warn!("[PluginSource] skipping {:?}: duplicate plugin name '{}'", path, name);
                continue;
            }
            debug!("[PluginSource] candidate {} at {:?}", name, path);
            candidates.push(Candidate::new(name, Some(path)));
        }

        info!("[PluginSource] scanned {} candidates in {:?}", candidates.len(), self.root);
        Ok(candidates)
    }

    async fn import(&self, candidate: &Candidate) -> Result<ImportedPlugin> {
        let dir = candidate
            .path
            .as_deref()
            .ok_or_else(|| Error::plugin_import(&candidate.name, "candidate has no directory"))?;

        let manifest = PluginManifest::load(&candidate.name, dir).await?;
        let factory = self
            .factories
            .read()
            .get(&manifest.entry)
            .cloned()
            .ok_or_else(|| {
                Error::plugin_import(
                    &candidate.name,
                    format!("unknown entry '{}'", manifest.entry),
                )
            })?;

        let plugin = create_with(&factory, &candidate.name, &manifest.settings)?;
        let permissions = manifest
            .permissions
            .into_iter()
            .map(|set| Arc::new(set) as Arc<dyn FieldSource>)
            .collect();

        Ok(ImportedPlugin {
            plugin,
            version: Some(manifest.version),
            description: (!manifest.description.is_empty()).then_some(manifest.description),
            settings: manifest.settings,
            permissions,
        })
    }
}

// ============================================================================
// MemorySource
// ============================================================================

/// 코드로 등록하는 플러그인 소스
#[derive(Default)]
pub struct MemorySource {
    entries: RwLock<BTreeMap<String, Arc<dyn PluginFactory>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(self, name: impl Into<String>, factory: impl PluginFactory + 'static) -> Self {
        self.insert(name, factory);
        self
    }

    /// 후보 추가/교체. 다음 refresh 에서 새 factory 로 import 된다.
    pub fn insert(&self, name: impl Into<String>, factory: impl PluginFactory + 'static) {
        self.entries.write().insert(name.into(), Arc::new(factory));
    }

    /// 후보 제거
    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }
}

#[async_trait]
impl PluginSource for MemorySource {
    async fn scan(&self) -> Result<Vec<Candidate>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|name| {
                let valid = is_valid_plugin_name(name);
                if !valid {
                    warn!("[PluginSource] skipping invalid plugin name '{}'", name);
                }
                valid
            })
            .map(|name| Candidate::new(name.clone(), None))
            .collect())
    }

    async fn import(&self, candidate: &Candidate) -> Result<ImportedPlugin> {
        let factory = self
            .entries
            .read()
            .get(&candidate.name)
            .cloned()
            .ok_or_else(|| Error::plugin_import(&candidate.name, "plugin source missing"))?;

        let plugin = create_with(&factory, &candidate.name, &Value::Null)?;
        Ok(ImportedPlugin::new(plugin))
    }
}
