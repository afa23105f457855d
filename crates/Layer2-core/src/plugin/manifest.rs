//! Plugin Manifest - plugin.json

use aranes_foundation::{Error, FieldSet, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// 매니페스트 파일명
pub const MANIFEST_FILE: &str = "plugin.json";

/// plugin.json 파일 구조
///
/// ```json
/// {
///   "entry": "quiz",
///   "version": "1.2.0",
///   "permissions": [{"fields": [{"name": "timer", "type": "int", "default": 60}]}],
///   "settings": {"questions": 10}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// 플러그인 이름 (없으면 디렉토리 이름)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// 등록된 PluginFactory 이름
    pub entry: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    /// 선언적 권한 필드
    #[serde(default)]
    pub permissions: Vec<FieldSet>,

    /// 플러그인에 전달되는 설정
    #[serde(default)]
    pub settings: Value,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl PluginManifest {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            name: None,
            entry: entry.into(),
            version: default_version(),
            description: String::new(),
            permissions: Vec::new(),
            settings: Value::Null,
        }
    }

    /// 매니페스트 파일 로드. 모든 실패는 `PluginImport` 로 보고한다.
    pub async fn load(plugin: &str, dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::plugin_import(plugin, format!("cannot read {}: {}", path.display(), e))
        })?;
        let manifest: PluginManifest = serde_json::from_str(&content).map_err(|e| {
            Error::plugin_import(plugin, format!("invalid {}: {}", path.display(), e))
        })?;
        if manifest.entry.trim().is_empty() {
            return Err(Error::plugin_import(plugin, "manifest entry is empty"));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_manifest() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(MANIFEST_FILE),
            r#"{
                "entry": "quiz",
                "version": "1.2.0",
                "permissions": [{"fields": [{"name": "timer", "type": "int", "default": 60}]}],
                "settings": {"questions": 10}
            }"#,
        )
        .unwrap();

        let manifest = PluginManifest::load("quiz", temp.path()).await.unwrap();
        assert_eq!(manifest.entry, "quiz");
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(manifest.permissions[0].fields[0].name, "timer");
        assert_eq!(manifest.settings["questions"], 10);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_import_error() {
        let temp = TempDir::new().unwrap();
        let err = PluginManifest::load("quiz", temp.path()).await.unwrap_err();
        assert!(matches!(err, Error::PluginImport { .. }));
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_import_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(MANIFEST_FILE), "{ \"entry\": ").unwrap();
        let err = PluginManifest::load("quiz", temp.path()).await.unwrap_err();
        assert!(matches!(err, Error::PluginImport { .. }));
    }
}
