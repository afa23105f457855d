//! 권한 스키마 스냅샷
//!
//! 불변, 키 순서 고정(BTreeMap), 버전 태그가 붙은 전체 필드 집합.

use super::types::{owner_for, FieldType};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// 스키마에 등록된 필드 하나
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionField {
    /// 정규화된 전체 키 (예: `plugins:quiz:timer`)
    pub key: String,

    /// 원래 필드 이름
    pub name: String,

    /// 원래 클래스 이름 (소문자)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    pub default: Value,

    /// 정규화된 prefix 또는 `core`
    pub owner: String,
}

/// 권한 스키마 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PermissionSchema {
    version: u64,
    fields: BTreeMap<String, PermissionField>,
}

impl PermissionSchema {
    pub(crate) fn from_parts(version: u64, fields: BTreeMap<String, PermissionField>) -> Self {
        Self { version, fields }
    }

    pub(crate) fn field_map(&self) -> &BTreeMap<String, PermissionField> {
        &self.fields
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PermissionField> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// 키 순서대로 순회
    pub fn fields(&self) -> impl Iterator<Item = &PermissionField> {
        self.fields.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// 특정 owner의 필드
    pub fn owned_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a PermissionField> {
        self.fields.values().filter(move |f| f.owner == owner)
    }

    /// 등록된 owner 목록
    pub fn owners(&self) -> Vec<String> {
        self.fields
            .values()
            .map(|f| f.owner.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    // ========================================================================
    // 값 처리
    // ========================================================================

    /// 키 -> 기본값
    pub fn defaults(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(key, field)| (key.clone(), field.default.clone()))
            .collect()
    }

    /// 값 맵 검증 + 누락된 키는 기본값으로 채움
    pub fn instance(&self, values: &Map<String, Value>) -> Result<Map<String, Value>> {
        for (key, value) in values {
            let field = self
                .fields
                .get(key)
                .ok_or_else(|| Error::UnknownFieldKey(key.clone()))?;
            if !field.field_type.accepts(value) {
                return Err(Error::Validation(format!(
                    "{} expects {}, got {}",
                    key, field.field_type, value
                )));
            }
        }

        let mut result = self.defaults();
        for (key, value) in values {
            result.insert(key.clone(), value.clone());
        }
        Ok(result)
    }

    /// 네임스페이스를 떼고 원래 필드 이름으로 되돌림
    ///
    /// `prefix` 의 owner 와 `class_name` 이 일치하는 필드만 대상.
    /// 값 맵에 없는 필드는 기본값을 사용한다.
    pub fn unmap(
        &self,
        values: &Map<String, Value>,
        prefix: &str,
        class_name: Option<&str>,
    ) -> Map<String, Value> {
        let owner = owner_for(prefix);
        let class = class_name.map(str::to_lowercase);

        self.owned_by(&owner)
            .filter(|f| f.class == class)
            .map(|f| {
                let value = values.get(&f.key).unwrap_or(&f.default).clone();
                (f.name.clone(), value)
            })
            .collect()
    }

    /// 관리 API 용 JSON Schema 객체
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(key, field)| {
                let mut prop = Map::new();
                if let Some(ty) = field.field_type.json_type() {
                    prop.insert("type".to_string(), json!(ty));
                }
                prop.insert("default".to_string(), field.default.clone());
                prop.insert("x-owner".to_string(), json!(field.owner));
                (key.clone(), Value::Object(prop))
            })
            .collect();

        json!({
            "title": "PermissionModel",
            "type": "object",
            "properties": properties,
            "additionalProperties": false,
        })
    }
}
