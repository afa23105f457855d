//! 권한 필드 타입 정의
//!
//! 각 플러그인이 `FieldSource`로 자신의 필드를 선언하고,
//! foundation은 키 조합과 타입 검증만 담당한다.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 코어 소유 필드의 owner 이름 (prefix 없음)
pub const CORE_OWNER: &str = "core";

// ============================================================================
// FieldType
// ============================================================================

/// 필드 값 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "number")]
    Float,
    #[serde(alias = "string")]
    Str,
    #[serde(alias = "array")]
    List,
    #[serde(alias = "object")]
    Json,
}

impl FieldType {
    /// 값이 이 타입에 맞는지 확인 (null은 항상 허용)
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            FieldType::Bool => value.is_boolean(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Str => value.is_string(),
            FieldType::List => value.is_array(),
            FieldType::Json => true,
        }
    }

    /// JSON Schema 타입 이름
    pub fn json_type(&self) -> Option<&'static str> {
        match self {
            FieldType::Bool => Some("boolean"),
            FieldType::Int => Some("integer"),
            FieldType::Float => Some("number"),
            FieldType::Str => Some("string"),
            FieldType::List => Some("array"),
            FieldType::Json => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Str => "str",
            FieldType::List => "list",
            FieldType::Json => "json",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FieldSpec
// ============================================================================

/// 필드 선언 (name, type, default)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub default: Value,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: default.into(),
        }
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, FieldType::Bool, default)
    }

    pub fn int(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, FieldType::Int, default)
    }

    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, FieldType::Float, default)
    }

    pub fn str(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, FieldType::Str, default.into())
    }

    pub fn list(name: impl Into<String>, default: Vec<Value>) -> Self {
        Self::new(name, FieldType::List, default)
    }
}

// ============================================================================
// FieldSource
// ============================================================================

/// 권한 스키마 조각을 제공하는 타입
///
/// 클래스 이름이 있으면 키는 `prefix:class:field`, 없으면 `prefix:field`.
pub trait FieldSource: Send + Sync {
    fn class_name(&self) -> Option<&str> {
        None
    }

    /// 선언 순서대로의 필드 목록
    fn fields(&self) -> Vec<FieldSpec>;
}

/// 데이터로 선언된 필드 묶음 (plugin.json 의 permissions 항목)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }
}

impl FieldSource for FieldSet {
    fn class_name(&self) -> Option<&str> {
        self.class.as_deref()
    }

    fn fields(&self) -> Vec<FieldSpec> {
        self.fields.clone()
    }
}

// ============================================================================
// Key 조합
// ============================================================================

/// prefix 정규화: `\` 와 `/` 를 `:` 로, 양끝 `:` 제거, 소문자
pub fn normalize_prefix(prefix: &str) -> String {
    prefix
        .replace('\\', "/")
        .replace('/', ":")
        .trim_matches(':')
        .to_lowercase()
}

/// owner 이름: 정규화된 prefix, 비어 있으면 `core`
pub fn owner_for(prefix: &str) -> String {
    let normalized = normalize_prefix(prefix);
    if normalized.is_empty() {
        CORE_OWNER.to_string()
    } else {
        normalized
    }
}

/// 필드 키 생성: `[prefix:][class:]field` (소문자)
pub fn build_key(prefix: &str, class_name: Option<&str>, field: &str) -> String {
    let normalized = normalize_prefix(prefix);
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if !normalized.is_empty() {
        parts.push(&normalized);
    }
    if let Some(class) = class_name.filter(|c| !c.is_empty()) {
        parts.push(class);
    }
    parts.push(field);
    parts.join(":").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("plugins/quiz"), "plugins:quiz");
        assert_eq!(normalize_prefix("\\Plugins\\Quiz\\"), "plugins:quiz");
        assert_eq!(normalize_prefix("::sec::"), "sec");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_build_key() {
        assert_eq!(build_key("plugins/quiz", None, "timer"), "plugins:quiz:timer");
        assert_eq!(
            build_key("sec", Some("SecurityPlugin"), "Timeout"),
            "sec:securityplugin:timeout"
        );
        assert_eq!(build_key("", Some("AuthPlugin"), "name"), "authplugin:name");
        assert_eq!(owner_for(""), CORE_OWNER);
        assert_eq!(owner_for("plugins/quiz"), "plugins:quiz");
    }

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::Int.accepts(&json!(60)));
        assert!(!FieldType::Int.accepts(&json!(1.5)));
        assert!(FieldType::Float.accepts(&json!(3)));
        assert!(!FieldType::Str.accepts(&json!(true)));
        assert!(FieldType::List.accepts(&json!(["a"])));
        assert!(FieldType::Bool.accepts(&Value::Null));
        assert!(FieldType::Json.accepts(&json!({"a": 1})));
    }

    #[test]
    fn test_field_set_from_manifest_json() {
        let set: FieldSet = serde_json::from_value(json!({
            "fields": [
                {"name": "timer", "type": "int", "default": 60},
                {"name": "shuffle", "type": "boolean", "default": false}
            ]
        }))
        .unwrap();

        assert!(set.class_name().is_none());
        assert_eq!(set.fields()[0], FieldSpec::int("timer", 60));
        assert_eq!(set.fields()[1].field_type, FieldType::Bool);
    }
}
