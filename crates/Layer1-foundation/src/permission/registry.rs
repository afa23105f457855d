//! Permission Registry - 병합된 권한 스키마 관리
//!
//! 읽기는 락 없이 현재 스냅샷을 가져가고, 쓰기는 직렬화되어
//! 완성된 스냅샷을 포인터 교체 한 번으로 발행한다.

use super::schema::{PermissionField, PermissionSchema};
use super::types::{build_key, owner_for, FieldSource};
use crate::{Error, Result};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 64;

/// 스키마 발행 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEvent {
    pub version: u64,
    /// 이번 커밋에서 필드가 바뀐 owner
    pub owners: Vec<String>,
}

/// 프로세스 단위 권한 레지스트리
pub struct PermissionRegistry {
    current: ArcSwap<PermissionSchema>,
    writer: Mutex<()>,
    events: broadcast::Sender<SchemaEvent>,
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PermissionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schema = self.current.load();
        f.debug_struct("PermissionRegistry")
            .field("version", &schema.version())
            .field("fields", &schema.len())
            .finish()
    }
}

impl PermissionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: ArcSwap::from_pointee(PermissionSchema::default()),
            writer: Mutex::new(()),
            events,
        }
    }

    /// 현재 스키마 스냅샷
    pub fn snapshot(&self) -> Arc<PermissionSchema> {
        self.current.load_full()
    }

    pub fn owners(&self) -> Vec<String> {
        self.current.load().owners()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchemaEvent> {
        self.events.subscribe()
    }

    /// 쓰기 트랜잭션 시작. 커밋/드롭 전까지 다른 writer 는 대기한다.
    pub fn begin(&self) -> SchemaTxn<'_> {
        let guard = self.writer.lock();
        let base = self.current.load_full();
        SchemaTxn {
            registry: self,
            _guard: guard,
            staged: base.field_map().clone(),
            base_version: base.version(),
            changed: Vec::new(),
        }
    }

    /// `prefix` 아래에 필드 소스 등록 (전부 아니면 전무)
    pub fn register(&self, source: &dyn FieldSource, prefix: &str) -> Result<Arc<PermissionSchema>> {
        let mut txn = self.begin();
        txn.add(prefix, [source])?;
        Ok(txn.commit())
    }

    /// 여러 `(source, prefix)` 를 한 번에 커밋 (전부 아니면 전무)
    pub fn register_many<'a, I, S>(&self, entries: I) -> Result<Arc<PermissionSchema>>
    where
        I: IntoIterator<Item = (&'a S, &'a str)>,
        S: FieldSource + ?Sized + 'a,
    {
        let mut txn = self.begin();
        for (source, prefix) in entries {
            txn.add(prefix, [source])?;
        }
        Ok(txn.commit())
    }

    /// `prefix` 소유 필드 모두 제거
    pub fn unregister(&self, prefix: &str) -> Arc<PermissionSchema> {
        let mut txn = self.begin();
        txn.remove_owner(prefix);
        txn.commit()
    }

    fn publish(&self, schema: PermissionSchema, owners: Vec<String>) -> Arc<PermissionSchema> {
        let schema = Arc::new(schema);
        self.current.store(Arc::clone(&schema));
        info!(
            "[Permissions] schema v{} published ({} fields, owners changed: {:?})",
            schema.version(),
            schema.len(),
            owners
        );
        // 구독자가 없어도 무시
        let _ = self.events.send(SchemaEvent {
            version: schema.version(),
            owners,
        });
        schema
    }
}

// ============================================================================
// SchemaTxn - 트랜잭션
// ============================================================================

/// 스테이징된 스키마 변경
///
/// 스테이징은 실패할 수 있고, 실패하면 스테이징 상태는 그대로 남는다.
/// `commit()` 은 실패하지 않으며, 커밋 없이 드롭하면 모두 버려진다.
pub struct SchemaTxn<'a> {
    registry: &'a PermissionRegistry,
    _guard: MutexGuard<'a, ()>,
    staged: BTreeMap<String, PermissionField>,
    base_version: u64,
    changed: Vec<String>,
}

impl<'a> SchemaTxn<'a> {
    /// 기존 필드는 그대로 두고 `prefix` 조각 추가
    pub fn add<'s, I, S>(&mut self, prefix: &str, sources: I) -> Result<()>
    where
        I: IntoIterator<Item = &'s S>,
        S: FieldSource + ?Sized + 's,
    {
        let owner = owner_for(prefix);
        let fragment = build_fragment(&owner, prefix, sources)?;
        check_against(&self.staged, &fragment, &owner, false)?;
        self.insert(owner, fragment);
        Ok(())
    }

    /// `prefix` 소유 필드를 새 조각으로 교체
    pub fn replace_owner<'s, I, S>(&mut self, prefix: &str, sources: I) -> Result<()>
    where
        I: IntoIterator<Item = &'s S>,
        S: FieldSource + ?Sized + 's,
    {
        let owner = owner_for(prefix);
        let fragment = build_fragment(&owner, prefix, sources)?;
        check_against(&self.staged, &fragment, &owner, true)?;
        self.staged.retain(|_, f| f.owner != owner);
        self.insert(owner, fragment);
        Ok(())
    }

    /// `prefix` 소유 필드 제거
    pub fn remove_owner(&mut self, prefix: &str) {
        let owner = owner_for(prefix);
        let before = self.staged.len();
        self.staged.retain(|_, f| f.owner != owner);
        if self.staged.len() != before {
            debug!(
                "[Permissions] staged removal of {} fields owned by {}",
                before - self.staged.len(),
                owner
            );
            self.mark(owner);
        }
    }

    /// 스테이징된 변경이 있는지
    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    /// 스테이징된 스키마 발행. 변경이 없으면 발행하지 않는다.
    pub fn commit(self) -> Arc<PermissionSchema> {
        if self.changed.is_empty() {
            return self.registry.snapshot();
        }
        let schema = PermissionSchema::from_parts(self.base_version + 1, self.staged);
        self.registry.publish(schema, self.changed)
    }

    fn insert(&mut self, owner: String, fragment: Vec<PermissionField>) {
        for field in fragment {
            self.staged.insert(field.key.clone(), field);
        }
        self.mark(owner);
    }

    fn mark(&mut self, owner: String) {
        if !self.changed.contains(&owner) {
            self.changed.push(owner);
        }
    }
}

fn build_fragment<'s, I, S>(owner: &str, prefix: &str, sources: I) -> Result<Vec<PermissionField>>
where
    I: IntoIterator<Item = &'s S>,
    S: FieldSource + ?Sized + 's,
{
    let mut fragment = Vec::new();
    let mut seen = HashSet::new();

    for source in sources {
        let class = source.class_name().map(str::to_lowercase);
        for spec in source.fields() {
            let key = build_key(prefix, class.as_deref(), &spec.name);
            if !seen.insert(key.clone()) {
                return Err(Error::DuplicateFieldKey {
                    key,
                    owner: owner.to_string(),
                    existing_owner: owner.to_string(),
                });
            }
            if !spec.field_type.accepts(&spec.default) {
                return Err(Error::Validation(format!(
                    "default for {} does not match type {}: {}",
                    key, spec.field_type, spec.default
                )));
            }
            fragment.push(PermissionField {
                key,
                name: spec.name,
                class: class.clone(),
                field_type: spec.field_type,
                default: spec.default,
                owner: owner.to_string(),
            });
        }
    }

    Ok(fragment)
}

fn check_against(
    staged: &BTreeMap<String, PermissionField>,
    fragment: &[PermissionField],
    owner: &str,
    replacing: bool,
) -> Result<()> {
    for field in fragment {
        if let Some(existing) = staged.get(&field.key) {
            if replacing && existing.owner == owner {
                continue;
            }
            return Err(Error::DuplicateFieldKey {
                key: field.key.clone(),
                owner: owner.to_string(),
                existing_owner: existing.owner.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{FieldSet, FieldSpec};
    use serde_json::json;

    fn quiz() -> FieldSet {
        FieldSet::new()
            .field(FieldSpec::int("timer", 60))
            .field(FieldSpec::int("attempts", 3))
    }

    fn security() -> FieldSet {
        FieldSet::new()
            .class("SecurityPlugin")
            .field(FieldSpec::int("timeout", 30))
    }

    #[test]
    fn test_register_quiz_fields() {
        let registry = PermissionRegistry::new();
        let schema = registry.register(&quiz(), "plugins/quiz").unwrap();

        assert_eq!(schema.version(), 1);
        assert_eq!(schema.defaults()["plugins:quiz:timer"], json!(60));
        assert_eq!(schema.defaults()["plugins:quiz:attempts"], json!(3));
        assert_eq!(registry.owners(), vec!["plugins:quiz"]);
    }

    #[test]
    fn test_register_order_independent() {
        let a = PermissionRegistry::new();
        a.register(&quiz(), "plugins/quiz").unwrap();
        a.register(&security(), "sec").unwrap();

        let b = PermissionRegistry::new();
        b.register(&security(), "sec").unwrap();
        b.register(&quiz(), "plugins/quiz").unwrap();

        assert_eq!(*a.snapshot(), *b.snapshot());
        assert!(a.snapshot().contains("sec:securityplugin:timeout"));
    }

    #[test]
    fn test_duplicate_key_leaves_schema_unchanged() {
        let registry = PermissionRegistry::new();
        registry.register(&quiz(), "plugins/quiz").unwrap();
        let before = registry.snapshot();

        let clash = FieldSet::new()
            .field(FieldSpec::bool("shuffle", true))
            .field(FieldSpec::int("timer", 10));
        let err = registry.register(&clash, "plugins/quiz").unwrap_err();

        assert!(matches!(err, Error::DuplicateFieldKey { ref key, .. } if key == "plugins:quiz:timer"));
        assert_eq!(*registry.snapshot(), *before);
        assert!(!registry.snapshot().contains("plugins:quiz:shuffle"));
    }

    #[test]
    fn test_duplicate_within_fragment() {
        let registry = PermissionRegistry::new();
        let twice = FieldSet::new()
            .field(FieldSpec::int("timer", 1))
            .field(FieldSpec::int("Timer", 2));

        assert!(matches!(
            registry.register(&twice, "plugins/quiz"),
            Err(Error::DuplicateFieldKey { .. })
        ));
        assert_eq!(registry.snapshot().version(), 0);
    }

    #[test]
    fn test_mistyped_default_rejected() {
        let registry = PermissionRegistry::new();
        let bad = FieldSet::new().field(FieldSpec::new("timer", crate::permission::FieldType::Int, "sixty"));

        assert!(matches!(
            registry.register(&bad, "plugins/quiz"),
            Err(Error::Validation(_))
        ));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_register_many_is_all_or_nothing() {
        let registry = PermissionRegistry::new();
        let quiz = quiz();
        let again = quiz.clone();

        let result = registry.register_many([
            (&quiz as &dyn FieldSource, "plugins/quiz"),
            (&again as &dyn FieldSource, "plugins/quiz"),
        ]);

        assert!(result.is_err());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_unregister_removes_only_owner() {
        let registry = PermissionRegistry::new();
        registry.register(&quiz(), "plugins/quiz").unwrap();
        registry.register(&security(), "sec").unwrap();

        let schema = registry.unregister("plugins/quiz");

        assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["sec:securityplugin:timeout"]);
        assert_eq!(schema.version(), 3);

        // 모르는 owner 는 no-op
        let same = registry.unregister("plugins/nothing");
        assert_eq!(same.version(), 3);
    }

    #[test]
    fn test_replace_owner_on_reload() {
        let registry = PermissionRegistry::new();
        registry.register(&quiz(), "plugins/quiz").unwrap();

        let reloaded = FieldSet::new()
            .field(FieldSpec::int("timer", 90))
            .field(FieldSpec::bool("shuffle", false));
        let mut txn = registry.begin();
        txn.replace_owner("plugins/quiz", [&reloaded as &dyn FieldSource])
            .unwrap();
        let schema = txn.commit();

        assert_eq!(schema.defaults()["plugins:quiz:timer"], json!(90));
        assert!(schema.contains("plugins:quiz:shuffle"));
        assert!(!schema.contains("plugins:quiz:attempts"));
    }

    #[test]
    fn test_replace_owner_cannot_steal_foreign_key() {
        let registry = PermissionRegistry::new();
        registry.register(&quiz(), "plugins/quiz").unwrap();

        let thief = FieldSet::new().field(FieldSpec::int("quiz:timer", 1));
        let mut txn = registry.begin();
        let err = txn
            .replace_owner("plugins", [&thief as &dyn FieldSource])
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateFieldKey { ref existing_owner, .. } if existing_owner == "plugins:quiz"));
        assert!(!txn.is_dirty());
    }

    #[test]
    fn test_dropped_txn_discards() {
        let registry = PermissionRegistry::new();
        {
            let mut txn = registry.begin();
            txn.add("plugins/quiz", [&quiz() as &dyn FieldSource]).unwrap();
            assert!(txn.is_dirty());
        }
        assert!(registry.snapshot().is_empty());
        assert!(registry.register(&quiz(), "plugins/quiz").is_ok());
    }

    #[test]
    fn test_subscribe_receives_events() {
        let registry = PermissionRegistry::new();
        let mut rx = registry.subscribe();

        registry.register(&quiz(), "plugins/quiz").unwrap();
        registry.unregister("plugins/quiz");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.owners, vec!["plugins:quiz"]);
        assert_eq!(rx.try_recv().unwrap().version, 2);
    }

    #[test]
    fn test_core_owner() {
        let registry = PermissionRegistry::new();
        let core = FieldSet::new().field(FieldSpec::bool("admin", false));
        registry.register(&core, "").unwrap();

        let schema = registry.snapshot();
        assert_eq!(schema.get("admin").map(|f| f.owner.as_str()), Some("core"));
    }
}
