//! 플러그인 라이프사이클 통합 테스트
//!
//! Kernel + MemorySource/DirectorySource 로 활성화, 비활성화, hot reload,
//! 실패 격리, 재시작 복구를 검증한다.

use aranes_core::{
    DirectorySource, Kernel, LoaderEvent, MemorySource, Plugin, PluginContext, PluginRegistryStore,
    PluginState, RefreshOutcome, Routes,
};
use aranes_foundation::{
    temp_path_for, CoreConfig, Error, FieldSet, FieldSource, FieldSpec, Result,
};
use axum::routing::{get, post};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

struct Quiz {
    version: &'static str,
    starts: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Plugin for Quiz {
    fn routes(&self, _ctx: &PluginContext) -> Result<Routes> {
        let version = self.version;
        let starts = Arc::clone(&self.starts);
        Ok(Routes::new()
            .open("/ping", get(move || async move { version }))
            .closed(
                "/start",
                post(move || {
                    let starts = Arc::clone(&starts);
                    async move {
                        starts.fetch_add(1, Ordering::SeqCst);
                        "started"
                    }
                }),
            ))
    }

    fn permissions(&self) -> Vec<Arc<dyn FieldSource>> {
        vec![Arc::new(
            FieldSet::new()
                .field(FieldSpec::int("timer", 60))
                .field(FieldSpec::int("attempts", 3)),
        )]
    }
}

struct Stats;

#[async_trait::async_trait]
impl Plugin for Stats {
    fn routes(&self, _ctx: &PluginContext) -> Result<Routes> {
        Ok(Routes::new().open("/summary", get(|| async { "ok" })))
    }

    fn permissions(&self) -> Vec<Arc<dyn FieldSource>> {
        vec![Arc::new(
            FieldSet::new()
                .class("report")
                .field(FieldSpec::bool("export", false)),
        )]
    }
}

struct Broken;

#[async_trait::async_trait]
impl Plugin for Broken {
    fn routes(&self, _ctx: &PluginContext) -> Result<Routes> {
        panic!("broken plugin cannot declare routes");
    }
}

fn quiz(
    version: &'static str,
    starts: Arc<AtomicUsize>,
) -> impl Fn(&Value) -> Result<Arc<dyn Plugin>> + Send + Sync {
    move |_: &Value| -> Result<Arc<dyn Plugin>> {
        Ok(Arc::new(Quiz {
            version,
            starts: Arc::clone(&starts),
        }))
    }
}

fn stats(_: &Value) -> Result<Arc<dyn Plugin>> {
    Ok(Arc::new(Stats))
}

fn broken(_: &Value) -> Result<Arc<dyn Plugin>> {
    Ok(Arc::new(Broken))
}

fn config(temp: &TempDir) -> CoreConfig {
    CoreConfig::new()
        .plugins_dir(temp.path().join("services"))
        .state_file(temp.path().join("plugins_registry.json"))
}

fn kernel(temp: &TempDir, source: Arc<MemorySource>) -> Kernel {
    Kernel::builder(config(temp))
        .with_source(source)
        .build()
        .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_enable_mounts_routes_and_fields() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(MemorySource::new().with_plugin("quiz", quiz("v1", starts)));
    let kernel = kernel(&temp, source);

    let summary = kernel.start().await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.discovered, 1);

    // 발견만 된 상태에서는 라우트가 없다
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.status, 404);

    let descriptor = kernel.loader().enable("quiz").await.unwrap();
    assert_eq!(descriptor.state, PluginState::Enabled);
    assert!(descriptor.mounted);
    assert_eq!(descriptor.mount_generation, 1);

    let response = kernel.transport().get("/plugins/quiz/ping").await;
    assert!(response.is_success());
    assert_eq!(response.text(), "v1");

    let schema = kernel.permissions().snapshot();
    assert_eq!(schema.defaults()["plugins:quiz:timer"], json!(60));
    assert_eq!(schema.defaults()["plugins:quiz:attempts"], json!(3));
    assert_eq!(schema.get("plugins:quiz:timer").unwrap().owner, "plugins:quiz");
}

#[tokio::test]
async fn test_enable_disable_enable_cycle() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(MemorySource::new().with_plugin("quiz", quiz("v1", starts)));
    let kernel = kernel(&temp, source);
    kernel.start().await.unwrap();

    kernel.loader().enable("quiz").await.unwrap();
    let disabled = kernel.loader().disable("quiz").await.unwrap();
    assert_eq!(disabled.state, PluginState::Disabled);
    assert!(!disabled.mounted);
    assert!(!kernel.permissions().snapshot().contains("plugins:quiz:timer"));
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.status, 404);

    // 다시 활성화해도 DuplicateFieldKey 가 나지 않는다
    let enabled = kernel.loader().enable("quiz").await.unwrap();
    assert_eq!(enabled.state, PluginState::Enabled);
    assert!(enabled.last_error.is_none());
    assert!(kernel.permissions().snapshot().contains("plugins:quiz:timer"));

    // 이미 활성화된 플러그인은 no-op
    let again = kernel.loader().enable("quiz").await.unwrap();
    assert_eq!(again.mount_generation, enabled.mount_generation);
}

#[tokio::test]
async fn test_disable_removes_only_owner_fields() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(
        MemorySource::new()
            .with_plugin("quiz", quiz("v1", starts))
            .with_plugin("stats", stats),
    );
    let kernel = Kernel::builder(config(&temp))
        .with_source(source)
        .with_core_fields(Arc::new(
            FieldSet::new().field(FieldSpec::bool("admin", false)),
        ))
        .build()
        .unwrap();
    kernel.start().await.unwrap();

    kernel.loader().enable("quiz").await.unwrap();
    kernel.loader().enable("stats").await.unwrap();
    assert_eq!(kernel.permissions().snapshot().len(), 4);

    kernel.loader().disable("quiz").await.unwrap();

    let schema = kernel.permissions().snapshot();
    let keys: Vec<&str> = schema.keys().collect();
    assert_eq!(keys, vec!["admin", "plugins:stats:report:export"]);
    assert_eq!(kernel.transport().get("/plugins/stats/summary").await.text(), "ok");
}

#[tokio::test]
async fn test_refresh_failure_keeps_previous_version() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(MemorySource::new().with_plugin("quiz", quiz("v1", starts.clone())));
    let kernel = kernel(&temp, Arc::clone(&source));
    kernel.start().await.unwrap();
    kernel.loader().enable("quiz").await.unwrap();

    // 새 버전이 import 단계에서 실패
    let failing = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&failing);
    let next = quiz("v2", starts.clone());
    source.insert("quiz", move |settings: &Value| -> Result<Arc<dyn Plugin>> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::plugin_import("quiz", "syntax error in v2"));
        }
        next(settings)
    });

    let report = kernel.loader().refresh().await.unwrap();
    match &report.outcomes["quiz"] {
        RefreshOutcome::Failed {
            error,
            serving_previous,
        } => {
            assert!(error.contains("syntax error in v2"));
            assert!(*serving_previous);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(report.failed(), vec!["quiz"]);

    let descriptor = kernel.loader().get("quiz").unwrap();
    assert_eq!(descriptor.state, PluginState::Failed);
    assert!(descriptor.last_error.unwrap().contains("syntax error in v2"));
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.text(), "v1");
    assert!(kernel.permissions().snapshot().contains("plugins:quiz:timer"));

    // 수정 후 다시 refresh
    failing.store(false, Ordering::SeqCst);
    let report = kernel.loader().refresh().await.unwrap();
    assert!(report.is_clean());
    assert!(matches!(
        report.outcomes["quiz"],
        RefreshOutcome::Enabled { generation: 2 }
    ));

    let descriptor = kernel.loader().get("quiz").unwrap();
    assert_eq!(descriptor.state, PluginState::Enabled);
    assert!(descriptor.last_error.is_none());
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.text(), "v2");
}

#[tokio::test]
async fn test_refresh_failure_leaves_other_plugins_serving() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(
        MemorySource::new()
            .with_plugin("quiz", quiz("v1", starts))
            .with_plugin("stats", stats),
    );
    let kernel = kernel(&temp, Arc::clone(&source));
    kernel.start().await.unwrap();
    kernel.loader().enable("quiz").await.unwrap();
    kernel.loader().enable("stats").await.unwrap();

    source.insert("quiz", |_: &Value| -> Result<Arc<dyn Plugin>> {
        Err(Error::plugin_import("quiz", "syntax error in v2"))
    });

    let report = kernel.loader().refresh().await.unwrap();
    assert_eq!(report.failed(), vec!["quiz"]);
    assert_eq!(
        report.outcomes["stats"],
        RefreshOutcome::Enabled { generation: 2 }
    );

    let stats = kernel.loader().get("stats").unwrap();
    assert_eq!(stats.state, PluginState::Enabled);
    assert_eq!(stats.mount_generation, 2);
    assert_eq!(kernel.transport().get("/plugins/stats/summary").await.text(), "ok");

    let schema = kernel.permissions().snapshot();
    assert_eq!(schema.defaults()["plugins:stats:report:export"], json!(false));
    assert_eq!(schema.owned_by("plugins:stats").count(), 1);
    // quiz 는 이전 버전으로 계속 서비스
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.text(), "v1");
    assert!(schema.contains("plugins:quiz:timer"));
}

#[tokio::test]
async fn test_refresh_applies_edited_store() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(
        MemorySource::new()
            .with_plugin("quiz", quiz("v1", starts))
            .with_plugin("stats", stats),
    );
    let kernel = kernel(&temp, source);
    kernel.start().await.unwrap();
    kernel.loader().enable("quiz").await.unwrap();

    // 운영자가 파일을 직접 수정
    let store = PluginRegistryStore::new(temp.path().join("plugins_registry.json"));
    let mut records = store.load().await.unwrap();
    records.get_mut("quiz").unwrap().enabled = false;
    records.get_mut("stats").unwrap().enabled = true;
    store.save(&records).await.unwrap();

    let report = kernel.loader().refresh().await.unwrap();
    assert_eq!(report.outcomes["quiz"], RefreshOutcome::Disabled);
    assert_eq!(
        report.outcomes["stats"],
        RefreshOutcome::Enabled { generation: 1 }
    );

    assert_eq!(kernel.loader().get("quiz").unwrap().state, PluginState::Disabled);
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.status, 404);
    assert_eq!(kernel.transport().get("/plugins/stats/summary").await.text(), "ok");
    assert!(!kernel.permissions().snapshot().contains("plugins:quiz:timer"));

    // 수정 내용은 다음 저장에서 덮어써지지 않는다
    let records = store.load().await.unwrap();
    assert!(!records["quiz"].enabled);
    assert!(records["stats"].enabled);

    // 변경이 없으면 다시 refresh 해도 그대로
    let report = kernel.loader().refresh().await.unwrap();
    assert_eq!(
        report.outcomes["quiz"],
        RefreshOutcome::Unchanged {
            state: PluginState::Disabled
        }
    );
}

#[tokio::test]
async fn test_case_variant_name_is_not_a_plugin() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(
        MemorySource::new()
            .with_plugin("quiz", quiz("v1", starts.clone()))
            .with_plugin("Quiz", quiz("upper", starts)),
    );
    let kernel = kernel(&temp, source);

    let summary = kernel.start().await.unwrap();
    assert_eq!(summary.total, 1);

    kernel.loader().enable("quiz").await.unwrap();
    let err = kernel.loader().enable("Quiz").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // quiz 의 필드와 라우트는 그대로
    let schema = kernel.permissions().snapshot();
    assert_eq!(schema.owned_by("plugins:quiz").count(), 2);
    assert_eq!(kernel.loader().get("quiz").unwrap().state, PluginState::Enabled);
    assert_eq!(kernel.transport().get("/plugins/Quiz/ping").await.status, 404);
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.text(), "v1");
}

#[tokio::test]
async fn test_panicking_plugin_is_isolated() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(
        MemorySource::new()
            .with_plugin("broken", broken)
            .with_plugin("stats", stats),
    );
    let kernel = kernel(&temp, source);
    kernel.start().await.unwrap();

    let err = kernel.loader().enable("broken").await.unwrap_err();
    assert!(err.is_plugin_failure());

    let descriptor = kernel.loader().get("broken").unwrap();
    assert_eq!(descriptor.state, PluginState::Failed);
    assert!(!descriptor.mounted);
    assert!(descriptor.last_error.unwrap().contains("cannot declare routes"));

    kernel.loader().enable("stats").await.unwrap();
    assert_eq!(kernel.transport().get("/plugins/stats/summary").await.text(), "ok");
    assert_eq!(kernel.loader().summary().failed, 1);
}

#[tokio::test]
async fn test_restart_restores_enabled_plugins() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));

    {
        let source = Arc::new(
            MemorySource::new()
                .with_plugin("quiz", quiz("v1", starts.clone()))
                .with_plugin("stats", stats),
        );
        let kernel = kernel(&temp, source);
        kernel.start().await.unwrap();
        kernel.loader().enable("quiz").await.unwrap();
    }

    let store = PluginRegistryStore::new(temp.path().join("plugins_registry.json"));
    let records = store.load().await.unwrap();
    assert!(records["quiz"].enabled);
    assert!(!records["stats"].enabled);

    let source = Arc::new(
        MemorySource::new()
            .with_plugin("quiz", quiz("v1", starts.clone()))
            .with_plugin("stats", stats),
    );
    let kernel = kernel(&temp, source);
    let summary = kernel.start().await.unwrap();
    assert_eq!(summary.enabled, 1);
    assert_eq!(summary.discovered, 1);
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.text(), "v1");
}

#[tokio::test]
async fn test_vanished_plugin_is_marked_failed() {
    let temp = TempDir::new().unwrap();
    let starts = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(MemorySource::new().with_plugin("quiz", quiz("v1", starts)));
    let kernel = kernel(&temp, Arc::clone(&source));
    kernel.start().await.unwrap();
    kernel.loader().enable("quiz").await.unwrap();

    source.remove("quiz");
    let report = kernel.loader().refresh().await.unwrap();
    assert_eq!(
        report.outcomes["quiz"],
        RefreshOutcome::Missing { was_mounted: true }
    );

    let descriptor = kernel.loader().get("quiz").unwrap();
    assert_eq!(descriptor.state, PluginState::Failed);
    assert_eq!(descriptor.last_error.as_deref(), Some(aranes_core::plugin::SOURCE_MISSING));
    assert_eq!(kernel.transport().get("/plugins/quiz/ping").await.status, 404);
    assert!(!kernel.permissions().snapshot().contains("plugins:quiz:timer"));

    kernel.loader().forget("quiz").await.unwrap();
    assert!(kernel.loader().get("quiz").is_none());
}

#[tokio::test]
async fn test_forget_rejects_mounted_plugin() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::new().with_plugin("stats", stats));
    let kernel = kernel(&temp, source);
    kernel.start().await.unwrap();
    kernel.loader().enable("stats").await.unwrap();

    let err = kernel.loader().forget("stats").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = kernel.loader().forget("nope").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_directory_source_manifest_plugin() {
    let temp = TempDir::new().unwrap();
    let plugin_dir = temp.path().join("services").join("quiz");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(
        plugin_dir.join("plugin.json"),
        json!({
            "entry": "stats",
            "version": "1.2.0",
            "description": "quiz service",
            "permissions": [{"fields": [{"name": "timer", "type": "int", "default": 60}]}]
        })
        .to_string(),
    )
    .unwrap();
    std::fs::create_dir_all(temp.path().join("services").join("__pycache__")).unwrap();

    let source = DirectorySource::new(temp.path().join("services")).with_factory("stats", stats);
    let kernel = Kernel::builder(config(&temp))
        .with_source(Arc::new(source))
        .build()
        .unwrap();

    let summary = kernel.start().await.unwrap();
    assert_eq!(summary.total, 1);

    let descriptor = kernel.loader().enable("quiz").await.unwrap();
    assert_eq!(descriptor.version.as_deref(), Some("1.2.0"));
    assert_eq!(descriptor.path.as_deref(), Some(plugin_dir.as_path()));

    let schema = kernel.permissions().snapshot();
    assert_eq!(schema.defaults()["plugins:quiz:timer"], json!(60));
    assert!(schema.contains("plugins:quiz:report:export"));
}

#[tokio::test]
async fn test_unknown_entry_fails_import() {
    let temp = TempDir::new().unwrap();
    let plugin_dir = temp.path().join("services").join("quiz");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(plugin_dir.join("plugin.json"), r#"{"entry": "missing"}"#).unwrap();

    let kernel = Kernel::builder(config(&temp)).build().unwrap();
    kernel.start().await.unwrap();

    let err = kernel.loader().enable("quiz").await.unwrap_err();
    assert!(matches!(err, Error::PluginImport { .. }));
    assert_eq!(kernel.loader().get("quiz").unwrap().state, PluginState::Failed);

    // 실패해도 희망 상태는 저장된다
    let store = PluginRegistryStore::new(temp.path().join("plugins_registry.json"));
    assert!(store.load().await.unwrap()["quiz"].enabled);
}

#[tokio::test]
async fn test_crash_mid_save_keeps_previous_state() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::new().with_plugin("stats", stats));
    let kernel = kernel(&temp, source);
    kernel.start().await.unwrap();
    kernel.loader().enable("stats").await.unwrap();

    // 쓰기 도중 중단된 임시 파일
    let path = temp.path().join("plugins_registry.json");
    std::fs::write(temp_path_for(&path), "{ \"version\": 1, \"plugi").unwrap();

    let records = PluginRegistryStore::new(&path).load().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records["stats"].enabled);
}

#[tokio::test]
async fn test_corrupt_store_fails_start() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("plugins_registry.json"), "not json").unwrap();

    let source = Arc::new(MemorySource::new().with_plugin("stats", stats));
    let kernel = kernel(&temp, source);
    let err = kernel.start().await.unwrap_err();
    assert!(matches!(err, Error::StoreCorrupt { .. }));
}

#[tokio::test]
async fn test_loader_events() {
    let temp = TempDir::new().unwrap();
    let source = Arc::new(
        MemorySource::new()
            .with_plugin("broken", broken)
            .with_plugin("stats", stats),
    );
    let kernel = kernel(&temp, source);
    kernel.start().await.unwrap();

    let mut events = kernel.loader().subscribe();
    let mut schema_events = kernel.permissions().subscribe();

    kernel.loader().enable("stats").await.unwrap();
    let _ = kernel.loader().enable("broken").await;
    kernel.loader().disable("stats").await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        LoaderEvent::Enabled {
            name: "stats".into(),
            generation: 1
        }
    );
    match events.recv().await.unwrap() {
        LoaderEvent::Failed { name, error } => {
            assert_eq!(name, "broken");
            assert!(!error.is_empty());
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(
        events.recv().await.unwrap(),
        LoaderEvent::Disabled {
            name: "stats".into()
        }
    );

    let added = schema_events.recv().await.unwrap();
    assert_eq!(added.owners, vec!["plugins:stats".to_string()]);
    let removed = schema_events.recv().await.unwrap();
    assert!(removed.version > added.version);
}
