//! Plugin Loader - 플러그인 라이프사이클 관리
//!
//! - 발견/활성화/비활성화/새로고침 (hot reload)
//! - 라우터 마운트와 권한 조각 병합을 한 단계로 처리 (stage → commit)
//! - 플러그인 단위 실패 격리: 실패한 플러그인은 이전 버전을 계속 서비스
//!
//! 변경 작업은 로더 단일 뮤텍스로 직렬화되고, `list()`/`get()` 은 별도로
//! 발행되는 디스크립터 맵을 읽으므로 진행 중인 작업을 기다리지 않는다.

use super::descriptor::{PluginDescriptor, PluginState};
use super::discovery::{Candidate, ImportedPlugin, PluginSource};
use super::events::{EventBus, LoaderEvent};
use super::store::{PluginRecord, PluginRegistryStore};
use super::traits::{permission_prefix, Plugin, PluginContext};
use crate::routing::{panic_message, RouteTable, StagedRoutes};
use crate::transport::InProcessTransport;
use aranes_foundation::{Error, FieldSource, PermissionRegistry, Result};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// 소스에서 사라진 플러그인의 진단 메시지
pub const SOURCE_MISSING: &str = "plugin source missing";

// ============================================================================
// Report 타입
// ============================================================================

/// refresh 결과 (플러그인별)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// 새로 발견됨
    Discovered,
    /// 새 버전으로 교체됨
    Enabled { generation: u64 },
    /// 실패. `serving_previous` 면 이전 버전이 계속 서비스 중
    Failed { error: String, serving_previous: bool },
    /// 소스에서 사라짐
    Missing { was_mounted: bool },
    /// 저장 파일에서 희망 상태가 꺼져 마운트 해제됨
    Disabled,
    /// 대상 아님
    Unchanged { state: PluginState },
}

/// refresh 보고서
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub outcomes: BTreeMap<String, RefreshOutcome>,
}

impl RefreshReport {
    /// 실패했거나 사라진 플러그인
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| {
                matches!(o, RefreshOutcome::Failed { .. } | RefreshOutcome::Missing { .. })
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed().is_empty()
    }
}

/// 상태별 플러그인 수
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderSummary {
    pub total: usize,
    pub discovered: usize,
    pub loaded: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub failed: usize,
    pub mounted: usize,
}

// ============================================================================
// PluginLoader
// ============================================================================

struct LivePlugin {
    plugin: Arc<dyn Plugin>,
    ctx: PluginContext,
}

#[derive(Default)]
struct LoaderState {
    live: HashMap<String, LivePlugin>,
    started: bool,
}

#[derive(Default)]
struct ScanResult {
    candidates: Vec<Candidate>,
    new: Vec<String>,
    missing: Vec<String>,
}

/// 플러그인 로더
pub struct PluginLoader {
    source: Arc<dyn PluginSource>,
    store: PluginRegistryStore,
    permissions: Arc<PermissionRegistry>,
    routes: Arc<RouteTable>,
    transport: InProcessTransport,
    descriptors: RwLock<BTreeMap<String, PluginDescriptor>>,
    /// 마지막으로 저장하거나 읽은 희망 상태 (외부 수정 감지용)
    on_disk: parking_lot::Mutex<BTreeMap<String, bool>>,
    state: Mutex<LoaderState>,
    events: EventBus,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("store", &self.store)
            .field("summary", &self.summary())
            .finish()
    }
}

impl PluginLoader {
    pub fn new(
        source: Arc<dyn PluginSource>,
        store: PluginRegistryStore,
        permissions: Arc<PermissionRegistry>,
        routes: Arc<RouteTable>,
        transport: InProcessTransport,
    ) -> Self {
        Self {
            source,
            store,
            permissions,
            routes,
            transport,
            descriptors: RwLock::new(BTreeMap::new()),
            on_disk: parking_lot::Mutex::new(BTreeMap::new()),
            state: Mutex::new(LoaderState::default()),
            events: EventBus::new(),
        }
    }

    // ========================================================================
    // 조회 (로더 락 없음)
    // ========================================================================

    /// 모든 디스크립터 (이름순)
    pub fn list(&self) -> Vec<PluginDescriptor> {
        self.descriptors.read().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<PluginDescriptor> {
        self.descriptors.read().get(name).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.events.subscribe()
    }

    pub fn summary(&self) -> LoaderSummary {
        let descriptors = self.descriptors.read();
        let mut summary = LoaderSummary {
            total: descriptors.len(),
            ..Default::default()
        };
        for d in descriptors.values() {
            match d.state {
                PluginState::Discovered => summary.discovered += 1,
                PluginState::Loaded => summary.loaded += 1,
                PluginState::Enabled => summary.enabled += 1,
                PluginState::Disabled => summary.disabled += 1,
                PluginState::Failed => summary.failed += 1,
            }
            if d.mounted {
                summary.mounted += 1;
            }
        }
        summary
    }

    // ========================================================================
    // 라이프사이클
    // ========================================================================

    /// 저장된 상태 로드 → 발견 → 희망 상태가 enabled 인 플러그인 활성화
    pub async fn start(&self) -> Result<LoaderSummary> {
        let mut state = self.state.lock().await;
        if state.started {
            warn!("[PluginLoader] start() called twice; ignoring");
            return Ok(self.summary());
        }

        let records = self.store.load().await?;
        self.restore(&records);
        *self.on_disk.lock() = enabled_flags(&records);

        let scan = self.scan_locked().await?;
        let wanted = self.wanted(&scan.candidates);
        info!(
            "[PluginLoader] starting: {} known, {} new, {} to enable",
            self.descriptors.read().len(),
            scan.new.len(),
            wanted.len()
        );

        for candidate in &wanted {
            // failures are recorded on the descriptor
            let _ = self.mount_locked(&mut state, candidate).await;
        }
        for name in &scan.missing {
            self.mark_missing(name);
        }

        state.started = true;
        self.persist().await?;
        Ok(self.summary())
    }

    /// 새 후보 발견. 코드는 로드하지 않는다.
    pub async fn discover(&self) -> Result<Vec<String>> {
        let _state = self.state.lock().await;
        let scan = self.scan_locked().await?;
        if !scan.new.is_empty() {
            info!("[PluginLoader] discovered: {:?}", scan.new);
            self.persist().await?;
        }
        Ok(scan.new)
    }

    /// 플러그인 활성화
    ///
    /// 실패해도 희망 상태(enabled)는 저장되므로 이후 `refresh()` 가 재시도한다.
    pub async fn enable(&self, name: &str) -> Result<PluginDescriptor> {
        let mut state = self.state.lock().await;
        self.sync_from_store().await?;
        let descriptor = self.require(name)?;

        if descriptor.state == PluginState::Enabled && state.live.contains_key(name) {
            debug!("[PluginLoader] {} already enabled", name);
            return Ok(descriptor);
        }

        self.update(name, |d| d.enabled = true);
        let candidate = Candidate::new(name, descriptor.path.clone());
        let result = self.mount_locked(&mut state, &candidate).await;
        let persisted = self.persist().await;

        match result {
            Ok(descriptor) => {
                persisted?;
                Ok(descriptor)
            }
            Err(err) => {
                if let Err(store_err) = persisted {
                    error!("[PluginLoader] failed to persist state: {}", store_err);
                }
                Err(err)
            }
        }
    }

    /// 플러그인 비활성화 (멱등)
    pub async fn disable(&self, name: &str) -> Result<PluginDescriptor> {
        let mut state = self.state.lock().await;
        self.sync_from_store().await?;
        self.require(name)?;

        self.unmount_locked(&mut state, name).await?;
        let descriptor = self
            .update(name, |d| {
                d.enabled = false;
                d.mounted = false;
                d.transition(PluginState::Disabled);
            })
            .ok_or_else(|| Error::NotFound(format!("plugin {}", name)))?;

        info!("[PluginLoader] disabled {}", name);
        self.events.emit(LoaderEvent::Disabled {
            name: name.to_string(),
        });
        self.persist().await?;
        Ok(descriptor)
    }

    /// 재발견 + 희망 상태가 enabled 인 모든 플러그인 재import/재마운트
    ///
    /// 저장 파일이 외부에서 수정되었으면 그 희망 상태를 먼저 반영한다.
    /// 플러그인별 실패는 격리되며 중간에 중단하지 않는다.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let mut state = self.state.lock().await;
        self.sync_from_store().await?;
        let scan = self.scan_locked().await?;
        let mut report = RefreshReport::default();

        for name in &scan.new {
            report
                .outcomes
                .insert(name.clone(), RefreshOutcome::Discovered);
        }

        for name in &scan.missing {
            let was_mounted = state.live.contains_key(name);
            if let Err(err) = self.unmount_locked(&mut state, name).await {
                error!("[PluginLoader] failed to unmount vanished {}: {}", name, err);
            }
            self.mark_missing(name);
            report
                .outcomes
                .insert(name.clone(), RefreshOutcome::Missing { was_mounted });
        }

        for name in self.unwanted(&state) {
            match self.unmount_locked(&mut state, &name).await {
                Ok(()) => {
                    self.update(&name, |d| {
                        d.mounted = false;
                        d.transition(PluginState::Disabled);
                    });
                    info!("[PluginLoader] disabled {} (store edited)", name);
                    self.events.emit(LoaderEvent::Disabled { name: name.clone() });
                    report.outcomes.insert(name, RefreshOutcome::Disabled);
                }
                Err(err) => {
                    error!("[PluginLoader] failed to unmount {}: {}", name, err);
                    report.outcomes.insert(
                        name,
                        RefreshOutcome::Failed {
                            error: err.to_string(),
                            serving_previous: true,
                        },
                    );
                }
            }
        }

        for candidate in self.wanted(&scan.candidates) {
            let outcome = match self.mount_locked(&mut state, &candidate).await {
                Ok(descriptor) => RefreshOutcome::Enabled {
                    generation: descriptor.mount_generation,
                },
                Err(err) => RefreshOutcome::Failed {
                    error: err.to_string(),
                    serving_previous: state.live.contains_key(&candidate.name),
                },
            };
            report.outcomes.insert(candidate.name.clone(), outcome);
        }

        for descriptor in self.list() {
            report
                .outcomes
                .entry(descriptor.name)
                .or_insert(RefreshOutcome::Unchanged {
                    state: descriptor.state,
                });
        }

        self.persist().await?;

        let states = self
            .list()
            .into_iter()
            .map(|d| (d.name, d.state))
            .collect();
        self.events.emit(LoaderEvent::Refreshed { outcomes: states });
        info!(
            "[PluginLoader] refresh complete: {} plugins, failed: {:?}",
            report.outcomes.len(),
            report.failed()
        );
        Ok(report)
    }

    /// 디스크립터 삭제. 마운트되어 있으면 거부한다.
    pub async fn forget(&self, name: &str) -> Result<()> {
        let state = self.state.lock().await;
        if state.live.contains_key(name) {
            return Err(Error::Validation(format!(
                "plugin {} is mounted; disable it first",
                name
            )));
        }
        if self.descriptors.write().remove(name).is_none() {
            return Err(Error::NotFound(format!("plugin {}", name)));
        }

        info!("[PluginLoader] forgot {}", name);
        self.events.emit(LoaderEvent::Forgotten {
            name: name.to_string(),
        });
        self.persist().await
    }

    // ========================================================================
    // 마운트
    // ========================================================================

    async fn mount_locked(
        &self,
        state: &mut LoaderState,
        candidate: &Candidate,
    ) -> Result<PluginDescriptor> {
        let name = candidate.name.as_str();
        debug!("[PluginLoader] mounting {}", name);

        match self.try_mount(state, candidate).await {
            Ok(()) => {
                let descriptor = self
                    .update(name, |d| {
                        d.transition(PluginState::Enabled);
                        d.mount_generation += 1;
                        d.mounted = true;
                    })
                    .ok_or_else(|| Error::NotFound(format!("plugin {}", name)))?;

                info!(
                    "[PluginLoader] enabled {} (generation {})",
                    name, descriptor.mount_generation
                );
                self.events.emit(LoaderEvent::Enabled {
                    name: name.to_string(),
                    generation: descriptor.mount_generation,
                });
                Ok(descriptor)
            }
            Err(err) => {
                let serving = state.live.contains_key(name);
                self.update(name, |d| {
                    d.fail(err.to_string());
                    d.mounted = serving;
                });

                if serving {
                    error!("[PluginLoader] {} failed, previous version stays live: {}", name, err);
                } else {
                    error!("[PluginLoader] {} failed: {}", name, err);
                }
                self.events.emit(LoaderEvent::Failed {
                    name: name.to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// import → 라우터/권한 준비 → on_enable → 커밋
    async fn try_mount(&self, state: &mut LoaderState, candidate: &Candidate) -> Result<()> {
        let name = candidate.name.as_str();

        let imported = match AssertUnwindSafe(self.source.import(candidate))
            .catch_unwind()
            .await
        {
            Ok(result) => result?,
            Err(panic) => {
                return Err(Error::plugin_import(
                    name,
                    format!("import panicked: {}", panic_message(&panic)),
                ))
            }
        };

        let ImportedPlugin {
            plugin,
            version,
            description,
            settings,
            permissions: declared,
        } = imported;

        self.update(name, |d| {
            d.transition(PluginState::Loaded);
            d.version = version;
            d.description = description;
        });

        let ctx = PluginContext::new(
            name,
            candidate.path.clone(),
            settings,
            self.transport.clone(),
            Arc::clone(&self.permissions),
        );

        let (routes, mut sources) = std::panic::catch_unwind(AssertUnwindSafe(|| {
            plugin.routes(&ctx).map(|routes| (routes, plugin.permissions()))
        }))
        .map_err(|panic| {
            Error::plugin_mount(name, format!("panicked while mounting: {}", panic_message(&panic)))
        })??;
        sources.extend(declared);

        let staged = self.routes.stage_mount(name, routes)?;
        self.check_fragment(name, &sources)?;

        match AssertUnwindSafe(plugin.on_enable(&ctx)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(Error::plugin_mount(name, format!("on_enable failed: {}", err)))
            }
            Err(panic) => {
                return Err(Error::plugin_mount(
                    name,
                    format!("on_enable panicked: {}", panic_message(&panic)),
                ))
            }
        }

        if let Err(err) = self.commit_mount(name, &sources, staged) {
            run_on_disable(name, &plugin, &ctx).await;
            return Err(err);
        }

        if let Some(previous) = state
            .live
            .insert(name.to_string(), LivePlugin { plugin, ctx })
        {
            run_on_disable(name, &previous.plugin, &previous.ctx).await;
        }
        Ok(())
    }

    /// 권한 조각 충돌 검사 (커밋하지 않음)
    fn check_fragment(&self, name: &str, sources: &[Arc<dyn FieldSource>]) -> Result<()> {
        let mut txn = self.permissions.begin();
        txn.replace_owner(&permission_prefix(name), sources.iter().map(|s| s.as_ref()))
    }

    /// 권한 스키마 커밋 후 라우터 발행
    fn commit_mount(
        &self,
        name: &str,
        sources: &[Arc<dyn FieldSource>],
        staged: StagedRoutes,
    ) -> Result<()> {
        let mut txn = self.permissions.begin();
        txn.replace_owner(&permission_prefix(name), sources.iter().map(|s| s.as_ref()))?;
        txn.commit();
        self.routes.publish(staged);
        Ok(())
    }

    async fn unmount_locked(&self, state: &mut LoaderState, name: &str) -> Result<()> {
        let Some(live) = state.live.remove(name) else {
            return Ok(());
        };

        if let Err(err) = self.commit_unmount(name) {
            state.live.insert(name.to_string(), live);
            return Err(err);
        }

        run_on_disable(name, &live.plugin, &live.ctx).await;
        Ok(())
    }

    fn commit_unmount(&self, name: &str) -> Result<()> {
        let staged = self.routes.stage_unmount(name)?;
        let mut txn = self.permissions.begin();
        txn.remove_owner(&permission_prefix(name));
        txn.commit();
        self.routes.publish(staged);
        Ok(())
    }

    // ========================================================================
    // 디스크립터
    // ========================================================================

    fn require(&self, name: &str) -> Result<PluginDescriptor> {
        self.get(name)
            .ok_or_else(|| Error::NotFound(format!("plugin {}", name)))
    }

    fn update<F>(&self, name: &str, f: F) -> Option<PluginDescriptor>
    where
        F: FnOnce(&mut PluginDescriptor),
    {
        let mut descriptors = self.descriptors.write();
        let descriptor = descriptors.get_mut(name)?;
        f(descriptor);
        Some(descriptor.clone())
    }

    fn restore(&self, records: &BTreeMap<String, PluginRecord>) {
        let mut descriptors = self.descriptors.write();
        for (name, record) in records {
            descriptors
                .entry(name.clone())
                .or_insert_with(|| record.to_descriptor(name));
        }
    }

    fn mark_missing(&self, name: &str) {
        self.update(name, |d| {
            d.fail(SOURCE_MISSING);
            d.mounted = false;
        });
        warn!("[PluginLoader] {}: {}", name, SOURCE_MISSING);
        self.events.emit(LoaderEvent::Failed {
            name: name.to_string(),
            error: SOURCE_MISSING.to_string(),
        });
    }

    /// 마운트되어 있지만 희망 상태가 꺼진 플러그인
    fn unwanted(&self, state: &LoaderState) -> Vec<String> {
        let descriptors = self.descriptors.read();
        let mut names: Vec<String> = state
            .live
            .keys()
            .filter(|name| descriptors.get(name.as_str()).is_some_and(|d| !d.enabled))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// 희망 상태가 enabled 인 후보
    fn wanted(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        let descriptors = self.descriptors.read();
        candidates
            .iter()
            .filter(|c| descriptors.get(&c.name).is_some_and(|d| d.enabled))
            .cloned()
            .collect()
    }

    async fn scan_locked(&self) -> Result<ScanResult> {
        let candidates = self.source.scan().await?;
        Ok(self.merge_scan(candidates))
    }

    fn merge_scan(&self, candidates: Vec<Candidate>) -> ScanResult {
        let mut descriptors = self.descriptors.write();
        let mut result = ScanResult::default();

        for candidate in &candidates {
            match descriptors.get_mut(&candidate.name) {
                Some(existing) => {
                    if existing.path != candidate.path {
                        existing.path = candidate.path.clone();
                    }
                }
                None => {
                    descriptors.insert(
                        candidate.name.clone(),
                        PluginDescriptor::discovered(&candidate.name, candidate.path.clone()),
                    );
                    result.new.push(candidate.name.clone());
                }
            }
        }

        let present: HashSet<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        result.missing = descriptors
            .keys()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect();
        drop(descriptors);

        result.candidates = candidates;
        result
    }

    /// 저장 파일이 마지막 저장 이후 바뀌었으면 enabled 플래그를 병합
    ///
    /// 파일이 사라졌으면 모든 희망 상태가 꺼진 것으로 본다.
    async fn sync_from_store(&self) -> Result<()> {
        let records = self.store.load().await?;
        let flags = enabled_flags(&records);
        let previous = std::mem::replace(&mut *self.on_disk.lock(), flags.clone());
        if previous == flags {
            return Ok(());
        }

        let mut descriptors = self.descriptors.write();
        for (name, record) in &records {
            if previous.get(name) == Some(&record.enabled) {
                continue;
            }
            match descriptors.get_mut(name) {
                Some(descriptor) => descriptor.enabled = record.enabled,
                None => {
                    descriptors.insert(name.clone(), record.to_descriptor(name));
                }
            }
            info!(
                "[PluginLoader] store edited: {} enabled={}",
                name, record.enabled
            );
        }
        for name in previous.keys().filter(|name| !records.contains_key(*name)) {
            if let Some(descriptor) = descriptors.get_mut(name) {
                descriptor.enabled = false;
            }
            info!("[PluginLoader] store edited: {} removed", name);
        }
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let records: BTreeMap<String, PluginRecord> = self
            .descriptors
            .read()
            .iter()
            .map(|(name, d)| (name.clone(), PluginRecord::from(d)))
            .collect();
        self.store.save(&records).await?;
        *self.on_disk.lock() = enabled_flags(&records);
        Ok(())
    }
}

fn enabled_flags(records: &BTreeMap<String, PluginRecord>) -> BTreeMap<String, bool> {
    records
        .iter()
        .map(|(name, record)| (name.clone(), record.enabled))
        .collect()
}

async fn run_on_disable(name: &str, plugin: &Arc<dyn Plugin>, ctx: &PluginContext) {
    match AssertUnwindSafe(plugin.on_disable(ctx)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("[PluginLoader] {} on_disable failed: {}", name, err),
        Err(panic) => warn!(
            "[PluginLoader] {} on_disable panicked: {}",
            name,
            panic_message(&panic)
        ),
    }
}
