//! 서브커맨드 구현

use anyhow::Context;
use aranes_core::{Kernel, MemoryIdentityStore, PluginRegistryStore};
use aranes_foundation::{CoreConfig, JsonStore, CORE_CONFIG_FILE};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 리스너 실행
pub async fn serve(dir: &Path, bind: SocketAddr, users: &[String]) -> anyhow::Result<()> {
    let config = load_config(dir)?;
    if config.secret_key == aranes_foundation::DEFAULT_SECRET_KEY {
        warn!("Using the default secret key; set ARANES_SECRET_KEY in production");
    }

    let identities = MemoryIdentityStore::new();
    for user in users {
        let (name, password) = user
            .split_once(':')
            .with_context(|| format!("--user expects name:password, got '{}'", user))?;
        identities.add_user(name, password, Vec::new());
    }

    let kernel = Kernel::builder(config)
        .with_identities(Arc::new(identities))
        .build()?;
    let summary = kernel.start().await?;
    if summary.failed > 0 {
        for descriptor in kernel.loader().list() {
            if let Some(error) = &descriptor.last_error {
                warn!("Plugin {} failed: {}", descriptor.name, error);
            }
        }
    }

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, kernel.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

/// 기본 설정 파일 생성
pub fn init(dir: &Path, force: bool) -> anyhow::Result<()> {
    let store = JsonStore::new(dir);
    if store.exists(CORE_CONFIG_FILE) && !force {
        println!("✓ {} already exists.", store.file_path(CORE_CONFIG_FILE).display());
        println!("  Use --force to overwrite.");
        return Ok(());
    }

    let config = CoreConfig::new();
    store.save(CORE_CONFIG_FILE, &config)?;
    std::fs::create_dir_all(dir.join(&config.plugins_dir))?;

    println!("  Created {}", store.file_path(CORE_CONFIG_FILE).display());
    println!("  Plugins directory: {}", dir.join(&config.plugins_dir).display());
    Ok(())
}

/// 저장된 플러그인 상태 출력
pub async fn plugins(dir: &Path) -> anyhow::Result<()> {
    let config = load_config(dir)?;
    let store = PluginRegistryStore::new(config.state_file_path());
    let records = store.load().await?;

    if records.is_empty() {
        println!("No plugins recorded in {}.", store.path().display());
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:<8} {:<10} {:<6}",
        "Name", "State", "Enabled", "Version", "Gen"
    );
    println!("{}", "-".repeat(60));

    for (name, record) in &records {
        println!(
            "{:<20} {:<12} {:<8} {:<10} {:<6}",
            name,
            record.metadata.state.as_str(),
            record.enabled,
            record.metadata.version.as_deref().unwrap_or("-"),
            record.metadata.mount_generation
        );
        if let Some(error) = &record.metadata.last_error {
            println!("    └─ {}", error);
        }
    }
    Ok(())
}

/// 상대 경로는 설정 디렉토리 기준
fn load_config(dir: &Path) -> anyhow::Result<CoreConfig> {
    let mut config = CoreConfig::load(dir).context("failed to load configuration")?;
    if config.plugins_dir.is_relative() {
        config.plugins_dir = dir.join(&config.plugins_dir);
    }
    if let Some(file) = config.state_file.as_mut().filter(|f| f.is_relative()) {
        *file = dir.join(&*file);
    }
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
