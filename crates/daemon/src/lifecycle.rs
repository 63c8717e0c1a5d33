// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, shutdown.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use rl_adapters::{JsonlReportSink, LogNotifyAdapter, TracedNotifyAdapter, TracedReportSink};
use rl_audit::{AuditLogChain, AuditLogError, AuditLogger, AuditStore, ChainKey, JsonlAuditStore};
use rl_core::{BusConfig, ConfigError, EventWorker};
use rl_engine::{
    AuditTrailWorker, EventBus, EventBusError, InMemoryEventBus, NotificationWorker,
    ReportingWorker, RiskAlertWorker, SharedStream, StreamEventBus,
};
use rl_storage::StreamError;
use serde::Deserialize;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Which bus implementation the daemon runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Stream,
}

/// `relay.toml` as written by operators
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    daemon: DaemonSection,
    bus: BusConfig,
    audit: AuditSection,
    workers: WorkerToggles,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct DaemonSection {
    state_dir: Option<PathBuf>,
    socket_path: Option<PathBuf>,
    backend: Backend,
    consumer_name: Option<String>,
    #[serde(with = "humantime_serde")]
    health_interval: Duration,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            state_dir: None,
            socket_path: None,
            backend: Backend::default(),
            consumer_name: None,
            health_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct AuditSection {
    key_env: String,
    store_path: PathBuf,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            key_env: "RELAY_AUDIT_KEY".to_string(),
            store_path: PathBuf::from("audit.jsonl"),
        }
    }
}

/// Which example workers to register
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerToggles {
    pub risk_alert: bool,
    pub notification: bool,
    pub reporting: bool,
    pub audit_trail: bool,
    pub reporting_batch_size: usize,
}

impl Default for WorkerToggles {
    fn default() -> Self {
        Self {
            risk_alert: true,
            notification: true,
            reporting: true,
            audit_trail: true,
            reporting_batch_size: 100,
        }
    }
}

/// Resolved daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Event stream file, used by the stream backend
    pub stream_path: PathBuf,
    /// Reporting rows written by the reporting worker
    pub report_path: PathBuf,
    pub audit_path: PathBuf,
    /// Environment variable holding the audit chain secret
    pub audit_key_env: String,
    pub backend: Backend,
    pub consumer_name: Option<String>,
    pub health_interval: Duration,
    pub bus: BusConfig,
    pub workers: WorkerToggles,
}

impl Config {
    /// Load `path`, or `relay.toml` in the working directory if it exists,
    /// or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, LifecycleError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };
        let Some(path) = path else {
            return Self::from_toml("");
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| LifecycleError::ConfigRead(path.clone(), e))?;
        info!(path = %path.display(), "loading config");
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, LifecycleError> {
        let file: FileConfig = toml::from_str(content)?;
        file.bus.validate()?;
        if file.daemon.health_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "daemon.health_interval must be greater than zero".to_string(),
            )
            .into());
        }

        let state_dir = match file.daemon.state_dir {
            Some(dir) => dir,
            None => state_dir()?,
        };
        let resolve = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                state_dir.join(p)
            }
        };

        Ok(Self {
            socket_path: resolve(
                file.daemon
                    .socket_path
                    .unwrap_or_else(|| PathBuf::from("relay.sock")),
            ),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            stream_path: state_dir.join("stream").join("events.jsonl"),
            report_path: state_dir.join("reports").join("rows.jsonl"),
            audit_path: resolve(file.audit.store_path),
            audit_key_env: file.audit.key_env,
            backend: file.daemon.backend,
            consumer_name: file.daemon.consumer_name,
            health_interval: file.daemon.health_interval,
            bus: file.bus,
            workers: file.workers,
            state_dir,
        })
    }
}

/// Audit logger over the on-disk chain
pub type DaemonAuditLogger = AuditLogger<JsonlAuditStore>;

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// Unix socket listener
    pub listener: UnixListener,
    pub bus: Arc<dyn EventBus>,
    /// Present when the audit trail worker is enabled
    pub audit: Option<DaemonAuditLogger>,
    /// When daemon started
    pub start_time: Instant,
    /// Shutdown requested flag
    pub shutdown_requested: bool,
}

impl DaemonState {
    /// Stop the bus, then remove the socket and lock files
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        let report = self.bus.stop().await;
        if !report.drained_cleanly {
            warn!(
                cancelled = report.cancelled,
                "deliveries were cancelled at shutdown and dead-lettered"
            );
        }

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to read config {0}: {1}")]
    ConfigRead(PathBuf, std::io::Error),

    #[error("Invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    BusConfig(#[from] ConfigError),

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit key not set: export {0} (at least 32 bytes)")]
    MissingAuditKey(String),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditLogError),

    #[error("Audit chain at {0} failed verification")]
    AuditChainBroken(PathBuf),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Bus error: {0}")]
    Bus(#[from] EventBusError),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // Another daemon owns the socket and lock file
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            // Clean up any resources created before failure
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory (needed for socket, lock, etc.)
    std::fs::create_dir_all(&config.state_dir)?;
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 2. Acquire lock file FIRST - prevents races
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    // Write PID to lock file
    use std::io::Write;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Open and verify the audit chain before anything can be published
    let audit = if config.workers.audit_trail {
        Some(open_audit(config).await?)
    } else {
        None
    };

    // 4. Build the bus and its workers
    let workers = build_workers(config, audit.as_ref());
    let bus = build_bus(config, workers).await?;

    // 5. Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = match UnixListener::bind(&config.socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            bus.stop().await;
            return Err(LifecycleError::BindFailed(config.socket_path.clone(), e));
        }
    };

    info!(
        backend = ?config.backend,
        workers = bus.workers().len(),
        "Daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        bus,
        audit,
        start_time: Instant::now(),
        shutdown_requested: false,
    })
}

async fn open_audit(config: &Config) -> Result<DaemonAuditLogger, LifecycleError> {
    let secret = std::env::var(&config.audit_key_env)
        .map_err(|_| LifecycleError::MissingAuditKey(config.audit_key_env.clone()))?;
    let key = ChainKey::new(secret.as_bytes())?;

    let store = JsonlAuditStore::open(&config.audit_path)?;
    let chain = AuditLogChain::open(key, store).await?;
    if !chain.verify().await? {
        return Err(LifecycleError::AuditChainBroken(config.audit_path.clone()));
    }
    info!(
        path = %config.audit_path.display(),
        entries = chain.store().count().await?,
        "audit chain verified"
    );
    Ok(AuditLogger::new(Arc::new(chain)))
}

fn build_workers(config: &Config, audit: Option<&DaemonAuditLogger>) -> Vec<Arc<dyn EventWorker>> {
    let toggles = &config.workers;
    let notifier = TracedNotifyAdapter::new(LogNotifyAdapter::new());
    let mut workers: Vec<Arc<dyn EventWorker>> = Vec::new();

    if toggles.risk_alert {
        workers.push(Arc::new(RiskAlertWorker::new(notifier.clone())));
    }
    if toggles.notification {
        workers.push(Arc::new(NotificationWorker::new(notifier)));
    }
    if toggles.reporting {
        let sink = TracedReportSink::new(JsonlReportSink::new(config.report_path.clone()));
        workers.push(Arc::new(
            ReportingWorker::new(sink).with_batch_size(toggles.reporting_batch_size),
        ));
    }
    if let Some(logger) = audit {
        workers.push(Arc::new(AuditTrailWorker::new(logger.clone())));
    }
    workers
}

async fn build_bus(
    config: &Config,
    workers: Vec<Arc<dyn EventWorker>>,
) -> Result<Arc<dyn EventBus>, LifecycleError> {
    let bus: Arc<dyn EventBus> = match config.backend {
        Backend::Memory => {
            let bus = InMemoryEventBus::new(config.bus.clone());
            for worker in workers {
                bus.register_worker(worker).await?;
            }
            Arc::new(bus)
        }
        Backend::Stream => {
            let stream = SharedStream::open(&config.stream_path)?;
            info!(
                path = %config.stream_path.display(),
                entries = stream.len(),
                "event stream opened"
            );
            let mut bus = StreamEventBus::new(stream, config.bus.clone());
            if let Some(name) = &config.consumer_name {
                bus = bus.with_consumer_name(name.as_str());
            }
            for worker in workers {
                bus.register_worker(worker).await?;
            }
            Arc::new(bus)
        }
    };
    bus.start().await?;
    Ok(bus)
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

/// Get the state directory for relay
fn state_dir() -> Result<PathBuf, LifecycleError> {
    // Use XDG_STATE_HOME or default to ~/.local/state
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("relay"));
    }

    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/relay"))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
