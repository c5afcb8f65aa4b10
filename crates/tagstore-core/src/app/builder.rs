//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - グローバル状態を持たない: App は起動時に作られ、終了時に drop される

use std::sync::Arc;
use tokio::sync::Mutex;

use super::auditor_loop::AuditorLoop;
use super::service::TaskService;
use crate::config::CoreConfig;
use crate::healing::SelfHealingAuditor;
use crate::impls::JsonFileTaskStore;
use crate::locks::TagLockManager;
use crate::moves::MoveEngine;
use crate::ports::{Clock, FileRegenerator, SystemClock, TaskStore};
use crate::resilience::ResilienceWrapper;

/// AppBuilder は App を構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .config(config)
///     .json_file_store()
///     .file_regenerator(Arc::new(MyRegenerator))
///     .build()?;
/// app.service().move_within_tag(None, "5", "7", true).await?;
/// ```
///
/// # Fail-fast 設計
/// - store が未設定なら BuildError::MissingStore
/// - 動作しない設定値（poll 間隔 0 など）は BuildError::InvalidConfig
#[derive(Default)]
pub struct AppBuilder {
    config: CoreConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn TaskStore>>,
    json_file_store: bool,
    regenerator: Option<Arc<dyn FileRegenerator>>,
    auditor: Option<SelfHealingAuditor>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no task store configured; call store() or json_file_store()")]
    MissingStore,

    #[error("invalid config value {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl AppBuilder {
    /// 新しい AppBuilder を作成（設定はすべてデフォルト）
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persist to `config.store.path`. Also installs the self-healing auditor
    /// for that file unless `healing.enabled` is off.
    pub fn json_file_store(mut self) -> Self {
        self.json_file_store = true;
        self
    }

    pub fn file_regenerator(mut self, regenerator: Arc<dyn FileRegenerator>) -> Self {
        self.regenerator = Some(regenerator);
        self
    }

    /// Use this auditor instead of the one derived from the config.
    pub fn auditor(mut self, auditor: SelfHealingAuditor) -> Self {
        self.auditor = Some(auditor);
        self
    }

    /// AppBuilder を検証して App を生成
    pub fn build(self) -> Result<App, BuildError> {
        validate(&self.config)?;
        let config = self.config;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let store: Arc<dyn TaskStore> = match (self.store, self.json_file_store) {
            (Some(store), _) => store,
            (None, true) => Arc::new(JsonFileTaskStore::new(config.store.path.clone())),
            (None, false) => return Err(BuildError::MissingStore),
        };

        // request path と auditor が同じ gate で read-modify-write を直列化する
        let gate = Arc::new(Mutex::new(()));
        let auditor = match self.auditor {
            Some(auditor) => Some(auditor),
            None if self.json_file_store && config.healing.enabled => Some(
                SelfHealingAuditor::new(config.store.path.clone(), Arc::clone(&clock))
                    .with_recreate_on_corrupt(config.healing.recreate_on_corrupt),
            ),
            None => None,
        }
        .map(|auditor| Arc::new(auditor.with_gate(Arc::clone(&gate))));

        let locks = Arc::new(TagLockManager::new(
            config.lock_poll_interval(),
            Arc::clone(&clock),
        ));
        let resilience = Arc::new(ResilienceWrapper::new(
            config.retry_policy(),
            config.breaker_policy(),
            Arc::clone(&clock),
        ));

        let service = TaskService {
            store,
            locks: Arc::clone(&locks),
            resilience: Arc::clone(&resilience),
            engine: MoveEngine::new(Arc::clone(&clock)),
            regenerator: self.regenerator,
            auditor: auditor.clone(),
            clock: Arc::clone(&clock),
            lock_timeout: config.lock_timeout(),
            gate,
        };

        Ok(App {
            config,
            clock,
            locks,
            resilience,
            auditor,
            service,
        })
    }
}

fn validate(config: &CoreConfig) -> Result<(), BuildError> {
    let invalid = |field, reason: &str| {
        Err(BuildError::InvalidConfig {
            field,
            reason: reason.to_string(),
        })
    };
    if config.locks.poll_interval_ms == 0 {
        return invalid("locks.poll_interval_ms", "must be greater than zero");
    }
    if config.breaker.failure_threshold == 0 {
        return invalid("breaker.failure_threshold", "must be at least 1");
    }
    if config.retry.multiplier.is_nan() || config.retry.multiplier < 1.0 {
        return invalid("retry.multiplier", "must be at least 1.0");
    }
    if config.healing.enabled && config.healing.interval_secs == 0 {
        return invalid("healing.interval_secs", "must be greater than zero");
    }
    Ok(())
}

/// App はアプリケーションのコンテキスト
///
/// Owns every long-lived component. Request paths go through
/// [`App::service`]; the periodic auditor is started separately with
/// [`App::spawn_auditor_loop`].
pub struct App {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    locks: Arc<TagLockManager>,
    resilience: Arc<ResilienceWrapper>,
    auditor: Option<Arc<SelfHealingAuditor>>,
    service: TaskService,
}

impl App {
    pub fn service(&self) -> &TaskService {
        &self.service
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn locks(&self) -> &Arc<TagLockManager> {
        &self.locks
    }

    pub fn resilience(&self) -> &Arc<ResilienceWrapper> {
        &self.resilience
    }

    pub fn auditor(&self) -> Option<&Arc<SelfHealingAuditor>> {
        self.auditor.as_ref()
    }

    /// Start the periodic audit. `None` when no auditor is installed.
    pub fn spawn_auditor_loop(&self) -> Option<AuditorLoop> {
        let auditor = self.auditor.as_ref()?;
        Some(AuditorLoop::spawn(
            Arc::clone(auditor),
            self.config.healing_interval(),
        ))
    }
}
