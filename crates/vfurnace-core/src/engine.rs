//! Engine lifecycle: build, load, tick, shut down.
//!
//! Tables and hooks are configured on an [`EngineBuilder`], then frozen when
//! [`EngineBuilder::initialize`] produces an [`EngineHandle`]. The tables
//! cannot be extended after that point. The handle owns the manager and the
//! scheduler and lives exactly as long as the engine.
//!
//! ```rust,ignore
//! let mut builder = EngineBuilder::new(EngineConfig::default())
//!     .with_store(Arc::new(DirStore::open("machines")?));
//! builder.hooks_mut().on_veto(ProposalKind::Ignite, Box::new(|_| Verdict::Allow));
//! let engine = builder.initialize()?;
//! let id = engine.manager().create(MachineKind::Furnace, None)?;
//! engine.tick()?;
//! engine.shutdown(false)?;
//! ```

use crate::config::{ConfigError, EngineConfig};
use crate::event::HookBus;
use crate::manager::{LoadReport, MachineManager, ManagerError};
use crate::scheduler::{Scheduler, SchedulerError, TickDriver, TickReport};
use crate::store::{MachineStore, MemoryStore};
use crate::table::{TableBuilder, TableError, Tables};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("table error: {0}")]
    Table(#[from] TableError),
    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// A failed [`EngineHandle::shutdown`]. The engine is handed back with its
/// machines still live, so the caller can retry or keep running it.
#[derive(Debug, thiserror::Error)]
#[error("shutdown failed: {error}")]
pub struct ShutdownError {
    #[source]
    pub error: EngineError,
    pub handle: Box<EngineHandle>,
}

impl ShutdownError {
    /// Take the engine back.
    pub fn into_handle(self) -> EngineHandle {
        *self.handle
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct EngineBuilder {
    config: EngineConfig,
    tables: TableBuilder,
    hooks: HookBus,
    store: Option<Arc<dyn MachineStore>>,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("tables", &self.tables)
            .field("hooks", &self.hooks)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl EngineBuilder {
    /// A builder preloaded with the vanilla fuel and recipe tables.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_tables(config, TableBuilder::vanilla())
    }

    pub fn with_tables(config: EngineConfig, tables: TableBuilder) -> Self {
        Self {
            config,
            tables,
            hooks: HookBus::new(),
            store: None,
        }
    }

    /// Persist to `store`. Defaults to an in-memory store.
    pub fn with_store(mut self, store: Arc<dyn MachineStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register additional fuels, recipes and tags.
    pub fn tables_mut(&mut self) -> &mut TableBuilder {
        &mut self.tables
    }

    /// Register veto hooks and listeners.
    pub fn hooks_mut(&mut self) -> &mut HookBus {
        &mut self.hooks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Freeze tables and hooks, load the store and return a running engine.
    pub fn initialize(self) -> Result<EngineHandle, EngineError> {
        let Self {
            config,
            tables,
            mut hooks,
            store,
        } = self;
        let tables = Arc::new(tables.build()?);
        hooks.set_failure_policy(config.hook_failure_policy);
        let hooks = Arc::new(hooks);
        let store = store.unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let manager = Arc::new(MachineManager::new(store, &config));
        let load_report = manager.load_all()?;
        let scheduler = Arc::new(Scheduler::new(
            manager.clone(),
            tables.clone(),
            hooks.clone(),
            config.tick_checkpoint_period,
        ));

        if !config.start_silently {
            tracing::info!(
                machines = manager.len(),
                fuels = tables.fuel_count(),
                checkpoint_period = config.tick_checkpoint_period,
                "furnace engine initialized"
            );
        }

        Ok(EngineHandle {
            config,
            tables,
            hooks,
            manager,
            scheduler,
            driver: None,
            load_report,
        })
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A running engine.
#[derive(Debug)]
pub struct EngineHandle {
    config: EngineConfig,
    tables: Arc<Tables>,
    hooks: Arc<HookBus>,
    manager: Arc<MachineManager>,
    scheduler: Arc<Scheduler>,
    driver: Option<TickDriver>,
    load_report: LoadReport,
}

impl EngineHandle {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tables(&self) -> &Arc<Tables> {
        &self.tables
    }

    pub fn manager(&self) -> &Arc<MachineManager> {
        &self.manager
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// What the startup load found in the store.
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// Run one tick on the calling thread.
    pub fn tick(&self) -> Result<TickReport, SchedulerError> {
        self.scheduler.tick()
    }

    /// Move ticking onto a background thread driven by [`pulse`].
    /// A no-op if the driver is already running.
    ///
    /// [`pulse`]: EngineHandle::pulse
    pub fn start_driver(&mut self) -> Result<(), EngineError> {
        if self.driver.is_none() {
            self.driver = Some(TickDriver::spawn(self.scheduler.clone())?);
        }
        Ok(())
    }

    /// Queue one tick on the background driver. Returns false if no driver
    /// is running.
    pub fn pulse(&self) -> bool {
        self.driver.as_ref().is_some_and(TickDriver::pulse)
    }

    /// Stop ticking. Returns after the in-flight tick completes.
    pub fn stop_ticking(&mut self) {
        match self.driver.take() {
            Some(mut driver) => driver.stop(),
            None => self.scheduler.stop(),
        }
    }

    /// Replace a stopped scheduler with a fresh one bound to the same
    /// manager, continuing the tick count.
    pub fn restart_ticking(&mut self) {
        self.stop_ticking();
        self.scheduler = Arc::new(Scheduler::resuming(
            self.manager.clone(),
            self.tables.clone(),
            self.hooks.clone(),
            self.config.tick_checkpoint_period,
            self.scheduler.current_tick(),
        ));
    }

    /// Stop ticking, then persist (or clear, when `clear_persisted_data` is
    /// set) and release every machine.
    ///
    /// On failure the handle comes back inside the error with every machine
    /// still live and ticking stopped. Call [`restart_ticking`] to resume, or
    /// retry the shutdown.
    ///
    /// [`restart_ticking`]: EngineHandle::restart_ticking
    pub fn shutdown(mut self, clear_persisted_data: bool) -> Result<(), ShutdownError> {
        self.stop_ticking();
        if let Err(e) = self.manager.shutdown(clear_persisted_data) {
            return Err(ShutdownError {
                error: e.into(),
                handle: Box::new(self),
            });
        }
        if !self.config.start_silently {
            tracing::info!(tick = self.scheduler.current_tick(), "furnace engine shut down");
        }
        Ok(())
    }

    /// [`shutdown`](Self::shutdown) using `clear_store_on_shutdown` from the
    /// config.
    pub fn shutdown_default(self) -> Result<(), ShutdownError> {
        let clear = self.config.clear_store_on_shutdown;
        self.shutdown(clear)
    }
}

/// Start an engine with vanilla tables, no hooks and the given store.
pub fn initialize(config: EngineConfig, store: Arc<dyn MachineStore>) -> Result<EngineHandle, EngineError> {
    EngineBuilder::new(config).with_store(store).initialize()
}

/// Shut an engine down. See [`EngineHandle::shutdown`].
pub fn shutdown(handle: EngineHandle, clear_persisted_data: bool) -> Result<(), ShutdownError> {
    handle.shutdown(clear_persisted_data)
}
