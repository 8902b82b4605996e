//! The logical tick driver.
//!
//! [`Scheduler::tick`] advances every live machine by one tick, strictly
//! serialized against other ticks of the same manager. The set of machines is
//! snapshotted when the tick starts: machines created mid-tick wait for the
//! next tick, and machines destroyed mid-tick are skipped.
//!
//! [`TickDriver`] runs a scheduler on its own thread, one tick per pulse
//! from the host.

use crate::event::HookBus;
use crate::fixed::Ticks;
use crate::id::MachineId;
use crate::manager::MachineManager;
use crate::table::Tables;
use crate::transition::{TickContext, TransitionResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, PoisonError};
use std::thread::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler has been stopped")]
    Stopped,
    #[error("machine manager is shut down")]
    ManagerShutDown,
    #[error("failed to spawn tick driver thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Ticks,
    /// Machines advanced this tick.
    pub machines: usize,
    /// Ids from the snapshot that were destroyed before their turn.
    pub skipped: usize,
    pub ignited: usize,
    pub completed: usize,
    pub events: usize,
    /// Whether a checkpoint ran and succeeded at the end of this tick.
    pub checkpointed: bool,
}

pub struct Scheduler {
    manager: Arc<MachineManager>,
    tables: Arc<Tables>,
    hooks: Arc<HookBus>,
    checkpoint_period: u64,
    tick: AtomicU64,
    stopped: AtomicBool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick", &self.current_tick())
            .field("checkpoint_period", &self.checkpoint_period)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// A scheduler starting at tick zero. `checkpoint_period` of zero
    /// disables checkpoints.
    pub fn new(
        manager: Arc<MachineManager>,
        tables: Arc<Tables>,
        hooks: Arc<HookBus>,
        checkpoint_period: u64,
    ) -> Self {
        Self::resuming(manager, tables, hooks, checkpoint_period, 0)
    }

    /// A scheduler whose first tick is `last_tick + 1`. Used to replace a
    /// stopped scheduler without restarting the tick count.
    pub fn resuming(
        manager: Arc<MachineManager>,
        tables: Arc<Tables>,
        hooks: Arc<HookBus>,
        checkpoint_period: u64,
        last_tick: Ticks,
    ) -> Self {
        Self {
            manager,
            tables,
            hooks,
            checkpoint_period,
            tick: AtomicU64::new(last_tick),
            stopped: AtomicBool::new(false),
        }
    }

    /// The most recently started tick; zero before the first.
    pub fn current_tick(&self) -> Ticks {
        self.tick.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn manager(&self) -> &Arc<MachineManager> {
        &self.manager
    }

    /// Advance every live machine by one tick, deliver the tick's events and
    /// checkpoint when due.
    pub fn tick(&self) -> Result<TickReport, SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        let Some(_gate) = self.manager.enter_tick() else {
            return Err(SchedulerError::ManagerShutDown);
        };
        // stop() may have run while we waited on the gate.
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }

        let tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        let ids = self.manager.live_machines();
        let ctx = TickContext {
            tables: &self.tables,
            hooks: &self.hooks,
            tick,
        };
        let results = self.advance_all(&ids, &ctx);

        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        let mut events = Vec::new();
        for result in results {
            let Some(result) = result else {
                report.skipped += 1;
                continue;
            };
            report.machines += 1;
            report.ignited += usize::from(result.ignited);
            report.completed += usize::from(result.completed);
            events.extend(result.events);
        }
        report.events = events.len();
        self.hooks.deliver(&events);

        if self.checkpoint_period > 0 && tick % self.checkpoint_period == 0 {
            match self.manager.persist_all() {
                Ok(count) => {
                    tracing::debug!(tick, count, "checkpoint written");
                    report.checkpointed = true;
                }
                Err(e) => tracing::warn!(tick, error = %e, "checkpoint failed"),
            }
        }
        Ok(report)
    }

    #[cfg(not(feature = "parallel"))]
    fn advance_all(&self, ids: &[MachineId], ctx: &TickContext<'_>) -> Vec<Option<TransitionResult>> {
        ids.iter().map(|id| self.advance_one(*id, ctx)).collect()
    }

    #[cfg(feature = "parallel")]
    fn advance_all(&self, ids: &[MachineId], ctx: &TickContext<'_>) -> Vec<Option<TransitionResult>> {
        use rayon::prelude::*;
        ids.par_iter().map(|id| self.advance_one(*id, ctx)).collect()
    }

    fn advance_one(&self, id: MachineId, ctx: &TickContext<'_>) -> Option<TransitionResult> {
        let cell = self.manager.resolve(id)?;
        let mut state = cell.lock().unwrap_or_else(PoisonError::into_inner);
        Some(state.advance(ctx))
    }

    /// Stop the scheduler. Returns once any in-flight tick has completed;
    /// every later `tick` call fails with [`SchedulerError::Stopped`].
    ///
    /// Events are delivered inside the tick, so calling this from a listener
    /// deadlocks.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.manager.wait_for_tick();
    }
}

// ---------------------------------------------------------------------------
// TickDriver
// ---------------------------------------------------------------------------

/// Runs a [`Scheduler`] on a dedicated thread, one tick per [`pulse`].
///
/// [`pulse`]: TickDriver::pulse
pub struct TickDriver {
    scheduler: Arc<Scheduler>,
    pulses: Option<mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TickDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriver")
            .field("scheduler", &self.scheduler)
            .field("running", &self.join.is_some())
            .finish()
    }
}

impl TickDriver {
    pub fn spawn(scheduler: Arc<Scheduler>) -> Result<Self, SchedulerError> {
        let (tx, rx) = mpsc::channel::<()>();
        let worker = scheduler.clone();
        let join = std::thread::Builder::new()
            .name("vfurnace-tick".into())
            .spawn(move || drive(&worker, &rx))
            .map_err(SchedulerError::Spawn)?;
        Ok(Self {
            scheduler,
            pulses: Some(tx),
            join: Some(join),
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Request one tick. Returns false once the driver has stopped.
    pub fn pulse(&self) -> bool {
        self.pulses.as_ref().is_some_and(|tx| tx.send(()).is_ok())
    }

    /// Stop the scheduler, wait for the in-flight tick and join the thread.
    /// Pulses still queued are discarded.
    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.pulses = None;
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("tick driver thread panicked");
            }
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drive(scheduler: &Scheduler, pulses: &mpsc::Receiver<()>) {
    for () in pulses {
        match scheduler.tick() {
            Ok(_) => {}
            Err(SchedulerError::Stopped) => break,
            Err(e) => {
                tracing::warn!(error = %e, "tick driver exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::item::ItemStack;
    use crate::machine::{FurnaceSlots, MachineKind, Slots};
    use crate::store::MemoryStore;
    use crate::table::TableBuilder;

    fn setup(period: u64) -> (Arc<MemoryStore>, Arc<MachineManager>, Scheduler) {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            start_silently: true,
            ..EngineConfig::default()
        };
        let manager = Arc::new(MachineManager::new(store.clone(), &config));
        let tables = Arc::new(TableBuilder::vanilla().build().unwrap());
        let scheduler = Scheduler::new(manager.clone(), tables, Arc::new(HookBus::new()), period);
        (store, manager, scheduler)
    }

    fn smelting() -> Option<Slots> {
        Some(Slots::Furnace(FurnaceSlots {
            input: Some(ItemStack::one("iron_ore")),
            fuel: Some(ItemStack::one("coal")),
            output: None,
        }))
    }

    #[test]
    fn tick_advances_every_machine() {
        let (_, manager, scheduler) = setup(0);
        let a = manager.create(MachineKind::Furnace, smelting()).unwrap();
        let b = manager.create(MachineKind::Furnace, smelting()).unwrap();
        let report = scheduler.tick().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.machines, 2);
        assert_eq!(report.ignited, 2);
        for id in [a, b] {
            assert_eq!(manager.get(id).unwrap().snapshot().unwrap().progress(), 1);
        }
    }

    #[test]
    fn checkpoint_runs_on_period() {
        let (store, manager, scheduler) = setup(3);
        manager.create(MachineKind::Furnace, None).unwrap();
        assert!(!scheduler.tick().unwrap().checkpointed);
        assert!(!scheduler.tick().unwrap().checkpointed);
        assert!(store.is_empty());
        assert!(scheduler.tick().unwrap().checkpointed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stopped_scheduler_refuses_ticks() {
        let (_, _, scheduler) = setup(0);
        scheduler.tick().unwrap();
        scheduler.stop();
        assert!(matches!(scheduler.tick(), Err(SchedulerError::Stopped)));
        assert_eq!(scheduler.current_tick(), 1);
    }

    #[test]
    fn fresh_scheduler_resumes_after_stop() {
        let (_, manager, scheduler) = setup(0);
        let id = manager.create(MachineKind::Furnace, smelting()).unwrap();
        scheduler.tick().unwrap();
        scheduler.stop();
        let next = Scheduler::resuming(
            manager.clone(),
            scheduler.tables.clone(),
            scheduler.hooks.clone(),
            0,
            scheduler.current_tick(),
        );
        assert_eq!(next.tick().unwrap().tick, 2);
        assert_eq!(manager.get(id).unwrap().snapshot().unwrap().progress(), 2);
    }

    #[test]
    fn tick_after_manager_shutdown_fails() {
        let (_, manager, scheduler) = setup(0);
        manager.shutdown(true).unwrap();
        assert!(matches!(scheduler.tick(), Err(SchedulerError::ManagerShutDown)));
    }

    #[test]
    fn driver_ticks_on_pulses_and_stops() {
        let (_, manager, scheduler) = setup(0);
        let id = manager.create(MachineKind::Furnace, smelting()).unwrap();
        let mut driver = TickDriver::spawn(Arc::new(scheduler)).unwrap();
        for _ in 0..5 {
            assert!(driver.pulse());
        }
        // Wait for the queued pulses before stopping.
        while driver.scheduler().current_tick() < 5 {
            std::thread::yield_now();
        }
        driver.stop();
        assert!(!driver.pulse());
        assert_eq!(manager.get(id).unwrap().snapshot().unwrap().progress(), 5);
    }
}
