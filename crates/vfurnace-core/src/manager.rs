//! Ownership of the live machine set and its persistence.
//!
//! The manager is the only long-lived owner of [`MachineState`]s. Each
//! machine sits behind its own mutex, so the tick, persistence snapshots and
//! collaborator edits exclude each other per machine without a global lock.
//! Collaborators hold a [`MachineHandle`], which re-resolves on every access
//! and fails softly once the machine is destroyed.

use crate::config::EngineConfig;
use crate::id::MachineId;
use crate::machine::{InvalidState, MachineKind, MachineState, Slots};
use crate::serialize::{self, EncodeError};
use crate::store::{MachineStore, StoreError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

pub(crate) type MachineCell = Arc<Mutex<MachineState>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("unknown machine id {0}")]
    UnknownMachineId(MachineId),
    #[error("machine capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },
    #[error("slots for {slots:?} given to a {kind:?}")]
    KindMismatch { kind: MachineKind, slots: MachineKind },
    #[error("invalid machine state: {0}")]
    Invalid(#[from] InvalidState),
    #[error("machine manager is shut down")]
    ShutDown,
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<StoreError> for ManagerError {
    fn from(e: StoreError) -> Self {
        ManagerError::Persistence(e.into())
    }
}

/// Outcome of [`MachineManager::load_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    /// Records that were corrupt, duplicated or over capacity.
    pub dropped: Vec<MachineId>,
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// A collaborator's reference to one machine. Does not keep it alive.
#[derive(Debug, Clone)]
pub struct MachineHandle {
    id: MachineId,
    cell: Weak<Mutex<MachineState>>,
}

impl MachineHandle {
    pub fn id(&self) -> MachineId {
        self.id
    }

    /// Whether the machine is still live.
    pub fn is_live(&self) -> bool {
        self.cell.strong_count() > 0
    }

    /// A consistent copy of the machine, or `None` if it was destroyed.
    pub fn snapshot(&self) -> Option<MachineState> {
        let cell = self.cell.upgrade()?;
        let state = cell.lock().unwrap_or_else(PoisonError::into_inner);
        Some(state.clone())
    }

    /// Edit the machine under its lock. The edit is rolled back if it leaves
    /// the machine invalid.
    pub fn modify<R>(&self, f: impl FnOnce(&mut MachineState) -> R) -> Result<R, ManagerError> {
        let cell = self.cell.upgrade().ok_or(ManagerError::UnknownMachineId(self.id))?;
        let mut state = cell.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.clone();
        let out = f(&mut state);
        if let Err(e) = state.validate() {
            *state = before;
            return Err(e.into());
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MachineManager
// ---------------------------------------------------------------------------

pub struct MachineManager {
    machines: RwLock<BTreeMap<MachineId, MachineCell>>,
    store: Arc<dyn MachineStore>,
    max_machines: usize,
    silent: bool,
    accepting: AtomicBool,
    /// Held for the duration of a tick, and by shutdown.
    tick_gate: Mutex<()>,
    /// Serializes writers to the store.
    persist_lock: Mutex<()>,
}

impl std::fmt::Debug for MachineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineManager")
            .field("live", &self.len())
            .field("max_machines", &self.max_machines)
            .field("accepting", &self.is_accepting())
            .finish_non_exhaustive()
    }
}

impl MachineManager {
    pub fn new(store: Arc<dyn MachineStore>, config: &EngineConfig) -> Self {
        Self {
            machines: RwLock::new(BTreeMap::new()),
            store,
            max_machines: config.max_machines,
            silent: config.start_silently,
            accepting: AtomicBool::new(true),
            tick_gate: Mutex::new(()),
            persist_lock: Mutex::new(()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<MachineId, MachineCell>> {
        self.machines.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<MachineId, MachineCell>> {
        self.machines.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Live set
    // -----------------------------------------------------------------------

    /// Register a new machine of `kind`, optionally with initial slots.
    pub fn create(&self, kind: MachineKind, slots: Option<Slots>) -> Result<MachineId, ManagerError> {
        let slots = slots.unwrap_or_else(|| Slots::empty(kind));
        if slots.kind() != kind {
            return Err(ManagerError::KindMismatch {
                kind,
                slots: slots.kind(),
            });
        }
        let state = MachineState::with_slots(MachineId::new(), slots);
        state.validate()?;
        self.insert(state)
    }

    /// Register an existing machine state, keeping its id and counters.
    pub fn adopt(&self, state: MachineState) -> Result<MachineId, ManagerError> {
        state.validate()?;
        self.insert(state)
    }

    fn insert(&self, state: MachineState) -> Result<MachineId, ManagerError> {
        if !self.is_accepting() {
            return Err(ManagerError::ShutDown);
        }
        let id = state.id();
        let mut machines = self.write();
        if machines.len() >= self.max_machines {
            return Err(ManagerError::CapacityExceeded {
                limit: self.max_machines,
            });
        }
        machines.insert(id, Arc::new(Mutex::new(state)));
        tracing::debug!(machine = %id, "machine created");
        Ok(id)
    }

    /// A handle to a live machine, or `None` if unknown or destroyed.
    pub fn get(&self, id: MachineId) -> Option<MachineHandle> {
        self.read().get(&id).map(|cell| MachineHandle {
            id,
            cell: Arc::downgrade(cell),
        })
    }

    /// Run `f` against a live machine under its lock.
    pub fn with_machine<R>(
        &self,
        id: MachineId,
        f: impl FnOnce(&mut MachineState) -> R,
    ) -> Result<R, ManagerError> {
        self.get(id).ok_or(ManagerError::UnknownMachineId(id))?.modify(f)
    }

    pub(crate) fn resolve(&self, id: MachineId) -> Option<MachineCell> {
        self.read().get(&id).cloned()
    }

    /// Remove a machine from the live set. Returns whether it was live;
    /// destroying an unknown id is a no-op.
    pub fn destroy(&self, id: MachineId) -> bool {
        let removed = self.write().remove(&id).is_some();
        if removed {
            tracing::debug!(machine = %id, "machine destroyed");
        }
        removed
    }

    /// Ids registered at call time, in id order.
    pub fn live_machines(&self) -> Vec<MachineId> {
        self.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -----------------------------------------------------------------------
    // Tick gate
    // -----------------------------------------------------------------------

    /// Enter the tick critical section. `None` once shut down.
    pub(crate) fn enter_tick(&self) -> Option<MutexGuard<'_, ()>> {
        if !self.is_accepting() {
            return None;
        }
        let gate = self.tick_gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.is_accepting().then_some(gate)
    }

    /// Block until no tick is in progress.
    pub(crate) fn wait_for_tick(&self) {
        drop(self.tick_gate.lock().unwrap_or_else(PoisonError::into_inner));
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write every live machine to the store. Each machine is copied under its
    /// own lock, then encoded with no machine locked.
    ///
    /// The snapshot is taken while holding the store writer lock, so
    /// concurrent persists land in snapshot order and none can follow a
    /// shutdown's clear or final write.
    pub fn persist_all(&self) -> Result<usize, ManagerError> {
        let _writer = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_accepting() {
            return Err(ManagerError::ShutDown);
        }
        self.persist_snapshot()
    }

    /// Caller holds `persist_lock`.
    fn persist_snapshot(&self) -> Result<usize, ManagerError> {
        let cells: Vec<MachineCell> = self.read().values().cloned().collect();
        let snapshot: Vec<MachineState> = cells
            .iter()
            .map(|cell| cell.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        let records = snapshot
            .iter()
            .map(|state| Ok((state.id(), serialize::encode_machine(state)?)))
            .collect::<Result<Vec<_>, EncodeError>>()
            .map_err(PersistenceError::from)?;
        let count = records.len();
        self.store.persist_all(records).inspect_err(|e| {
            tracing::warn!(error = %e, "persisting machines failed");
        })?;
        tracing::debug!(count, "machines persisted");
        Ok(count)
    }

    /// Load every record from the store into the live set. Corrupt records
    /// are logged and dropped; the rest still load.
    pub fn load_all(&self) -> Result<LoadReport, ManagerError> {
        let records = self.store.load_all()?;
        let mut report = LoadReport::default();
        for (key, bytes) in records {
            let state = match serialize::decode_keyed(key, &bytes) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(machine = %key, error = %e, "dropping corrupt machine record");
                    report.dropped.push(key);
                    continue;
                }
            };
            if self.resolve(key).is_some() {
                tracing::warn!(machine = %key, "dropping record for an already live machine");
                report.dropped.push(key);
                continue;
            }
            match self.insert(state) {
                Ok(_) => report.loaded += 1,
                Err(e) => {
                    tracing::warn!(machine = %key, error = %e, "dropping machine record");
                    report.dropped.push(key);
                }
            }
        }
        if !self.silent {
            tracing::info!(
                loaded = report.loaded,
                dropped = report.dropped.len(),
                "machines loaded"
            );
        }
        Ok(report)
    }

    /// Erase persisted data. The live set is untouched.
    pub fn clear_store(&self) -> Result<(), ManagerError> {
        let _writer = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.clear()?;
        Ok(())
    }

    /// Stop accepting ticks, wait for an in-flight tick, then persist (or
    /// clear the store when `clear` is set) and release the live set.
    ///
    /// If persisting fails the manager reopens with its live set intact and
    /// the error is returned, so shutdown can be retried. Calling shutdown on
    /// a manager that is already shut down is a no-op.
    pub fn shutdown(&self, clear: bool) -> Result<(), ManagerError> {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.wait_for_tick();
        let saved = {
            let _writer = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
            if clear {
                self.store.clear().map_err(ManagerError::from)
            } else {
                self.persist_snapshot().map(|_| ())
            }
        };
        if let Err(e) = saved {
            self.accepting.store(true, Ordering::Release);
            return Err(e);
        }
        let released = {
            let mut machines = self.write();
            let n = machines.len();
            machines.clear();
            n
        };
        if !self.silent {
            tracing::info!(released, cleared = clear, "machine manager shut down");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemStack;
    use crate::machine::FurnaceSlots;
    use crate::store::MemoryStore;

    fn manager_with(store: Arc<MemoryStore>, max: usize) -> MachineManager {
        let config = EngineConfig {
            max_machines: max,
            start_silently: true,
            ..EngineConfig::default()
        };
        MachineManager::new(store, &config)
    }

    fn manager() -> MachineManager {
        manager_with(Arc::new(MemoryStore::new()), 16)
    }

    #[test]
    fn create_get_destroy() {
        let m = manager();
        let id = m.create(MachineKind::Furnace, None).unwrap();
        assert_eq!(m.live_machines(), vec![id]);
        let handle = m.get(id).unwrap();
        assert_eq!(handle.snapshot().unwrap().kind(), MachineKind::Furnace);
        assert!(m.destroy(id));
        assert!(!m.destroy(id));
        assert!(m.get(id).is_none());
        assert!(handle.snapshot().is_none());
        assert!(!handle.is_live());
    }

    #[test]
    fn stale_handle_modify_is_unknown_id() {
        let m = manager();
        let id = m.create(MachineKind::Furnace, None).unwrap();
        let handle = m.get(id).unwrap();
        m.destroy(id);
        assert!(matches!(handle.modify(|_| ()), Err(ManagerError::UnknownMachineId(x)) if x == id));
        assert!(matches!(m.with_machine(id, |_| ()), Err(ManagerError::UnknownMachineId(_))));
    }

    #[test]
    fn capacity_is_enforced() {
        let m = manager_with(Arc::new(MemoryStore::new()), 2);
        m.create(MachineKind::Furnace, None).unwrap();
        m.create(MachineKind::BrewingStand, None).unwrap();
        assert!(matches!(
            m.create(MachineKind::Furnace, None),
            Err(ManagerError::CapacityExceeded { limit: 2 })
        ));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let m = manager();
        let err = m
            .create(MachineKind::BrewingStand, Some(Slots::empty(MachineKind::Furnace)))
            .unwrap_err();
        assert!(matches!(err, ManagerError::KindMismatch { .. }));
    }

    #[test]
    fn invalid_edit_is_rolled_back() {
        let m = manager();
        let id = m.create(MachineKind::Furnace, None).unwrap();
        let handle = m.get(id).unwrap();
        let err = handle
            .modify(|s| s.furnace_mut().unwrap().input = Some(ItemStack::new("iron_ore", 0)))
            .unwrap_err();
        assert!(matches!(err, ManagerError::Invalid(_)));
        assert_eq!(handle.snapshot().unwrap().furnace().unwrap().input, None);
    }

    #[test]
    fn persist_then_load_restores_machines() {
        let store = Arc::new(MemoryStore::new());
        let first = manager_with(store.clone(), 16);
        let slots = Slots::Furnace(FurnaceSlots {
            input: Some(ItemStack::one("iron_ore")),
            ..FurnaceSlots::default()
        });
        let id = first.create(MachineKind::Furnace, Some(slots.clone())).unwrap();
        assert_eq!(first.persist_all().unwrap(), 1);

        let second = manager_with(store, 16);
        let report = second.load_all().unwrap();
        assert_eq!(report.loaded, 1);
        assert!(report.dropped.is_empty());
        assert_eq!(second.get(id).unwrap().snapshot().unwrap().slots(), &slots);
    }

    #[test]
    fn corrupt_record_is_dropped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let first = manager_with(store.clone(), 16);
        let good = first.create(MachineKind::Furnace, None).unwrap();
        first.persist_all().unwrap();
        let bad = MachineId::new();
        store.insert_raw(bad, vec![1, 2, 3]);

        let second = manager_with(store, 16);
        let report = second.load_all().unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.dropped, vec![bad]);
        assert!(second.get(good).is_some());
    }

    #[test]
    fn clear_store_keeps_live_set() {
        let store = Arc::new(MemoryStore::new());
        let m = manager_with(store.clone(), 16);
        m.create(MachineKind::Furnace, None).unwrap();
        m.persist_all().unwrap();
        m.clear_store().unwrap();
        assert!(store.is_empty());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn shutdown_persists_and_releases() {
        let store = Arc::new(MemoryStore::new());
        let m = manager_with(store.clone(), 16);
        m.create(MachineKind::Furnace, None).unwrap();
        m.shutdown(false).unwrap();
        assert!(m.is_empty());
        assert_eq!(store.len(), 1);
        assert!(matches!(m.create(MachineKind::Furnace, None), Err(ManagerError::ShutDown)));
        assert!(matches!(m.persist_all(), Err(ManagerError::ShutDown)));
        // A second shutdown must not wipe the store.
        m.shutdown(false).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn shutdown_with_clear_erases_store() {
        let store = Arc::new(MemoryStore::new());
        let m = manager_with(store.clone(), 16);
        m.create(MachineKind::Furnace, None).unwrap();
        m.persist_all().unwrap();
        m.shutdown(true).unwrap();
        assert!(store.is_empty());
        assert!(m.is_empty());
    }

    #[test]
    fn enter_tick_refused_after_shutdown() {
        let m = manager();
        assert!(m.enter_tick().is_some());
        m.shutdown(true).unwrap();
        assert!(m.enter_tick().is_none());
    }
}
