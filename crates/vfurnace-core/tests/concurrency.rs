//! Live-set mutation and persistence while ticks are running.

use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use vfurnace_core::engine::EngineBuilder;
use vfurnace_core::event::{ProposalKind, Verdict};
use vfurnace_core::id::MachineId;
use vfurnace_core::machine::MachineKind;
use vfurnace_core::manager::MachineManager;
use vfurnace_core::serialize::decode_keyed;
use vfurnace_core::store::{MachineStore, MemoryStore};
use vfurnace_core::test_utils::*;

#[test]
fn machines_created_mid_tick_wait_for_next_tick() {
    let manager_slot: Arc<OnceLock<Arc<MachineManager>>> = Arc::default();
    let created: Arc<Mutex<Vec<MachineId>>> = Arc::default();

    let mut builder = EngineBuilder::new(quiet_config());
    let slot = manager_slot.clone();
    let out = created.clone();
    builder.hooks_mut().on_veto(
        ProposalKind::AdvanceProgress,
        Box::new(move |_| {
            let mut out = out.lock().unwrap();
            if let (true, Some(manager)) = (out.is_empty(), slot.get()) {
                for _ in 0..2 {
                    out.push(manager.create(MachineKind::Furnace, Some(iron_smelt(1))).unwrap());
                }
            }
            Verdict::Allow
        }),
    );
    let engine = builder.initialize().unwrap();
    manager_slot.set(engine.manager().clone()).unwrap();
    engine
        .manager()
        .create(MachineKind::Furnace, Some(iron_smelt(1)))
        .unwrap();

    let report = engine.tick().unwrap();
    assert_eq!(report.machines, 1);
    let created = created.lock().unwrap().clone();
    assert_eq!(created.len(), 2);
    for id in &created {
        let m = engine.manager().get(*id).unwrap().snapshot().unwrap();
        assert_eq!(m.progress(), 0);
        assert_eq!(m.fuel_remaining(), 0);
    }

    let report = engine.tick().unwrap();
    assert_eq!(report.machines, 3);
    for id in &created {
        assert_eq!(engine.manager().get(*id).unwrap().snapshot().unwrap().progress(), 1);
    }
}

#[test]
fn machine_destroyed_mid_tick_is_skipped() {
    let manager_slot: Arc<OnceLock<Arc<MachineManager>>> = Arc::default();
    let victim: Arc<OnceLock<MachineId>> = Arc::default();

    let mut builder = EngineBuilder::new(quiet_config());
    let slot = manager_slot.clone();
    let target = victim.clone();
    builder.hooks_mut().on_veto(
        ProposalKind::Ignite,
        Box::new(move |p| {
            if let (Some(manager), Some(victim)) = (slot.get(), target.get()) {
                if p.machine() != *victim {
                    manager.destroy(*victim);
                }
            }
            Verdict::Allow
        }),
    );
    let engine = builder.initialize().unwrap();
    manager_slot.set(engine.manager().clone()).unwrap();
    let mut ids = vec![
        engine.manager().create(MachineKind::Furnace, Some(iron_smelt(1))).unwrap(),
        engine.manager().create(MachineKind::Furnace, Some(iron_smelt(1))).unwrap(),
    ];
    ids.sort();
    // The later machine in tick order is destroyed while the first ignites.
    victim.set(ids[1]).unwrap();

    let report = engine.tick().unwrap();
    assert_eq!(report.machines, 1);
    assert_eq!(report.skipped, 1);
    assert!(engine.manager().get(ids[1]).is_none());
}

#[test]
fn persist_while_driver_ticks_yields_consistent_records() {
    let store = Arc::new(MemoryStore::new());
    let mut engine = EngineBuilder::new(quiet_config())
        .with_store(store.clone())
        .initialize()
        .unwrap();
    for _ in 0..32 {
        engine
            .manager()
            .create(MachineKind::Furnace, Some(iron_smelt(4)))
            .unwrap();
    }
    engine.start_driver().unwrap();

    let manager = engine.manager().clone();
    let churn = thread::spawn(move || {
        for _ in 0..50 {
            let id = manager.create(MachineKind::BrewingStand, Some(brewing_slots(2, "sugar", 1))).unwrap();
            manager.persist_all().unwrap();
            manager.destroy(id);
        }
    });
    for _ in 0..500 {
        assert!(engine.pulse());
    }
    churn.join().unwrap();
    engine.stop_ticking();

    engine.manager().persist_all().unwrap();
    let records = store.load_all().unwrap();
    assert_eq!(records.len(), 32);
    for (id, bytes) in records {
        let m = decode_keyed(id, &bytes).unwrap();
        assert!(m.progress() <= m.required());
    }
}

#[test]
fn clearing_shutdown_wins_over_in_flight_persist() {
    for _ in 0..20 {
        let store = Arc::new(MemoryStore::new());
        let engine = EngineBuilder::new(quiet_config())
            .with_store(store.clone())
            .initialize()
            .unwrap();
        for _ in 0..2_000 {
            engine
                .manager()
                .create(MachineKind::Furnace, Some(iron_smelt(1)))
                .unwrap();
        }

        let manager = engine.manager().clone();
        let writer = thread::spawn(move || {
            while manager.persist_all().is_ok() {}
        });
        while store.is_empty() {
            thread::yield_now();
        }
        engine.shutdown(true).unwrap();
        writer.join().unwrap();

        assert!(store.is_empty());
    }
}

#[test]
#[ignore]
fn ten_thousand_machines_for_a_thousand_ticks() {
    let config = vfurnace_core::config::EngineConfig {
        tick_checkpoint_period: 250,
        ..quiet_config()
    };
    let store = Arc::new(MemoryStore::new());
    let engine = EngineBuilder::new(config)
        .with_store(store.clone())
        .initialize()
        .unwrap();
    for _ in 0..10_000 {
        engine
            .manager()
            .create(MachineKind::Furnace, Some(iron_smelt(1)))
            .unwrap();
    }
    for _ in 0..1000 {
        engine.tick().unwrap();
    }
    assert_eq!(store.len(), 10_000);
}
