//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::EngineConfig;
use crate::event::{EventKind, HookBus, MachineEvent, Proposal, ProposalKind, Verdict, VetoHook};
use crate::item::ItemStack;
use crate::machine::{BrewingSlots, FurnaceSlots, Slots};
use crate::table::{TableBuilder, Tables};
use std::sync::{Arc, Mutex, PoisonError};

// ===========================================================================
// Tables and config
// ===========================================================================

pub fn vanilla_tables() -> Tables {
    match TableBuilder::vanilla().build() {
        Ok(tables) => tables,
        Err(e) => panic!("vanilla tables must build: {e}"),
    }
}

/// Default config with logging suppressed and checkpoints off.
pub fn quiet_config() -> EngineConfig {
    EngineConfig {
        start_silently: true,
        tick_checkpoint_period: 0,
        ..EngineConfig::default()
    }
}

// ===========================================================================
// Slot fixtures
// ===========================================================================

pub fn stack(item: &str, amount: u32) -> Option<ItemStack> {
    Some(ItemStack::new(item, amount))
}

pub fn furnace_slots(input: Option<ItemStack>, fuel: Option<ItemStack>) -> Slots {
    Slots::Furnace(FurnaceSlots {
        input,
        fuel,
        output: None,
    })
}

/// One iron ore and `coal` coal.
pub fn iron_smelt(coal: u32) -> Slots {
    furnace_slots(stack("iron_ore", 1), stack("coal", coal))
}

/// `potions` water bottles, one ingredient and `powder` blaze powder.
pub fn brewing_slots(potions: usize, ingredient: &str, powder: u32) -> Slots {
    let mut slots = BrewingSlots::default();
    for slot in slots.potions.iter_mut().take(potions) {
        *slot = stack("water_bottle", 1);
    }
    slots.ingredient = stack(ingredient, 1);
    slots.fuel = if powder > 0 { stack("blaze_powder", powder) } else { None };
    Slots::Brewing(slots)
}

// ===========================================================================
// Recording hooks
// ===========================================================================

/// Collects every proposal offered and every event delivered.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub proposals: Arc<Mutex<Vec<Proposal>>>,
    pub events: Arc<Mutex<Vec<MachineEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register on every proposal and event kind, allowing everything.
    pub fn attach(&self, bus: &mut HookBus) {
        for kind in [
            ProposalKind::Ignite,
            ProposalKind::BurnFuel,
            ProposalKind::AdvanceProgress,
        ] {
            let proposals = self.proposals.clone();
            bus.on_veto(
                kind,
                Box::new(move |p| {
                    proposals
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(p.clone());
                    Verdict::Allow
                }),
            );
        }
        for kind in [
            EventKind::FuelIgnited,
            EventKind::FuelDepleted,
            EventKind::ProgressReset,
            EventKind::RecipeCompleted,
            EventKind::OutputBlocked,
        ] {
            let events = self.events.clone();
            bus.on_event(
                kind,
                Box::new(move |e| {
                    events
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(e.clone());
                }),
            );
        }
    }

    pub fn proposals(&self) -> Vec<Proposal> {
        self.proposals.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn events(&self) -> Vec<MachineEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// A veto hook that denies every proposal.
pub fn deny_all() -> VetoHook {
    Box::new(|_| Verdict::Deny)
}
