//! Per-machine simulation state.
//!
//! A [`MachineState`] is the complete data object for one furnace or one
//! brewing stand: its slots and its fuel/progress counters. The counters are
//! only changed by the tick transition (see [`crate::transition`]) and by the
//! validated [`MachineState::from_parts`] constructor, so the invariants
//! checked by [`MachineState::validate`] hold for every live machine.

use crate::fixed::{Fixed64, fraction};
use crate::id::{ItemKey, MachineId};
use crate::item::ItemStack;
use serde::{Deserialize, Serialize};

/// Number of potion slots in a brewing stand.
pub const POTION_SLOTS: usize = 3;

// ---------------------------------------------------------------------------
// Kinds and slots
// ---------------------------------------------------------------------------

/// Which recipe table and progress semantics a machine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineKind {
    Furnace,
    BrewingStand,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FurnaceSlots {
    pub input: Option<ItemStack>,
    pub fuel: Option<ItemStack>,
    pub output: Option<ItemStack>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrewingSlots {
    pub potions: [Option<ItemStack>; POTION_SLOTS],
    pub ingredient: Option<ItemStack>,
    pub fuel: Option<ItemStack>,
}

impl BrewingSlots {
    /// Number of occupied potion slots.
    pub fn occupied_potions(&self) -> usize {
        self.potions.iter().filter(|p| p.is_some()).count()
    }
}

/// Slot contents, shaped by machine kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slots {
    Furnace(FurnaceSlots),
    Brewing(BrewingSlots),
}

impl Slots {
    /// Empty slots for a machine of `kind`.
    pub fn empty(kind: MachineKind) -> Self {
        match kind {
            MachineKind::Furnace => Slots::Furnace(FurnaceSlots::default()),
            MachineKind::BrewingStand => Slots::Brewing(BrewingSlots::default()),
        }
    }

    pub fn kind(&self) -> MachineKind {
        match self {
            Slots::Furnace(_) => MachineKind::Furnace,
            Slots::Brewing(_) => MachineKind::BrewingStand,
        }
    }

    /// The item being transformed: the furnace input or the brewing ingredient.
    pub fn input_item(&self) -> Option<&ItemKey> {
        match self {
            Slots::Furnace(f) => f.input.as_ref().map(|s| &s.item),
            Slots::Brewing(b) => b.ingredient.as_ref().map(|s| &s.item),
        }
    }

    pub fn fuel(&self) -> Option<&ItemStack> {
        match self {
            Slots::Furnace(f) => f.fuel.as_ref(),
            Slots::Brewing(b) => b.fuel.as_ref(),
        }
    }

    pub(crate) fn fuel_slot_mut(&mut self) -> &mut Option<ItemStack> {
        match self {
            Slots::Furnace(f) => &mut f.fuel,
            Slots::Brewing(b) => &mut b.fuel,
        }
    }

    /// Every occupied slot, in a fixed order.
    pub fn stacks(&self) -> Vec<&ItemStack> {
        match self {
            Slots::Furnace(f) => [&f.input, &f.fuel, &f.output]
                .into_iter()
                .flatten()
                .collect(),
            Slots::Brewing(b) => b
                .potions
                .iter()
                .chain([&b.ingredient, &b.fuel])
                .flatten()
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Fuel and progress counters, all in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Ticks left on the current fuel charge.
    pub fuel_remaining: u32,
    /// Duration the current charge was ignited for. Reporting only.
    pub fuel_total: u32,
    /// Ticks of progress on the current input.
    pub progress: u32,
    /// Ticks needed to complete the current input. Zero when nothing cooks.
    pub required: u32,
}

/// Coarse burn state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurnPhase {
    Idle,
    Burning,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidState {
    #[error("progress {progress} exceeds required {required}")]
    ProgressExceedsRequired { progress: u32, required: u32 },
    #[error("fuel remaining {remaining} exceeds charge total {total}")]
    FuelExceedsTotal { remaining: u32, total: u32 },
    #[error("progress {0} recorded without a cooking input")]
    ProgressWithoutInput(u32),
    #[error("cooking {0} with a required duration of zero")]
    ZeroRequired(ItemKey),
    #[error("invalid stack of {item}: {amount}")]
    InvalidStack { item: ItemKey, amount: u32 },
}

// ---------------------------------------------------------------------------
// MachineState
// ---------------------------------------------------------------------------

/// The full state of one furnace or brewing stand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    id: MachineId,
    slots: Slots,
    counters: Counters,
    /// Input item the current progress belongs to.
    cooking: Option<ItemKey>,
}

impl MachineState {
    /// A fresh, idle machine with empty slots.
    pub fn new(id: MachineId, kind: MachineKind) -> Self {
        Self::with_slots(id, Slots::empty(kind))
    }

    /// A fresh, idle machine with the given slot contents.
    pub fn with_slots(id: MachineId, slots: Slots) -> Self {
        Self {
            id,
            slots,
            counters: Counters::default(),
            cooking: None,
        }
    }

    /// Rebuild a machine from raw parts, rejecting states that break the
    /// counter invariants.
    pub fn from_parts(
        id: MachineId,
        slots: Slots,
        counters: Counters,
        cooking: Option<ItemKey>,
    ) -> Result<Self, InvalidState> {
        let state = Self {
            id,
            slots,
            counters,
            cooking,
        };
        state.validate()?;
        Ok(state)
    }

    /// Check the counter and slot invariants.
    pub fn validate(&self) -> Result<(), InvalidState> {
        let c = &self.counters;
        if c.progress > c.required {
            return Err(InvalidState::ProgressExceedsRequired {
                progress: c.progress,
                required: c.required,
            });
        }
        if c.fuel_remaining > c.fuel_total {
            return Err(InvalidState::FuelExceedsTotal {
                remaining: c.fuel_remaining,
                total: c.fuel_total,
            });
        }
        if c.progress > 0 && self.cooking.is_none() {
            return Err(InvalidState::ProgressWithoutInput(c.progress));
        }
        if let (Some(input), 0) = (&self.cooking, c.required) {
            return Err(InvalidState::ZeroRequired(input.clone()));
        }
        if let Some(bad) = self.slots.stacks().into_iter().find(|s| !s.is_valid()) {
            return Err(InvalidState::InvalidStack {
                item: bad.item.clone(),
                amount: bad.amount,
            });
        }
        Ok(())
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn kind(&self) -> MachineKind {
        self.slots.kind()
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    /// Mutable slot access for collaborators. Progress is re-resolved
    /// against the new contents on the next tick.
    pub fn slots_mut(&mut self) -> &mut Slots {
        &mut self.slots
    }

    pub fn furnace(&self) -> Option<&FurnaceSlots> {
        match &self.slots {
            Slots::Furnace(f) => Some(f),
            Slots::Brewing(_) => None,
        }
    }

    pub fn furnace_mut(&mut self) -> Option<&mut FurnaceSlots> {
        match &mut self.slots {
            Slots::Furnace(f) => Some(f),
            Slots::Brewing(_) => None,
        }
    }

    pub fn brewing(&self) -> Option<&BrewingSlots> {
        match &self.slots {
            Slots::Brewing(b) => Some(b),
            Slots::Furnace(_) => None,
        }
    }

    pub fn brewing_mut(&mut self) -> Option<&mut BrewingSlots> {
        match &mut self.slots {
            Slots::Brewing(b) => Some(b),
            Slots::Furnace(_) => None,
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    pub fn fuel_remaining(&self) -> u32 {
        self.counters.fuel_remaining
    }

    pub fn fuel_total(&self) -> u32 {
        self.counters.fuel_total
    }

    pub fn progress(&self) -> u32 {
        self.counters.progress
    }

    pub fn required(&self) -> u32 {
        self.counters.required
    }

    pub fn cooking(&self) -> Option<&ItemKey> {
        self.cooking.as_ref()
    }

    pub(crate) fn set_cooking(&mut self, item: Option<ItemKey>) {
        self.cooking = item;
    }

    pub fn phase(&self) -> BurnPhase {
        if self.counters.fuel_remaining > 0 {
            BurnPhase::Burning
        } else {
            BurnPhase::Idle
        }
    }

    /// Fraction of the current fuel charge left, for a flame indicator.
    pub fn burn_fraction(&self) -> Fixed64 {
        fraction(self.counters.fuel_remaining, self.counters.fuel_total)
    }

    /// Fraction of the current input cooked, for a progress arrow.
    pub fn cook_fraction(&self) -> Fixed64 {
        fraction(self.counters.progress, self.counters.required)
    }
}
