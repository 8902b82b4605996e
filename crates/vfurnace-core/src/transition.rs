//! The per-tick state machine for furnaces and brewing stands.
//!
//! Each tick runs in two phases:
//!
//! 1. **Ignition**: an idle machine with a cookable input and room for the
//!    result offers an `Ignite` proposal for the fuel in its fuel slot and, if
//!    allowed, consumes one unit and starts a new charge.
//! 2. **Burn and progress**: an active charge offers `BurnFuel` and counts
//!    down by one; if the input still matches a recipe, `AdvanceProgress` is
//!    offered and progress goes up by one. Reaching the required ticks
//!    completes the recipe in the same tick.
//!
//! Before either phase the current input is re-resolved against the recipe
//! table. A changed, removed or unmatched input resets progress to zero.
//!
//! A denied proposal leaves the machine untouched; hooks only ever see an
//! immutable copy of the pending change.

use crate::event::{HookBus, MachineEvent, Proposal};
use crate::fixed::Ticks;
use crate::id::ItemKey;
use crate::item::{self, ItemStack};
use crate::machine::{MachineState, Slots};
use crate::table::{RecipeEntry, Tables};

/// Shared, read-only inputs for advancing machines during one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub tables: &'a Tables,
    pub hooks: &'a HookBus,
    /// Logical tick being executed, stamped onto emitted events.
    pub tick: Ticks,
}

/// What happened to one machine during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionResult {
    pub events: Vec<MachineEvent>,
    pub ignited: bool,
    pub advanced: bool,
    pub completed: bool,
}

/// Whether the current input can make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    /// A recipe matches and its result has somewhere to go.
    Ready,
    /// A recipe matches but the output slot cannot take the result.
    Blocked,
    NoRecipe,
}

impl MachineState {
    /// Advance this machine by exactly one tick.
    pub fn advance(&mut self, ctx: &TickContext<'_>) -> TransitionResult {
        let mut result = TransitionResult::default();
        let recipe = current_recipe(self, ctx.tables).cloned();
        sync_recipe(self, recipe.as_ref(), ctx.tick, &mut result.events);

        let readiness = match &recipe {
            None => Readiness::NoRecipe,
            Some(recipe) if output_accepts(self.slots(), recipe) => Readiness::Ready,
            Some(_) => Readiness::Blocked,
        };

        if self.fuel_remaining() == 0 && readiness == Readiness::Ready {
            result.ignited = try_ignite(self, ctx, &mut result.events);
        }

        if self.fuel_remaining() == 0 {
            return result;
        }

        burn_one(self, ctx, &mut result.events);

        match (readiness, recipe, self.cooking().cloned()) {
            (Readiness::Ready, Some(recipe), Some(input)) => {
                let proposal = Proposal::AdvanceProgress {
                    machine: self.id(),
                    input: input.clone(),
                    progress: self.progress(),
                    required: self.required(),
                };
                if ctx.hooks.offer(proposal).is_some() {
                    self.counters_mut().progress += 1;
                    result.advanced = true;
                    if self.progress() >= self.required() {
                        complete(self, input, &recipe, ctx, &mut result.events);
                        result.completed = true;
                    }
                }
            }
            (Readiness::Blocked, _, _) => {
                result.events.push(MachineEvent::OutputBlocked {
                    machine: self.id(),
                    tick: ctx.tick,
                });
            }
            _ => {}
        }

        result
    }
}

/// The recipe the current input resolves to. Brewing stands with no potions
/// have nothing to brew.
fn current_recipe<'t>(state: &MachineState, tables: &'t Tables) -> Option<&'t RecipeEntry> {
    if state.brewing().is_some_and(|b| b.occupied_potions() == 0) {
        return None;
    }
    let input = state.slots().input_item()?;
    tables.lookup_recipe(state.kind(), input)
}

/// Re-bind progress to the current input. Progress belongs to one input item;
/// anything else resets it.
fn sync_recipe(
    state: &mut MachineState,
    recipe: Option<&RecipeEntry>,
    tick: Ticks,
    events: &mut Vec<MachineEvent>,
) {
    let matched = recipe.and(state.slots().input_item().cloned());
    if state.cooking() == matched.as_ref() {
        return;
    }
    let lost = state.progress();
    if lost > 0 {
        events.push(MachineEvent::ProgressReset {
            machine: state.id(),
            lost_progress: lost,
            tick,
        });
    }
    let counters = state.counters_mut();
    counters.progress = 0;
    counters.required = recipe.map_or(0, |r| r.required_ticks);
    state.set_cooking(matched);
}

fn output_accepts(slots: &Slots, recipe: &RecipeEntry) -> bool {
    match slots {
        Slots::Furnace(f) => item::accepts(&f.output, &recipe.output.item, recipe.output.amount),
        Slots::Brewing(_) => true,
    }
}

fn try_ignite(state: &mut MachineState, ctx: &TickContext<'_>, events: &mut Vec<MachineEvent>) -> bool {
    let Some(fuel_item) = state.slots().fuel().map(|s| s.item.clone()) else {
        return false;
    };
    let Some(entry) = ctx.tables.fuel_for(state.kind(), &fuel_item) else {
        return false;
    };
    let remainder = entry.remainder.clone();
    let proposal = Proposal::Ignite {
        machine: state.id(),
        kind: state.kind(),
        fuel: fuel_item.clone(),
        burn_ticks: entry.burn_ticks,
    };
    let burn_ticks = match ctx.hooks.offer(proposal) {
        Some(Proposal::Ignite { burn_ticks, .. }) if burn_ticks > 0 => burn_ticks,
        _ => return false,
    };

    let slot = state.slots_mut().fuel_slot_mut();
    item::take_one(slot);
    if slot.is_none() {
        *slot = remainder.map(ItemStack::one);
    }

    let counters = state.counters_mut();
    counters.fuel_remaining = burn_ticks;
    counters.fuel_total = burn_ticks;
    events.push(MachineEvent::FuelIgnited {
        machine: state.id(),
        fuel: fuel_item,
        burn_ticks,
        tick: ctx.tick,
    });
    true
}

/// Offer and apply one tick of burn. A hook may resize the charge first; a
/// charge shortened past what already burned goes out this tick.
fn burn_one(state: &mut MachineState, ctx: &TickContext<'_>, events: &mut Vec<MachineEvent>) {
    let proposal = Proposal::BurnFuel {
        machine: state.id(),
        fuel_remaining: state.fuel_remaining(),
        burn_ticks: state.fuel_total(),
    };
    let Some(Proposal::BurnFuel {
        fuel_remaining,
        burn_ticks,
        ..
    }) = ctx.hooks.offer(proposal)
    else {
        return;
    };
    let counters = state.counters_mut();
    counters.fuel_total = burn_ticks;
    counters.fuel_remaining = fuel_remaining.saturating_sub(1);
    if counters.fuel_remaining == 0 {
        events.push(MachineEvent::FuelDepleted {
            machine: state.id(),
            tick: ctx.tick,
        });
    }
}

fn complete(
    state: &mut MachineState,
    input: ItemKey,
    recipe: &RecipeEntry,
    ctx: &TickContext<'_>,
    events: &mut Vec<MachineEvent>,
) {
    let output = recipe.output.clone();
    let batches = match state.slots_mut() {
        Slots::Furnace(f) => {
            item::take_one(&mut f.input);
            let overflow = item::insert(&mut f.output, &output.item, output.amount);
            debug_assert_eq!(overflow, 0, "ignition checked output capacity");
            1
        }
        Slots::Brewing(b) => {
            let mut brewed = 0;
            for potion in b.potions.iter_mut().filter(|p| p.is_some()) {
                *potion = Some(output.clone());
                brewed += 1;
            }
            item::take_one(&mut b.ingredient);
            brewed
        }
    };

    state.counters_mut().progress = 0;
    state.set_cooking(None);
    events.push(MachineEvent::RecipeCompleted {
        machine: state.id(),
        input,
        output,
        batches,
        tick: ctx.tick,
    });

    let next = current_recipe(state, ctx.tables).cloned();
    sync_recipe(state, next.as_ref(), ctx.tick, events);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ProposalKind, Verdict};
    use crate::id::MachineId;
    use crate::machine::{BrewingSlots, FurnaceSlots, MachineKind};
    use crate::table::TableBuilder;

    fn tables() -> Tables {
        TableBuilder::vanilla().build().unwrap()
    }

    fn furnace(input: Option<(&str, u32)>, fuel: Option<(&str, u32)>) -> MachineState {
        MachineState::with_slots(
            MachineId::new(),
            Slots::Furnace(FurnaceSlots {
                input: input.map(|(i, n)| ItemStack::new(i, n)),
                fuel: fuel.map(|(i, n)| ItemStack::new(i, n)),
                output: None,
            }),
        )
    }

    fn run(state: &mut MachineState, tables: &Tables, hooks: &HookBus, ticks: u64) -> Vec<TransitionResult> {
        (1..=ticks)
            .map(|tick| state.advance(&TickContext { tables, hooks, tick }))
            .collect()
    }

    #[test]
    fn first_tick_ignites_and_advances() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 2)));
        let r = run(&mut m, &tables, &hooks, 1).remove(0);
        assert!(r.ignited && r.advanced && !r.completed);
        assert_eq!(m.fuel_remaining(), 1599);
        assert_eq!(m.fuel_total(), 1600);
        assert_eq!(m.progress(), 1);
        assert_eq!(m.required(), 200);
        assert_eq!(m.furnace().unwrap().fuel, Some(ItemStack::new("coal", 1)));
    }

    #[test]
    fn completes_after_required_ticks() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        let results = run(&mut m, &tables, &hooks, 200);
        assert!(results[199].completed);
        assert!(results[..199].iter().all(|r| !r.completed));
        let f = m.furnace().unwrap();
        assert_eq!(f.output, Some(ItemStack::one("iron_ingot")));
        assert_eq!(f.input, None);
        assert_eq!(m.progress(), 0);
        assert_eq!(m.required(), 0);
        assert_eq!(m.fuel_remaining(), 1400);
    }

    #[test]
    fn next_input_rebinds_after_completion() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 2)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 201);
        assert_eq!(m.furnace().unwrap().output, Some(ItemStack::one("iron_ingot")));
        assert_eq!(m.cooking(), Some(&ItemKey::from("iron_ore")));
        assert_eq!(m.required(), 200);
        assert_eq!(m.progress(), 1);
    }

    #[test]
    fn no_fuel_no_progress() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), None);
        run(&mut m, &tables, &hooks, 20);
        assert_eq!(m.progress(), 0);
        assert_eq!(m.fuel_remaining(), 0);
    }

    #[test]
    fn no_input_does_not_ignite() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(None, Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 5);
        assert_eq!(m.fuel_remaining(), 0);
        assert_eq!(m.slots().fuel(), Some(&ItemStack::one("coal")));
    }

    #[test]
    fn unsmeltable_input_does_not_ignite() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("dirt", 1)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 5);
        assert_eq!(m.fuel_remaining(), 0);
    }

    #[test]
    fn removing_input_resets_progress() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 50);
        assert_eq!(m.progress(), 50);
        m.furnace_mut().unwrap().input = None;
        let r = m.advance(&TickContext { tables: &tables, hooks: &hooks, tick: 51 });
        assert_eq!(m.progress(), 0);
        assert_eq!(m.required(), 0);
        assert!(matches!(
            r.events[0],
            MachineEvent::ProgressReset { lost_progress: 50, .. }
        ));
        // The charge keeps burning without an input.
        assert_eq!(m.fuel_remaining(), 1600 - 51);
    }

    #[test]
    fn swapping_input_resets_progress() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 30);
        m.furnace_mut().unwrap().input = Some(ItemStack::one("sand"));
        m.advance(&TickContext { tables: &tables, hooks: &hooks, tick: 31 });
        assert_eq!(m.cooking(), Some(&ItemKey::from("sand")));
        assert_eq!(m.progress(), 1);
    }

    #[test]
    fn vetoed_ignition_changes_nothing() {
        let tables = tables();
        let mut hooks = HookBus::new();
        hooks.on_veto(ProposalKind::Ignite, Box::new(|_| Verdict::Deny));
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        let before_slots = m.slots().clone();
        run(&mut m, &tables, &hooks, 10);
        assert_eq!(m.fuel_remaining(), 0);
        assert_eq!(m.progress(), 0);
        assert_eq!(m.slots(), &before_slots);
    }

    #[test]
    fn vetoed_progress_holds_progress() {
        let tables = tables();
        let mut hooks = HookBus::new();
        hooks.on_veto(ProposalKind::AdvanceProgress, Box::new(|_| Verdict::Deny));
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 10);
        assert_eq!(m.progress(), 0);
        assert_eq!(m.fuel_remaining(), 1590);
    }

    #[test]
    fn vetoed_burn_freezes_countdown() {
        let tables = tables();
        let mut hooks = HookBus::new();
        hooks.on_veto(ProposalKind::BurnFuel, Box::new(|_| Verdict::Deny));
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 10);
        assert_eq!(m.fuel_remaining(), 1600);
        assert_eq!(m.progress(), 10);
    }

    #[test]
    fn amended_burn_ticks_apply() {
        let tables = tables();
        let mut hooks = HookBus::new();
        hooks.on_veto(ProposalKind::Ignite, Box::new(|_| Verdict::AmendBurnTicks(5)));
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 2)));
        run(&mut m, &tables, &hooks, 1);
        assert_eq!(m.fuel_total(), 5);
        assert_eq!(m.fuel_remaining(), 4);
        // Charge runs out after five ticks; the sixth ignites the next coal.
        let results = run(&mut m, &tables, &hooks, 5);
        assert!(results[4].ignited);
        assert_eq!(m.slots().fuel(), None);
        assert_eq!(m.progress(), 6);
    }

    #[test]
    fn amended_burn_resizes_active_charge() {
        let tables = tables();
        let mut hooks = HookBus::new();
        hooks.on_veto(
            ProposalKind::BurnFuel,
            Box::new(|p| match p {
                Proposal::BurnFuel { burn_ticks: 1600, .. } => Verdict::AmendBurnTicks(10),
                _ => Verdict::Allow,
            }),
        );
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 1);
        assert_eq!(m.fuel_total(), 10);
        assert_eq!(m.fuel_remaining(), 9);

        let results = run(&mut m, &tables, &hooks, 9);
        assert_eq!(m.fuel_remaining(), 0);
        assert!(results[8]
            .events
            .iter()
            .any(|e| matches!(e, MachineEvent::FuelDepleted { .. })));
        assert_eq!(m.progress(), 10);
    }

    #[test]
    fn burn_amended_to_zero_puts_charge_out() {
        let tables = tables();
        let mut hooks = HookBus::new();
        hooks.on_veto(ProposalKind::BurnFuel, Box::new(|_| Verdict::AmendBurnTicks(0)));
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        let results = run(&mut m, &tables, &hooks, 1);
        assert!(results[0].ignited);
        assert_eq!(m.fuel_remaining(), 0);
        assert_eq!(m.fuel_total(), 0);
        assert!(results[0]
            .events
            .iter()
            .any(|e| matches!(e, MachineEvent::FuelDepleted { .. })));
        // Fuel was lit, so the igniting tick still counts.
        assert_eq!(m.progress(), 1);
        m.validate().unwrap();
    }

    #[test]
    fn amend_to_zero_is_a_veto() {
        let tables = tables();
        let mut hooks = HookBus::new();
        hooks.on_veto(ProposalKind::Ignite, Box::new(|_| Verdict::AmendBurnTicks(0)));
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 3);
        assert_eq!(m.fuel_remaining(), 0);
        assert_eq!(m.slots().fuel(), Some(&ItemStack::one("coal")));
    }

    #[test]
    fn fuel_depletes_and_reignites() {
        let tables = tables();
        let hooks = HookBus::new();
        // A stick burns for 100 ticks.
        let mut m = furnace(Some(("iron_ore", 1)), Some(("stick", 2)));
        let results = run(&mut m, &tables, &hooks, 101);
        assert!(results[99]
            .events
            .iter()
            .any(|e| matches!(e, MachineEvent::FuelDepleted { .. })));
        assert!(results[100].ignited);
        assert_eq!(m.progress(), 101);
        assert_eq!(m.slots().fuel(), None);
    }

    #[test]
    fn progress_held_when_fuel_runs_out() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), Some(("stick", 1)));
        run(&mut m, &tables, &hooks, 150);
        assert_eq!(m.progress(), 100);
        assert_eq!(m.fuel_remaining(), 0);
    }

    #[test]
    fn lava_bucket_leaves_bucket() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), Some(("lava_bucket", 1)));
        run(&mut m, &tables, &hooks, 1);
        assert_eq!(m.slots().fuel(), Some(&ItemStack::one("bucket")));
        assert_eq!(m.fuel_total(), 20000);
    }

    #[test]
    fn blocked_output_stalls_without_reset() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        run(&mut m, &tables, &hooks, 10);
        m.furnace_mut().unwrap().output = Some(ItemStack::one("gold_ingot"));
        let r = m.advance(&TickContext { tables: &tables, hooks: &hooks, tick: 11 });
        assert_eq!(m.progress(), 10);
        assert!(!r.advanced);
        assert!(matches!(r.events[..], [MachineEvent::OutputBlocked { .. }]));
    }

    #[test]
    fn blocked_output_prevents_ignition() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 1)), Some(("coal", 1)));
        m.furnace_mut().unwrap().output = Some(ItemStack::new("iron_ingot", 64));
        run(&mut m, &tables, &hooks, 5);
        assert_eq!(m.fuel_remaining(), 0);
    }

    #[test]
    fn progress_never_exceeds_required() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = furnace(Some(("iron_ore", 64)), Some(("coal", 8)));
        for tick in 1..=2_000 {
            m.advance(&TickContext { tables: &tables, hooks: &hooks, tick });
            assert!(m.progress() <= m.required());
        }
    }

    fn brewing(potions: usize, ingredient: Option<&str>, fuel: u32) -> MachineState {
        let mut slots = BrewingSlots::default();
        for slot in slots.potions.iter_mut().take(potions) {
            *slot = Some(ItemStack::one("water_bottle"));
        }
        slots.ingredient = ingredient.map(ItemStack::one);
        slots.fuel = (fuel > 0).then(|| ItemStack::new("blaze_powder", fuel));
        MachineState::with_slots(MachineId::new(), Slots::Brewing(slots))
    }

    #[test]
    fn brewing_converts_every_occupied_slot() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = brewing(2, Some("nether_wart"), 1);
        assert_eq!(m.kind(), MachineKind::BrewingStand);
        let results = run(&mut m, &tables, &hooks, 400);
        assert!(results[399].completed);
        let b = m.brewing().unwrap();
        assert_eq!(b.potions[0], Some(ItemStack::one("awkward_potion")));
        assert_eq!(b.potions[1], Some(ItemStack::one("awkward_potion")));
        assert_eq!(b.potions[2], None);
        assert_eq!(b.ingredient, None);
        let batches = results[399].events.iter().find_map(|e| match e {
            MachineEvent::RecipeCompleted { batches, .. } => Some(*batches),
            _ => None,
        });
        assert_eq!(batches, Some(2));
    }

    #[test]
    fn brewing_without_potions_idles() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = brewing(0, Some("nether_wart"), 1);
        run(&mut m, &tables, &hooks, 10);
        assert_eq!(m.fuel_remaining(), 0);
        assert_eq!(m.progress(), 0);
    }

    #[test]
    fn brewing_rejects_furnace_fuel() {
        let tables = tables();
        let hooks = HookBus::new();
        let mut m = brewing(1, Some("nether_wart"), 0);
        m.brewing_mut().unwrap().fuel = Some(ItemStack::one("coal"));
        run(&mut m, &tables, &hooks, 10);
        assert_eq!(m.fuel_remaining(), 0);
    }
}
