//! Veto hooks and observation events.
//!
//! Before the tick transition applies an observable change it offers a
//! [`Proposal`] to every registered veto hook. Hooks see an immutable
//! proposal and answer with a [`Verdict`]; a `Deny` leaves the machine
//! exactly as it was. Hooks run synchronously inside the tick.
//!
//! After every machine has advanced, the scheduler delivers the tick's
//! [`MachineEvent`]s to passive listeners in machine order.
//!
//! # Failure policy
//!
//! A hook that panics is treated according to [`HookFailurePolicy`]:
//! fail-open (the default) counts the panic as `Allow`, fail-closed as `Deny`.

use crate::fixed::Ticks;
use crate::id::{ItemKey, MachineId};
use crate::item::ItemStack;
use crate::machine::MachineKind;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};

// ---------------------------------------------------------------------------
// Proposals and verdicts
// ---------------------------------------------------------------------------

/// A state change the transition is about to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    /// Consume one unit of `fuel` and start a charge of `burn_ticks`.
    Ignite {
        machine: MachineId,
        kind: MachineKind,
        fuel: ItemKey,
        burn_ticks: u32,
    },
    /// Burn one tick off the active charge. `burn_ticks` is the charge's
    /// full duration.
    BurnFuel {
        machine: MachineId,
        fuel_remaining: u32,
        burn_ticks: u32,
    },
    /// Add one tick of cook/brew progress.
    AdvanceProgress {
        machine: MachineId,
        input: ItemKey,
        progress: u32,
        required: u32,
    },
}

/// Discriminant tag for proposals, used for hook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalKind {
    Ignite,
    BurnFuel,
    AdvanceProgress,
}

const PROPOSAL_KIND_COUNT: usize = 3;

impl Proposal {
    pub fn kind(&self) -> ProposalKind {
        match self {
            Proposal::Ignite { .. } => ProposalKind::Ignite,
            Proposal::BurnFuel { .. } => ProposalKind::BurnFuel,
            Proposal::AdvanceProgress { .. } => ProposalKind::AdvanceProgress,
        }
    }

    pub fn machine(&self) -> MachineId {
        match self {
            Proposal::Ignite { machine, .. }
            | Proposal::BurnFuel { machine, .. }
            | Proposal::AdvanceProgress { machine, .. } => *machine,
        }
    }
}

/// A hook's answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
    /// Allow with a different charge duration. On `Ignite` this is the new
    /// charge's length; on `BurnFuel` it resizes the active charge, keeping
    /// the ticks already burned. Treated as `Allow` for progress.
    AmendBurnTicks(u32),
}

/// How a panicking hook is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookFailurePolicy {
    #[default]
    FailOpen,
    FailClosed,
}

/// Priority level for hooks. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

impl ProposalKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Observation events
// ---------------------------------------------------------------------------

/// Something that happened to a machine during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    FuelIgnited {
        machine: MachineId,
        fuel: ItemKey,
        burn_ticks: u32,
        tick: Ticks,
    },
    FuelDepleted {
        machine: MachineId,
        tick: Ticks,
    },
    ProgressReset {
        machine: MachineId,
        lost_progress: u32,
        tick: Ticks,
    },
    RecipeCompleted {
        machine: MachineId,
        input: ItemKey,
        output: ItemStack,
        /// One per furnace, one per occupied potion slot when brewing.
        batches: u32,
        tick: Ticks,
    },
    OutputBlocked {
        machine: MachineId,
        tick: Ticks,
    },
}

/// Discriminant tag for machine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FuelIgnited,
    FuelDepleted,
    ProgressReset,
    RecipeCompleted,
    OutputBlocked,
}

const EVENT_KIND_COUNT: usize = 5;

impl MachineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MachineEvent::FuelIgnited { .. } => EventKind::FuelIgnited,
            MachineEvent::FuelDepleted { .. } => EventKind::FuelDepleted,
            MachineEvent::ProgressReset { .. } => EventKind::ProgressReset,
            MachineEvent::RecipeCompleted { .. } => EventKind::RecipeCompleted,
            MachineEvent::OutputBlocked { .. } => EventKind::OutputBlocked,
        }
    }

    pub fn machine(&self) -> MachineId {
        match self {
            MachineEvent::FuelIgnited { machine, .. }
            | MachineEvent::FuelDepleted { machine, .. }
            | MachineEvent::ProgressReset { machine, .. }
            | MachineEvent::RecipeCompleted { machine, .. }
            | MachineEvent::OutputBlocked { machine, .. } => *machine,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// A veto hook inspects a proposal and returns a verdict.
pub type VetoHook = Box<dyn Fn(&Proposal) -> Verdict + Send + Sync>;

/// A passive listener receives events read-only.
pub type Listener = Box<dyn Fn(&MachineEvent) + Send + Sync>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&MachineEvent) -> bool + Send + Sync>;

struct HookEntry {
    hook: VetoHook,
    priority: HookPriority,
    insertion_order: u64,
}

struct ListenerEntry {
    listener: Listener,
    filter: Option<EventFilter>,
}

impl std::fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEntry")
            .field("priority", &self.priority)
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// HookBus
// ---------------------------------------------------------------------------

/// Holds veto hooks per proposal kind and listeners per event kind.
///
/// Registration takes `&mut self`; once the engine is initialized the bus is
/// shared read-only, so offers and deliveries never contend.
#[derive(Debug, Default)]
pub struct HookBus {
    hooks: [Vec<HookEntry>; PROPOSAL_KIND_COUNT],
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    failure_policy: HookFailurePolicy,
    next_insertion_order: u64,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure_policy(&mut self, policy: HookFailurePolicy) {
        self.failure_policy = policy;
    }

    pub fn failure_policy(&self) -> HookFailurePolicy {
        self.failure_policy
    }

    /// Register a veto hook with Normal priority.
    pub fn on_veto(&mut self, kind: ProposalKind, hook: VetoHook) {
        self.on_veto_prioritized(kind, HookPriority::Normal, hook);
    }

    /// Register a veto hook with explicit priority. Hooks run in
    /// `(priority, registration order)`.
    pub fn on_veto_prioritized(&mut self, kind: ProposalKind, priority: HookPriority, hook: VetoHook) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        let hooks = &mut self.hooks[kind.index()];
        hooks.push(HookEntry {
            hook,
            priority,
            insertion_order: order,
        });
        hooks.sort_by_key(|entry| (entry.priority, entry.insertion_order));
    }

    /// Register a passive listener for an event kind.
    pub fn on_event(&mut self, kind: EventKind, listener: Listener) {
        self.listeners[kind.index()].push(ListenerEntry {
            listener,
            filter: None,
        });
    }

    /// Register a passive listener that only sees events passing `filter`.
    pub fn on_event_filtered(&mut self, kind: EventKind, filter: EventFilter, listener: Listener) {
        self.listeners[kind.index()].push(ListenerEntry {
            listener,
            filter: Some(filter),
        });
    }

    pub fn hook_count(&self, kind: ProposalKind) -> usize {
        self.hooks[kind.index()].len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners[kind.index()].len()
    }

    /// Offer a proposal to every hook registered for its kind.
    ///
    /// Returns the proposal to apply (possibly with an amended burn
    /// duration), or `None` if any hook denied it. The first `Deny`
    /// short-circuits the remaining hooks.
    pub fn offer(&self, proposal: Proposal) -> Option<Proposal> {
        let mut proposal = proposal;
        for entry in &self.hooks[proposal.kind().index()] {
            let verdict = match catch_unwind(AssertUnwindSafe(|| (entry.hook)(&proposal))) {
                Ok(verdict) => verdict,
                Err(_) => {
                    tracing::warn!(
                        machine = %proposal.machine(),
                        kind = ?proposal.kind(),
                        policy = ?self.failure_policy,
                        "veto hook panicked"
                    );
                    match self.failure_policy {
                        HookFailurePolicy::FailOpen => Verdict::Allow,
                        HookFailurePolicy::FailClosed => Verdict::Deny,
                    }
                }
            };
            match verdict {
                Verdict::Allow => {}
                Verdict::Deny => return None,
                Verdict::AmendBurnTicks(ticks) => match &mut proposal {
                    Proposal::Ignite { burn_ticks, .. } => *burn_ticks = ticks,
                    Proposal::BurnFuel {
                        fuel_remaining,
                        burn_ticks,
                        ..
                    } => {
                        let burned = burn_ticks.saturating_sub(*fuel_remaining);
                        *fuel_remaining = ticks.saturating_sub(burned);
                        *burn_ticks = ticks;
                    }
                    Proposal::AdvanceProgress { .. } => {}
                },
            }
        }
        Some(proposal)
    }

    /// Deliver events to listeners, oldest first. A panicking listener is
    /// logged and skipped.
    pub fn deliver(&self, events: &[MachineEvent]) {
        for event in events {
            for entry in &self.listeners[event.kind().index()] {
                if entry.filter.as_ref().is_some_and(|filter| !filter(event)) {
                    continue;
                }
                if catch_unwind(AssertUnwindSafe(|| (entry.listener)(event))).is_err() {
                    tracing::warn!(machine = %event.machine(), kind = ?event.kind(), "event listener panicked");
                }
            }
        }
    }
}
