//! vfurnace-core -- tick-driven simulation of virtual furnaces and brewing
//! stands.
//!
//! Machines exist purely as in-memory state, independent of any block or
//! inventory in the host game. Once per logical tick every live machine
//! burns fuel and advances its cook or brew progress, with external veto
//! hooks able to cancel each change before it is applied. Machine state
//! survives a full persist/reload round trip, partial progress included.
//!
//! # Tick pipeline
//!
//! Each call to [`scheduler::Scheduler::tick`]:
//!
//! 1. **Snapshot** -- Take the ids of every live machine.
//! 2. **Advance** -- Run the furnace or brewing transition on each machine
//!    that is still live, offering proposals to veto hooks.
//! 3. **Deliver** -- Hand the tick's events to passive listeners.
//! 4. **Checkpoint** -- Every `tick_checkpoint_period` ticks, persist all
//!    machines.
//!
//! # Key Types
//!
//! - [`engine::EngineBuilder`] / [`engine::EngineHandle`] -- Lifecycle.
//! - [`table::TableBuilder`] / [`table::Tables`] -- Fuel and recipe tables,
//!   mutable while building and frozen once the engine starts.
//! - [`machine::MachineState`] -- One furnace or brewing stand.
//! - [`manager::MachineManager`] -- Owner of the live set and persistence.
//! - [`event::HookBus`] -- Veto hooks and event listeners.
//! - [`store::MachineStore`] -- Storage seam, with memory and directory
//!   implementations.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point for progress fractions.

pub mod config;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod id;
pub mod item;
pub mod machine;
pub mod manager;
pub mod scheduler;
pub mod serialize;
pub mod store;
pub mod table;
pub mod transition;
pub mod vanilla;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use engine::{initialize, shutdown};
