//! Data-driven table loading from JSON.
//!
//! Feature-gated behind `data-loader`. Extra tags, fuels and recipes are
//! applied to a [`TableBuilder`] before it is frozen. Entries are appended,
//! so for an item that is already registered the earlier entry still wins.
//!
//! ```json
//! {
//!   "tags": [{ "name": "peats", "items": ["peat", "dried_peat"] }],
//!   "fuels": [{ "matcher": { "tag": "peats" }, "burn_ticks": 800 }],
//!   "recipes": [{
//!     "machine": "furnace",
//!     "input": { "item": "raw_tin" },
//!     "ticks": 200,
//!     "output": "tin_ingot"
//!   }]
//! }
//! ```

use crate::item::ItemStack;
use crate::machine::MachineKind;
use crate::table::{FuelEntry, ItemMatcher, RecipeEntry, TableBuilder};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("output amount {amount} for {item} is out of range")]
    BadAmount { item: String, amount: u32 },
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub tags: Vec<TagData>,
    #[serde(default)]
    pub fuels: Vec<FuelData>,
    #[serde(default)]
    pub brewing_fuel: Option<BrewingFuelData>,
    #[serde(default)]
    pub recipes: Vec<RecipeData>,
}

#[derive(Debug, serde::Deserialize)]
pub struct TagData {
    pub name: String,
    pub items: Vec<String>,
}

/// `{ "item": "coal" }` or `{ "tag": "logs" }`.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherData {
    Item(String),
    Tag(String),
}

#[derive(Debug, serde::Deserialize)]
pub struct FuelData {
    pub matcher: MatcherData,
    pub burn_ticks: u32,
    #[serde(default)]
    pub remainder: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct BrewingFuelData {
    pub item: String,
    pub burn_ticks: u32,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineData {
    Furnace,
    BrewingStand,
}

#[derive(Debug, serde::Deserialize)]
pub struct RecipeData {
    pub machine: MachineData,
    pub input: MatcherData,
    pub ticks: u32,
    pub output: String,
    #[serde(default = "one")]
    pub amount: u32,
}

fn one() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Apply table data from a JSON string to `builder`.
pub fn load_tables_json(builder: &mut TableBuilder, json: &str) -> Result<(), DataLoadError> {
    let data: TableData = serde_json::from_str(json)?;
    apply(builder, data)
}

/// Apply table data from JSON bytes to `builder`.
pub fn load_tables_json_bytes(builder: &mut TableBuilder, bytes: &[u8]) -> Result<(), DataLoadError> {
    let data: TableData = serde_json::from_slice(bytes)?;
    apply(builder, data)
}

fn matcher(data: &MatcherData) -> ItemMatcher {
    match data {
        MatcherData::Item(name) => ItemMatcher::item(name),
        MatcherData::Tag(name) => ItemMatcher::tag(name),
    }
}

fn apply(builder: &mut TableBuilder, data: TableData) -> Result<(), DataLoadError> {
    for tag in &data.tags {
        builder.register_tag(&tag.name, tag.items.iter().map(String::as_str));
    }

    for fuel in &data.fuels {
        let mut entry = FuelEntry::new(matcher(&fuel.matcher), fuel.burn_ticks);
        if let Some(remainder) = &fuel.remainder {
            entry = entry.with_remainder(remainder);
        }
        builder.register_fuel(entry);
    }

    if let Some(fuel) = &data.brewing_fuel {
        builder.set_brewing_fuel(&fuel.item, fuel.burn_ticks);
    }

    for recipe in &data.recipes {
        let output = ItemStack::new(recipe.output.as_str(), recipe.amount);
        if !output.is_valid() {
            return Err(DataLoadError::BadAmount {
                item: recipe.output.clone(),
                amount: recipe.amount,
            });
        }
        let kind = match recipe.machine {
            MachineData::Furnace => MachineKind::Furnace,
            MachineData::BrewingStand => MachineKind::BrewingStand,
        };
        builder.register_recipe(kind, RecipeEntry::new(matcher(&recipe.input), recipe.ticks, output));
    }

    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
