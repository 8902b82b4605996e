//! Fuel and recipe lookup tables.
//!
//! Tables follow a two-phase lifecycle: entries are registered on a
//! [`TableBuilder`], then [`TableBuilder::build`] freezes them into an
//! immutable [`Tables`] that the engine shares for its whole lifetime.
//! There is no way to register an entry after the tables are built.
//!
//! # Resolution order
//!
//! Exact-item matchers are consulted before category-tag matchers. Within
//! each class the earliest registered entry wins.

use crate::id::{ItemKey, TagKey};
use crate::item::ItemStack;
use crate::machine::MachineKind;
use std::collections::{HashMap, HashSet};

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Matches a candidate item either by exact key or by category membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemMatcher {
    Item(ItemKey),
    Tag(TagKey),
}

impl ItemMatcher {
    pub fn item(name: &str) -> Self {
        Self::Item(ItemKey::from(name))
    }

    pub fn tag(name: &str) -> Self {
        Self::Tag(TagKey::from(name))
    }
}

/// A furnace or brewing-stand fuel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuelEntry {
    pub matcher: ItemMatcher,
    pub burn_ticks: u32,
    /// Item left behind in the fuel slot when the last unit burns
    /// (an empty bucket for lava).
    pub remainder: Option<ItemKey>,
}

impl FuelEntry {
    pub fn new(matcher: ItemMatcher, burn_ticks: u32) -> Self {
        Self {
            matcher,
            burn_ticks,
            remainder: None,
        }
    }

    pub fn with_remainder(mut self, item: &str) -> Self {
        self.remainder = Some(ItemKey::from(item));
        self
    }
}

/// A smelting or brewing recipe.
///
/// For a brewing stand `input` matches the shared ingredient and `output`
/// replaces every occupied potion slot on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeEntry {
    pub input: ItemMatcher,
    pub required_ticks: u32,
    pub output: ItemStack,
}

impl RecipeEntry {
    pub fn new(input: ItemMatcher, required_ticks: u32, output: ItemStack) -> Self {
        Self {
            input,
            required_ticks,
            output,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("unknown tag: {0}")]
    UnknownTag(TagKey),
    #[error("{0} has a zero duration")]
    ZeroDuration(String),
    #[error("recipe output {0} is not a valid stack")]
    InvalidOutput(ItemKey),
    #[error("not found: {0}")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Match index
// ---------------------------------------------------------------------------

/// Resolves an item to the first matching entry index, exact before tag.
#[derive(Debug, Default)]
struct MatchIndex {
    exact: HashMap<ItemKey, usize>,
    tagged: Vec<(TagKey, usize)>,
}

impl MatchIndex {
    fn build<'a>(matchers: impl Iterator<Item = &'a ItemMatcher>) -> Self {
        let mut index = Self::default();
        for (i, matcher) in matchers.enumerate() {
            match matcher {
                ItemMatcher::Item(item) => {
                    index.exact.entry(item.clone()).or_insert(i);
                }
                ItemMatcher::Tag(tag) => index.tagged.push((tag.clone(), i)),
            }
        }
        index
    }

    fn resolve(&self, item: &ItemKey, tags: &HashMap<TagKey, HashSet<ItemKey>>) -> Option<usize> {
        if let Some(&i) = self.exact.get(item) {
            return Some(i);
        }
        self.tagged
            .iter()
            .find(|(tag, _)| tags.get(tag).is_some_and(|members| members.contains(item)))
            .map(|(_, i)| *i)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects tags, fuels and recipes before the tables are frozen.
#[derive(Debug, Default)]
pub struct TableBuilder {
    tags: HashMap<TagKey, HashSet<ItemKey>>,
    furnace_fuels: Vec<FuelEntry>,
    brewing_fuel: Option<FuelEntry>,
    furnace_recipes: Vec<RecipeEntry>,
    brewing_recipes: Vec<RecipeEntry>,
}

impl TableBuilder {
    /// An empty builder with no tags, fuels or recipes.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder pre-populated with the vanilla data set.
    pub fn vanilla() -> Self {
        let mut builder = Self::new();
        crate::vanilla::register_all(&mut builder);
        builder
    }

    /// Add items to a category tag, creating the tag if needed.
    pub fn register_tag<I, K>(&mut self, tag: &str, items: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<ItemKey>,
    {
        self.tags
            .entry(TagKey::from(tag))
            .or_default()
            .extend(items.into_iter().map(Into::into));
    }

    /// Register a furnace fuel.
    pub fn register_fuel(&mut self, entry: FuelEntry) {
        self.furnace_fuels.push(entry);
    }

    /// Set the single item that fuels brewing stands.
    pub fn set_brewing_fuel(&mut self, item: &str, burn_ticks: u32) {
        self.brewing_fuel = Some(FuelEntry::new(ItemMatcher::item(item), burn_ticks));
    }

    /// Register a recipe for the given machine kind.
    pub fn register_recipe(&mut self, kind: MachineKind, entry: RecipeEntry) {
        match kind {
            MachineKind::Furnace => self.furnace_recipes.push(entry),
            MachineKind::BrewingStand => self.brewing_recipes.push(entry),
        }
    }

    /// Mutate the first recipe registered for `input`.
    pub fn mutate_recipe<F>(
        &mut self,
        kind: MachineKind,
        input: &ItemMatcher,
        f: F,
    ) -> Result<(), TableError>
    where
        F: FnOnce(&mut RecipeEntry),
    {
        let recipes = match kind {
            MachineKind::Furnace => &mut self.furnace_recipes,
            MachineKind::BrewingStand => &mut self.brewing_recipes,
        };
        let recipe = recipes
            .iter_mut()
            .find(|r| &r.input == input)
            .ok_or_else(|| TableError::NotFound(format!("{input:?}")))?;
        f(recipe);
        Ok(())
    }

    pub fn fuel_count(&self) -> usize {
        self.furnace_fuels.len()
    }

    pub fn recipe_count(&self, kind: MachineKind) -> usize {
        match kind {
            MachineKind::Furnace => self.furnace_recipes.len(),
            MachineKind::BrewingStand => self.brewing_recipes.len(),
        }
    }

    fn check_matcher(&self, matcher: &ItemMatcher) -> Result<(), TableError> {
        match matcher {
            ItemMatcher::Tag(tag) if !self.tags.contains_key(tag) => {
                Err(TableError::UnknownTag(tag.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Freeze the builder into immutable tables.
    pub fn build(self) -> Result<Tables, TableError> {
        for fuel in self.furnace_fuels.iter().chain(self.brewing_fuel.iter()) {
            self.check_matcher(&fuel.matcher)?;
            if fuel.burn_ticks == 0 {
                return Err(TableError::ZeroDuration(format!("fuel {:?}", fuel.matcher)));
            }
        }
        for recipe in self.furnace_recipes.iter().chain(self.brewing_recipes.iter()) {
            self.check_matcher(&recipe.input)?;
            if recipe.required_ticks == 0 {
                return Err(TableError::ZeroDuration(format!("recipe {:?}", recipe.input)));
            }
            if !recipe.output.is_valid() {
                return Err(TableError::InvalidOutput(recipe.output.item.clone()));
            }
        }

        let furnace_fuel_index = MatchIndex::build(self.furnace_fuels.iter().map(|f| &f.matcher));
        let furnace_recipe_index =
            MatchIndex::build(self.furnace_recipes.iter().map(|r| &r.input));
        let brewing_recipe_index =
            MatchIndex::build(self.brewing_recipes.iter().map(|r| &r.input));

        Ok(Tables {
            tags: self.tags,
            furnace_fuels: self.furnace_fuels,
            furnace_fuel_index,
            brewing_fuel: self.brewing_fuel,
            furnace_recipes: self.furnace_recipes,
            furnace_recipe_index,
            brewing_recipes: self.brewing_recipes,
            brewing_recipe_index,
        })
    }
}

// ---------------------------------------------------------------------------
// Frozen tables
// ---------------------------------------------------------------------------

/// Immutable fuel and recipe tables. Thread-safe to share.
#[derive(Debug)]
pub struct Tables {
    tags: HashMap<TagKey, HashSet<ItemKey>>,
    furnace_fuels: Vec<FuelEntry>,
    furnace_fuel_index: MatchIndex,
    brewing_fuel: Option<FuelEntry>,
    furnace_recipes: Vec<RecipeEntry>,
    furnace_recipe_index: MatchIndex,
    brewing_recipes: Vec<RecipeEntry>,
    brewing_recipe_index: MatchIndex,
}

impl Tables {
    /// Look up a furnace fuel for `item`.
    pub fn lookup_fuel(&self, item: &ItemKey) -> Option<&FuelEntry> {
        self.furnace_fuel_index
            .resolve(item, &self.tags)
            .map(|i| &self.furnace_fuels[i])
    }

    /// The single brewing-stand fuel, if one is registered.
    pub fn brewing_fuel(&self) -> Option<&FuelEntry> {
        self.brewing_fuel.as_ref()
    }

    /// Look up the fuel entry a machine of `kind` would burn for `item`.
    /// Brewing stands only accept their fixed fuel item; no tag matching.
    pub fn fuel_for(&self, kind: MachineKind, item: &ItemKey) -> Option<&FuelEntry> {
        match kind {
            MachineKind::Furnace => self.lookup_fuel(item),
            MachineKind::BrewingStand => self
                .brewing_fuel
                .as_ref()
                .filter(|fuel| matches!(&fuel.matcher, ItemMatcher::Item(k) if k == item)),
        }
    }

    /// Look up the recipe a machine of `kind` applies to `item`.
    pub fn lookup_recipe(&self, kind: MachineKind, item: &ItemKey) -> Option<&RecipeEntry> {
        match kind {
            MachineKind::Furnace => self
                .furnace_recipe_index
                .resolve(item, &self.tags)
                .map(|i| &self.furnace_recipes[i]),
            MachineKind::BrewingStand => self
                .brewing_recipe_index
                .resolve(item, &self.tags)
                .map(|i| &self.brewing_recipes[i]),
        }
    }

    /// Whether `item` belongs to `tag`.
    pub fn is_tagged(&self, tag: &TagKey, item: &ItemKey) -> bool {
        self.tags.get(tag).is_some_and(|members| members.contains(item))
    }

    pub fn fuel_count(&self) -> usize {
        self.furnace_fuels.len()
    }

    pub fn recipe_count(&self, kind: MachineKind) -> usize {
        match kind {
            MachineKind::Furnace => self.furnace_recipes.len(),
            MachineKind::BrewingStand => self.brewing_recipes.len(),
        }
    }
}
