use crate::id::ItemKey;
use serde::{Deserialize, Serialize};

/// Maximum number of items a single slot holds.
pub const MAX_STACK: u32 = 64;

/// A stack of identical items occupying one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemKey,
    pub amount: u32,
}

impl ItemStack {
    pub fn new(item: impl Into<ItemKey>, amount: u32) -> Self {
        Self {
            item: item.into(),
            amount,
        }
    }

    /// A stack of exactly one item.
    pub fn one(item: impl Into<ItemKey>) -> Self {
        Self::new(item, 1)
    }

    pub fn is_valid(&self) -> bool {
        self.amount > 0 && self.amount <= MAX_STACK
    }
}

impl From<ItemKey> for ItemStack {
    fn from(item: ItemKey) -> Self {
        Self { item, amount: 1 }
    }
}

/// Remove one item from a slot. Empties the slot when the last item goes.
/// Returns the key of the removed item.
pub fn take_one(slot: &mut Option<ItemStack>) -> Option<ItemKey> {
    let stack = slot.as_mut()?;
    let item = stack.item.clone();
    stack.amount = stack.amount.saturating_sub(1);
    if stack.amount == 0 {
        *slot = None;
    }
    Some(item)
}

/// Whether `amount` of `item` fits into the slot without overflow.
pub fn accepts(slot: &Option<ItemStack>, item: &ItemKey, amount: u32) -> bool {
    match slot {
        None => amount <= MAX_STACK,
        Some(stack) => &stack.item == item && stack.amount + amount <= MAX_STACK,
    }
}

/// Add items to a slot. Returns the amount that didn't fit.
#[must_use = "overflow count indicates items that did not fit"]
pub fn insert(slot: &mut Option<ItemStack>, item: &ItemKey, amount: u32) -> u32 {
    match slot {
        None => {
            let to_add = amount.min(MAX_STACK);
            if to_add > 0 {
                *slot = Some(ItemStack::new(item.clone(), to_add));
            }
            amount - to_add
        }
        Some(stack) if &stack.item == item => {
            let space = MAX_STACK.saturating_sub(stack.amount);
            let to_add = amount.min(space);
            stack.amount += to_add;
            amount - to_add
        }
        Some(_) => amount,
    }
}
