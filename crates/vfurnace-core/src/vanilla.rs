//! Built-in vanilla tags, fuels and recipes.

use crate::item::ItemStack;
use crate::machine::MachineKind;
use crate::table::{FuelEntry, ItemMatcher, RecipeEntry, TableBuilder};

/// Ticks to smelt one item in a furnace.
pub const SMELT_TICKS: u32 = 200;

/// Ticks to brew one batch in a brewing stand.
pub const BREW_TICKS: u32 = 400;

/// Burn ticks of one blaze powder: twenty brews.
pub const BLAZE_POWDER_TICKS: u32 = 20 * BREW_TICKS;

const WOODS: [&str; 8] = [
    "oak", "spruce", "birch", "jungle", "acacia", "dark_oak", "mangrove", "cherry",
];

const COLORS: [&str; 16] = [
    "white", "orange", "magenta", "light_blue", "yellow", "lime", "pink", "gray",
    "light_gray", "cyan", "purple", "blue", "brown", "green", "red", "black",
];

fn variants(prefixes: &[&str], suffix: &str) -> Vec<String> {
    prefixes.iter().map(|p| format!("{p}_{suffix}")).collect()
}

/// Populate `builder` with every vanilla tag, fuel and recipe.
pub fn register_all(builder: &mut TableBuilder) {
    register_tags(builder);
    register_fuels(builder);
    register_smelting(builder);
    register_brewing(builder);
}

fn register_tags(b: &mut TableBuilder) {
    let mut logs = variants(&WOODS, "log");
    logs.extend(variants(&WOODS, "wood"));
    b.register_tag("logs", logs);
    b.register_tag("planks", variants(&WOODS, "planks"));
    b.register_tag("wooden_slabs", variants(&WOODS, "slab"));
    b.register_tag("wooden_stairs", variants(&WOODS, "stairs"));
    b.register_tag("wooden_pressure_plates", variants(&WOODS, "pressure_plate"));
    b.register_tag("wooden_trapdoors", variants(&WOODS, "trapdoor"));
    b.register_tag("wooden_doors", variants(&WOODS, "door"));
    b.register_tag("wooden_buttons", variants(&WOODS, "button"));
    b.register_tag("wooden_fences", variants(&WOODS, "fence"));
    b.register_tag("boats", variants(&WOODS, "boat"));
    b.register_tag("signs", variants(&WOODS, "sign"));
    let mut saplings = variants(&WOODS[..6], "sapling");
    saplings.extend(["mangrove_propagule".to_string(), "cherry_sapling".to_string()]);
    b.register_tag("saplings", saplings);
    b.register_tag("banners", variants(&COLORS, "banner"));
    b.register_tag("wool", variants(&COLORS, "wool"));
    b.register_tag("carpets", variants(&COLORS, "carpet"));
}

fn register_fuels(b: &mut TableBuilder) {
    b.register_fuel(FuelEntry::new(ItemMatcher::item("lava_bucket"), 20000).with_remainder("bucket"));

    let items: &[(&str, u32)] = &[
        ("coal_block", 16000),
        ("dried_kelp_block", 4000),
        ("blaze_rod", 2400),
        ("coal", 1600),
        ("charcoal", 1600),
        ("scaffolding", 400),
        ("crafting_table", 300),
        ("bookshelf", 300),
        ("chest", 300),
        ("trapped_chest", 300),
        ("daylight_detector", 300),
        ("jukebox", 300),
        ("note_block", 300),
        ("mushroom_stem", 300),
        ("brown_mushroom_block", 300),
        ("red_mushroom_block", 300),
        ("cartography_table", 300),
        ("fletching_table", 300),
        ("smithing_table", 300),
        ("lectern", 300),
        ("composter", 300),
        ("barrel", 300),
        ("loom", 300),
        ("bow", 300),
        ("fishing_rod", 300),
        ("ladder", 300),
        ("wooden_pickaxe", 200),
        ("wooden_shovel", 200),
        ("wooden_hoe", 200),
        ("wooden_axe", 200),
        ("wooden_sword", 200),
        ("bowl", 100),
        ("stick", 100),
    ];
    for &(item, ticks) in items {
        b.register_fuel(FuelEntry::new(ItemMatcher::item(item), ticks));
    }
    b.register_fuel(FuelEntry::new(ItemMatcher::item("bamboo"), 50));

    let tags: &[(&str, u32)] = &[
        ("boats", 1200),
        ("logs", 300),
        ("planks", 300),
        ("wooden_pressure_plates", 300),
        ("wooden_stairs", 300),
        ("wooden_trapdoors", 300),
        ("wooden_fences", 300),
        ("banners", 300),
        ("signs", 200),
        ("wooden_doors", 200),
        ("wooden_slabs", 150),
        ("wooden_buttons", 100),
        ("saplings", 100),
        ("wool", 100),
        ("carpets", 67),
    ];
    for &(tag, ticks) in tags {
        b.register_fuel(FuelEntry::new(ItemMatcher::tag(tag), ticks));
    }
}

fn register_smelting(b: &mut TableBuilder) {
    let recipes: &[(&str, &str)] = &[
        ("iron_ore", "iron_ingot"),
        ("raw_iron", "iron_ingot"),
        ("gold_ore", "gold_ingot"),
        ("raw_gold", "gold_ingot"),
        ("copper_ore", "copper_ingot"),
        ("raw_copper", "copper_ingot"),
        ("ancient_debris", "netherite_scrap"),
        ("sand", "glass"),
        ("cobblestone", "stone"),
        ("stone", "smooth_stone"),
        ("clay_ball", "brick"),
        ("netherrack", "nether_brick"),
        ("cactus", "green_dye"),
        ("wet_sponge", "sponge"),
        ("kelp", "dried_kelp"),
        ("potato", "baked_potato"),
        ("beef", "cooked_beef"),
        ("porkchop", "cooked_porkchop"),
        ("chicken", "cooked_chicken"),
        ("mutton", "cooked_mutton"),
        ("cod", "cooked_cod"),
        ("salmon", "cooked_salmon"),
    ];
    for &(input, output) in recipes {
        b.register_recipe(
            MachineKind::Furnace,
            RecipeEntry::new(ItemMatcher::item(input), SMELT_TICKS, ItemStack::one(output)),
        );
    }
    b.register_recipe(
        MachineKind::Furnace,
        RecipeEntry::new(ItemMatcher::tag("logs"), SMELT_TICKS, ItemStack::one("charcoal")),
    );
}

fn register_brewing(b: &mut TableBuilder) {
    b.set_brewing_fuel("blaze_powder", BLAZE_POWDER_TICKS);

    let recipes: &[(&str, &str)] = &[
        ("nether_wart", "awkward_potion"),
        ("glowstone_dust", "thick_potion"),
        ("redstone", "mundane_potion"),
        ("sugar", "potion_of_swiftness"),
        ("magma_cream", "potion_of_fire_resistance"),
        ("blaze_powder", "potion_of_strength"),
        ("ghast_tear", "potion_of_regeneration"),
        ("glistering_melon_slice", "potion_of_healing"),
        ("golden_carrot", "potion_of_night_vision"),
        ("spider_eye", "potion_of_poison"),
        ("rabbit_foot", "potion_of_leaping"),
        ("pufferfish", "potion_of_water_breathing"),
        ("fermented_spider_eye", "potion_of_weakness"),
        ("turtle_helmet", "potion_of_the_turtle_master"),
    ];
    for &(ingredient, output) in recipes {
        b.register_recipe(
            MachineKind::BrewingStand,
            RecipeEntry::new(ItemMatcher::item(ingredient), BREW_TICKS, ItemStack::one(output)),
        );
    }
}
