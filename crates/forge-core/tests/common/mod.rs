// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use forge_core::{Item, Lookup, MetadataTable, Property};

/// Builds an item with explicit metadata.
pub fn item_with(ty: &str, include: &str, metadata: &[(&str, &str)]) -> Item {
    let table: MetadataTable = metadata.iter().copied().collect();
    Item::new(ty, include).with_metadata(table)
}

/// Seeds `lookup` with one item per include.
pub fn seed_items(lookup: &mut Lookup, ty: &str, includes: &[&str]) {
    for include in includes {
        lookup.seed_item(Item::new(ty, *include));
    }
}

/// Seeds `lookup` with properties.
pub fn seed_properties(lookup: &mut Lookup, properties: &[(&str, &str)]) {
    for (name, value) in properties {
        lookup.seed_property(Property::new(*name, *value));
    }
}

/// The includes of every visible item of `ty`, in order.
pub fn includes(lookup: &Lookup, ty: &str) -> Vec<String> {
    lookup
        .get_items(ty)
        .into_iter()
        .map(|s| s.item.include())
        .collect()
}
