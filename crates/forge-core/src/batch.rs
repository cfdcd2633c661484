// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Item batching: partitioning consumed item lists into execution buckets.
//!
//! Given the expressions a target or task consumes, the batching engine
//! collects their metadata references, partitions the consumed items by
//! the referenced metadata values, and yields one [`ItemBucket`] per
//! distinct value tuple. Each bucket carries the metadata binding that
//! drove the partition plus the items that contributed to it; one task
//! invocation runs per bucket.
//!
//! Ordering invariant:
//! - Buckets are yielded in the order their first contributing item
//!   appears in the consumed item lists; ties between independent lists
//!   preserve declaration order.
//! - Folding is by full key tuple, with empty and missing metadata values
//!   in the same equivalence class, so batching the same input twice
//!   yields equal bucket sequences.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::expand::{extract_references, Expander, MetadataBinding, ReferenceSet};
use crate::expand::ExpandError;
use crate::lookup::{ItemSnapshot, Lookup};
use crate::telemetry::TelemetrySink;

/// Stable diagnostic code for an illegal unqualified metadata reference.
pub const INVALID_METADATA_REFERENCE_CODE: &str = "FRG4006";

/// Stable diagnostic code for item-vector concatenation.
pub const ITEM_VECTOR_CONCATENATION_CODE: &str = "FRG4012";

/// Failures raised while partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// An unqualified `%()` reference could not be resolved: either no
    /// item list is consumed in the same expression set, or a consumed
    /// item defines a non-empty value while another lacks the name
    /// entirely.
    #[error("{INVALID_METADATA_REFERENCE_CODE}: unqualified metadata reference %({name}) cannot be resolved against the consumed item lists")]
    InvalidMetadataReference {
        /// The referenced metadata name.
        name: String,
    },
    /// The underlying expression was malformed or illegally concatenated.
    #[error(transparent)]
    Expression(#[from] ExpandError),
}

impl BatchError {
    /// The stable diagnostic code callers key error handling on.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMetadataReference { .. } => INVALID_METADATA_REFERENCE_CODE,
            Self::Expression(ExpandError::ItemVectorConcatenation(_)) => {
                ITEM_VECTOR_CONCATENATION_CODE
            }
            Self::Expression(ExpandError::Malformed(_)) => "FRG4000",
        }
    }
}

/// One invocation's worth of items plus the metadata binding that drove
/// the partition.
#[derive(Debug, Clone)]
pub struct ItemBucket {
    binding: MetadataBinding,
    items: BTreeMap<String, Vec<ItemSnapshot>>,
    batched_types: BTreeSet<String>,
    lookup: Lookup,
    order: usize,
}

impl ItemBucket {
    /// The metadata binding for `%()` references inside this bucket.
    #[must_use]
    pub fn binding(&self) -> &MetadataBinding {
        &self.binding
    }

    /// Items of `item_type` belonging to this bucket.
    ///
    /// Empty when the type participates in batching but contributed
    /// nothing here; callers wanting the full list for unbatched types go
    /// through the expander or the lookup.
    #[must_use]
    pub fn items_of(&self, item_type: &str) -> &[ItemSnapshot] {
        self.items
            .get(&item_type.to_ascii_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    /// The item types that drove this partition.
    #[must_use]
    pub fn batched_types(&self) -> impl Iterator<Item = &str> {
        self.batched_types.iter().map(String::as_str)
    }

    /// Position of this bucket in the yielded sequence.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// The bucket's view of item and property state.
    ///
    /// This is a snapshot of the lookup the partition ran against; task
    /// execution enters scopes on it and commits mutations through it.
    #[must_use]
    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    /// Mutable access to the bucket's lookup for task execution.
    pub fn lookup_mut(&mut self) -> &mut Lookup {
        &mut self.lookup
    }

    /// An expander bound to this bucket's binding and item partition.
    #[must_use]
    pub fn expander(&self) -> Expander<'_> {
        Expander::for_bucket(&self.lookup, &self.binding, &self.items, &self.batched_types)
    }
}

/// Canonical reference key: every bucket key is a tuple over this list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RefKey {
    Qualified(String, String),
    Unqualified(String),
}

/// Partitions the items consumed by `expressions` into buckets.
///
/// With no metadata references at all, one bucket with the empty binding
/// is returned (no batching). With references but no contributing items,
/// zero buckets are returned — the caller reports the target *Skipped*.
pub fn partition_buckets(
    lookup: &Lookup,
    expressions: &[&str],
) -> Result<Vec<ItemBucket>, BatchError> {
    let mut refs = ReferenceSet::default();
    for expression in expressions {
        refs.merge(extract_references(expression)?);
    }

    if refs.qualified.is_empty() && refs.unqualified.is_empty() {
        // Nothing to batch on: a single bucket carrying the empty binding.
        return Ok(vec![ItemBucket {
            binding: MetadataBinding::new(),
            items: BTreeMap::new(),
            batched_types: BTreeSet::new(),
            lookup: lookup.snapshot(),
            order: 0,
        }]);
    }

    let consumed: Vec<(String, Vec<ItemSnapshot>)> = refs
        .consumed_order
        .iter()
        .map(|key| (key.clone(), lookup.get_items(key)))
        .collect();

    check_unqualified_references(&refs, &consumed)?;

    // Canonical key order for the tuple; BTreeSet iteration is stable.
    let keys: Vec<RefKey> = refs
        .qualified
        .iter()
        .map(|(t, m)| RefKey::Qualified(t.clone(), m.clone()))
        .chain(refs.unqualified.iter().map(|m| RefKey::Unqualified(m.clone())))
        .collect();

    let mut index: FxHashMap<Vec<String>, usize> = FxHashMap::default();
    let mut buckets: Vec<ItemBucket> = Vec::new();
    let batched_types: BTreeSet<String> = refs.consumed_order.iter().cloned().collect();

    for (type_key, snapshots) in &consumed {
        for snapshot in snapshots {
            let key_tuple: Vec<String> = keys
                .iter()
                .map(|key| key_value_for(key, type_key, snapshot))
                .collect();
            let slot = *index.entry(key_tuple.clone()).or_insert_with(|| {
                let mut binding = MetadataBinding::new();
                for (key, value) in keys.iter().zip(&key_tuple) {
                    match key {
                        RefKey::Qualified(t, m) => binding.bind_qualified(t, m, value.clone()),
                        RefKey::Unqualified(m) => binding.bind_unqualified(m, value.clone()),
                    }
                }
                buckets.push(ItemBucket {
                    binding,
                    items: BTreeMap::new(),
                    batched_types: batched_types.clone(),
                    lookup: lookup.snapshot(),
                    order: buckets.len(),
                });
                buckets.len() - 1
            });
            buckets[slot]
                .items
                .entry(type_key.clone())
                .or_default()
                .push(snapshot.clone());
        }
    }

    Ok(buckets)
}

/// [`partition_buckets`] with a telemetry sink observing the outcome.
pub fn partition_buckets_observed(
    lookup: &Lookup,
    expressions: &[&str],
    telemetry: &dyn TelemetrySink,
) -> Result<Vec<ItemBucket>, BatchError> {
    let buckets = partition_buckets(lookup, expressions)?;
    telemetry.buckets_partitioned(buckets.len());
    Ok(buckets)
}

/// Validates every unqualified reference per the resolution rules.
///
/// Undefined and empty are the same equivalence class, so a reference is
/// illegal only when some consumed item carries a *non-empty* value while
/// another consumed item lacks the name entirely — or when no item list
/// is consumed at all.
fn check_unqualified_references(
    refs: &ReferenceSet,
    consumed: &[(String, Vec<ItemSnapshot>)],
) -> Result<(), BatchError> {
    for name in &refs.unqualified {
        if refs.consumed_order.is_empty() {
            return Err(BatchError::InvalidMetadataReference { name: name.clone() });
        }
        let mut any_undefined = false;
        let mut any_non_empty = false;
        for (_, snapshots) in consumed {
            for snapshot in snapshots {
                match snapshot.item.get_metadata(name) {
                    None => any_undefined = true,
                    Some(value) if !value.is_empty() => any_non_empty = true,
                    Some(_) => {}
                }
            }
        }
        if any_undefined && any_non_empty {
            return Err(BatchError::InvalidMetadataReference { name: name.clone() });
        }
    }
    Ok(())
}

/// The key-tuple component an item contributes for one reference.
///
/// Qualified references pertain only to items of their own type; for any
/// other item the component is empty, putting the item in the empty
/// equivalence class for that reference.
fn key_value_for(key: &RefKey, item_type_key: &str, snapshot: &ItemSnapshot) -> String {
    match key {
        RefKey::Qualified(t, m) => {
            if t == item_type_key {
                snapshot.item.get_metadata_or_empty(m)
            } else {
                String::new()
            }
        }
        RefKey::Unqualified(m) => snapshot.item.get_metadata_or_empty(m),
    }
}
