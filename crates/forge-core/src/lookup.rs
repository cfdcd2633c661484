// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stacked, copy-on-write view over the item and property tables.
//!
//! A [`Lookup`] is what a task sees: the bottom of the stack reads through
//! to the shared primary tables, and every entered scope pushes a frame
//! that records *deltas* — ordered additions, removal identities, pending
//! metadata modifications, and property overrides. Reads fold the stack
//! bottom-up:
//!
//! ```text
//! visible(T) = (primary_T − Σ removes) ∪ Σ adds     (modifications folded in)
//! ```
//!
//! Leaving a scope commits its deltas to the parent frame atomically; the
//! outermost commit applies them to the primary tables themselves. Nothing
//! mutates an item in place until that final commit, so siblings never see
//! each other's work and an unentered scope never sees an add.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::ident::ItemHandle;
use crate::item::{is_reserved_metadata, Item};
use crate::table::{ItemArena, ItemTable, Property, PropertyTable};
use crate::telemetry::{NullTelemetrySink, TelemetrySink};

/// Failures raised by lookup operations.
///
/// All of these indicate programmer error in the engine's host, not user
/// error in a project: scopes left out of order, mutations attempted with
/// no scope entered, or built-in metadata names being assigned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// `leave_scope` was handed a frame other than the current top.
    #[error("scope handle does not match the current top frame")]
    InvalidScopeOrder,
    /// An add/remove/modify was attempted with only the global frame present.
    #[error("items may not be mutated in the global scope")]
    ModifyInGlobalScope,
    /// A modification attempted to set a built-in metadata name.
    #[error("metadata name is reserved: {0}")]
    ReservedMetadata(String),
    /// A handle did not resolve to an item in this lookup's arena.
    #[error("unknown item handle: {0}")]
    UnknownItem(ItemHandle),
}

/// One pending change to a single metadata name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataModification {
    /// Assign this value when the scope commits.
    SetTo(String),
    /// Preserve whatever the enclosing scope sees.
    ///
    /// On its own this is a no-op; under `keep_only_specified` it is the
    /// way to exempt a name from zeroing.
    Unchanged,
    /// Drop the metadata entry entirely.
    Remove,
}

/// An ordered set of pending metadata modifications for one item.
///
/// `keep_only_specified` is tri-state: `None` inherits the sticky value of
/// the enclosing scope, `Some(true)` zeroes every metadata name not listed
/// in the set, and `Some(false)` explicitly switches the zeroing off again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationSet {
    entries: Vec<(String, MetadataModification)>,
    keep_only_specified: Option<bool>,
}

impl ModificationSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a modification for `name`, rejecting built-in names.
    ///
    /// A later entry for the same (case-insensitive) name replaces the
    /// earlier one in place.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        modification: MetadataModification,
    ) -> Result<&mut Self, LookupError> {
        let name = name.into();
        if is_reserved_metadata(&name) {
            return Err(LookupError::ReservedMetadata(name));
        }
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            entry.1 = modification;
        } else {
            self.entries.push((name, modification));
        }
        Ok(self)
    }

    /// Sets the `keep_only_specified` flag explicitly.
    #[must_use]
    pub fn keep_only_specified(mut self, keep: bool) -> Self {
        self.keep_only_specified = Some(keep);
        self
    }

    /// Looks up the pending modification for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetadataModification> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, m)| m)
    }

    /// True when the set names no metadata and carries no flag.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.keep_only_specified.is_none()
    }

    fn names_name(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// A modification set whose sticky flag has been resolved to a plain bool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ResolvedModification {
    entries: Vec<(String, MetadataModification)>,
    keep_only: bool,
}

impl ResolvedModification {
    fn from_set(set: &ModificationSet, inherited_keep_only: bool) -> Self {
        Self {
            entries: set.entries.clone(),
            keep_only: set.keep_only_specified.unwrap_or(inherited_keep_only),
        }
    }

    /// Folds `later` on top of `self`: later keys override earlier keys of
    /// the same name, untouched keys remain, and the later flag wins.
    fn merge_later(&mut self, later: &ResolvedModification) {
        for (name, modification) in &later.entries {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
            {
                entry.1 = modification.clone();
            } else {
                self.entries.push((name.clone(), modification.clone()));
            }
        }
        self.keep_only = later.keep_only;
    }

    /// Applies the resolved set to an item's explicit metadata.
    fn apply_to(&self, item: &mut Item) {
        if self.keep_only {
            let unspecified: Vec<String> = item
                .metadata()
                .iter()
                .filter(|e| !self.names(&e.name))
                .map(|e| e.name.clone())
                .collect();
            for name in unspecified {
                item.metadata_mut().set_unchecked(name, String::new());
            }
        }
        for (name, modification) in &self.entries {
            match modification {
                MetadataModification::SetTo(value) => {
                    item.metadata_mut().set_unchecked(name.clone(), value.clone());
                }
                MetadataModification::Remove => {
                    item.metadata_mut().remove(name);
                }
                MetadataModification::Unchanged => {}
            }
        }
    }

    fn names(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// Token for a pushed scope; required to leave it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeHandle {
    id: u64,
}

/// An item read out of a lookup: stable identity plus the materialized
/// value with all pending modifications folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    /// Arena identity of the item.
    pub handle: ItemHandle,
    /// Materialized item as this lookup currently sees it.
    pub item: Item,
}

#[derive(Debug, Clone, Default)]
struct ScopeFrame {
    id: u64,
    description: String,
    adds: BTreeMap<String, Vec<ItemHandle>>,
    removes: BTreeMap<String, BTreeSet<ItemHandle>>,
    mods: BTreeMap<String, BTreeMap<ItemHandle, ResolvedModification>>,
    /// Secondary-primary seeds (`populate_with_item`): behave like primary
    /// items for this scope and its children, discarded on leave.
    seeds: BTreeMap<String, Vec<ItemHandle>>,
    properties: PropertyTable,
    /// Sticky `keep_only_specified` state for this scope.
    sticky_keep_only: Option<bool>,
}

/// Shared primary tables under the bottom of every lookup stack.
#[derive(Debug, Default)]
pub(crate) struct PrimaryTables {
    arena: ItemArena,
    items: ItemTable,
    properties: PropertyTable,
}

/// The stacked item/property view described in the module docs.
#[derive(Clone)]
pub struct Lookup {
    primary: Arc<RwLock<PrimaryTables>>,
    frames: Vec<ScopeFrame>,
    next_scope_id: u64,
    telemetry: Arc<dyn TelemetrySink>,
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup")
            .field("frames", &self.frames.len())
            .finish_non_exhaustive()
    }
}

impl Default for Lookup {
    fn default() -> Self {
        Self::new()
    }
}

impl Lookup {
    /// Creates a lookup over fresh, empty primary tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            primary: Arc::new(RwLock::new(PrimaryTables::default())),
            frames: Vec::new(),
            next_scope_id: 1,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    /// Replaces the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Seeds the *global* item table directly.
    ///
    /// This is evaluation-time population (before any scope exists), not a
    /// build-time mutation; it is the one write that bypasses the scope
    /// discipline.
    pub fn seed_item(&mut self, item: Item) -> ItemHandle {
        let mut primary = write_primary(&self.primary);
        let ty = item.item_type().to_owned();
        let handle = primary.arena.alloc(item);
        primary.items.add(&ty, handle);
        handle
    }

    /// Seeds the *global* property table directly.
    pub fn seed_property(&mut self, property: Property) {
        write_primary(&self.primary).properties.set(property);
    }

    /// Number of entered scopes (0 = only the global frame).
    #[must_use]
    pub fn scope_depth(&self) -> usize {
        self.frames.len()
    }

    // ------------------------------------------------------------------
    // Scope lifecycle
    // ------------------------------------------------------------------

    /// Pushes a new scope frame.
    ///
    /// `description` is opaque; it only labels diagnostics and telemetry.
    pub fn enter_scope(&mut self, description: impl Into<String>) -> ScopeHandle {
        let id = self.next_scope_id;
        self.next_scope_id += 1;
        let description = description.into();
        self.telemetry.scope_entered(&description);
        self.frames.push(ScopeFrame {
            id,
            description,
            ..ScopeFrame::default()
        });
        ScopeHandle { id }
    }

    /// Pops `handle`, which must be the top frame, and commits its deltas
    /// to the parent (or to the primary tables when the parent is the
    /// global frame). Commit is all-or-nothing within this call.
    pub fn leave_scope(&mut self, handle: &ScopeHandle) -> Result<(), LookupError> {
        match self.frames.last() {
            Some(top) if top.id == handle.id => {}
            _ => return Err(LookupError::InvalidScopeOrder),
        }
        // Guard above proves the stack is non-empty.
        let Some(leaving) = self.frames.pop() else {
            return Err(LookupError::InvalidScopeOrder);
        };
        let description = leaving.description.clone();
        if let Some(parent) = self.frames.last_mut() {
            Self::merge_into_parent(leaving, parent);
        } else {
            self.commit_to_primary(leaving);
        }
        self.telemetry.scope_left(&description);
        Ok(())
    }

    fn merge_into_parent(leaving: ScopeFrame, parent: &mut ScopeFrame) {
        // 1. Removes: cancel a matching parent add, else record.
        for (key, removed) in leaving.removes {
            for handle in removed {
                let cancelled = parent
                    .adds
                    .get_mut(&key)
                    .is_some_and(|adds| {
                        let before = adds.len();
                        adds.retain(|h| *h != handle);
                        before != adds.len()
                    });
                if !cancelled {
                    parent.removes.entry(key.clone()).or_default().insert(handle);
                }
            }
        }
        // 2. Modifications: later scope wins per metadata key.
        for (key, per_item) in leaving.mods {
            let parent_mods = parent.mods.entry(key).or_default();
            for (handle, modification) in per_item {
                parent_mods
                    .entry(handle)
                    .or_default()
                    .merge_later(&modification);
            }
        }
        // 3. Adds: append in original order.
        for (key, added) in leaving.adds {
            parent.adds.entry(key).or_default().extend(added);
        }
        // Properties overwrite the parent's overrides.
        for property in leaving.properties.iter() {
            parent.properties.set(property.clone());
        }
        // Seeds are scope-local pre-computed views; they do not survive.
    }

    fn commit_to_primary(&mut self, leaving: ScopeFrame) {
        let mut primary = write_primary(&self.primary);
        for (key, removed) in leaving.removes {
            for handle in removed {
                primary.items.remove(&key, handle);
            }
        }
        for (_key, per_item) in leaving.mods {
            for (handle, modification) in per_item {
                if let Some(item) = primary.arena.get_mut(handle) {
                    modification.apply_to(item);
                }
            }
        }
        for (key, added) in leaving.adds {
            for handle in added {
                primary.items.add(&key, handle);
            }
        }
        for property in leaving.properties.iter() {
            primary.properties.set(property.clone());
        }
    }

    // ------------------------------------------------------------------
    // Item reads
    // ------------------------------------------------------------------

    /// Reads the items of `item_type` visible at the current scope.
    ///
    /// Primary items come first, then additions frame by frame; removed
    /// identities never appear; pending modifications are folded into the
    /// returned values. Unknown types read as empty.
    #[must_use]
    pub fn get_items(&self, item_type: &str) -> Vec<ItemSnapshot> {
        let key = item_type.to_ascii_lowercase();
        let primary = read_primary(&self.primary);
        let handles = self.visible_handles(&primary, &key);
        handles
            .into_iter()
            .filter_map(|handle| {
                primary.arena.get(handle).map(|item| {
                    let mut item = item.clone();
                    for frame in &self.frames {
                        if let Some(modification) =
                            frame.mods.get(&key).and_then(|m| m.get(&handle))
                        {
                            modification.apply_to(&mut item);
                        }
                    }
                    ItemSnapshot { handle, item }
                })
            })
            .collect()
    }

    /// Number of items of `item_type` visible at the current scope.
    #[must_use]
    pub fn get_item_count(&self, item_type: &str) -> usize {
        let key = item_type.to_ascii_lowercase();
        let primary = read_primary(&self.primary);
        self.visible_handles(&primary, &key).len()
    }

    /// All item types with at least one visible item, in deterministic
    /// (case-folded) order.
    #[must_use]
    pub fn item_types(&self) -> Vec<String> {
        let primary = read_primary(&self.primary);
        let mut keys: BTreeSet<String> = primary
            .items
            .iter()
            .filter(|(_, handles)| !handles.is_empty())
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        for frame in &self.frames {
            keys.extend(frame.adds.keys().cloned());
            keys.extend(frame.seeds.keys().cloned());
        }
        keys.into_iter()
            .filter(|key| !self.visible_handles(&primary, key).is_empty())
            .collect()
    }

    fn visible_handles(
        &self,
        primary: &RwLockReadGuard<'_, PrimaryTables>,
        key: &str,
    ) -> Vec<ItemHandle> {
        let mut visible: Vec<ItemHandle> = primary.items.handles_of(key).to_vec();
        for frame in &self.frames {
            if let Some(seeds) = frame.seeds.get(key) {
                visible.extend(seeds.iter().copied());
            }
            if let Some(removed) = frame.removes.get(key) {
                visible.retain(|h| !removed.contains(h));
            }
            if let Some(added) = frame.adds.get(key) {
                visible.extend(added.iter().copied());
            }
        }
        visible
    }

    // ------------------------------------------------------------------
    // Item mutations
    // ------------------------------------------------------------------

    /// Appends `item` to the top frame's add list.
    ///
    /// Requires at least one entered scope; mutating the global frame is a
    /// programmer error.
    pub fn add_new_item(&mut self, item: Item) -> Result<ItemHandle, LookupError> {
        if self.frames.is_empty() {
            return Err(LookupError::ModifyInGlobalScope);
        }
        let key = item.item_type().to_ascii_lowercase();
        let handle = write_primary(&self.primary).arena.alloc(item);
        // Frame existence checked above.
        if let Some(top) = self.frames.last_mut() {
            top.adds.entry(key).or_default().push(handle);
        }
        Ok(handle)
    }

    /// Adds a batch of items of one type, optionally folding duplicates.
    ///
    /// With `dedupe`, an incoming item whose `(include, metadata-multiset)`
    /// matches a visible item of the same type — primary, already added, or
    /// earlier in this same batch — is dropped. Returns the handles of the
    /// items actually added.
    pub fn add_new_items(
        &mut self,
        item_type: &str,
        items: Vec<Item>,
        dedupe: bool,
    ) -> Result<Vec<ItemHandle>, LookupError> {
        if self.frames.is_empty() {
            return Err(LookupError::ModifyInGlobalScope);
        }
        let mut seen: BTreeSet<(String, String, Vec<(String, String)>)> = BTreeSet::new();
        if dedupe {
            for snapshot in self.get_items(item_type) {
                seen.insert(snapshot.item.identity_key());
            }
        }
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            if dedupe && !seen.insert(item.identity_key()) {
                continue;
            }
            handles.push(self.add_new_item(item)?);
        }
        Ok(handles)
    }

    /// Records a remove for `handle` in the top frame.
    ///
    /// Removing an item added in the same frame cancels the add instead;
    /// re-removing an already-removed item is idempotent.
    pub fn remove_item(&mut self, handle: ItemHandle) -> Result<(), LookupError> {
        if self.frames.is_empty() {
            return Err(LookupError::ModifyInGlobalScope);
        }
        let key = {
            let primary = read_primary(&self.primary);
            let item = primary
                .arena
                .get(handle)
                .ok_or(LookupError::UnknownItem(handle))?;
            item.item_type().to_ascii_lowercase()
        };
        if let Some(top) = self.frames.last_mut() {
            let cancelled = top.adds.get_mut(&key).is_some_and(|adds| {
                let before = adds.len();
                adds.retain(|h| *h != handle);
                before != adds.len()
            });
            if !cancelled {
                top.removes.entry(key).or_default().insert(handle);
            }
        }
        Ok(())
    }

    /// Records metadata modifications for `handles` in the top frame.
    ///
    /// A later modify on the same item in the same scope merges: later
    /// keys override earlier keys of the same name, untouched keys remain.
    /// The `keep_only_specified` flag is sticky for the scope once set.
    pub fn modify_items(
        &mut self,
        item_type: &str,
        handles: &[ItemHandle],
        modset: &ModificationSet,
    ) -> Result<(), LookupError> {
        if self.frames.is_empty() {
            return Err(LookupError::ModifyInGlobalScope);
        }
        let key = item_type.to_ascii_lowercase();
        let inherited = self.effective_keep_only();
        let resolved = ResolvedModification::from_set(modset, inherited);
        if let Some(top) = self.frames.last_mut() {
            if let Some(flag) = modset.keep_only_specified {
                top.sticky_keep_only = Some(flag);
            }
            let per_item = top.mods.entry(key).or_default();
            for handle in handles {
                per_item
                    .entry(*handle)
                    .or_default()
                    .merge_later(&resolved);
            }
        }
        Ok(())
    }

    /// Seeds the top frame's secondary-primary view with a pre-computed
    /// item. The item is visible to this scope and its children but is
    /// *not* a local addition — it is discarded when the scope leaves.
    pub fn populate_with_item(&mut self, item: Item) -> Result<ItemHandle, LookupError> {
        if self.frames.is_empty() {
            return Err(LookupError::ModifyInGlobalScope);
        }
        let key = item.item_type().to_ascii_lowercase();
        let handle = write_primary(&self.primary).arena.alloc(item);
        if let Some(top) = self.frames.last_mut() {
            top.seeds.entry(key).or_default().push(handle);
        }
        Ok(handle)
    }

    fn effective_keep_only(&self) -> bool {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.sticky_keep_only)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Reads a property through the stack: the nearest frame override
    /// wins, then the global table.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<Property> {
        for frame in self.frames.iter().rev() {
            if let Some(property) = frame.properties.get(name) {
                return Some(property.clone());
            }
        }
        read_primary(&self.primary).properties.get(name).cloned()
    }

    /// Reads a property value, or `None` when undefined.
    #[must_use]
    pub fn property_value(&self, name: &str) -> Option<String> {
        self.get_property(name).map(|p| p.value)
    }

    /// Sets a property in the top frame (override) or, with no entered
    /// scope, directly in the global table.
    pub fn set_property(&mut self, property: Property) {
        if let Some(top) = self.frames.last_mut() {
            top.properties.set(property);
        } else {
            write_primary(&self.primary).properties.set(property);
        }
    }

    // ------------------------------------------------------------------
    // Cloning
    // ------------------------------------------------------------------

    /// Produces an independent snapshot of this lookup.
    ///
    /// The clone shares the primary tables (deltas that commit all the way
    /// down remain observable to both sides) but carries its own copy of
    /// the scope stack: mutations recorded after the call never cross
    /// between original and clone.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Reads an item straight out of the arena (no modification folding).
    #[must_use]
    pub fn arena_item(&self, handle: ItemHandle) -> Option<Item> {
        read_primary(&self.primary).arena.get(handle).cloned()
    }
}

fn read_primary(primary: &Arc<RwLock<PrimaryTables>>) -> RwLockReadGuard<'_, PrimaryTables> {
    primary.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_primary(primary: &Arc<RwLock<PrimaryTables>>) -> RwLockWriteGuard<'_, PrimaryTables> {
    primary.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn includes(lookup: &Lookup, ty: &str) -> Vec<String> {
        lookup
            .get_items(ty)
            .into_iter()
            .map(|s| s.item.include())
            .collect()
    }

    #[test]
    fn enter_leave_without_mutation_is_identity() {
        let mut lookup = Lookup::new();
        lookup.seed_item(Item::new("i1", "a1"));
        let before = includes(&lookup, "i1");
        let scope = lookup.enter_scope("noop");
        lookup.leave_scope(&scope).unwrap();
        assert_eq!(includes(&lookup, "i1"), before);
    }

    #[test]
    fn scoped_add_commits_on_leave() {
        let mut lookup = Lookup::new();
        lookup.seed_item(Item::new("i1", "a1"));
        let scope = lookup.enter_scope("target");
        lookup.add_new_item(Item::new("i1", "a2")).unwrap();
        assert_eq!(includes(&lookup, "i1"), ["a1", "a2"]);
        lookup.leave_scope(&scope).unwrap();
        assert_eq!(includes(&lookup, "i1"), ["a1", "a2"]);
    }

    #[test]
    fn add_invisible_before_scope_leaves_elsewhere() {
        let mut lookup = Lookup::new();
        lookup.seed_item(Item::new("i1", "a1"));
        let peer = lookup.snapshot();
        let scope = lookup.enter_scope("target");
        lookup.add_new_item(Item::new("i1", "a2")).unwrap();
        // The sibling view sees nothing until the delta reaches primary.
        assert_eq!(includes(&peer, "i1"), ["a1"]);
        lookup.leave_scope(&scope).unwrap();
        assert_eq!(includes(&peer, "i1"), ["a1", "a2"]);
    }

    #[test]
    fn mutation_in_global_scope_is_internal_error() {
        let mut lookup = Lookup::new();
        let handle = lookup.seed_item(Item::new("i1", "a1"));
        assert_eq!(
            lookup.add_new_item(Item::new("i1", "a2")).unwrap_err(),
            LookupError::ModifyInGlobalScope
        );
        assert_eq!(
            lookup.remove_item(handle).unwrap_err(),
            LookupError::ModifyInGlobalScope
        );
    }

    #[test]
    fn leave_out_of_order_fails() {
        let mut lookup = Lookup::new();
        let outer = lookup.enter_scope("outer");
        let _inner = lookup.enter_scope("inner");
        assert_eq!(
            lookup.leave_scope(&outer).unwrap_err(),
            LookupError::InvalidScopeOrder
        );
    }

    #[test]
    fn remove_of_same_frame_add_cancels() {
        let mut lookup = Lookup::new();
        lookup.seed_item(Item::new("i1", "a1"));
        let scope = lookup.enter_scope("target");
        let added = lookup.add_new_item(Item::new("i1", "a2")).unwrap();
        lookup.remove_item(added).unwrap();
        assert_eq!(includes(&lookup, "i1"), ["a1"]);
        lookup.leave_scope(&scope).unwrap();
        assert_eq!(includes(&lookup, "i1"), ["a1"]);
    }

    #[test]
    fn re_remove_is_idempotent() {
        let mut lookup = Lookup::new();
        let handle = lookup.seed_item(Item::new("i1", "a1"));
        let scope = lookup.enter_scope("target");
        lookup.remove_item(handle).unwrap();
        lookup.remove_item(handle).unwrap();
        assert!(includes(&lookup, "i1").is_empty());
        lookup.leave_scope(&scope).unwrap();
        assert!(includes(&lookup, "i1").is_empty());
    }

    #[test]
    fn modification_visible_in_scope_and_after_commit() {
        let mut lookup = Lookup::new();
        let handle = lookup.seed_item(
            Item::new("i1", "a1").with_metadata([("m", "old")].into_iter().collect()),
        );
        let scope = lookup.enter_scope("target");
        let mut modset = ModificationSet::new();
        modset
            .set("m", MetadataModification::SetTo("new".into()))
            .unwrap();
        lookup.modify_items("i1", &[handle], &modset).unwrap();
        let seen = &lookup.get_items("i1")[0];
        assert_eq!(seen.item.get_metadata("m").as_deref(), Some("new"));
        lookup.leave_scope(&scope).unwrap();
        let committed = lookup.arena_item(handle).unwrap();
        assert_eq!(committed.get_metadata("m").as_deref(), Some("new"));
    }

    #[test]
    fn later_modify_merges_per_key() {
        let mut lookup = Lookup::new();
        let handle = lookup.seed_item(
            Item::new("i1", "a1")
                .with_metadata([("m1", "1"), ("m2", "2")].into_iter().collect()),
        );
        let scope = lookup.enter_scope("target");
        let mut first = ModificationSet::new();
        first
            .set("m1", MetadataModification::SetTo("x".into()))
            .unwrap();
        lookup.modify_items("i1", &[handle], &first).unwrap();
        let mut second = ModificationSet::new();
        second
            .set("M1", MetadataModification::SetTo("y".into()))
            .unwrap();
        lookup.modify_items("i1", &[handle], &second).unwrap();
        lookup.leave_scope(&scope).unwrap();
        let committed = lookup.arena_item(handle).unwrap();
        assert_eq!(committed.get_metadata("m1").as_deref(), Some("y"));
        assert_eq!(committed.get_metadata("m2").as_deref(), Some("2"));
    }

    #[test]
    fn keep_only_specified_zeroes_through_two_leaves() {
        let mut lookup = Lookup::new();
        let handle = lookup.seed_item(
            Item::new("i1", "a1")
                .with_metadata([("m1", "m1"), ("m2", "m2")].into_iter().collect()),
        );
        let outer = lookup.enter_scope("outer");
        let inner = lookup.enter_scope("inner");
        let mut modset = ModificationSet::new().keep_only_specified(true);
        modset.set("m1", MetadataModification::Unchanged).unwrap();
        lookup.modify_items("i1", &[handle], &modset).unwrap();
        lookup.leave_scope(&inner).unwrap();
        lookup.leave_scope(&outer).unwrap();
        let committed = lookup.arena_item(handle).unwrap();
        assert_eq!(committed.get_metadata("m1").as_deref(), Some("m1"));
        assert_eq!(committed.get_metadata("m2").as_deref(), Some(""));
    }

    #[test]
    fn reserved_metadata_rejected_in_modset() {
        let mut modset = ModificationSet::new();
        let err = modset
            .set("Extension", MetadataModification::SetTo(".x".into()))
            .unwrap_err();
        assert_eq!(err, LookupError::ReservedMetadata("Extension".into()));
    }

    #[test]
    fn dedupe_folds_against_primary_and_batch() {
        let mut lookup = Lookup::new();
        lookup.seed_item(Item::new("i1", "a1"));
        let scope = lookup.enter_scope("target");
        let added = lookup
            .add_new_items(
                "i1",
                vec![
                    Item::new("i1", "a1"),
                    Item::new("i1", "a2"),
                    Item::new("i1", "a2"),
                ],
                true,
            )
            .unwrap();
        assert_eq!(added.len(), 1);
        lookup.leave_scope(&scope).unwrap();
        assert_eq!(includes(&lookup, "i1"), ["a1", "a2"]);
    }

    #[test]
    fn populate_with_item_is_scope_local() {
        let mut lookup = Lookup::new();
        lookup.seed_item(Item::new("i1", "a1"));
        let scope = lookup.enter_scope("target");
        lookup.populate_with_item(Item::new("i1", "pre")).unwrap();
        assert_eq!(includes(&lookup, "i1"), ["a1", "pre"]);
        lookup.leave_scope(&scope).unwrap();
        assert_eq!(includes(&lookup, "i1"), ["a1"]);
    }

    #[test]
    fn property_override_commits_outward() {
        let mut lookup = Lookup::new();
        lookup.seed_property(Property::new("p", "global"));
        let scope = lookup.enter_scope("target");
        lookup.set_property(Property::new("p", "scoped"));
        assert_eq!(lookup.property_value("P").as_deref(), Some("scoped"));
        lookup.leave_scope(&scope).unwrap();
        assert_eq!(lookup.property_value("p").as_deref(), Some("scoped"));
    }

    #[test]
    fn clone_shares_primary_but_not_frames() {
        let mut lookup = Lookup::new();
        lookup.seed_item(Item::new("i1", "a1"));
        let mut clone = lookup.snapshot();
        let scope = clone.enter_scope("child");
        clone.add_new_item(Item::new("i1", "child")).unwrap();
        // Child mutations do not leak to the caller.
        assert_eq!(includes(&lookup, "i1"), ["a1"]);
        clone.leave_scope(&scope).unwrap();
        // A committed delta reaches the shared primary and both views.
        assert_eq!(includes(&lookup, "i1"), ["a1", "child"]);
    }
}
