// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Expression expansion for the `$()` / `@()` / `%()` dialect.
//!
//! The dialect is a compatibility boundary and is preserved bit-exact:
//!
//! - `$(Name)` — property expansion.
//! - `@(Type)` — item list; optional separator `@(Type, 'sep')`; optional
//!   transform `@(Type->'%(Meta)')`.
//! - `%(Meta)` — unqualified metadata; `%(Type.Meta)` — qualified.
//!   Metadata names compare case-insensitively.
//!
//! An [`Expander`] is bound to a metadata binding (usually a bucket's): the
//! binding decides what `%()` references resolve to, and the bucket's item
//! partition decides what `@()` lists enumerate. References the binding
//! does not carry expand to the empty string — never to an error.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::lookup::{ItemSnapshot, Lookup};

/// Failures raised during expansion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    /// An item vector was concatenated with adjacent text in a context
    /// that demands a single vector, e.g. `@(T)$(x)`.
    #[error("expression concatenates an item vector with adjacent text: {0}")]
    ItemVectorConcatenation(String),
    /// The expression is syntactically malformed (unbalanced parentheses,
    /// unterminated quote, missing identifier).
    #[error("malformed expression: {0}")]
    Malformed(String),
}

/// The metadata values a bucket binds for `%()` references.
///
/// Qualified entries are keyed by `(type, name)`, unqualified by name
/// alone; both fold case on lookup. Empty and missing values are the same
/// equivalence class, so a bound empty value and an absent binding both
/// expand to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataBinding {
    qualified: BTreeMap<(String, String), String>,
    unqualified: BTreeMap<String, String>,
}

impl MetadataBinding {
    /// Creates an empty binding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `%(item_type.name)` to `value`.
    pub fn bind_qualified(&mut self, item_type: &str, name: &str, value: impl Into<String>) {
        self.qualified.insert(
            (item_type.to_ascii_lowercase(), name.to_ascii_lowercase()),
            value.into(),
        );
    }

    /// Binds `%(name)` to `value`.
    pub fn bind_unqualified(&mut self, name: &str, value: impl Into<String>) {
        self.unqualified
            .insert(name.to_ascii_lowercase(), value.into());
    }

    /// Resolves a qualified reference.
    #[must_use]
    pub fn qualified(&self, item_type: &str, name: &str) -> Option<&str> {
        self.qualified
            .get(&(item_type.to_ascii_lowercase(), name.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Resolves an unqualified reference.
    #[must_use]
    pub fn unqualified(&self, name: &str) -> Option<&str> {
        self.unqualified
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.qualified.is_empty() && self.unqualified.is_empty()
    }
}

/// Parsed form of the inside of an `@( ... )` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemRef {
    item_type: String,
    transform: Option<String>,
    separator: Option<String>,
}

/// Expands dialect expressions against a lookup and a metadata binding.
pub struct Expander<'a> {
    lookup: &'a Lookup,
    binding: Option<&'a MetadataBinding>,
    scoped_items: Option<&'a BTreeMap<String, Vec<ItemSnapshot>>>,
    batched_types: Option<&'a BTreeSet<String>>,
}

impl<'a> Expander<'a> {
    /// An expander with no binding: `%()` references expand to empty and
    /// `@()` lists always read the full lookup.
    #[must_use]
    pub fn new(lookup: &'a Lookup) -> Self {
        Self {
            lookup,
            binding: None,
            scoped_items: None,
            batched_types: None,
        }
    }

    /// An expander bound to a bucket's binding and item partition.
    pub(crate) fn for_bucket(
        lookup: &'a Lookup,
        binding: &'a MetadataBinding,
        scoped_items: &'a BTreeMap<String, Vec<ItemSnapshot>>,
        batched_types: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            lookup,
            binding: Some(binding),
            scoped_items: Some(scoped_items),
            batched_types: Some(batched_types),
        }
    }

    /// Expands every `$()`, `@()`, and `%()` reference in `expression`.
    pub fn expand(&self, expression: &str) -> Result<String, ExpandError> {
        let bytes = expression.as_bytes();
        let mut out = String::with_capacity(expression.len());
        let mut literal_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            let sigil = bytes[i];
            if matches!(sigil, b'$' | b'@' | b'%') && bytes.get(i + 1) == Some(&b'(') {
                out.push_str(&expression[literal_start..i]);
                let (inner, after) = read_parenthesized(expression, i + 1)?;
                match sigil {
                    b'$' => out.push_str(&self.property_value(inner)),
                    b'@' => out.push_str(&self.expand_item_ref(inner)?),
                    _ => out.push_str(&self.metadata_value(inner)),
                }
                i = after;
                literal_start = after;
            } else {
                i += 1;
            }
        }
        out.push_str(&expression[literal_start..]);
        Ok(out)
    }

    /// Expands a semicolon-separated list expression into entries.
    ///
    /// Splits on top-level `;` (separators inside `@()` do not split),
    /// expands each piece, and drops entries that expand to nothing.
    pub fn expand_list(&self, expression: &str) -> Result<Vec<String>, ExpandError> {
        let mut entries = Vec::new();
        for piece in split_top_level(expression) {
            let expanded = self.expand(piece.trim())?;
            for entry in expanded.split(';') {
                if !entry.is_empty() {
                    entries.push(entry.to_owned());
                }
            }
        }
        Ok(entries)
    }

    /// Expands an expression that must denote a single item vector.
    ///
    /// `@(T)` yields one entry per item; the separator form flattens to a
    /// single entry; plain text expands and splits on `;`. Mixing an item
    /// vector with any adjacent text is illegal here.
    pub fn expand_single_vector(&self, expression: &str) -> Result<Vec<String>, ExpandError> {
        let trimmed = expression.trim();
        if trimmed.starts_with("@(") {
            let (inner, after) = read_parenthesized(trimmed, 1)?;
            if !trimmed[after..].trim().is_empty() {
                return Err(ExpandError::ItemVectorConcatenation(trimmed.to_owned()));
            }
            let item_ref = parse_item_ref(inner)?;
            let items = self.items_for(&item_ref.item_type);
            if let Some(sep) = &item_ref.separator {
                // Separator forms flatten to a single entry.
                let joined = self.join_items(&items, &item_ref, sep)?;
                return Ok(if joined.is_empty() { vec![] } else { vec![joined] });
            }
            let mut out = Vec::with_capacity(items.len());
            for snapshot in &items {
                let value = match &item_ref.transform {
                    Some(pattern) => self.apply_transform(pattern, &snapshot.item)?,
                    None => snapshot.item.include(),
                };
                if !value.is_empty() {
                    out.push(value);
                }
            }
            return Ok(out);
        }
        if trimmed.contains("@(") {
            return Err(ExpandError::ItemVectorConcatenation(trimmed.to_owned()));
        }
        self.expand_list(trimmed)
    }

    fn property_value(&self, name: &str) -> String {
        self.lookup
            .property_value(name.trim())
            .unwrap_or_default()
    }

    fn metadata_value(&self, reference: &str) -> String {
        let reference = reference.trim();
        let resolved = match reference.split_once('.') {
            Some((qualifier, name)) => self
                .binding
                .and_then(|b| b.qualified(qualifier.trim(), name.trim())),
            None => self.binding.and_then(|b| b.unqualified(reference)),
        };
        resolved.unwrap_or_default().to_owned()
    }

    fn expand_item_ref(&self, inner: &str) -> Result<String, ExpandError> {
        let item_ref = parse_item_ref(inner)?;
        let items = self.items_for(&item_ref.item_type);
        let separator = item_ref.separator.clone().unwrap_or_else(|| ";".to_owned());
        self.join_items(&items, &item_ref, &separator)
    }

    fn join_items(
        &self,
        items: &[ItemSnapshot],
        item_ref: &ItemRef,
        separator: &str,
    ) -> Result<String, ExpandError> {
        let mut parts = Vec::with_capacity(items.len());
        for snapshot in items {
            let value = match &item_ref.transform {
                Some(pattern) => self.apply_transform(pattern, &snapshot.item)?,
                None => snapshot.item.include(),
            };
            parts.push(value);
        }
        Ok(parts.join(separator))
    }

    /// Expands a transform pattern against one item: `%()` references read
    /// the item's own metadata (built-ins included), `$()` reads properties.
    fn apply_transform(
        &self,
        pattern: &str,
        item: &crate::item::Item,
    ) -> Result<String, ExpandError> {
        let bytes = pattern.as_bytes();
        let mut out = String::with_capacity(pattern.len());
        let mut literal_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            let sigil = bytes[i];
            if matches!(sigil, b'$' | b'%') && bytes.get(i + 1) == Some(&b'(') {
                out.push_str(&pattern[literal_start..i]);
                let (inner, after) = read_parenthesized(pattern, i + 1)?;
                if sigil == b'$' {
                    out.push_str(&self.property_value(inner));
                } else {
                    // Inside a transform, a qualifier is allowed but the
                    // name alone decides the value.
                    let name = inner
                        .split_once('.')
                        .map_or(inner, |(_, name)| name)
                        .trim();
                    out.push_str(&item.get_metadata_or_empty(name));
                }
                i = after;
                literal_start = after;
            } else {
                i += 1;
            }
        }
        out.push_str(&pattern[literal_start..]);
        Ok(out)
    }

    /// The item list a `@()` reference enumerates: the bucket's partition
    /// when the type participates in batching (possibly empty when this
    /// bucket was driven by another type), the full lookup otherwise.
    fn items_for(&self, item_type: &str) -> Vec<ItemSnapshot> {
        let key = item_type.to_ascii_lowercase();
        let batched = self
            .batched_types
            .is_some_and(|set| set.contains(&key));
        if batched {
            return self
                .scoped_items
                .and_then(|items| items.get(&key))
                .cloned()
                .unwrap_or_default();
        }
        self.lookup.get_items(item_type)
    }
}

/// Reads a balanced `( ... )` starting at `open` (which must index a `(`).
/// Returns the inner text and the index just past the closing paren.
fn read_parenthesized(src: &str, open: usize) -> Result<(&str, usize), ExpandError> {
    let bytes = src.as_bytes();
    debug_assert_eq!(bytes.get(open), Some(&b'('));
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&src[open + 1..i], i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(ExpandError::Malformed(src.to_owned()))
}

/// Parses `Type`, `Type->'pattern'`, `Type, 'sep'`, or both combined.
fn parse_item_ref(inner: &str) -> Result<ItemRef, ExpandError> {
    let mut rest = inner.trim_start();
    let ident_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    if ident_len == 0 {
        return Err(ExpandError::Malformed(inner.to_owned()));
    }
    let item_type = rest[..ident_len].to_owned();
    rest = rest[ident_len..].trim_start();

    let mut transform = None;
    if let Some(after_arrow) = rest.strip_prefix("->") {
        let (pattern, remainder) = read_quoted(after_arrow.trim_start(), inner)?;
        transform = Some(pattern.to_owned());
        rest = remainder.trim_start();
    }

    let mut separator = None;
    if let Some(after_comma) = rest.strip_prefix(',') {
        let (sep, remainder) = read_quoted(after_comma.trim_start(), inner)?;
        separator = Some(sep.to_owned());
        rest = remainder.trim_start();
    }

    if !rest.is_empty() {
        return Err(ExpandError::Malformed(inner.to_owned()));
    }
    Ok(ItemRef {
        item_type,
        transform,
        separator,
    })
}

fn read_quoted<'s>(src: &'s str, context: &str) -> Result<(&'s str, &'s str), ExpandError> {
    let rest = src
        .strip_prefix('\'')
        .ok_or_else(|| ExpandError::Malformed(context.to_owned()))?;
    let end = rest
        .find('\'')
        .ok_or_else(|| ExpandError::Malformed(context.to_owned()))?;
    Ok((&rest[..end], &rest[end + 1..]))
}

/// Splits on `;` outside any parenthesized span.
fn split_top_level(expression: &str) -> Vec<&str> {
    let bytes = expression.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => {
                pieces.push(&expression[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&expression[start..]);
    pieces
}

/// Scans an expression for the references it consumes, without expanding.
///
/// Returns `(item list types, qualified metadata refs, unqualified
/// metadata refs)`. Item types referenced by transforms are included in
/// the consumed set, but metadata inside transform patterns never is —
/// transforms do not participate in batching.
pub(crate) fn extract_references(
    expression: &str,
) -> Result<ReferenceSet, ExpandError> {
    let bytes = expression.as_bytes();
    let mut refs = ReferenceSet::default();
    let mut i = 0;
    while i < bytes.len() {
        let sigil = bytes[i];
        if matches!(sigil, b'@' | b'%') && bytes.get(i + 1) == Some(&b'(') {
            let (inner, after) = read_parenthesized(expression, i + 1)?;
            if sigil == b'@' {
                let item_ref = parse_item_ref(inner)?;
                let key = item_ref.item_type.to_ascii_lowercase();
                refs.note_consumed(&key);
                refs.item_types.insert(key);
            } else {
                let inner = inner.trim();
                match inner.split_once('.') {
                    Some((qualifier, name)) => {
                        let key = qualifier.trim().to_ascii_lowercase();
                        refs.note_consumed(&key);
                        refs.qualified
                            .insert((key, name.trim().to_ascii_lowercase()));
                    }
                    None => {
                        refs.unqualified.insert(inner.to_ascii_lowercase());
                    }
                }
            }
            i = after;
        } else {
            i += 1;
        }
    }
    Ok(refs)
}

/// The references one or more expressions consume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ReferenceSet {
    /// Consumed item types (from `@()` and qualified `%()`), case-folded,
    /// in order of first appearance. Bucket ordering depends on this.
    pub consumed_order: Vec<String>,
    /// Item list types referenced by `@()` (transforms included).
    pub item_types: BTreeSet<String>,
    /// `(type, name)` pairs referenced by qualified `%()`.
    pub qualified: BTreeSet<(String, String)>,
    /// Names referenced by unqualified `%()`.
    pub unqualified: BTreeSet<String>,
}

impl ReferenceSet {
    fn note_consumed(&mut self, key: &str) {
        if !self.consumed_order.iter().any(|t| t == key) {
            self.consumed_order.push(key.to_owned());
        }
    }

    /// Folds another reference set into this one.
    pub fn merge(&mut self, other: ReferenceSet) {
        for key in other.consumed_order {
            self.note_consumed(&key);
        }
        self.item_types.extend(other.item_types);
        self.qualified.extend(other.qualified);
        self.unqualified.extend(other.unqualified);
    }
}
