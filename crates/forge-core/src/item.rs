// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Items: typed, metadata-carrying string values.
//!
//! An [`Item`] couples an *item type* (its classification, e.g. `Compile`),
//! an *evaluated include* (the value, stored escaped and decoded only when
//! read), an ordered metadata table, and the path of the project that
//! defined it. Metadata names compare case-insensitively; values are
//! case-sensitive. A reserved set of built-in metadata names is synthesized
//! from the include on read and can never be set explicitly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escape::unescape;

/// Built-in metadata names, synthesized on read.
///
/// Attempting to set any of these through a metadata table or a pending
/// modification is a [`ReservedMetadataError`].
pub const RESERVED_METADATA: &[&str] = &[
    "FullPath",
    "RootDir",
    "Filename",
    "Extension",
    "RelativeDir",
    "Directory",
    "RecursiveDir",
    "Identity",
    "ModifiedTime",
    "CreatedTime",
    "AccessedTime",
];

/// Returns true when `name` is a built-in (reserved) metadata name.
#[must_use]
pub fn is_reserved_metadata(name: &str) -> bool {
    RESERVED_METADATA
        .iter()
        .any(|r| r.eq_ignore_ascii_case(name))
}

/// Error raised when a caller attempts to set a built-in metadata name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("metadata name is reserved: {0}")]
pub struct ReservedMetadataError(pub String);

/// One explicit metadata assignment on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Metadata name as first written (case preserved for display).
    pub name: String,
    /// Metadata value, case-sensitive, stored escaped.
    pub value: String,
}

/// Ordered, case-insensitive metadata table.
///
/// Insertion order is observable (it drives serialization and display); a
/// re-assignment keeps the original position and the first-seen name casing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataTable {
    entries: Vec<MetadataEntry>,
}

impl MetadataTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of explicit entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no explicit entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a value by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_str())
    }

    /// True when the table carries an explicit entry for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name` to `value`, rejecting reserved names.
    ///
    /// An existing entry keeps its position and first-seen casing; a new
    /// entry appends.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ReservedMetadataError> {
        let name = name.into();
        if is_reserved_metadata(&name) {
            return Err(ReservedMetadataError(name));
        }
        self.set_unchecked(name, value.into());
        Ok(())
    }

    pub(crate) fn set_unchecked(&mut self, name: String, value: String) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.name.eq_ignore_ascii_case(&name))
        {
            entry.value = value;
        } else {
            self.entries.push(MetadataEntry { name, value });
        }
    }

    /// Removes the entry for `name`; returns whether one existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !e.name.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.entries.iter()
    }

    /// Canonical multiset form: `(lowercased name, value)` pairs, sorted.
    ///
    /// This is the metadata component of item identity — two tables are
    /// equivalent iff their multisets are equal, regardless of insertion
    /// order or name casing.
    #[must_use]
    pub fn multiset(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|e| (e.name.to_ascii_lowercase(), e.value.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

impl PartialEq for MetadataTable {
    fn eq(&self, other: &Self) -> bool {
        self.multiset() == other.multiset()
    }
}

impl Eq for MetadataTable {}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for MetadataTable {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (name, value) in iter {
            table.set_unchecked(name.into(), value.into());
        }
        table
    }
}

/// A named, metadata-carrying string value.
///
/// Items are immutable once observed by a task: mutations during a build
/// are expressed as pending modification records inside
/// [`crate::lookup::Lookup`] scopes and fold into the item only when the
/// outermost scope commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    item_type: String,
    include: String,
    metadata: MetadataTable,
    defining_project: Option<String>,
}

impl Item {
    /// Creates an item of `item_type` with the given evaluated include.
    ///
    /// The include is stored in escaped form and decoded only on read.
    #[must_use]
    pub fn new(item_type: impl Into<String>, include: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            include: include.into(),
            metadata: MetadataTable::new(),
            defining_project: None,
        }
    }

    /// Builder: attaches explicit metadata entries.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MetadataTable) -> Self {
        self.metadata = metadata;
        self
    }

    /// Builder: records the defining project path.
    #[must_use]
    pub fn with_defining_project(mut self, project: impl Into<String>) -> Self {
        self.defining_project = Some(project.into());
        self
    }

    /// Item type (classification). Compared case-insensitively.
    #[must_use]
    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    /// Evaluated include in stored (escaped) form.
    #[must_use]
    pub fn include_escaped(&self) -> &str {
        &self.include
    }

    /// Evaluated include with `%xx` escapes decoded.
    #[must_use]
    pub fn include(&self) -> String {
        unescape(&self.include)
    }

    /// Path of the project that defined this item, when known.
    #[must_use]
    pub fn defining_project(&self) -> Option<&str> {
        self.defining_project.as_deref()
    }

    /// Explicit metadata table (built-ins excluded).
    #[must_use]
    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    /// Mutable access to the explicit metadata table.
    ///
    /// Only constructors and the global-commit path of the lookup use this;
    /// everything else records modifications instead.
    pub(crate) fn metadata_mut(&mut self) -> &mut MetadataTable {
        &mut self.metadata
    }

    /// Reads metadata by name, synthesizing built-ins from the include.
    ///
    /// Returns `None` only for a non-reserved name with no explicit entry;
    /// every reserved name yields `Some` (possibly empty).
    #[must_use]
    pub fn get_metadata(&self, name: &str) -> Option<String> {
        if is_reserved_metadata(name) {
            return Some(self.builtin_metadata(name));
        }
        self.metadata.get(name).map(|v| unescape(v))
    }

    /// Reads metadata by name, treating missing entries as empty.
    #[must_use]
    pub fn get_metadata_or_empty(&self, name: &str) -> String {
        self.get_metadata(name).unwrap_or_default()
    }

    fn builtin_metadata(&self, name: &str) -> String {
        let spec = self.include();
        let lowered = name.to_ascii_lowercase();
        match lowered.as_str() {
            "identity" => spec,
            "filename" => split_spec(&spec).1.to_owned(),
            "extension" => split_spec(&spec).2.to_owned(),
            "relativedir" => split_spec(&spec).0.to_owned(),
            "fullpath" => self.full_path(&spec),
            "rootdir" => root_of(&self.full_path(&spec)),
            "directory" => {
                let full = self.full_path(&spec);
                let root = root_of(&full);
                let (dir, _, _) = split_spec(&full);
                dir.strip_prefix(root.as_str()).unwrap_or(dir).to_owned()
            }
            // RecursiveDir is populated by wildcard expansion, which happens
            // upstream of this engine; with no recursion info it is empty.
            "recursivedir" => String::new(),
            // Timestamps require touching the file system; the core never
            // does, so these read as empty.
            "modifiedtime" | "createdtime" | "accessedtime" => String::new(),
            _ => String::new(),
        }
    }

    fn full_path(&self, spec: &str) -> String {
        if std::path::Path::new(spec).is_absolute() || has_windows_drive(spec) {
            return spec.to_owned();
        }
        match &self.defining_project {
            Some(project) => {
                let (dir, _, _) = split_spec(project);
                if dir.is_empty() {
                    spec.to_owned()
                } else {
                    format!("{dir}{spec}")
                }
            }
            None => spec.to_owned(),
        }
    }

    /// Identity tuple: `(type, include, metadata multiset)`.
    ///
    /// Dedupe during [`crate::lookup::Lookup::add_new_items`] and bucket
    /// folding compare items by this key.
    #[must_use]
    pub fn identity_key(&self) -> (String, String, Vec<(String, String)>) {
        (
            self.item_type.to_ascii_lowercase(),
            self.include.clone(),
            self.metadata.multiset(),
        )
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.identity_key() == other.identity_key()
    }
}

impl Eq for Item {}

/// Splits a spec into `(directory-with-trailing-separator, stem, extension)`.
///
/// Both `/` and `\` separate; the extension keeps its leading dot.
fn split_spec(spec: &str) -> (&str, &str, &str) {
    let split_at = spec
        .rfind(['/', '\\'])
        .map_or(0, |i| i + 1);
    let (dir, file) = spec.split_at(split_at);
    match file.rfind('.') {
        // A leading dot (".gitignore") is part of the stem, not an extension.
        Some(0) | None => (dir, file, ""),
        Some(dot) => (dir, &file[..dot], &file[dot..]),
    }
}

fn has_windows_drive(spec: &str) -> bool {
    let bytes = spec.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn root_of(path: &str) -> String {
    if path.starts_with('/') || path.starts_with('\\') {
        return path[..1].to_owned();
    }
    if has_windows_drive(path) && path.len() >= 3 {
        return path[..3].to_owned();
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_names_are_case_insensitive() {
        let mut table = MetadataTable::new();
        table.set("Culture", "fr-fr").unwrap();
        assert_eq!(table.get("culture"), Some("fr-fr"));
        table.set("CULTURE", "en-us").unwrap();
        assert_eq!(table.get("Culture"), Some("en-us"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn metadata_values_are_case_sensitive() {
        let a: MetadataTable = [("m", "X")].into_iter().collect();
        let b: MetadataTable = [("m", "x")].into_iter().collect();
        assert_ne!(a, b);
    }

    #[test]
    fn multiset_ignores_insertion_order() {
        let a: MetadataTable = [("m1", "1"), ("m2", "2")].into_iter().collect();
        let b: MetadataTable = [("M2", "2"), ("M1", "1")].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn reserved_names_are_rejected() {
        let mut table = MetadataTable::new();
        let err = table.set("Filename", "nope").unwrap_err();
        assert_eq!(err, ReservedMetadataError("Filename".to_owned()));
    }

    #[test]
    fn builtins_synthesize_from_include() {
        let item = Item::new("File", "src/a.foo");
        assert_eq!(item.get_metadata("Filename").as_deref(), Some("a"));
        assert_eq!(item.get_metadata("Extension").as_deref(), Some(".foo"));
        assert_eq!(item.get_metadata("Identity").as_deref(), Some("src/a.foo"));
        assert_eq!(item.get_metadata("RelativeDir").as_deref(), Some("src/"));
        assert_eq!(item.get_metadata("RecursiveDir").as_deref(), Some(""));
    }

    #[test]
    fn include_decodes_on_read() {
        let item = Item::new("File", "a%3b1.txt");
        assert_eq!(item.include(), "a;1.txt");
        assert_eq!(item.include_escaped(), "a%3b1.txt");
        assert_eq!(item.get_metadata("Filename").as_deref(), Some("a;1"));
    }

    #[test]
    fn item_identity_is_type_include_multiset() {
        let a = Item::new("File", "a.foo")
            .with_metadata([("m1", "1"), ("m2", "2")].into_iter().collect());
        let b = Item::new("FILE", "a.foo")
            .with_metadata([("M2", "2"), ("M1", "1")].into_iter().collect());
        assert_eq!(a, b);
        let c = Item::new("File", "a.foo");
        assert_ne!(a, c);
    }

    #[test]
    fn dotfile_has_no_extension() {
        let item = Item::new("File", ".gitignore");
        assert_eq!(item.get_metadata("Filename").as_deref(), Some(".gitignore"));
        assert_eq!(item.get_metadata("Extension").as_deref(), Some(""));
    }

    #[test]
    fn full_path_joins_defining_project_dir() {
        let item = Item::new("File", "a.foo").with_defining_project("proj/build.xml");
        assert_eq!(item.get_metadata("FullPath").as_deref(), Some("proj/a.foo"));
    }
}
