// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Configuration and results caches.
//!
//! A [`ConfigCache`] stores configurations by assigned id with a content
//! index (fingerprint → id) for equal-content lookups. A [`ResultsCache`]
//! stores at most one [`BuildResult`] per configuration; individual target
//! results are addressed by `(configuration id, target name)`.

use std::collections::BTreeMap;

use crate::ident::ConfigurationId;
use crate::request::BuildRequestConfiguration;
use crate::result::{BuildResult, TargetResult};

/// Cache of configurations by id, with a content index.
#[derive(Debug, Clone, Default)]
pub struct ConfigCache {
    configs: BTreeMap<ConfigurationId, BuildRequestConfiguration>,
    by_content: BTreeMap<[u8; 32], ConfigurationId>,
}

impl ConfigCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `configuration` under its assigned id.
    ///
    /// The first id for a given content wins the content index, so
    /// [`Self::get_by_content`] is stable across duplicate inserts.
    pub fn insert(&mut self, configuration: BuildRequestConfiguration) {
        let id = configuration.configuration_id();
        self.by_content
            .entry(configuration.content_fingerprint())
            .or_insert(id);
        self.configs.insert(id, configuration);
    }

    /// Looks up a configuration by id.
    #[must_use]
    pub fn get(&self, id: ConfigurationId) -> Option<&BuildRequestConfiguration> {
        self.configs.get(&id)
    }

    /// True when `id` is present.
    #[must_use]
    pub fn contains(&self, id: ConfigurationId) -> bool {
        self.configs.contains_key(&id)
    }

    /// Finds the id of a configuration with equal content, if cached.
    #[must_use]
    pub fn get_by_content(&self, configuration: &BuildRequestConfiguration) -> Option<ConfigurationId> {
        self.by_content
            .get(&configuration.content_fingerprint())
            .copied()
    }

    /// Number of cached configurations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Iterates configurations in id order.
    pub fn iter(&self) -> impl Iterator<Item = &BuildRequestConfiguration> {
        self.configs.values()
    }
}

/// Cache of build results, one per configuration.
#[derive(Debug, Clone, Default)]
pub struct ResultsCache {
    results: BTreeMap<ConfigurationId, BuildResult>,
}

impl ResultsCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `result` under its configuration id, replacing any
    /// previous entry wholesale.
    pub fn insert(&mut self, result: BuildResult) {
        self.results.insert(result.configuration_id(), result);
    }

    /// The result for `id`, if present.
    #[must_use]
    pub fn get(&self, id: ConfigurationId) -> Option<&BuildResult> {
        self.results.get(&id)
    }

    /// Mutable access for merge operations.
    pub fn get_mut(&mut self, id: ConfigurationId) -> Option<&mut BuildResult> {
        self.results.get_mut(&id)
    }

    /// Addresses one target result by `(configuration id, target name)`.
    #[must_use]
    pub fn target_result(&self, id: ConfigurationId, target: &str) -> Option<&TargetResult> {
        self.results.get(&id).and_then(|r| r.target_result(target))
    }

    /// Number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterates results in configuration-id order.
    pub fn iter(&self) -> impl Iterator<Item = &BuildResult> {
        self.results.values()
    }
}

/// File name for the on-disk entry addressed by `(configuration, target)`.
///
/// Composition is literal: no locale-aware formatting interprets the
/// target name, so glyphs like braces survive verbatim. Path separators
/// are the only characters rewritten.
#[must_use]
pub fn result_file_name(id: ConfigurationId, target: &str) -> String {
    let mut name = String::with_capacity(target.len() + 24);
    name.push_str("results-");
    name.push_str(&id.value().to_string());
    name.push('-');
    for c in target.chars() {
        name.push(match c {
            '/' | '\\' | ':' => '_',
            other => other,
        });
    }
    name.push_str(".cache");
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::PropertyTable;

    fn config(id: i32, path: &str) -> BuildRequestConfiguration {
        BuildRequestConfiguration::new(path, PropertyTable::new(), "v1", vec![])
            .with_id(ConfigurationId::from_raw(id))
    }

    #[test]
    fn content_index_is_first_one_wins() {
        let mut cache = ConfigCache::new();
        cache.insert(config(1, "p.xml"));
        cache.insert(config(2, "p.xml"));
        let probe = config(0, "p.xml");
        assert_eq!(
            cache.get_by_content(&probe),
            Some(ConfigurationId::from_raw(1))
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn result_file_name_keeps_format_glyphs() {
        let name = result_file_name(ConfigurationId::from_raw(3), "Pack{Stage}");
        assert_eq!(name, "results-3-Pack{Stage}.cache");
        let sep = result_file_name(ConfigurationId::from_raw(-2), "a/b");
        assert_eq!(sep, "results--2-a_b.cache");
    }
}
