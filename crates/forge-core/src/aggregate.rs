// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Cache aggregation: merging per-node cache pairs into one.
//!
//! Distributed builds come home as one `(ConfigCache, ResultsCache)` pair
//! per node, each numbered independently. The aggregator renumbers every
//! configuration to a fresh consecutive id and re-keys results to match.
//! Equal-content configurations recurring across pairs fold
//! first-one-wins: the first occurrence keeps its configuration object,
//! later occurrences contribute only target results the retained result
//! does not already carry.
//!
//! Conflicts are bugs. A configuration id recurring with *different*
//! content means the input caches lied, and the merge explodes loudly
//! rather than guessing.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::{ConfigCache, ResultsCache};
use crate::ident::ConfigurationId;
use crate::telemetry::{NullTelemetrySink, TelemetrySink};

/// Fatal aggregation failures. All internal: they indicate malformed
/// input caches or a misused aggregator, never user error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// A pair's configuration count does not match its result count.
    #[error("cache pair {index}: {configs} configurations but {results} results")]
    NotMinimalOrIncomplete {
        /// Index of the offending input pair.
        index: usize,
        /// Configuration count.
        configs: usize,
        /// Result count.
        results: usize,
    },
    /// A result points at a configuration its paired cache lacks.
    #[error("cache pair {index}: result for configuration {id} has no matching configuration")]
    InconsistentCaches {
        /// Index of the offending input pair.
        index: usize,
        /// The dangling configuration id.
        id: ConfigurationId,
    },
    /// The same configuration id recurs across pairs with different
    /// content.
    #[error("configuration id {id} recurs with different content")]
    CollidingDistinctConfigurations {
        /// The colliding id.
        id: ConfigurationId,
    },
    /// `add` was called after `aggregate`.
    #[error("cache pairs may not be added after aggregation")]
    AfterAggregation,
    /// `aggregate` was called twice.
    #[error("aggregate may be called exactly once")]
    AggregatedTwice,
}

/// The merged output of [`CacheAggregator::aggregate`].
#[derive(Debug)]
pub struct Aggregation {
    /// Renumbered configurations.
    pub config_cache: ConfigCache,
    /// Results re-keyed to the renumbered configurations, with request
    /// identity stripped to the invalid sentinels.
    pub results_cache: ResultsCache,
    /// Highest configuration id assigned.
    pub last_configuration_id: ConfigurationId,
}

/// Accumulates `(ConfigCache, ResultsCache)` pairs, then merges once.
pub struct CacheAggregator {
    inputs: Vec<(ConfigCache, ResultsCache)>,
    next_id: i32,
    aggregated: bool,
    telemetry: Arc<dyn TelemetrySink>,
}

impl core::fmt::Debug for CacheAggregator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheAggregator")
            .field("inputs", &self.inputs.len())
            .field("aggregated", &self.aggregated)
            .finish_non_exhaustive()
    }
}

impl Default for CacheAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheAggregator {
    /// An aggregator assigning output ids from 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            next_id: 1,
            aggregated: false,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    /// Starts output id assignment at `first` instead of 1.
    #[must_use]
    pub fn starting_at(mut self, first: ConfigurationId) -> Self {
        self.next_id = first.value();
        self
    }

    /// Replaces the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Accumulates one input pair.
    pub fn add(
        &mut self,
        config_cache: ConfigCache,
        results_cache: ResultsCache,
    ) -> Result<(), AggregateError> {
        if self.aggregated {
            return Err(AggregateError::AfterAggregation);
        }
        self.inputs.push((config_cache, results_cache));
        Ok(())
    }

    /// Merges every accumulated pair. May be called exactly once.
    pub fn aggregate(&mut self) -> Result<Aggregation, AggregateError> {
        if self.aggregated {
            return Err(AggregateError::AggregatedTwice);
        }
        self.aggregated = true;

        let inputs = std::mem::take(&mut self.inputs);
        let mut config_cache = ConfigCache::new();
        let mut results_cache = ResultsCache::new();
        // fingerprint → renumbered id (first occurrence wins).
        let mut by_content: BTreeMap<[u8; 32], ConfigurationId> = BTreeMap::new();
        // input id → fingerprint, for detecting colliding distinct content.
        let mut content_by_input_id: BTreeMap<ConfigurationId, [u8; 32]> = BTreeMap::new();
        let mut last = ConfigurationId::INVALID;

        for (index, (configs, results)) in inputs.iter().enumerate() {
            if configs.len() != results.len() {
                return Err(AggregateError::NotMinimalOrIncomplete {
                    index,
                    configs: configs.len(),
                    results: results.len(),
                });
            }
            for result in results.iter() {
                if !configs.contains(result.configuration_id()) {
                    return Err(AggregateError::InconsistentCaches {
                        index,
                        id: result.configuration_id(),
                    });
                }
            }

            for configuration in configs.iter() {
                let input_id = configuration.configuration_id();
                let fingerprint = configuration.content_fingerprint();
                if let Some(previous) = content_by_input_id.insert(input_id, fingerprint) {
                    if previous != fingerprint {
                        return Err(AggregateError::CollidingDistinctConfigurations {
                            id: input_id,
                        });
                    }
                }

                let output_id = match by_content.get(&fingerprint) {
                    Some(existing) => *existing,
                    None => {
                        let assigned = ConfigurationId::from_raw(self.next_id);
                        self.next_id += 1;
                        by_content.insert(fingerprint, assigned);
                        let mut retained = configuration.clone();
                        retained.set_configuration_id(assigned);
                        config_cache.insert(retained);
                        last = assigned;
                        assigned
                    }
                };

                let Some(result) = results.get(input_id) else {
                    continue;
                };
                match results_cache.get_mut(output_id) {
                    None => {
                        let mut rekeyed = result.clone();
                        rekeyed.strip_request_identity(output_id);
                        results_cache.insert(rekeyed);
                    }
                    Some(existing) => {
                        for (target, target_result) in result.iter_targets() {
                            existing.add_target_result_if_absent(target, target_result.clone());
                        }
                    }
                }
            }
        }

        self.telemetry.caches_aggregated(config_cache.len());
        Ok(Aggregation {
            config_cache,
            results_cache,
            last_configuration_id: last,
        })
    }
}
