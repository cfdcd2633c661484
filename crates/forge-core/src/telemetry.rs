// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Telemetry sink seam.
//!
//! The core holds no global logger; components that narrate their progress
//! accept a sink at construction. The default [`NullTelemetrySink`] makes
//! every event a no-op.

use crate::entry::EntryState;

/// Observer for engine events.
///
/// All methods have empty defaults so sinks implement only what they need.
/// Sinks must be cheap and infallible; the engine never checks for errors.
pub trait TelemetrySink: Send + Sync {
    /// A lookup scope was entered.
    fn scope_entered(&self, _description: &str) {}

    /// A lookup scope was left and its deltas committed to the parent.
    fn scope_left(&self, _description: &str) {}

    /// Batching partitioned consumed items into `bucket_count` buckets.
    fn buckets_partitioned(&self, _bucket_count: usize) {}

    /// A build request entry moved between states.
    fn entry_transition(&self, _from: EntryState, _to: EntryState) {}

    /// Cache aggregation finished with `configurations` merged configs.
    fn caches_aggregated(&self, _configurations: usize) {}
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {}
