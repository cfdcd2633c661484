// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! forge-core: deterministic build-request execution engine.
//!
//! The core evaluates targets composed of tasks against item and property
//! tables: a stacked copy-on-write [`Lookup`] scopes what a task sees and
//! may mutate, the batching engine partitions consumed items into
//! execution buckets, a per-request entry state machine coordinates
//! nested builds, and the cache aggregator merges per-node caches back
//! into one. Project parsing, logging transports, and task assembly
//! loading live upstream; the core is handed already-evaluated tables and
//! collaborator interfaces at construction.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod aggregate;
mod batch;
mod cache;
/// CBOR serialization of build results and configurations.
pub mod codec;
mod entry;
/// `%xx` hex escaping for evaluated values.
pub mod escape;
mod expand;
mod ident;
mod item;
mod lookup;
mod request;
mod result;
/// Worker coordination: yield/reacquire, cancellation, pool sizing.
pub mod sched;
mod table;
mod task;
mod telemetry;

// Re-exports for stable public API
/// Cache aggregation across per-node cache pairs.
pub use aggregate::{AggregateError, Aggregation, CacheAggregator};
/// Item batching into execution buckets.
pub use batch::{
    partition_buckets, partition_buckets_observed, BatchError, ItemBucket,
    INVALID_METADATA_REFERENCE_CODE, ITEM_VECTOR_CONCATENATION_CODE,
};
/// Configuration and results caches.
pub use cache::{result_file_name, ConfigCache, ResultsCache};
/// The build-request entry state machine.
pub use entry::{BuildRequestEntry, ContinueOutcome, EntryState, InvalidTransition};
/// Expression expansion for the `$()` / `@()` / `%()` dialect.
pub use expand::{ExpandError, Expander, MetadataBinding};
/// Identifier types and sentinels.
pub use ident::{
    BuildNodeId, ConfigurationId, GlobalRequestId, ItemHandle, NodeRequestId, SubmissionId,
};
/// Items and their metadata tables.
pub use item::{
    is_reserved_metadata, Item, MetadataEntry, MetadataTable, ReservedMetadataError,
    RESERVED_METADATA,
};
/// The stacked item/property view tasks execute against.
pub use lookup::{
    ItemSnapshot, Lookup, LookupError, MetadataModification, ModificationSet, ScopeHandle,
};
/// Build requests and configurations.
pub use request::{BuildRequest, BuildRequestConfiguration, EventContext};
/// Build and target results, plus warning routing.
pub use result::{
    BuildResult, ErrorRecord, OverallResult, TargetResult, TargetResultCode, WarningDisposition,
    WarningRouting, WorkUnitActionCode, WorkUnitResult, WorkUnitResultCode,
};
/// Primary item and property tables.
pub use table::{ItemArena, ItemTable, Property, PropertyTable, TypeList};
/// The task boundary: named parameters over a tagged value union.
pub use task::{TaskError, TaskInstance, Value};
/// Telemetry sink seam.
pub use telemetry::{NullTelemetrySink, TelemetrySink};
