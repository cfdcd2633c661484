// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier types for configurations, requests, nodes, and arena items.

use serde::{Deserialize, Serialize};

/// Identifier assigned to a [`crate::request::BuildRequestConfiguration`].
///
/// Assignment is an accident of scheduling, not part of configuration
/// identity: two configurations are the same iff their *content* matches
/// (see [`crate::request::BuildRequestConfiguration::content_eq`]).
///
/// # Sentinels
/// - [`ConfigurationId::INVALID`] (`0`) — no configuration assigned.
/// - Negative values are *unresolved* placeholders handed out while a
///   configuration's real id is still being negotiated; see
///   [`ConfigurationId::is_unresolved`].
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ConfigurationId(i32);

impl ConfigurationId {
    /// The "no configuration" sentinel.
    pub const INVALID: Self = Self(0);

    /// Constructs an id from a raw value.
    #[must_use]
    pub const fn from_raw(value: i32) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// True when this id is a negative, not-yet-resolved placeholder.
    #[must_use]
    pub const fn is_unresolved(self) -> bool {
        self.0 < 0
    }

    /// True when this id identifies a real, resolved configuration.
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        self.0 > 0
    }
}

impl core::fmt::Display for ConfigurationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build-wide identifier of a request, unique across every node of a build.
///
/// [`GlobalRequestId::INVALID`] (`-1`) marks "no request", e.g. the parent id
/// of a root request.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalRequestId(i32);

impl GlobalRequestId {
    /// The "no request" sentinel.
    pub const INVALID: Self = Self(-1);

    /// Constructs an id from a raw value.
    #[must_use]
    pub const fn from_raw(value: i32) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for GlobalRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node-local identifier of a request, unique only within the issuing node.
///
/// Waiting-request bookkeeping in
/// [`crate::entry::BuildRequestEntry`] is keyed by this id.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRequestId(i32);

impl NodeRequestId {
    /// The "no request" sentinel.
    pub const INVALID: Self = Self(-1);

    /// Constructs an id from a raw value.
    #[must_use]
    pub const fn from_raw(value: i32) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for NodeRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the submission that spawned a request tree.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubmissionId(i32);

impl SubmissionId {
    /// The "no submission" sentinel.
    pub const INVALID: Self = Self(-1);

    /// Constructs an id from a raw value.
    #[must_use]
    pub const fn from_raw(value: i32) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }
}

/// Identifier of the build node that produced a result.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildNodeId(i32);

impl BuildNodeId {
    /// The "no node" sentinel.
    pub const INVALID: Self = Self(-1);

    /// Constructs an id from a raw value.
    #[must_use]
    pub const fn from_raw(value: i32) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }
}

/// Stable identity of an item inside the engine's item arena.
///
/// Scope frames record additions, removals, and pending metadata
/// modifications as sets of handles rather than references, which keeps the
/// lookup stack free of shared pointers (and pointer cycles) entirely.
/// A handle is meaningful only for the [`crate::lookup::Lookup`] family that
/// allocated it.
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemHandle(u32);

impl ItemHandle {
    /// Constructs a handle from a raw arena index.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the underlying arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for ItemHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
