// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Build requests and the configurations they run against.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::ident::{
    BuildNodeId, ConfigurationId, GlobalRequestId, NodeRequestId, SubmissionId,
};
use crate::table::PropertyTable;

/// Logging correlation for everything a request does.
///
/// Opaque to the engine: it is threaded through results so a consumer can
/// stitch events back to the originating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Node the event originated on.
    pub node: BuildNodeId,
    /// Project-instance correlation id.
    pub project_context: i32,
    /// Target correlation id.
    pub target: i32,
    /// Task correlation id.
    pub task: i32,
}

impl EventContext {
    /// A context with every field invalid.
    pub const INVALID: Self = Self {
        node: BuildNodeId::INVALID,
        project_context: -1,
        target: -1,
        task: -1,
    };
}

impl Default for EventContext {
    fn default() -> Self {
        Self::INVALID
    }
}

/// A request to build a list of targets against one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    submission_id: SubmissionId,
    node_request_id: NodeRequestId,
    global_request_id: GlobalRequestId,
    configuration_id: ConfigurationId,
    targets: Vec<String>,
    parent_global_request_id: GlobalRequestId,
    event_context: EventContext,
}

impl BuildRequest {
    /// Creates a request.
    ///
    /// `configuration_id` may be an unresolved (negative) placeholder; the
    /// entry state machine patches it via
    /// [`crate::entry::BuildRequestEntry::resolve_configuration`] before
    /// the request is issued.
    #[must_use]
    pub fn new(
        submission_id: SubmissionId,
        node_request_id: NodeRequestId,
        configuration_id: ConfigurationId,
        targets: Vec<String>,
    ) -> Self {
        Self {
            submission_id,
            node_request_id,
            global_request_id: GlobalRequestId::INVALID,
            configuration_id,
            targets,
            parent_global_request_id: GlobalRequestId::INVALID,
            event_context: EventContext::INVALID,
        }
    }

    /// Builder: sets the parent request.
    #[must_use]
    pub fn with_parent(mut self, parent: GlobalRequestId) -> Self {
        self.parent_global_request_id = parent;
        self
    }

    /// Builder: sets the build-wide request id.
    #[must_use]
    pub fn with_global_id(mut self, id: GlobalRequestId) -> Self {
        self.global_request_id = id;
        self
    }

    /// Builder: sets the event context.
    #[must_use]
    pub fn with_event_context(mut self, context: EventContext) -> Self {
        self.event_context = context;
        self
    }

    /// Submission that spawned this request tree.
    #[must_use]
    pub fn submission_id(&self) -> SubmissionId {
        self.submission_id
    }

    /// Node-local request id.
    #[must_use]
    pub fn node_request_id(&self) -> NodeRequestId {
        self.node_request_id
    }

    /// Build-wide request id ([`GlobalRequestId::INVALID`] until assigned).
    #[must_use]
    pub fn global_request_id(&self) -> GlobalRequestId {
        self.global_request_id
    }

    /// Configuration this request runs against.
    #[must_use]
    pub fn configuration_id(&self) -> ConfigurationId {
        self.configuration_id
    }

    /// Patches an unresolved configuration id with the real assignment.
    pub(crate) fn set_configuration_id(&mut self, id: ConfigurationId) {
        self.configuration_id = id;
    }

    /// Targets to build, in order.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Parent request, or [`GlobalRequestId::INVALID`] for a root.
    #[must_use]
    pub fn parent_global_request_id(&self) -> GlobalRequestId {
        self.parent_global_request_id
    }

    /// Event context for logging correlation.
    #[must_use]
    pub fn event_context(&self) -> EventContext {
        self.event_context
    }
}

/// The identity-bearing descriptor of a project evaluation.
///
/// Two configurations are equal iff all four *content* fields are equal —
/// project path, global properties, tools version, and explicit target
/// list. The configuration id is an assignment, never part of identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequestConfiguration {
    configuration_id: ConfigurationId,
    project_path: String,
    global_properties: PropertyTable,
    tools_version: String,
    targets: Vec<String>,
}

impl BuildRequestConfiguration {
    /// Creates a configuration with an unassigned id.
    #[must_use]
    pub fn new(
        project_path: impl Into<String>,
        global_properties: PropertyTable,
        tools_version: impl Into<String>,
        targets: Vec<String>,
    ) -> Self {
        Self {
            configuration_id: ConfigurationId::INVALID,
            project_path: project_path.into(),
            global_properties,
            tools_version: tools_version.into(),
            targets,
        }
    }

    /// Builder: assigns the configuration id.
    #[must_use]
    pub fn with_id(mut self, id: ConfigurationId) -> Self {
        self.configuration_id = id;
        self
    }

    /// The assigned id ([`ConfigurationId::INVALID`] until assignment).
    #[must_use]
    pub fn configuration_id(&self) -> ConfigurationId {
        self.configuration_id
    }

    /// Re-assigns the id (cache aggregation renumbers configurations).
    pub(crate) fn set_configuration_id(&mut self, id: ConfigurationId) {
        self.configuration_id = id;
    }

    /// Project file path.
    #[must_use]
    pub fn project_path(&self) -> &str {
        &self.project_path
    }

    /// Global properties the project was evaluated with.
    #[must_use]
    pub fn global_properties(&self) -> &PropertyTable {
        &self.global_properties
    }

    /// Tools version.
    #[must_use]
    pub fn tools_version(&self) -> &str {
        &self.tools_version
    }

    /// Explicit target list.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Content equality: id excluded by design.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        self.project_path == other.project_path
            && self.global_properties == other.global_properties
            && self.tools_version == other.tools_version
            && self.targets == other.targets
    }

    /// Stable content fingerprint over the four identity fields.
    ///
    /// Length-prefixed, domain-separated BLAKE3 so distinct field splits
    /// can never collide.
    #[must_use]
    pub fn content_fingerprint(&self) -> [u8; 32] {
        let mut hasher = Hasher::new();
        hasher.update(b"config:");
        update_str(&mut hasher, &self.project_path);
        hasher.update(&(self.global_properties.len() as u64).to_le_bytes());
        for property in self.global_properties.iter() {
            update_str(&mut hasher, &property.name.to_ascii_lowercase());
            update_str(&mut hasher, &property.value);
        }
        update_str(&mut hasher, &self.tools_version);
        hasher.update(&(self.targets.len() as u64).to_le_bytes());
        for target in &self.targets {
            update_str(&mut hasher, target);
        }
        hasher.finalize().into()
    }
}

impl PartialEq for BuildRequestConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.content_eq(other)
    }
}

impl Eq for BuildRequestConfiguration {}

fn update_str(hasher: &mut Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
