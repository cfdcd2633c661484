// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Build and target results, plus warning routing.
//!
//! A [`TargetResult`] records one target's outputs and outcome; a
//! [`BuildResult`] collects them per request. The target map preserves
//! insertion order — merge operations in the cache aggregator are
//! first-writer-wins and the surviving order is observable.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

use crate::ident::{
    BuildNodeId, ConfigurationId, GlobalRequestId, NodeRequestId, SubmissionId,
};
use crate::item::Item;
use crate::request::BuildRequest;

/// Outcome of one target.
///
/// `Skipped` is a real outcome, distinct from succeeding with empty
/// outputs: a target whose outputs derive from an empty item list produces
/// zero buckets and is *skipped*, and downstream consumers can observe the
/// difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetResultCode {
    /// The target ran and succeeded.
    Success,
    /// The target ran and failed.
    Failure,
    /// The target did not run (zero buckets, or condition false upstream).
    Skipped,
}

/// Outcome of a single work unit (one task invocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkUnitResultCode {
    /// The unit ran to completion.
    Success,
    /// The unit failed.
    Failed,
    /// The unit did not run.
    Skipped,
    /// The unit observed cancellation.
    Canceled,
}

/// What the enclosing target does after a work unit completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkUnitActionCode {
    /// Keep executing subsequent work units.
    Continue,
    /// Stop the target.
    Stop,
}

/// Result of one work unit: outcome plus continuation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnitResult {
    /// Outcome code.
    pub code: WorkUnitResultCode,
    /// Continuation decision.
    pub action: WorkUnitActionCode,
}

impl WorkUnitResult {
    /// A successful unit that lets the target continue.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: WorkUnitResultCode::Success,
            action: WorkUnitActionCode::Continue,
        }
    }

    /// How a failed sub-request folds into the calling target.
    ///
    /// With `continue_on_error` the failure is demoted to a warning and
    /// execution continues; otherwise it stops the target.
    #[must_use]
    pub fn sub_request_failure(continue_on_error: bool) -> Self {
        Self {
            code: WorkUnitResultCode::Failed,
            action: if continue_on_error {
                WorkUnitActionCode::Continue
            } else {
                WorkUnitActionCode::Stop
            },
        }
    }
}

/// A preserved task exception: type name plus message.
///
/// Exceptions round-trip through serialization by value — two records are
/// equal iff both fields are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Name of the originating error type.
    pub kind: String,
    /// Human-readable message, verbatim.
    pub message: String,
}

impl ErrorRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// One target's outputs and outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    items: Vec<Item>,
    code: TargetResultCode,
    error: Option<ErrorRecord>,
    work_unit: WorkUnitResult,
}

impl TargetResult {
    /// A successful target with `items` as its ordered outputs.
    #[must_use]
    pub fn success(items: Vec<Item>) -> Self {
        Self {
            items,
            code: TargetResultCode::Success,
            error: None,
            work_unit: WorkUnitResult::success(),
        }
    }

    /// A failed target, optionally preserving the task's exception.
    #[must_use]
    pub fn failure(error: Option<ErrorRecord>) -> Self {
        Self {
            items: Vec::new(),
            code: TargetResultCode::Failure,
            error,
            work_unit: WorkUnitResult {
                code: WorkUnitResultCode::Failed,
                action: WorkUnitActionCode::Stop,
            },
        }
    }

    /// A skipped target (zero buckets — no work units ran).
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            items: Vec::new(),
            code: TargetResultCode::Skipped,
            error: None,
            work_unit: WorkUnitResult {
                code: WorkUnitResultCode::Skipped,
                action: WorkUnitActionCode::Continue,
            },
        }
    }

    /// Ordered output items.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Outcome code.
    #[must_use]
    pub fn code(&self) -> TargetResultCode {
        self.code
    }

    /// The preserved exception, if the target failed with one.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    /// The final work-unit result.
    #[must_use]
    pub fn work_unit(&self) -> WorkUnitResult {
        self.work_unit
    }
}

/// Overall outcome of a build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallResult {
    /// Every non-skipped target succeeded.
    Success,
    /// At least one target failed, or the request itself errored.
    Failure,
}

/// Everything a completed request reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    submission_id: SubmissionId,
    global_request_id: GlobalRequestId,
    parent_global_request_id: GlobalRequestId,
    node_request_id: NodeRequestId,
    configuration_id: ConfigurationId,
    results_node_id: BuildNodeId,
    target_results: Vec<(String, TargetResult)>,
    error: Option<ErrorRecord>,
    circular_dependency: bool,
    initial_targets: Vec<String>,
    default_targets: Vec<String>,
}

impl BuildResult {
    /// Creates an empty result carrying `request`'s identity.
    #[must_use]
    pub fn new(request: &BuildRequest) -> Self {
        Self {
            submission_id: request.submission_id(),
            global_request_id: request.global_request_id(),
            parent_global_request_id: request.parent_global_request_id(),
            node_request_id: request.node_request_id(),
            configuration_id: request.configuration_id(),
            results_node_id: BuildNodeId::INVALID,
            target_results: Vec::new(),
            error: None,
            circular_dependency: false,
            initial_targets: Vec::new(),
            default_targets: Vec::new(),
        }
    }

    /// Builder: marks the result as a circular-dependency report.
    #[must_use]
    pub fn with_circular_dependency(mut self) -> Self {
        self.circular_dependency = true;
        self
    }

    /// Builder: records the request-level error.
    #[must_use]
    pub fn with_error(mut self, error: ErrorRecord) -> Self {
        self.error = Some(error);
        self
    }

    /// Builder: records the project's initial and default target lists.
    #[must_use]
    pub fn with_target_lists(
        mut self,
        initial: Vec<String>,
        default: Vec<String>,
    ) -> Self {
        self.initial_targets = initial;
        self.default_targets = default;
        self
    }

    /// Builder: records the node that produced this result.
    #[must_use]
    pub fn with_results_node(mut self, node: BuildNodeId) -> Self {
        self.results_node_id = node;
        self
    }

    /// Adds (or replaces) the result for `target`.
    ///
    /// Target names compare case-insensitively; a replace keeps the
    /// original position and casing.
    pub fn add_target_result(&mut self, target: impl Into<String>, result: TargetResult) {
        let target = target.into();
        if let Some(entry) = self
            .target_results
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&target))
        {
            entry.1 = result;
        } else {
            self.target_results.push((target, result));
        }
    }

    /// Adds the result for `target` only when no result exists yet.
    ///
    /// Returns whether the insert happened. The cache aggregator's
    /// first-one-wins merge is built on this.
    pub fn add_target_result_if_absent(
        &mut self,
        target: impl Into<String>,
        result: TargetResult,
    ) -> bool {
        let target = target.into();
        if self.has_target(&target) {
            return false;
        }
        self.target_results.push((target, result));
        true
    }

    /// The result for `target`, if present.
    #[must_use]
    pub fn target_result(&self, target: &str) -> Option<&TargetResult> {
        self.target_results
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(target))
            .map(|(_, result)| result)
    }

    /// True when `target` has a recorded result.
    #[must_use]
    pub fn has_target(&self, target: &str) -> bool {
        self.target_result(target).is_some()
    }

    /// Target names in insertion order.
    #[must_use]
    pub fn target_names(&self) -> Vec<&str> {
        self.target_results
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Iterates `(name, result)` pairs in insertion order.
    pub fn iter_targets(&self) -> impl Iterator<Item = (&str, &TargetResult)> {
        self.target_results
            .iter()
            .map(|(name, result)| (name.as_str(), result))
    }

    /// Overall outcome: failure on any failed target, request error, or
    /// circular dependency.
    #[must_use]
    pub fn overall_result(&self) -> OverallResult {
        let failed = self.error.is_some()
            || self.circular_dependency
            || self
                .target_results
                .iter()
                .any(|(_, r)| r.code() == TargetResultCode::Failure);
        if failed {
            OverallResult::Failure
        } else {
            OverallResult::Success
        }
    }

    /// Submission id.
    #[must_use]
    pub fn submission_id(&self) -> SubmissionId {
        self.submission_id
    }

    /// Build-wide request id.
    #[must_use]
    pub fn global_request_id(&self) -> GlobalRequestId {
        self.global_request_id
    }

    /// Parent request id.
    #[must_use]
    pub fn parent_global_request_id(&self) -> GlobalRequestId {
        self.parent_global_request_id
    }

    /// Node-local request id.
    #[must_use]
    pub fn node_request_id(&self) -> NodeRequestId {
        self.node_request_id
    }

    /// Configuration the request ran against.
    #[must_use]
    pub fn configuration_id(&self) -> ConfigurationId {
        self.configuration_id
    }

    /// Node that produced this result.
    #[must_use]
    pub fn results_node_id(&self) -> BuildNodeId {
        self.results_node_id
    }

    /// The request-level error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    /// True when the request was rejected as circular.
    #[must_use]
    pub fn circular_dependency(&self) -> bool {
        self.circular_dependency
    }

    /// Initial targets recorded for the project.
    #[must_use]
    pub fn initial_targets(&self) -> &[String] {
        &self.initial_targets
    }

    /// Default targets recorded for the project.
    #[must_use]
    pub fn default_targets(&self) -> &[String] {
        &self.default_targets
    }

    /// Re-keys this result to a renumbered configuration and resets every
    /// request-identity field to its invalid sentinel. Used when results
    /// move between caches: the merged cache carries no request lineage.
    pub(crate) fn strip_request_identity(&mut self, configuration_id: ConfigurationId) {
        self.configuration_id = configuration_id;
        self.submission_id = SubmissionId::INVALID;
        self.global_request_id = GlobalRequestId::INVALID;
        self.parent_global_request_id = GlobalRequestId::INVALID;
        self.node_request_id = NodeRequestId::INVALID;
        self.results_node_id = BuildNodeId::INVALID;
    }
}

/// How a warning code should surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningDisposition {
    /// Promoted to an error.
    AsError,
    /// Left as a warning.
    AsWarning,
    /// Demoted to a low-importance message.
    AsLowImportanceMessage,
}

/// Per-build warning promotion and demotion sets.
///
/// `promote_all` mirrors the convention that an empty-but-present promote
/// set means "every warning". Demotion takes precedence only when both
/// sets explicitly name the same code; any other conflict promotes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarningRouting {
    promote: BTreeSet<String>,
    demote: BTreeSet<String>,
    promote_all: bool,
}

impl WarningRouting {
    /// No routing: every warning stays a warning.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Promotes every warning not otherwise routed.
    #[must_use]
    pub fn promote_all(mut self) -> Self {
        self.promote_all = true;
        self
    }

    /// Adds `code` to the promotion set.
    pub fn promote(&mut self, code: impl Into<String>) {
        self.promote.insert(code.into().to_ascii_uppercase());
    }

    /// Adds `code` to the demotion set.
    pub fn demote(&mut self, code: impl Into<String>) {
        self.demote.insert(code.into().to_ascii_uppercase());
    }

    /// Routes one warning code.
    #[must_use]
    pub fn dispose(&self, code: &str) -> WarningDisposition {
        let code = code.to_ascii_uppercase();
        let promoted_explicitly = self.promote.contains(&code);
        let demoted_explicitly = self.demote.contains(&code);
        match (promoted_explicitly, demoted_explicitly) {
            // Both sets name the code: demotion wins the explicit tie.
            (true, true) => WarningDisposition::AsLowImportanceMessage,
            (true, false) => WarningDisposition::AsError,
            // An implicit promote-all loses only to nothing: when in
            // doubt, promote.
            (false, true) if !self.promote_all => WarningDisposition::AsLowImportanceMessage,
            (false, _) if self.promote_all => WarningDisposition::AsError,
            _ => WarningDisposition::AsWarning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::SubmissionId;

    fn request() -> BuildRequest {
        BuildRequest::new(
            SubmissionId::from_raw(1),
            NodeRequestId::from_raw(10),
            ConfigurationId::from_raw(2),
            vec!["Build".into()],
        )
    }

    #[test]
    fn skipped_is_distinct_from_empty_success() {
        let skipped = TargetResult::skipped();
        let empty_success = TargetResult::success(vec![]);
        assert_ne!(skipped, empty_success);
        assert_eq!(skipped.code(), TargetResultCode::Skipped);
        assert_eq!(empty_success.code(), TargetResultCode::Success);
    }

    #[test]
    fn overall_result_fails_on_any_target_failure() {
        let mut result = BuildResult::new(&request());
        result.add_target_result("A", TargetResult::success(vec![]));
        assert_eq!(result.overall_result(), OverallResult::Success);
        result.add_target_result("B", TargetResult::failure(None));
        assert_eq!(result.overall_result(), OverallResult::Failure);
    }

    #[test]
    fn circular_dependency_fails_overall() {
        let result = BuildResult::new(&request()).with_circular_dependency();
        assert!(result.circular_dependency());
        assert_eq!(result.overall_result(), OverallResult::Failure);
    }

    #[test]
    fn target_names_are_case_insensitive_but_order_preserving() {
        let mut result = BuildResult::new(&request());
        result.add_target_result("Compile", TargetResult::success(vec![]));
        result.add_target_result("Link", TargetResult::success(vec![]));
        assert!(result.has_target("COMPILE"));
        assert_eq!(result.target_names(), ["Compile", "Link"]);
        assert!(!result.add_target_result_if_absent("link", TargetResult::failure(None)));
        assert_eq!(
            result.target_result("Link").map(TargetResult::code),
            Some(TargetResultCode::Success)
        );
    }

    #[test]
    fn continue_on_error_demotes_sub_request_failure() {
        let stop = WorkUnitResult::sub_request_failure(false);
        assert_eq!(stop.action, WorkUnitActionCode::Stop);
        let cont = WorkUnitResult::sub_request_failure(true);
        assert_eq!(cont.action, WorkUnitActionCode::Continue);
        assert_eq!(cont.code, WorkUnitResultCode::Failed);
    }

    #[test]
    fn warning_routing_tie_break() {
        let mut routing = WarningRouting::new();
        routing.promote("W100");
        routing.demote("W100");
        routing.demote("W200");
        routing.promote("W300");
        // Explicit tie: demotion wins.
        assert_eq!(
            routing.dispose("w100"),
            WarningDisposition::AsLowImportanceMessage
        );
        assert_eq!(
            routing.dispose("W200"),
            WarningDisposition::AsLowImportanceMessage
        );
        assert_eq!(routing.dispose("W300"), WarningDisposition::AsError);
        assert_eq!(routing.dispose("W999"), WarningDisposition::AsWarning);
    }

    #[test]
    fn promote_all_wins_over_implicit_conflicts() {
        let mut routing = WarningRouting::new().promote_all();
        routing.demote("W1");
        // Implicit promotion vs explicit demotion: promote when in doubt.
        assert_eq!(routing.dispose("W1"), WarningDisposition::AsError);
        assert_eq!(routing.dispose("W2"), WarningDisposition::AsError);
    }
}
