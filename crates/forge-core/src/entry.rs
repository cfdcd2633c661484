// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The build-request entry state machine.
//!
//! An entry is the scheduler's handle to one in-flight request. It moves
//! `Ready → Active → Waiting → Ready → … → Complete`; every transition is
//! driven by an explicit call and anything off the table below is a typed
//! internal error, never a silent no-op:
//!
//! ```text
//! Ready    --continue_execution-->  Active
//! Active   --wait_for_result---->   Waiting   (repeatable, stays Waiting)
//! Waiting  --report_result------>   Waiting | Ready
//! Waiting  --resolve_configuration-> Waiting
//! Active   --complete----------->   Complete
//! ```
//!
//! An entry is owned by exactly one scheduler thread at a time and
//! performs no locking; transitions are externally serialized.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::ident::{ConfigurationId, NodeRequestId};
use crate::request::{BuildRequest, BuildRequestConfiguration};
use crate::result::{BuildResult, ErrorRecord};
use crate::sched::CancellationToken;
use crate::telemetry::{NullTelemetrySink, TelemetrySink};

/// Lifecycle state of a [`BuildRequestEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Ready to execute (initial, and again after every wait completes).
    Ready,
    /// Executing on a worker.
    Active,
    /// Blocked on one or more sub-requests.
    Waiting,
    /// Terminal.
    Complete,
}

impl core::fmt::Display for EntryState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Ready => "Ready",
            Self::Active => "Active",
            Self::Waiting => "Waiting",
            Self::Complete => "Complete",
        };
        f.write_str(name)
    }
}

/// Misuse of the entry state machine. Fatal and internal: the scheduler,
/// not the user, drove the entry off the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entry in state {state} does not accept {event}")]
pub struct InvalidTransition {
    /// State the entry was in.
    pub state: EntryState,
    /// The rejected event.
    pub event: &'static str,
}

/// What [`BuildRequestEntry::continue_execution`] produced.
#[derive(Debug)]
pub enum ContinueOutcome {
    /// The entry is Active; here are the results collected while Waiting
    /// (empty on the first activation).
    Resumed(BTreeMap<NodeRequestId, BuildResult>),
    /// A pending cancellation was observed; the entry completed with an
    /// overall failure result instead of activating.
    Cancelled,
}

/// The scheduler's handle to one in-flight build request.
pub struct BuildRequestEntry {
    request: BuildRequest,
    configuration: BuildRequestConfiguration,
    state: EntryState,
    waiting: BTreeMap<NodeRequestId, BuildRequest>,
    collected: BTreeMap<NodeRequestId, BuildResult>,
    result: Option<BuildResult>,
    cancellation: Option<CancellationToken>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl core::fmt::Debug for BuildRequestEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BuildRequestEntry")
            .field("state", &self.state)
            .field("request", &self.request)
            .field("waiting", &self.waiting.len())
            .finish_non_exhaustive()
    }
}

impl BuildRequestEntry {
    /// Creates an entry in the `Ready` state.
    #[must_use]
    pub fn new(request: BuildRequest, configuration: BuildRequestConfiguration) -> Self {
        Self {
            request,
            configuration,
            state: EntryState::Ready,
            waiting: BTreeMap::new(),
            collected: BTreeMap::new(),
            result: None,
            cancellation: None,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    /// Replaces the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Arms cooperative cancellation. The signal is observed at the next
    /// [`Self::continue_execution`]; nothing is interrupted mid-flight.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = Some(token);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// The request this entry executes.
    #[must_use]
    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    /// The configuration the request runs against.
    #[must_use]
    pub fn configuration(&self) -> &BuildRequestConfiguration {
        &self.configuration
    }

    /// The final result, present once `Complete`.
    #[must_use]
    pub fn result(&self) -> Option<&BuildResult> {
        self.result.as_ref()
    }

    /// `Ready → Active`. Returns the results collected while Waiting
    /// (empty on the first call), or completes with failure if a
    /// cancellation signal is pending.
    pub fn continue_execution(&mut self) -> Result<ContinueOutcome, InvalidTransition> {
        if self.state != EntryState::Ready {
            return Err(InvalidTransition {
                state: self.state,
                event: "continue_execution",
            });
        }
        if self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            let result = BuildResult::new(&self.request)
                .with_error(ErrorRecord::new("BuildAborted", "the build was canceled"));
            self.transition(EntryState::Complete);
            self.result = Some(result);
            return Ok(ContinueOutcome::Cancelled);
        }
        self.transition(EntryState::Active);
        Ok(ContinueOutcome::Resumed(std::mem::take(&mut self.collected)))
    }

    /// `Active → Waiting` (or stays Waiting): records `sub_request` under
    /// its node request id and blocks this entry on its result.
    pub fn wait_for_result(&mut self, sub_request: BuildRequest) -> Result<(), InvalidTransition> {
        match self.state {
            EntryState::Active => self.transition(EntryState::Waiting),
            EntryState::Waiting => {}
            _ => {
                return Err(InvalidTransition {
                    state: self.state,
                    event: "wait_for_result",
                })
            }
        }
        self.waiting
            .insert(sub_request.node_request_id(), sub_request);
        Ok(())
    }

    /// Reports a sub-request result while Waiting.
    ///
    /// A result whose node request id matches no waiting request is
    /// ignored — not an error. The entry moves back to `Ready` once every
    /// waiting request has reported.
    pub fn report_result(&mut self, result: &BuildResult) -> Result<(), InvalidTransition> {
        if self.state != EntryState::Waiting {
            return Err(InvalidTransition {
                state: self.state,
                event: "report_result",
            });
        }
        let id = result.node_request_id();
        if self.waiting.remove(&id).is_some() {
            self.collected.insert(id, result.clone());
        }
        if self.waiting.is_empty() {
            self.transition(EntryState::Ready);
        }
        Ok(())
    }

    /// Patches every waiting request whose configuration id equals the
    /// `unresolved` (negative) placeholder with the real assignment.
    pub fn resolve_configuration(
        &mut self,
        unresolved: ConfigurationId,
        resolved: ConfigurationId,
    ) -> Result<(), InvalidTransition> {
        if self.state != EntryState::Waiting {
            return Err(InvalidTransition {
                state: self.state,
                event: "resolve_configuration",
            });
        }
        for request in self.waiting.values_mut() {
            if request.configuration_id() == unresolved {
                request.set_configuration_id(resolved);
            }
        }
        Ok(())
    }

    /// The waiting requests ready for dispatch, or `None` while any of
    /// them still carries an unresolved configuration id.
    #[must_use]
    pub fn get_requests_to_issue_if_ready(
        &self,
    ) -> Option<Vec<(BuildRequest, ConfigurationId)>> {
        if self
            .waiting
            .values()
            .any(|r| r.configuration_id().is_unresolved())
        {
            return None;
        }
        Some(
            self.waiting
                .values()
                .map(|r| (r.clone(), r.configuration_id()))
                .collect(),
        )
    }

    /// `Active → Complete`. Terminal.
    pub fn complete(&mut self, result: BuildResult) -> Result<(), InvalidTransition> {
        if self.state != EntryState::Active {
            return Err(InvalidTransition {
                state: self.state,
                event: "complete",
            });
        }
        self.transition(EntryState::Complete);
        self.result = Some(result);
        Ok(())
    }

    fn transition(&mut self, to: EntryState) {
        self.telemetry.entry_transition(self.state, to);
        self.state = to;
    }
}
