// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Worker coordination: yield/reacquire, cancellation, pool sizing.
//!
//! The core never owns threads. It exposes the coordination surface a
//! parallel-worker scheduler drives: a bounded message channel between a
//! long-running task and its scheduler (`Yield` sends a release message;
//! `Reacquire` blocks on the resume reply), a cooperative cancellation
//! token observed at the next entry activation, and the worker-count
//! arithmetic the embedding host asks for.
//!
//! Both halves of the handshake are advisory: the scheduler may park the
//! release message as long as it likes, and a worker that never yields is
//! merely impolite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use thiserror::Error;

use crate::ident::GlobalRequestId;
use crate::request::BuildRequest;

/// Environment variable overriding the default worker count.
///
/// Useful for CI (deterministic worker count), debugging (force serial
/// with `FORGE_WORKERS=1`), and benchmarking.
pub const WORKER_COUNT_VAR: &str = "FORGE_WORKERS";

/// Resolves the worker count: the environment override when set and
/// valid, otherwise the machine's available parallelism.
#[must_use]
pub fn default_worker_count() -> usize {
    if let Ok(value) = std::env::var(WORKER_COUNT_VAR) {
        if let Ok(n) = value.parse::<usize>() {
            return n.max(1);
        }
    }
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
}

/// Number of child workers a build parent retains after a build finishes.
#[must_use]
pub fn node_reuse_threshold(cores: usize) -> usize {
    (cores / 2).max(1)
}

/// Cooperative cancellation signal shared between scheduler and entries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once [`Self::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Messages a task host sends its scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationMessage {
    /// The task offers its worker slot back (`Yield`).
    Release {
        /// The request whose task is yielding.
        request: GlobalRequestId,
    },
    /// The task wants its slot again; it is now blocked on the resume
    /// reply (`Reacquire`).
    Reacquire {
        /// The request whose task is reacquiring.
        request: GlobalRequestId,
    },
    /// The task asks for nested builds (`BuildProjectFile`).
    ///
    /// The scheduler records the sub-requests on the calling entry via
    /// `wait_for_result`; each nested build runs against a snapshot of
    /// the caller's globals at the moment of this message, and results
    /// come back through the entry's collected-results map.
    SubBuild {
        /// The requesting entry.
        request: GlobalRequestId,
        /// The nested build requests to issue.
        requests: Vec<BuildRequest>,
    },
}

/// Failures on the coordination channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// The scheduler side of the channel is gone.
    #[error("scheduler disconnected from the coordination channel")]
    SchedulerGone,
}

/// The task-facing half of the coordination channel.
#[derive(Debug)]
pub struct TaskHost {
    request: GlobalRequestId,
    to_scheduler: SyncSender<CoordinationMessage>,
    resume: Receiver<()>,
}

impl TaskHost {
    /// The request this host belongs to.
    #[must_use]
    pub fn request(&self) -> GlobalRequestId {
        self.request
    }

    /// Asks the scheduler to free this worker slot so another entry may
    /// run. Returns immediately; honoring the release is discretionary.
    pub fn yield_slot(&self) -> Result<(), CoordinationError> {
        self.to_scheduler
            .send(CoordinationMessage::Release {
                request: self.request,
            })
            .map_err(|_| CoordinationError::SchedulerGone)
    }

    /// Hands the scheduler a batch of nested build requests.
    ///
    /// Fire-and-forget on this channel; the results arrive through the
    /// calling entry once it is resumed.
    pub fn build_projects(&self, requests: Vec<BuildRequest>) -> Result<(), CoordinationError> {
        self.to_scheduler
            .send(CoordinationMessage::SubBuild {
                request: self.request,
                requests,
            })
            .map_err(|_| CoordinationError::SchedulerGone)
    }

    /// Blocks until the scheduler re-admits this task.
    pub fn reacquire(&self) -> Result<(), CoordinationError> {
        self.to_scheduler
            .send(CoordinationMessage::Reacquire {
                request: self.request,
            })
            .map_err(|_| CoordinationError::SchedulerGone)?;
        self.resume
            .recv()
            .map_err(|_| CoordinationError::SchedulerGone)
    }
}

/// The scheduler-facing half of the coordination channel.
#[derive(Debug)]
pub struct HostController {
    messages: Receiver<CoordinationMessage>,
    resume: SyncSender<()>,
}

impl HostController {
    /// Receives the next coordination message, blocking.
    pub fn recv(&self) -> Result<CoordinationMessage, CoordinationError> {
        self.messages
            .recv()
            .map_err(|_| CoordinationError::SchedulerGone)
    }

    /// Receives without blocking, `None` when no message is pending.
    #[must_use]
    pub fn try_recv(&self) -> Option<CoordinationMessage> {
        self.messages.try_recv().ok()
    }

    /// Re-admits the task blocked in [`TaskHost::reacquire`].
    pub fn resume(&self) -> Result<(), CoordinationError> {
        self.resume.send(()).map_err(|_| CoordinationError::SchedulerGone)
    }
}

/// Creates a bounded coordination channel pair for one task.
#[must_use]
pub fn coordination_channel(
    request: GlobalRequestId,
    capacity: usize,
) -> (TaskHost, HostController) {
    let (to_scheduler, messages) = sync_channel(capacity.max(1));
    let (resume_tx, resume_rx) = sync_channel(1);
    (
        TaskHost {
            request,
            to_scheduler,
            resume: resume_rx,
        },
        HostController {
            messages,
            resume: resume_tx,
        },
    )
}
