// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]

use forge_core::sched::CancellationToken;
use forge_core::{
    BuildRequest, BuildRequestConfiguration, BuildRequestEntry, BuildResult, ConfigurationId,
    ContinueOutcome, EntryState, NodeRequestId, OverallResult, PropertyTable, SubmissionId,
    TargetResult,
};

fn request(node_id: i32, config_id: i32) -> BuildRequest {
    BuildRequest::new(
        SubmissionId::from_raw(1),
        NodeRequestId::from_raw(node_id),
        ConfigurationId::from_raw(config_id),
        vec!["Build".into()],
    )
}

fn configuration(id: i32) -> BuildRequestConfiguration {
    BuildRequestConfiguration::new("proj.xml", PropertyTable::new(), "current", vec![])
        .with_id(ConfigurationId::from_raw(id))
}

fn entry() -> BuildRequestEntry {
    BuildRequestEntry::new(request(1, 1), configuration(1))
}

#[test]
fn full_lifecycle_ready_active_waiting_ready_active_complete() {
    let mut entry = entry();
    assert_eq!(entry.state(), EntryState::Ready);

    match entry.continue_execution().unwrap() {
        ContinueOutcome::Resumed(results) => assert!(results.is_empty()),
        ContinueOutcome::Cancelled => panic!("not cancelled"),
    }
    assert_eq!(entry.state(), EntryState::Active);

    let sub = request(2, 1);
    entry.wait_for_result(sub).unwrap();
    assert_eq!(entry.state(), EntryState::Waiting);

    let mut sub_result = BuildResult::new(&request(2, 1));
    sub_result.add_target_result("Build", TargetResult::success(vec![]));
    entry.report_result(&sub_result).unwrap();
    assert_eq!(entry.state(), EntryState::Ready);

    match entry.continue_execution().unwrap() {
        ContinueOutcome::Resumed(results) => {
            assert_eq!(results.len(), 1);
            assert!(results.contains_key(&NodeRequestId::from_raw(2)));
        }
        ContinueOutcome::Cancelled => panic!("not cancelled"),
    }
    assert_eq!(entry.state(), EntryState::Active);

    entry.complete(BuildResult::new(&request(1, 1))).unwrap();
    assert_eq!(entry.state(), EntryState::Complete);
    assert!(entry.result().is_some());
}

#[test]
fn waiting_on_several_subs_reports_in_any_order() {
    let mut entry = entry();
    entry.continue_execution().unwrap();
    entry.wait_for_result(request(2, 1)).unwrap();
    entry.wait_for_result(request(3, 1)).unwrap();
    assert_eq!(entry.state(), EntryState::Waiting);

    entry.report_result(&BuildResult::new(&request(3, 1))).unwrap();
    // One sub still outstanding.
    assert_eq!(entry.state(), EntryState::Waiting);
    entry.report_result(&BuildResult::new(&request(2, 1))).unwrap();
    assert_eq!(entry.state(), EntryState::Ready);
}

#[test]
fn unmatched_reports_are_ignored() {
    let mut entry = entry();
    entry.continue_execution().unwrap();
    entry.wait_for_result(request(2, 1)).unwrap();

    entry.report_result(&BuildResult::new(&request(99, 1))).unwrap();
    assert_eq!(entry.state(), EntryState::Waiting);
}

#[test]
fn unresolved_configurations_block_issuing() {
    let mut entry = entry();
    entry.continue_execution().unwrap();
    entry.wait_for_result(request(2, -4)).unwrap();
    entry.wait_for_result(request(3, 7)).unwrap();

    assert!(entry.get_requests_to_issue_if_ready().is_none());

    entry
        .resolve_configuration(ConfigurationId::from_raw(-4), ConfigurationId::from_raw(9))
        .unwrap();
    let ready = entry.get_requests_to_issue_if_ready().unwrap();
    assert_eq!(ready.len(), 2);
    assert!(ready
        .iter()
        .all(|(request, id)| request.configuration_id() == *id && id.is_resolved()));
}

#[test]
fn off_table_transitions_are_internal_errors() {
    // Ready accepts only continue.
    let mut fresh = entry();
    assert!(fresh.wait_for_result(request(2, 1)).is_err());
    assert!(fresh.report_result(&BuildResult::new(&request(2, 1))).is_err());
    assert!(fresh.complete(BuildResult::new(&request(1, 1))).is_err());

    // Active rejects report and a second continue.
    let mut active = entry();
    active.continue_execution().unwrap();
    assert!(active.continue_execution().is_err());
    assert!(active
        .report_result(&BuildResult::new(&request(2, 1)))
        .is_err());

    // Waiting never completes directly.
    let mut waiting = entry();
    waiting.continue_execution().unwrap();
    waiting.wait_for_result(request(2, 1)).unwrap();
    assert!(waiting.complete(BuildResult::new(&request(1, 1))).is_err());

    // Complete accepts nothing.
    let mut done = entry();
    done.continue_execution().unwrap();
    done.complete(BuildResult::new(&request(1, 1))).unwrap();
    assert!(done.continue_execution().is_err());
    assert!(done.wait_for_result(request(2, 1)).is_err());
}

#[test]
fn cancellation_is_observed_at_the_next_continue() {
    let mut entry = entry();
    let token = CancellationToken::new();
    entry.set_cancellation(token.clone());

    // Not yet cancelled: first activation proceeds normally.
    entry.continue_execution().unwrap();
    entry.wait_for_result(request(2, 1)).unwrap();
    entry.report_result(&BuildResult::new(&request(2, 1))).unwrap();
    assert_eq!(entry.state(), EntryState::Ready);

    token.cancel();
    match entry.continue_execution().unwrap() {
        ContinueOutcome::Cancelled => {}
        ContinueOutcome::Resumed(_) => panic!("cancellation ignored"),
    }
    assert_eq!(entry.state(), EntryState::Complete);
    let result = entry.result().unwrap();
    assert_eq!(result.overall_result(), OverallResult::Failure);
}
