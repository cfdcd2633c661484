// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]

mod common;

use common::item_with;
use forge_core::codec::{
    decode_build_result, decode_configuration, encode_build_result, encode_configuration,
};
use forge_core::{
    BuildRequest, BuildRequestConfiguration, BuildResult, ConfigurationId, ErrorRecord,
    GlobalRequestId, NodeRequestId, Property, PropertyTable, SubmissionId, TargetResult,
};

fn full_result() -> BuildResult {
    let request = BuildRequest::new(
        SubmissionId::from_raw(2),
        NodeRequestId::from_raw(17),
        ConfigurationId::from_raw(6),
        vec!["Build".into(), "Pack".into()],
    )
    .with_parent(GlobalRequestId::from_raw(3))
    .with_global_id(GlobalRequestId::from_raw(8));

    let mut result = BuildResult::new(&request)
        .with_target_lists(vec!["Init".into()], vec!["Build".into()]);
    result.add_target_result(
        "Build",
        TargetResult::success(vec![
            // Empty-valued metadata keys must survive the trip distinct
            // from absent keys.
            item_with("Out", "bin/a.dll", &[("Culture", ""), ("Kind", "lib")]),
            item_with("Out", "bin/b%3bc.dll", &[]),
        ]),
    );
    result.add_target_result(
        "Pack",
        TargetResult::failure(Some(ErrorRecord::new(
            "PackagingException",
            "duplicate entry: a.nupkg",
        ))),
    );
    result
}

#[test]
fn build_result_round_trips_by_value() {
    let original = full_result();
    let bytes = encode_build_result(&original).unwrap();
    let decoded = decode_build_result(&bytes).unwrap();
    assert_eq!(decoded, original);

    // Exceptions compare by type name and message.
    let error = decoded.target_result("Pack").unwrap().error().unwrap();
    assert_eq!(error.kind, "PackagingException");
    assert_eq!(error.message, "duplicate entry: a.nupkg");

    // Escaped includes stay escaped in storage and decode on read.
    let items = decoded.target_result("Build").unwrap().items();
    assert_eq!(items[1].include_escaped(), "bin/b%3bc.dll");
    assert_eq!(items[1].include(), "bin/b;c.dll");
}

#[test]
fn item_equality_after_decode_is_multiset_based() {
    let original = full_result();
    let decoded = decode_build_result(&encode_build_result(&original).unwrap()).unwrap();

    let expected = item_with("Out", "bin/a.dll", &[("Kind", "lib"), ("Culture", "")]);
    assert_eq!(decoded.target_result("Build").unwrap().items()[0], expected);
}

#[test]
fn circular_dependency_flag_round_trips() {
    let request = BuildRequest::new(
        SubmissionId::from_raw(1),
        NodeRequestId::from_raw(1),
        ConfigurationId::from_raw(1),
        vec![],
    );
    let original = BuildResult::new(&request).with_circular_dependency();
    let decoded = decode_build_result(&encode_build_result(&original).unwrap()).unwrap();
    assert!(decoded.circular_dependency());
    assert_eq!(decoded, original);
}

#[test]
fn configuration_round_trips_with_identity_intact() {
    let mut properties = PropertyTable::new();
    properties.set(Property::new("Flavor", "Release"));
    let original = BuildRequestConfiguration::new(
        "dir/proj.xml",
        properties,
        "current",
        vec!["Build".into()],
    )
    .with_id(ConfigurationId::from_raw(12));

    let decoded = decode_configuration(&encode_configuration(&original).unwrap()).unwrap();
    assert_eq!(decoded, original);
    assert_eq!(decoded.configuration_id(), ConfigurationId::from_raw(12));
    assert_eq!(
        decoded.content_fingerprint(),
        original.content_fingerprint()
    );
}
