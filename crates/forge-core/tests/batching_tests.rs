// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]

mod common;

use common::{item_with, seed_items, seed_properties};
use forge_core::{
    partition_buckets, BatchError, Item, Lookup, TargetResult, TargetResultCode,
    INVALID_METADATA_REFERENCE_CODE,
};

/// Five `File` items and five `Doc` items, batched on `%(Filename)`:
/// one bucket per `File` item, each still seeing the full `Doc` list.
#[test]
fn one_bucket_per_file_item_docs_unbatched() {
    let mut lookup = Lookup::new();
    seed_items(
        &mut lookup,
        "File",
        &["a.foo", "b.foo", "c.foo", "d.foo", "e.foo"],
    );
    seed_items(
        &mut lookup,
        "Doc",
        &["a.doc", "b.doc", "c.doc", "d.doc", "e.doc"],
    );
    seed_properties(&mut lookup, &[("UnitTests", "unittests.foo"), ("obj", "obj")]);

    let parameters = [
        "@(File);$(unittests)",
        "$(obj)\\%(Filename).ext",
        "@(File->'%(extension)')",
    ];
    let buckets = partition_buckets(&lookup, &parameters).unwrap();
    assert_eq!(buckets.len(), 5);

    for bucket in &buckets {
        assert_eq!(bucket.items_of("File").len(), 1);
        // Doc does not participate in batching: every bucket sees all five.
        let docs = bucket.expander().expand("@(Doc)").unwrap();
        assert_eq!(docs.split(';').count(), 5);
    }

    let expander = buckets[0].expander();
    assert_eq!(expander.expand("@(File)").unwrap(), "a.foo");
    assert_eq!(expander.expand("@(File);$(unittests)").unwrap(), "a.foo;unittests.foo");
    assert_eq!(
        expander.expand("$(obj)\\%(Filename).ext").unwrap(),
        "obj\\a.ext"
    );
    // Extension is outside the batching set; unqualified it reads empty.
    assert_eq!(expander.expand("%(Extension)").unwrap(), "");
    // The transform still reads per-item metadata.
    assert_eq!(expander.expand("@(File->'%(extension)')").unwrap(), ".foo");
}

/// `%(Culture)` where one item defines it and another lacks it entirely.
#[test]
fn partially_defined_unqualified_culture_is_invalid() {
    let mut lookup = Lookup::new();
    lookup.seed_item(item_with("File", "a.foo", &[("Culture", "fr-fr")]));
    lookup.seed_item(Item::new("File", "b.foo"));

    let err = partition_buckets(&lookup, &["@(File); %(Culture)"]).unwrap_err();
    assert!(matches!(err, BatchError::InvalidMetadataReference { .. }));
    assert_eq!(err.code(), INVALID_METADATA_REFERENCE_CODE);
}

/// Outputs batched over a type with no items: zero buckets, and the
/// caller reports the target Skipped — not Success-with-empty.
#[test]
fn zero_buckets_mean_skipped() {
    let lookup = Lookup::new();
    let buckets = partition_buckets(&lookup, &["%(T.Identity)"]).unwrap();
    assert!(buckets.is_empty());

    let reported = if buckets.is_empty() {
        TargetResult::skipped()
    } else {
        TargetResult::success(vec![])
    };
    assert_eq!(reported.code(), TargetResultCode::Skipped);
    assert_ne!(reported, TargetResult::success(vec![]));
}

/// Adding items that contribute no new key tuples never creates new
/// buckets.
#[test]
fn monotonicity_under_keyless_additions() {
    let mut lookup = Lookup::new();
    lookup.seed_item(item_with("T", "one", &[("g", "x")]));
    lookup.seed_item(item_with("T", "two", &[("g", "y")]));
    let before = partition_buckets(&lookup, &["%(T.g)"]).unwrap();

    // More items, same key tuples.
    lookup.seed_item(item_with("T", "three", &[("g", "x")]));
    lookup.seed_item(item_with("T", "four", &[("g", "y")]));
    // Items of an unconsumed type never matter.
    lookup.seed_item(Item::new("Unrelated", "u"));
    let after = partition_buckets(&lookup, &["%(T.g)"]).unwrap();

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.binding(), b.binding());
    }
}

/// Batched `@(T)` inside a bucket lists only that bucket's partition.
#[test]
fn batched_list_is_restricted_to_the_bucket() {
    let mut lookup = Lookup::new();
    lookup.seed_item(item_with("T", "one", &[("g", "x")]));
    lookup.seed_item(item_with("T", "two", &[("g", "y")]));
    lookup.seed_item(item_with("T", "three", &[("g", "x")]));

    let buckets = partition_buckets(&lookup, &["@(T);%(g)"]).unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(
        buckets[0].expander().expand("@(T)").unwrap(),
        "one;three"
    );
    assert_eq!(buckets[1].expander().expand("@(T)").unwrap(), "two");
}

/// A qualified reference partitions a type the expressions never list
/// with `@()`, and other buckets bind it empty.
#[test]
fn qualified_reference_drives_batching_without_an_item_list() {
    let mut lookup = Lookup::new();
    lookup.seed_item(item_with("Src", "s1", &[("Lang", "cs")]));
    lookup.seed_item(item_with("Src", "s2", &[("Lang", "fs")]));

    let buckets = partition_buckets(&lookup, &["%(Src.Lang)"]).unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].binding().qualified("Src", "Lang"), Some("cs"));
    // Inside a bucket the partition holds exactly the matching items.
    assert_eq!(buckets[0].items_of("Src").len(), 1);
    assert_eq!(buckets[0].expander().expand("@(Src)").unwrap(), "s1");
}

/// Metadata written inside a scope is what batching observes.
#[test]
fn batching_reads_through_lookup_modifications() {
    use forge_core::{MetadataModification, ModificationSet};

    let mut lookup = Lookup::new();
    let h1 = lookup.seed_item(item_with("T", "one", &[("g", "old")]));
    let _scope = lookup.enter_scope("target");
    let mut modset = ModificationSet::new();
    modset
        .set("g", MetadataModification::SetTo("new".into()))
        .unwrap();
    lookup.modify_items("T", &[h1], &modset).unwrap();

    let buckets = partition_buckets(&lookup, &["%(T.g)"]).unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].binding().qualified("T", "g"), Some("new"));
}
