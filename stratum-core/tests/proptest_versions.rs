//! Property-based tests for version ids and lineage documents.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use stratum_core::LineageRecorder;
use stratum_core::data::storage::{is_version_id, version_id_at};

fn instant(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

// 2000-01-01 .. 2099-12-31, keeps every id at four year digits.
const MIN_SECS: i64 = 946_684_800;
const MAX_SECS: i64 = 4_102_444_799;

// --- Version id properties ---

proptest! {
    #[test]
    fn version_id_is_fixed_width_and_valid(secs in MIN_SECS..MAX_SECS) {
        let id = version_id_at(instant(secs));
        prop_assert_eq!(id.len(), 15);
        prop_assert!(is_version_id(&id));
    }

    #[test]
    fn version_ids_one_second_apart_are_distinct_and_sorted(
        secs in MIN_SECS..MAX_SECS,
        gap in 1i64..10_000_000,
    ) {
        let later = (secs + gap).min(MAX_SECS);
        prop_assume!(later > secs);
        let a = version_id_at(instant(secs));
        let b = version_id_at(instant(later));
        prop_assert_ne!(&a, &b);
        prop_assert!(a < b);
    }

    #[test]
    fn sub_second_writes_share_an_id(secs in MIN_SECS..MAX_SECS, nanos in 0u32..1_000_000_000) {
        let whole = version_id_at(instant(secs));
        let fractional = version_id_at(Utc.timestamp_opt(secs, nanos).unwrap());
        prop_assert_eq!(whole, fractional);
    }
}

// --- Lineage round-trip ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn lineage_roundtrips_inputs(
        env in "(dev|staging|prod)",
        input_path in "[a-z0-9/_.]{1,40}",
        git_sha in proptest::option::of("[0-9a-f]{7,40}"),
        features in proptest::collection::btree_map("[a-z_]{1,12}", any::<bool>(), 0..5),
        row_counts in proptest::collection::btree_map("[a-z]{1,8}", 0u64..1_000_000, 0..5),
    ) {
        let dir = tempfile::TempDir::new().unwrap();
        let recorder = LineageRecorder::new(dir.path());
        recorder
            .record(
                &env,
                &input_path,
                "20260101_000000",
                git_sha.as_deref(),
                &features,
                &row_counts,
            )
            .unwrap();

        let record = recorder.load("20260101_000000").unwrap().unwrap();
        prop_assert_eq!(record.env, env);
        prop_assert_eq!(record.input.path, input_path);
        prop_assert_eq!(record.output.version, "20260101_000000");
        prop_assert_eq!(record.output.dataset_root, dir.path().display().to_string());
        prop_assert_eq!(record.git_sha, git_sha);
        prop_assert_eq!(record.features, features);
        prop_assert_eq!(record.row_counts, row_counts);
    }
}

#[test]
fn empty_maps_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let recorder = LineageRecorder::new(dir.path());
    recorder
        .record("dev", "in.csv", "v1", None, &BTreeMap::new(), &BTreeMap::new())
        .unwrap();
    let record = recorder.load("v1").unwrap().unwrap();
    assert!(record.features.is_empty());
    assert!(record.row_counts.is_empty());
}
