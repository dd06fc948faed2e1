//! Regression tests for the deterministic replay harness against a recorded
//! fixture.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use prism_core::replay::{ReplayFixture, run_deterministic_replay};
use prism_types::{LensValue, Vec2, checksum};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegressionFixture {
    name: String,
    expected_snapshot_count: usize,
    expected_checksum: String,
    fixture: ReplayFixture,
}

fn load() -> RegressionFixture {
    let raw = include_str!("fixtures/replay_basic.json");
    serde_json::from_str(raw).unwrap()
}

#[tokio::test]
async fn fixture_replays_with_expected_snapshot_count() {
    let regression = load();
    let result = run_deterministic_replay(&regression.fixture).await.unwrap();
    assert_eq!(
        result.snapshots.len(),
        regression.expected_snapshot_count,
        "{}",
        regression.name
    );
    assert_eq!(result.checksum, checksum(&result.final_frame).unwrap());
    assert_eq!(result.final_frame.tick, 4);
    assert!(result.final_frame.entity("p3").is_some());
}

#[tokio::test]
async fn fixture_checksum_is_pinned() {
    let regression = load();
    let result = run_deterministic_replay(&regression.fixture).await.unwrap();
    assert_eq!(result.checksum, regression.expected_checksum, "{}", regression.name);

    // Six jitter steps of 0, 1, 0, 0, 1, 1 on top of the inputs.
    let p2 = result.final_frame.entity("p2").unwrap();
    assert_eq!(p2.position, Vec2::new(7.0, -0.5));
    let p3 = result.final_frame.entity("p3").unwrap();
    assert_eq!(p3.position, Vec2::new(4.0, 4.0));
    let crate_prop = result.final_frame.entity("crate-1").unwrap();
    assert_eq!(crate_prop.position, Vec2::new(13.0, 13.0));
}

#[tokio::test]
async fn replaying_twice_is_byte_identical() {
    let fixture = load().fixture;
    let first = run_deterministic_replay(&fixture).await.unwrap();
    let second = run_deterministic_replay(&fixture).await.unwrap();

    assert_eq!(first.checksum, second.checksum);
    assert_eq!(
        serde_json::to_string(&first.snapshots).unwrap(),
        serde_json::to_string(&second.snapshots).unwrap()
    );
}

#[tokio::test]
async fn recorded_order_does_not_matter() {
    let fixture = load().fixture;
    let baseline = run_deterministic_replay(&fixture).await.unwrap();

    let mut reversed = fixture.clone();
    reversed.inputs.reverse();
    let mut rotated = fixture.clone();
    rotated.inputs.rotate_left(3);

    for shuffled in [reversed, rotated] {
        let result = run_deterministic_replay(&shuffled).await.unwrap();
        assert_eq!(result.checksum, baseline.checksum);
        assert_eq!(result.snapshots, baseline.snapshots);
    }
}

#[tokio::test]
async fn changing_one_payload_changes_the_checksum() {
    let fixture = load().fixture;
    let baseline = run_deterministic_replay(&fixture).await.unwrap();

    let mut altered = fixture.clone();
    altered.inputs[0].payload = LensValue::map([("x", LensValue::Number(-1.25))]);
    let result = run_deterministic_replay(&altered).await.unwrap();
    assert_ne!(result.checksum, baseline.checksum);
}
