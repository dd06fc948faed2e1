//! Deterministic replay harness.
//!
//! Replays a recorded input set against an initial frame, one input at a
//! time, stepping the frame through the seeded jitter lens after each input.
//! Inputs are put into reconciliation order first, so the output does not
//! depend on the order the inputs were recorded in. Two replays of the same
//! fixture must produce byte-identical snapshots and the same checksum.

use std::collections::BTreeMap;

use prism_lens::lenses::{JitterLens, standard_manifest};
use prism_lens::{HostContext, LensError, LensRuntime, RuntimeLimits, TimeoutOverrides};
use prism_types::{CompatibilityRequirements, Frame, FrameError, InputMessage, checksum};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::authority::{AuthorityError, apply_input, input_order};

/// Lens id the harness runs frames through.
pub const REPLAY_LENS_ID: &str = "lens/jitter";

/// Errors raised by a replay.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The initial frame is invalid.
    #[error("invalid initial frame: {source}")]
    Frame {
        /// The underlying error.
        #[from]
        source: FrameError,
    },

    /// An input could not be applied.
    #[error("input rejected: {source}")]
    Authority {
        /// The underlying error.
        #[from]
        source: AuthorityError,
    },

    /// The replay lens failed.
    #[error("replay lens failed: {source}")]
    Lens {
        /// The underlying error.
        #[from]
        source: LensError,
    },

    /// The final frame could not be serialized for hashing.
    #[error("failed to checksum final frame: {source}")]
    Checksum {
        /// The underlying error.
        source: serde_json::Error,
    },
}

/// A recorded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFixture {
    /// Seed for the lens's random stream.
    pub seed: u64,
    /// Frame the session started from.
    pub initial_frame: Frame,
    /// Inputs in recorded (arbitrary) order.
    pub inputs: Vec<InputMessage>,
}

/// What a replay produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    /// Frame after the last input.
    pub final_frame: Frame,
    /// One frame per applied input.
    pub snapshots: Vec<Frame>,
    /// SHA-256 of the canonical JSON of `final_frame`.
    pub checksum: String,
}

/// Sort inputs into reconciliation order and drop repeats of an already
/// applied `(client_id, input_seq)`.
pub fn reconcile_inputs(inputs: &[InputMessage]) -> Vec<InputMessage> {
    let mut ordered = inputs.to_vec();
    ordered.sort_by(input_order);

    let mut last_applied: BTreeMap<String, u64> = BTreeMap::new();
    ordered.retain(|input| {
        if last_applied
            .get(&input.client_id)
            .is_some_and(|&seq| input.input_seq <= seq)
        {
            return false;
        }
        last_applied.insert(input.client_id.clone(), input.input_seq);
        true
    });
    ordered
}

/// Replay `fixture` and hash the result.
///
/// # Errors
///
/// Returns [`ReplayError`] if the initial frame or an input is invalid, the
/// replay lens fails, or the final frame cannot be hashed.
pub async fn run_deterministic_replay(fixture: &ReplayFixture) -> Result<ReplayResult, ReplayError> {
    let mut frame = fixture.initial_frame.clone().into_validated()?;
    let inputs = reconcile_inputs(&fixture.inputs);

    let mut runtime = LensRuntime::create(
        Box::new(JitterLens::new(standard_manifest(REPLAY_LENS_ID))),
        HostContext::new(REPLAY_LENS_ID, fixture.seed),
        replay_limits(fixture.seed),
        &CompatibilityRequirements::default(),
        &replay_timeouts(),
    )
    .await?;

    let mut snapshots = Vec::with_capacity(inputs.len());
    for input in &inputs {
        input
            .payload
            .validate()
            .map_err(|source| AuthorityError::NonDeterministicPayload {
                client_id: input.client_id.clone(),
                input_seq: input.input_seq,
                source,
            })?;
        apply_input(&mut frame, input)?;
        frame = runtime.run_frame(&frame).await?;
        snapshots.push(frame.clone());
    }
    runtime.shutdown().await?;

    let checksum = checksum(&frame).map_err(|source| ReplayError::Checksum { source })?;
    debug!(
        seed = fixture.seed,
        inputs = fixture.inputs.len(),
        applied = snapshots.len(),
        checksum = %checksum,
        "Replay complete"
    );
    Ok(ReplayResult {
        final_frame: frame,
        snapshots,
        checksum,
    })
}

/// Replays are about determinism, not speed; budgets only catch hangs.
const fn replay_limits(seed: u64) -> RuntimeLimits {
    RuntimeLimits {
        max_frame_ms: 10_000,
        max_heap_mb: 64,
        deterministic_seed: seed,
        dt: prism_lens::runtime::DEFAULT_STEP_DT,
    }
}

const fn replay_timeouts() -> TimeoutOverrides {
    TimeoutOverrides {
        init_ms: Some(5_000),
        decode_ms: Some(5_000),
        update_ms: Some(5_000),
        render_ms: Some(5_000),
        encode_ms: Some(5_000),
        shutdown_ms: Some(5_000),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use prism_types::LensValue;

    use super::*;

    fn input(client: &str, seq: u64, tick: u64, dx: f64, dy: f64) -> InputMessage {
        InputMessage {
            client_id: client.to_owned(),
            input_seq: seq,
            target_tick: tick,
            payload: LensValue::map([("x", LensValue::Number(dx)), ("y", LensValue::Number(dy))]),
        }
    }

    fn fixture(inputs: Vec<InputMessage>) -> ReplayFixture {
        ReplayFixture {
            seed: 1337,
            initial_frame: Frame::empty(0),
            inputs,
        }
    }

    #[test]
    fn reconcile_orders_and_drops_repeats() {
        let ordered = reconcile_inputs(&[
            input("b", 1, 2, 0.0, 0.0),
            input("a", 2, 1, 0.0, 0.0),
            input("a", 1, 1, 0.0, 0.0),
            input("a", 1, 1, 9.0, 9.0),
        ]);
        let keys: Vec<_> = ordered
            .iter()
            .map(|i| (i.client_id.as_str(), i.input_seq))
            .collect();
        assert_eq!(keys, [("a", 1), ("a", 2), ("b", 1)]);
    }

    #[tokio::test]
    async fn one_snapshot_per_applied_input() {
        let result = run_deterministic_replay(&fixture(vec![
            input("p1", 1, 1, 1.0, 0.0),
            input("p1", 2, 2, 0.0, 1.0),
            input("p1", 2, 2, 0.0, 1.0),
        ]))
        .await
        .unwrap();
        assert_eq!(result.snapshots.len(), 2);
        assert_eq!(result.snapshots.last(), Some(&result.final_frame));
        assert_eq!(result.final_frame.tick, 2);
        assert_eq!(result.checksum.len(), 64);
    }

    #[tokio::test]
    async fn empty_input_set_hashes_the_initial_frame() {
        let result = run_deterministic_replay(&fixture(Vec::new())).await.unwrap();
        assert!(result.snapshots.is_empty());
        assert_eq!(result.final_frame, Frame::empty(0));
        assert_eq!(result.checksum, checksum(&Frame::empty(0)).unwrap());
    }

    #[tokio::test]
    async fn non_finite_payload_is_rejected() {
        let err = run_deterministic_replay(&fixture(vec![input("p1", 1, 1, f64::NAN, 0.0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::Authority { .. }));
    }
}
