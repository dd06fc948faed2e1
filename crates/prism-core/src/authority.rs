//! The authoritative state machine: single writer of a room's canonical frame.
//!
//! Clients deliver [`InputMessage`]s over a transport that may reorder,
//! delay or duplicate them. [`AuthoritativeState::enqueue_input`] buffers
//! new inputs and acknowledges them immediately. [`AuthoritativeState::reconcile_to_tick`]
//! later applies every buffered input that has become due, in the total
//! order `(target_tick, client_id, input_seq)`. Arrival order never affects
//! the resulting frame, which is what makes a room replayable.
//!
//! Duplicates are absorbed twice over: at enqueue time against the highest
//! applied sequence number, and again at apply time so that two copies of
//! the same message buffered before either was applied still apply once.
//!
//! Reconciliation is all-or-nothing. If a due input would move its entity
//! out of range, nothing is committed and every other input stays buffered,
//! but the offending input is discarded so the next pass can make progress.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use prism_types::{
    AckMessage, EntityState, Frame, FrameError, InputMessage, LensValue, RoomId, SnapshotMessage,
    ValueError, Vec2,
};
use tracing::{debug, info, warn};

/// Entity kind assigned to entities created from client input.
pub const PLAYER_KIND: &str = "player";

/// Errors raised by the authoritative state machine.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// A frame offered to the state machine violates the data model.
    #[error("invalid frame: {source}")]
    InvalidFrame {
        /// The underlying violation.
        #[from]
        source: FrameError,
    },

    /// A replacement frame is older than the canonical one.
    #[error("frame tick {offered} is behind canonical tick {current}")]
    TickRegression {
        /// Tick of the rejected frame.
        offered: u64,
        /// Tick of the canonical frame.
        current: u64,
    },

    /// An input arrived without a client id.
    #[error("input {input_seq} has an empty client id")]
    EmptyClientId {
        /// Sequence number of the rejected input.
        input_seq: u64,
    },

    /// An input payload is not a deterministic value.
    #[error("input {input_seq} from {client_id} has a non-deterministic payload: {source}")]
    NonDeterministicPayload {
        /// Sending client.
        client_id: String,
        /// Sequence number of the rejected input.
        input_seq: u64,
        /// Where the payload went wrong.
        source: ValueError,
    },

    /// Applying an input would move an entity to a non-finite position.
    #[error("input {input_seq} from {client_id} moves its entity out of range")]
    PositionOverflow {
        /// Sending client.
        client_id: String,
        /// Sequence number of the offending input.
        input_seq: u64,
    },
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    /// Tick of the canonical frame after the pass.
    pub host_tick: u64,
    /// Inputs applied.
    pub applied: usize,
    /// Due inputs dropped because their sequence number was already applied.
    pub duplicates: usize,
    /// Inputs left buffered for a later tick.
    pub deferred: usize,
}

/// The total reconciliation order: `(target_tick, client_id, input_seq)`.
pub fn input_order(a: &InputMessage, b: &InputMessage) -> Ordering {
    a.target_tick
        .cmp(&b.target_tick)
        .then_with(|| a.client_id.cmp(&b.client_id))
        .then_with(|| a.input_seq.cmp(&b.input_seq))
}

/// The movement carried by a payload: its numeric `x` and `y` fields.
///
/// Missing or non-numeric components count as zero.
pub fn movement_delta(payload: &LensValue) -> Vec2 {
    let component = |key| payload.get(key).and_then(LensValue::as_f64).unwrap_or(0.0);
    Vec2::new(component("x"), component("y"))
}

/// Apply one input to `frame` as a position delta.
///
/// The frame tick advances to the input's target tick if it is behind. The
/// client's entity is created at the origin if it does not exist yet.
pub fn apply_input(frame: &mut Frame, input: &InputMessage) -> Result<(), AuthorityError> {
    frame.tick = frame.tick.max(input.target_tick);

    let mut entity = frame
        .entity(&input.client_id)
        .cloned()
        .unwrap_or_else(|| EntityState {
            id: input.client_id.clone(),
            kind: PLAYER_KIND.to_owned(),
            position: Vec2::default(),
            tick: input.target_tick,
        });

    let position = entity.position.offset(movement_delta(&input.payload));
    if !position.is_finite() {
        return Err(AuthorityError::PositionOverflow {
            client_id: input.client_id.clone(),
            input_seq: input.input_seq,
        });
    }
    entity.position = position;
    entity.tick = entity.tick.max(input.target_tick);
    frame.upsert(entity);
    Ok(())
}

/// Canonical state of one room.
#[derive(Debug, Clone)]
pub struct AuthoritativeState {
    room_id: RoomId,
    frame: Frame,
    pending: Vec<InputMessage>,
    last_applied: BTreeMap<String, u64>,
    last_acked: BTreeMap<String, u64>,
}

impl AuthoritativeState {
    /// Take ownership of an initial frame, validating it.
    pub fn new(room_id: RoomId, frame: Frame) -> Result<Self, AuthorityError> {
        Ok(Self {
            room_id,
            frame: frame.into_validated()?,
            pending: Vec::new(),
            last_applied: BTreeMap::new(),
            last_acked: BTreeMap::new(),
        })
    }

    /// Buffer an input and acknowledge it.
    ///
    /// An input whose sequence number is already applied is not buffered;
    /// the ack repeats the highest applied number instead. Acks for a client
    /// never go backwards.
    pub fn enqueue_input(&mut self, input: InputMessage) -> Result<AckMessage, AuthorityError> {
        if input.client_id.is_empty() {
            return Err(AuthorityError::EmptyClientId {
                input_seq: input.input_seq,
            });
        }
        input
            .payload
            .validate()
            .map_err(|source| AuthorityError::NonDeterministicPayload {
                client_id: input.client_id.clone(),
                input_seq: input.input_seq,
                source,
            })?;

        let client_id = input.client_id.clone();
        let candidate = match self.last_applied.get(&client_id) {
            Some(&applied) if input.input_seq <= applied => {
                debug!(
                    room_id = %self.room_id,
                    client_id = %client_id,
                    input_seq = input.input_seq,
                    last_applied = applied,
                    "Dropped stale input"
                );
                applied
            }
            _ => {
                let seq = input.input_seq;
                self.pending.push(input);
                seq
            }
        };

        let acked = self
            .last_acked
            .get(&client_id)
            .map_or(candidate, |&previous| previous.max(candidate));
        self.last_acked.insert(client_id.clone(), acked);

        Ok(AckMessage {
            room_id: self.room_id,
            client_id,
            acked_input_seq: acked,
            host_tick: self.frame.tick,
        })
    }

    /// Apply every buffered input with `target_tick <= target_tick`.
    ///
    /// Inputs for later ticks stay buffered. The canonical frame tick
    /// becomes at least `target_tick`.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::PositionOverflow`] if a due input cannot be applied.
    /// The pass is rolled back and that input is removed from the buffer.
    pub fn reconcile_to_tick(&mut self, target_tick: u64) -> Result<ReconcileSummary, AuthorityError> {
        let (mut due, deferred): (Vec<InputMessage>, Vec<InputMessage>) = self
            .pending
            .iter()
            .cloned()
            .partition(|input| input.target_tick <= target_tick);
        due.sort_by(input_order);

        let mut frame = self.frame.clone();
        let mut last_applied = self.last_applied.clone();
        let mut applied = 0_usize;
        let mut duplicates = 0_usize;

        for input in &due {
            if last_applied
                .get(&input.client_id)
                .is_some_and(|&seq| input.input_seq <= seq)
            {
                duplicates = duplicates.saturating_add(1);
                continue;
            }
            if let Err(e) = apply_input(&mut frame, input) {
                self.discard(&input.client_id, input.input_seq);
                return Err(e);
            }
            last_applied.insert(input.client_id.clone(), input.input_seq);
            applied = applied.saturating_add(1);
        }
        frame.tick = frame.tick.max(target_tick);
        frame.validate()?;

        let summary = ReconcileSummary {
            host_tick: frame.tick,
            applied,
            duplicates,
            deferred: deferred.len(),
        };
        self.frame = frame;
        self.last_applied = last_applied;
        self.pending = deferred;

        if applied > 0 {
            debug!(
                room_id = %self.room_id,
                host_tick = summary.host_tick,
                applied,
                duplicates,
                deferred = summary.deferred,
                "Reconciled inputs"
            );
        }
        Ok(summary)
    }

    /// Drop every buffered copy of one input.
    fn discard(&mut self, client_id: &str, input_seq: u64) {
        let before = self.pending.len();
        self.pending
            .retain(|input| input.client_id != client_id || input.input_seq != input_seq);
        warn!(
            room_id = %self.room_id,
            client_id,
            input_seq,
            copies = before.saturating_sub(self.pending.len()),
            "Discarded input that cannot be applied"
        );
    }

    /// The current snapshot. Client sequence numbers are sorted by client id.
    pub fn snapshot(&self) -> SnapshotMessage {
        SnapshotMessage {
            room_id: self.room_id,
            host_tick: self.frame.tick,
            frame: self.frame.clone(),
            last_applied_input_seq: self.last_applied.clone(),
        }
    }

    /// Adopt a new canonical frame, typically the output of a lens.
    ///
    /// Rejects invalid frames and frames older than the current one.
    pub fn replace_frame(&mut self, frame: Frame) -> Result<(), AuthorityError> {
        let frame = self.admit_frame(frame)?;
        self.commit_frame(frame);
        Ok(())
    }

    /// Check a frame [`Self::replace_frame`] would accept, without adopting it.
    pub fn admit_frame(&self, frame: Frame) -> Result<Frame, AuthorityError> {
        let frame = frame.into_validated()?;
        if frame.tick < self.frame.tick {
            return Err(AuthorityError::TickRegression {
                offered: frame.tick,
                current: self.frame.tick,
            });
        }
        Ok(frame)
    }

    /// Adopt a frame already returned by [`Self::admit_frame`].
    pub(crate) fn commit_frame(&mut self, frame: Frame) {
        if frame.tick > self.frame.tick {
            info!(
                room_id = %self.room_id,
                from = self.frame.tick,
                to = frame.tick,
                "Canonical frame jumped ahead"
            );
        }
        self.frame = frame;
    }

    /// The room this state belongs to.
    pub const fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// The canonical frame.
    pub const fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Current host tick.
    pub const fn host_tick(&self) -> u64 {
        self.frame.tick
    }

    /// Number of buffered inputs.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Highest applied sequence number for a client, if any.
    pub fn last_applied(&self, client_id: &str) -> Option<u64> {
        self.last_applied.get(client_id).copied()
    }
}
