//! Tick and transition hooks that report progress through tracing.

use prism_core::room::{RoomHost, TickReport, TransitionObserver};
use prism_core::runner::TickCallback;
use prism_lens::TransitionContext;
use prism_types::{DeltaState, UniverseState};
use tracing::{debug, info, warn};

/// Logs a summary every `every` ticks and every lens failure.
#[derive(Debug)]
pub struct LoggingCallback {
    every: u64,
    applied_inputs: usize,
}

impl LoggingCallback {
    /// Summarize every `every` ticks (0 disables summaries).
    pub const fn new(every: u64) -> Self {
        Self {
            every,
            applied_inputs: 0,
        }
    }

    /// Inputs applied across every reported tick.
    pub const fn applied_inputs(&self) -> usize {
        self.applied_inputs
    }
}

impl TickCallback for LoggingCallback {
    fn on_tick(&mut self, report: &TickReport, room: &RoomHost) {
        self.applied_inputs = self.applied_inputs.saturating_add(report.reconcile.applied);

        if let Some(error) = &report.lens_error {
            warn!(
                room_id = %room.room_id(),
                host_tick = report.host_tick,
                error = %error,
                "Lens frame failed"
            );
        }

        if report.host_tick.checked_rem(self.every) == Some(0) {
            info!(
                room_id = %room.room_id(),
                host_tick = report.host_tick,
                lens_id = room.active_lens_id().unwrap_or("none"),
                entities = room.authority().frame().len(),
                pending = room.authority().pending_len(),
                applied_inputs = self.applied_inputs,
                "Room progress"
            );
        }
    }
}

/// Logs every lens transition.
#[derive(Debug, Default)]
pub struct TransitionLogger;

impl TransitionObserver for TransitionLogger {
    fn before_transition(&mut self, context: &TransitionContext, current: &UniverseState) {
        debug!(
            from = %context.from_lens_id,
            to = %context.to_lens_id,
            tick = context.tick,
            entities = current.frame.len(),
            "Lens transition starting"
        );
    }

    fn after_transition(
        &mut self,
        context: &TransitionContext,
        _previous: &UniverseState,
        delta: &DeltaState,
        next: &UniverseState,
    ) {
        info!(
            from = %context.from_lens_id,
            to = %context.to_lens_id,
            tick = next.tick,
            carried_states = delta.lens_states.len(),
            outcomes = next.lens_outcomes.len(),
            "Lens transition complete"
        );
    }
}
