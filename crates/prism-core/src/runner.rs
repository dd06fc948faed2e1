//! Room tick loop.
//!
//! [`run_room`] drives one [`RoomHost`] at a fixed interval for a bounded
//! number of ticks. Before every tick it drains the [`InputSource`] for
//! that tick and dispatches each message to the room; after every tick it
//! hands the [`TickReport`] to a [`TickCallback`].
//!
//! A lens failure inside a tick is not fatal: the room keeps its reconciled
//! frame and the lens gets the next tick. Neither is an input that cannot be
//! applied: that tick fails, the input is gone, and the next tick reconciles
//! everything else. Messages from clients that never joined are logged and
//! dropped.

use tracing::{debug, error, info, warn};

use prism_types::{ClientMessage, HostMessage};

use crate::authority::AuthorityError;
use crate::room::{RoomError, RoomHost, TickReport};

/// Errors that end a run early.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The room failed in a way a retry cannot fix.
    #[error("room error: {source}")]
    Room {
        /// The underlying room error.
        #[from]
        source: RoomError,
    },
}

/// Where a room's inbound traffic comes from.
pub trait InputSource: Send {
    /// Messages to deliver before the tick that will reach `host_tick`.
    fn poll(&mut self, host_tick: u64) -> Vec<ClientMessage>;

    /// Outbound messages produced while delivering. Ignored by default.
    fn deliver(&mut self, _replies: &[HostMessage]) {}
}

/// An input source that never produces anything.
#[derive(Debug, Clone, Default)]
pub struct StubInputSource;

impl StubInputSource {
    /// Create a new stub input source.
    pub const fn new() -> Self {
        Self
    }
}

impl InputSource for StubInputSource {
    fn poll(&mut self, _host_tick: u64) -> Vec<ClientMessage> {
        Vec::new()
    }
}

/// Callback invoked after each tick completes.
pub trait TickCallback: Send {
    /// Called after a tick completes.
    fn on_tick(&mut self, report: &TickReport, room: &RoomHost);
}

/// A no-op tick callback for testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _report: &TickReport, _room: &RoomHost) {}
}

/// Pacing and bounds for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Milliseconds between ticks (0 = no sleep).
    pub tick_interval_ms: u64,
    /// Ticks to run.
    pub max_ticks: u64,
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Ticks executed.
    pub total_ticks: u64,
    /// Ticks whose lens frame failed.
    pub lens_failures: u64,
    /// Messages dropped because the room rejected them.
    pub rejected_messages: u64,
    /// Ticks that failed because a due input could not be applied.
    pub failed_ticks: u64,
    /// Host tick after the last tick.
    pub final_tick: u64,
}

/// Run a room for `settings.max_ticks` ticks.
///
/// # Errors
///
/// Returns [`RunnerError`] if the room fails in a way the next tick cannot
/// recover from, for example if a lens requests a transition to an unknown
/// lens.
pub async fn run_room(
    room: &mut RoomHost,
    settings: RunSettings,
    source: &mut dyn InputSource,
    callback: &mut dyn TickCallback,
) -> Result<RunResult, RunnerError> {
    let room_id = room.room_id();
    let mut result = RunResult {
        total_ticks: 0,
        lens_failures: 0,
        rejected_messages: 0,
        failed_ticks: 0,
        final_tick: room.authority().host_tick(),
    };

    info!(
        %room_id,
        max_ticks = settings.max_ticks,
        tick_interval_ms = settings.tick_interval_ms,
        lens_id = room.active_lens_id().unwrap_or("none"),
        "Room run starting"
    );

    while result.total_ticks < settings.max_ticks {
        let next_tick = room.authority().host_tick().saturating_add(1);
        for message in source.poll(next_tick) {
            match room.handle(message).await {
                Ok(replies) => source.deliver(&replies),
                Err(e @ RoomError::UnknownClient { .. }) => {
                    warn!(%room_id, error = %e, "Dropped message");
                    result.rejected_messages = result.rejected_messages.saturating_add(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        result.total_ticks = result.total_ticks.saturating_add(1);
        match room.tick().await {
            Ok(report) => {
                if report.lens_error.is_some() {
                    result.lens_failures = result.lens_failures.saturating_add(1);
                }
                result.final_tick = report.host_tick;
                callback.on_tick(&report, room);
                source.deliver(core::slice::from_ref(&report.snapshot));
            }
            Err(
                e @ RoomError::Authority {
                    source: AuthorityError::PositionOverflow { .. },
                },
            ) => {
                error!(%room_id, error = %e, "Tick failed, input discarded");
                result.failed_ticks = result.failed_ticks.saturating_add(1);
            }
            Err(e) => return Err(e.into()),
        }

        if settings.tick_interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(settings.tick_interval_ms)).await;
        }
    }

    debug!(%room_id, ?result, "Room run finished");
    Ok(result)
}
