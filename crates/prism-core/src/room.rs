//! Per-room host: transport dispatch, ticking and lens swaps.
//!
//! A [`RoomHost`] is the single logical sequence through which a room's
//! canonical state changes. It owns the room's [`AuthoritativeState`], its
//! [`UniverseState`] and the active [`LensRuntime`]. Rooms share nothing
//! mutable, so any number of them may run in parallel.
//!
//! Each tick reconciles due input, runs the frame through the active lens
//! and adopts the lens's output as canonical. A failed lens frame leaves
//! the reconciled frame in place and is retried with it on the next tick.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use prism_lens::lenses::LensCatalog;
use prism_lens::{
    HostContext, LensError, LensRuntime, RuntimeLimits, TimeoutOverrides, TransitionContext,
    TransitionRegistry, transition_lens,
};
use prism_types::{
    ClientMessage, CompatibilityRequirements, DeltaState, Frame, HostMessage, IdentityAnchors,
    LensTransitionMessage, RoomId, UniverseState,
};
use tracing::{debug, error, info, warn};

use crate::authority::{AuthoritativeState, AuthorityError, ReconcileSummary};

/// Errors raised by a room host.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The authoritative state rejected an operation.
    #[error("authority error: {source}")]
    Authority {
        /// The underlying error.
        #[from]
        source: AuthorityError,
    },

    /// The lens runtime failed to start or stop.
    #[error("lens error: {source}")]
    Lens {
        /// The underlying error.
        #[from]
        source: LensError,
    },

    /// A message came from a client that never joined.
    #[error("client {client_id} has not joined room {room_id}")]
    UnknownClient {
        /// The room.
        room_id: RoomId,
        /// The unknown client.
        client_id: String,
    },

    /// The requested lens is not in the catalog.
    #[error("unknown lens {lens_id}")]
    UnknownLens {
        /// The requested lens.
        lens_id: String,
    },

    /// A lens is already running.
    #[error("room {room_id} is already running {lens_id}")]
    AlreadyStarted {
        /// The room.
        room_id: RoomId,
        /// The lens already running.
        lens_id: String,
    },

    /// A transition was requested before any lens started.
    #[error("room {room_id} has no active lens")]
    NoActiveLens {
        /// The room.
        room_id: RoomId,
    },
}

/// Hooks notified around every lens transition.
///
/// Both methods default to doing nothing.
pub trait TransitionObserver: Send + Sync {
    /// Called after the transition is computed, before anything changes.
    fn before_transition(&mut self, _context: &TransitionContext, _current: &UniverseState) {}

    /// Called once the new lens is running and the delta is applied.
    fn after_transition(
        &mut self,
        _context: &TransitionContext,
        _previous: &UniverseState,
        _delta: &DeltaState,
        _next: &UniverseState,
    ) {
    }
}

/// Host-side settings shared by every lens a room runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomSettings {
    /// Runtime ceilings; `deterministic_seed` seeds each lens's host context.
    pub limits: RuntimeLimits,
    /// What a lens must satisfy to be loaded.
    pub requirements: CompatibilityRequirements,
    /// Phase timeout overrides.
    pub timeouts: TimeoutOverrides,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Host tick after the tick.
    pub host_tick: u64,
    /// Reconciliation counters.
    pub reconcile: ReconcileSummary,
    /// Whether the lens produced the canonical frame this tick.
    pub lens_applied: bool,
    /// The lens failure, if the lens ran and failed.
    pub lens_error: Option<String>,
    /// Snapshot broadcast to every client.
    pub snapshot: HostMessage,
}

/// One simulation room.
pub struct RoomHost {
    room_id: RoomId,
    authority: AuthoritativeState,
    universe: UniverseState,
    runtime: Option<LensRuntime>,
    catalog: Arc<LensCatalog>,
    registry: Arc<TransitionRegistry>,
    settings: RoomSettings,
    observers: Vec<Box<dyn TransitionObserver>>,
    clients: BTreeSet<String>,
    seen_ticks: BTreeMap<String, u64>,
}

impl core::fmt::Debug for RoomHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RoomHost")
            .field("room_id", &self.room_id)
            .field("host_tick", &self.authority.host_tick())
            .field("active_lens", &self.active_lens_id())
            .field("clients", &self.clients)
            .finish_non_exhaustive()
    }
}

impl RoomHost {
    /// A room with no lens running yet.
    pub fn new(
        room_id: RoomId,
        frame: Frame,
        anchors: IdentityAnchors,
        catalog: Arc<LensCatalog>,
        registry: Arc<TransitionRegistry>,
        settings: RoomSettings,
    ) -> Result<Self, RoomError> {
        let authority = AuthoritativeState::new(room_id, frame)?;
        let universe = UniverseState::new(String::new(), authority.frame().clone(), anchors);
        Ok(Self {
            room_id,
            authority,
            universe,
            runtime: None,
            catalog,
            registry,
            settings,
            observers: Vec::new(),
            clients: BTreeSet::new(),
            seen_ticks: BTreeMap::new(),
        })
    }

    /// Register a transition observer.
    pub fn add_observer(&mut self, observer: Box<dyn TransitionObserver>) {
        self.observers.push(observer);
    }

    /// Load and initialize the first lens.
    pub async fn start_lens(&mut self, lens_id: &str) -> Result<(), RoomError> {
        if let Some(runtime) = &self.runtime {
            return Err(RoomError::AlreadyStarted {
                room_id: self.room_id,
                lens_id: runtime.lens_id().to_owned(),
            });
        }
        let runtime = self.create_runtime(lens_id).await?;
        self.universe.active_lens_id = lens_id.to_owned();
        self.runtime = Some(runtime);
        info!(room_id = %self.room_id, lens_id, "Room lens started");
        Ok(())
    }

    /// Dispatch one inbound message and return the replies.
    pub async fn handle(&mut self, message: ClientMessage) -> Result<Vec<HostMessage>, RoomError> {
        match message {
            ClientMessage::Join { client_id } => {
                if self.clients.insert(client_id.clone()) {
                    info!(room_id = %self.room_id, client_id = %client_id, "Client joined room");
                }
                Ok(vec![HostMessage::Snapshot(self.authority.snapshot())])
            }
            ClientMessage::Input(input) => {
                self.require_client(&input.client_id)?;
                let ack = self.authority.enqueue_input(input)?;
                Ok(vec![HostMessage::Ack(ack)])
            }
            ClientMessage::Ack {
                client_id,
                host_tick,
            } => {
                self.require_client(&client_id)?;
                let seen = self.seen_ticks.entry(client_id).or_insert(host_tick);
                *seen = (*seen).max(host_tick);
                Ok(Vec::new())
            }
            ClientMessage::Snapshot { client_id } => {
                self.require_client(&client_id)?;
                Ok(vec![HostMessage::Snapshot(self.authority.snapshot())])
            }
            ClientMessage::LensTransition { lens_id } => {
                let notice = self.transition_lens(&lens_id).await?;
                Ok(vec![HostMessage::LensTransition(notice)])
            }
        }
    }

    /// Advance one tick: reconcile, run the lens, snapshot.
    pub async fn tick(&mut self) -> Result<TickReport, RoomError> {
        let next_tick = self.authority.host_tick().saturating_add(1);
        let reconcile = self.authority.reconcile_to_tick(next_tick)?;

        let mut lens_applied = false;
        let mut lens_error = None;
        if let Some(runtime) = self.runtime.as_mut() {
            let outcome = runtime.run_frame(self.authority.frame()).await;
            match outcome {
                Ok(frame) => match self.authority.replace_frame(frame) {
                    Ok(()) => lens_applied = true,
                    Err(e) => {
                        error!(room_id = %self.room_id, error = %e, "Lens produced an unusable frame");
                        lens_error = Some(e.to_string());
                    }
                },
                Err(e @ (LensError::Timeout { .. } | LensError::FrameBudgetExceeded { .. })) => {
                    warn!(room_id = %self.room_id, error = %e, "Lens frame failed, retrying next tick");
                    lens_error = Some(e.to_string());
                }
                Err(e) => {
                    error!(room_id = %self.room_id, error = %e, "Lens contract violation");
                    lens_error = Some(e.to_string());
                }
            }
        }

        self.universe = core::mem::take(&mut self.universe).with_frame(self.authority.frame().clone());
        debug!(
            room_id = %self.room_id,
            host_tick = self.authority.host_tick(),
            applied = reconcile.applied,
            lens_applied,
            "Tick complete"
        );

        Ok(TickReport {
            host_tick: self.authority.host_tick(),
            reconcile,
            lens_applied,
            lens_error,
            snapshot: HostMessage::Snapshot(self.authority.snapshot()),
        })
    }

    /// Swap the active lens, carrying the universe across.
    ///
    /// The handed-over frame is checked before the incoming lens is created.
    /// If either the frame or the incoming lens is rejected, the room keeps
    /// its current lens and universe untouched.
    pub async fn transition_lens(&mut self, lens_id: &str) -> Result<LensTransitionMessage, RoomError> {
        if self.runtime.is_none() {
            return Err(RoomError::NoActiveLens {
                room_id: self.room_id,
            });
        }

        let result = transition_lens(&self.universe, lens_id, &self.registry);
        for observer in &mut self.observers {
            observer.before_transition(&result.context, &self.universe);
        }

        let frame = self.authority.admit_frame(result.next.frame.clone())?;
        let incoming = self.create_runtime(lens_id).await?;
        self.authority.commit_frame(frame);
        if let Some(mut outgoing) = self.runtime.replace(incoming)
            && let Err(e) = outgoing.shutdown().await
        {
            warn!(room_id = %self.room_id, error = %e, "Outgoing lens shutdown failed");
        }

        let previous = core::mem::replace(&mut self.universe, result.next);
        for observer in &mut self.observers {
            observer.after_transition(&result.context, &previous, &result.delta, &self.universe);
        }

        info!(
            room_id = %self.room_id,
            from = %result.context.from_lens_id,
            to = %result.context.to_lens_id,
            at_tick = result.context.tick,
            "Room switched lens"
        );
        Ok(LensTransitionMessage {
            room_id: self.room_id,
            from: result.context.from_lens_id,
            to: result.context.to_lens_id.clone(),
            lens_id: result.context.to_lens_id,
            at_tick: result.context.tick,
        })
    }

    /// Shut the active lens down, if any.
    pub async fn shutdown(&mut self) -> Result<(), RoomError> {
        if let Some(mut runtime) = self.runtime.take() {
            runtime.shutdown().await?;
        }
        Ok(())
    }

    /// The room id.
    pub const fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// The canonical state.
    pub const fn authority(&self) -> &AuthoritativeState {
        &self.authority
    }

    /// The universe wrapping the canonical frame.
    pub const fn universe(&self) -> &UniverseState {
        &self.universe
    }

    /// Id of the running lens, if any.
    pub fn active_lens_id(&self) -> Option<&str> {
        self.runtime.as_ref().map(LensRuntime::lens_id)
    }

    /// Clients that joined, sorted.
    pub const fn clients(&self) -> &BTreeSet<String> {
        &self.clients
    }

    /// Latest snapshot tick each client confirmed.
    pub fn seen_tick(&self, client_id: &str) -> Option<u64> {
        self.seen_ticks.get(client_id).copied()
    }

    fn require_client(&self, client_id: &str) -> Result<(), RoomError> {
        if self.clients.contains(client_id) {
            Ok(())
        } else {
            Err(RoomError::UnknownClient {
                room_id: self.room_id,
                client_id: client_id.to_owned(),
            })
        }
    }

    async fn create_runtime(&self, lens_id: &str) -> Result<LensRuntime, RoomError> {
        let plugin = self
            .catalog
            .instantiate(lens_id)
            .ok_or_else(|| RoomError::UnknownLens {
                lens_id: lens_id.to_owned(),
            })?;
        let host = HostContext::new(lens_id, self.settings.limits.deterministic_seed);
        Ok(LensRuntime::create(
            plugin,
            host,
            self.settings.limits,
            &self.settings.requirements,
            &self.settings.timeouts,
        )
        .await?)
    }
}
