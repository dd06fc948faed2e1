//! Host binary for Prism.
//!
//! Wires configuration, logging, the lobby and the room hosts together and
//! plays one planned run in every room.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `prism-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Plan the run from the configured seed
//! 4. Open rooms in the lobby, seat scripted clients and ready them up
//! 5. Run every room in parallel through the planned lenses
//! 6. Shut the lenses down and log the result

mod callback;
mod error;
mod scripted;

use std::path::Path;
use std::sync::Arc;

use prism_core::config::{HostConfig, LogFormat};
use prism_core::lobby::{Lobby, StartedLens};
use prism_core::room::{RoomHost, RoomSettings};
use prism_core::run_plan::{RunPhase, RunPlan, build_run_plan};
use prism_core::runner::{self, RunSettings};
use prism_lens::TransitionRegistry;
use prism_lens::lenses::LensCatalog;
use prism_types::{Frame, IdentityAnchors};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::callback::{LoggingCallback, TransitionLogger};
use crate::error::EngineError;
use crate::scripted::ScriptedClients;

/// Hit points every room's party starts a run with.
const STARTING_HP: f64 = 100.0;

/// Ticks between progress summaries.
const PROGRESS_EVERY: u64 = 20;

/// What one room did over the run.
#[derive(Debug)]
struct RoomOutcome {
    name: String,
    final_tick: u64,
    lens_failures: u64,
    failed_ticks: u64,
    applied_inputs: usize,
    acks: u64,
    snapshots: u64,
}

/// Application entry point for the host.
///
/// # Errors
///
/// Returns an error if configuration, planning, the lobby or any room fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config)?;
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        rooms = config.world.rooms,
        tick_interval_ms = config.world.tick_interval_ms,
        "prism-engine starting"
    );

    // 3. Plan the run.
    let catalog = Arc::new(LensCatalog::standard());
    let plan = Arc::new(build_run_plan(
        config.world.seed,
        config.run.lens_target_duration_ms,
        &catalog,
    )?);
    for planned in plan.lenses() {
        info!(
            run_id = plan.run_id,
            lens_id = planned.lens_id,
            genre = %planned.genre,
            mutators = ?planned.mutators,
            target_duration_ms = planned.target_duration_ms,
            "Lens planned"
        );
    }
    info!(phase = %RunPhase::Lobby, run_id = plan.run_id, seed = plan.seed, "Run phase");

    // 4. Open rooms and ready everyone up.
    let mut lobby = Lobby::new();
    let mut starts = Vec::new();
    for room_index in 0..config.world.rooms {
        starts.push(open_room(&mut lobby, &plan, room_index, config.world.clients_per_room)?);
    }

    // 5. Run every room in parallel.
    let registry = Arc::new(TransitionRegistry::new());
    let settings = RoomSettings {
        limits: config.runtime_limits(),
        requirements: config.requirements(),
        timeouts: config.runtime.timeouts,
    };
    let run_settings = RunSettings {
        tick_interval_ms: config.world.tick_interval_ms,
        max_ticks: config.world.max_ticks,
    };

    let mut tasks = Vec::new();
    for (room_index, started) in starts.into_iter().enumerate() {
        let name = lobby
            .room(started.room_id)
            .map_or_else(|| started.room_id.to_string(), |room| room.name.clone());
        let seed = config.world.seed.wrapping_add(u64::try_from(room_index).unwrap_or(u64::MAX));
        tasks.push(tokio::spawn(run_room_session(
            name,
            started,
            Arc::clone(&plan),
            Arc::clone(&catalog),
            Arc::clone(&registry),
            settings.clone(),
            run_settings,
            seed,
        )));
    }

    let mut outcomes = Vec::new();
    for joined in futures::future::join_all(tasks).await {
        let outcome = joined.map_err(|e| EngineError::Task {
            message: e.to_string(),
        })??;
        outcomes.push(outcome);
    }

    // 6. Log results.
    info!(phase = %RunPhase::RunEnd, run_id = plan.run_id, "Run phase");
    for outcome in &outcomes {
        info!(
            room = outcome.name,
            final_tick = outcome.final_tick,
            lens_failures = outcome.lens_failures,
            failed_ticks = outcome.failed_ticks,
            applied_inputs = outcome.applied_inputs,
            acks = outcome.acks,
            snapshots = outcome.snapshots,
            "Room finished"
        );
    }
    info!(rooms = outcomes.len(), "prism-engine shutdown complete");
    Ok(())
}

/// Load configuration from `prism-config.yaml` in the working directory.
fn load_config() -> Result<HostConfig, EngineError> {
    let config_path = Path::new("prism-config.yaml");
    if config_path.exists() {
        Ok(HostConfig::from_file(config_path)?)
    } else {
        let mut config = HostConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_logging(config: &HostConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}

/// Create a room, seat its clients, ready them and start the first lens.
fn open_room(
    lobby: &mut Lobby,
    plan: &RunPlan,
    room_index: u32,
    clients: u32,
) -> Result<StartedLens, EngineError> {
    let room_id = lobby.create_room(format!("room-{room_index}"));
    for client_index in 0..clients {
        let client_id = format!("r{room_index}-p{client_index}");
        lobby.join_room(room_id, &client_id)?;
        lobby.set_ready(room_id, &client_id, true)?;
    }
    let first = plan
        .lenses()
        .next()
        .map_or(plan.boss_lens.lens_id.as_str(), |planned| planned.lens_id.as_str());
    Ok(lobby.start_lens(room_id, first)?)
}

/// Play the whole plan in one room.
#[allow(clippy::too_many_arguments)]
async fn run_room_session(
    name: String,
    started: StartedLens,
    plan: Arc<RunPlan>,
    catalog: Arc<LensCatalog>,
    registry: Arc<TransitionRegistry>,
    settings: RoomSettings,
    run_settings: RunSettings,
    seed: u64,
) -> Result<RoomOutcome, EngineError> {
    let anchors = IdentityAnchors {
        hp: STARTING_HP,
        ..IdentityAnchors::default()
    };
    let mut room = RoomHost::new(
        started.room_id,
        Frame::empty(0),
        anchors,
        catalog,
        registry,
        settings,
    )?;
    room.add_observer(Box::new(TransitionLogger));
    room.start_lens(&started.lens_id).await?;

    let mut clients = ScriptedClients::new(seed, started.members);
    let mut callback = LoggingCallback::new(PROGRESS_EVERY);
    let mut lens_failures = 0_u64;
    let mut failed_ticks = 0_u64;

    info!(phase = %RunPhase::LensSequence, room = name, "Run phase");
    for (index, planned) in plan.lenses().enumerate() {
        if index == plan.lens_sequence.len() {
            info!(phase = %RunPhase::BossLens, room = name, "Run phase");
        }
        if room.active_lens_id() != Some(planned.lens_id.as_str()) {
            room.transition_lens(&planned.lens_id).await?;
        }
        let result = runner::run_room(&mut room, run_settings, &mut clients, &mut callback).await?;
        lens_failures = lens_failures.saturating_add(result.lens_failures);
        failed_ticks = failed_ticks.saturating_add(result.failed_ticks);
        if result.rejected_messages > 0 {
            warn!(room = name, rejected = result.rejected_messages, "Room dropped messages");
        }
    }

    let final_tick = room.authority().host_tick();
    if let Err(e) = room.shutdown().await {
        warn!(room = name, error = %e, "Lens shutdown failed");
    }
    Ok(RoomOutcome {
        name,
        final_tick,
        lens_failures,
        failed_ticks,
        applied_inputs: callback.applied_inputs(),
        acks: clients.acks(),
        snapshots: clients.snapshots(),
    })
}
