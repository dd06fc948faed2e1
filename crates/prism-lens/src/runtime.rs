//! The lens runtime: budgets, timeouts and lifecycle enforcement.
//!
//! [`LensRuntime::create`] gates a plugin through the compatibility checker
//! and the host heap limit before `init` ever runs. Afterwards
//! [`LensRuntime::run_frame`] drives one `decode -> update -> encode` pass.
//!
//! Every phase runs on tokio's blocking pool under its own
//! [`tokio::time::timeout`]. A phase that overruns is abandoned: its result
//! is discarded and the call fails with [`LensError::Timeout`], but the
//! worker thread is not killed. The caller keeps its previous frame and may
//! retry on the next tick.
//!
//! `max_frame_ms` is checked after all three phases complete. It reports a
//! slow frame in aggregate; it does not interrupt one.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use prism_types::{
    CompatibilityRequirements, Frame, FrameError, LensValue, PluginManifest, ResourceBudgets,
    ValueError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compat;
use crate::plugin::{HostClock, HostContext, LensPlugin, LifecycleContext, PluginError};

/// Default `init` timeout in milliseconds.
pub const DEFAULT_INIT_MS: u64 = 100;
/// Default timeout for `decode`, `update`, `render` and `encode`.
pub const DEFAULT_PHASE_MS: u64 = 8;
/// Default `shutdown` timeout in milliseconds.
pub const DEFAULT_SHUTDOWN_MS: u64 = 50;
/// Default simulation step in seconds.
pub const DEFAULT_STEP_DT: f64 = 1.0 / 60.0;

/// A lifecycle phase, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `init`.
    Init,
    /// `decode`.
    Decode,
    /// `update`.
    Update,
    /// `render`.
    Render,
    /// `encode`.
    Encode,
    /// `shutdown`.
    Shutdown,
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Decode => "decode",
            Self::Update => "update",
            Self::Render => "render",
            Self::Encode => "encode",
            Self::Shutdown => "shutdown",
        })
    }
}

/// Where the runtime is in the lens lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed; `init` has not completed.
    Created,
    /// `init` succeeded; frames may run.
    Initialized,
    /// `shutdown` was called. Terminal.
    ShutDown,
}

impl core::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::ShutDown => "shut down",
        })
    }
}

/// Errors raised by the lens runtime.
#[derive(Debug, thiserror::Error)]
pub enum LensError {
    /// The manifest failed the compatibility gate. `init` was not called.
    #[error("manifest compatibility check failed for {lens_id}: {}", .errors.join("; "))]
    Incompatible {
        /// Lens that was rejected.
        lens_id: String,
        /// Every violation found.
        errors: Vec<String>,
    },

    /// The configured step is `NaN`, infinite or negative.
    #[error("dt must be a non-negative finite number, got {dt}")]
    InvalidStep {
        /// The rejected step.
        dt: f64,
    },

    /// A phase overran its budget.
    #[error("{phase} exceeded timeout ({budget_ms}ms)")]
    Timeout {
        /// The phase that overran.
        phase: Phase,
        /// The budget it was given.
        budget_ms: u64,
    },

    /// `decode` or `render` returned a value that is not deterministic.
    #[error("{phase} returned a non-deterministic value: {source}")]
    NonDeterministic {
        /// The offending phase.
        phase: Phase,
        /// Where the value went wrong.
        source: ValueError,
    },

    /// `encode` returned a frame that violates the data model.
    #[error("encode returned an invalid frame: {source}")]
    InvalidFrame {
        /// The frame violation.
        #[from]
        source: FrameError,
    },

    /// The lens reported a failure from inside a phase.
    #[error("{phase} failed: {source}")]
    Plugin {
        /// The failing phase.
        phase: Phase,
        /// What the lens reported.
        source: PluginError,
    },

    /// The lens panicked during a phase, now or earlier.
    #[error("lens panicked during {phase}")]
    Panicked {
        /// The phase that observed the panic.
        phase: Phase,
    },

    /// An operation was attempted in the wrong lifecycle state.
    #[error("cannot {operation} while runtime is {state}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// The state the runtime was in.
        state: LifecycleState,
    },

    /// The frame completed but took longer than `max_frame_ms` overall.
    #[error("lens exceeded frame budget: {elapsed_ms:.2}ms (limit {budget_ms}ms)")]
    FrameBudgetExceeded {
        /// Wall-clock time spent in the frame.
        elapsed_ms: f64,
        /// The configured ceiling.
        budget_ms: u64,
    },
}

/// Resolved per-phase timeouts in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimeouts {
    /// `init` timeout.
    pub init_ms: u64,
    /// `decode` timeout.
    pub decode_ms: u64,
    /// `update` timeout.
    pub update_ms: u64,
    /// `render` timeout.
    pub render_ms: u64,
    /// `encode` timeout.
    pub encode_ms: u64,
    /// `shutdown` timeout.
    pub shutdown_ms: u64,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            init_ms: DEFAULT_INIT_MS,
            decode_ms: DEFAULT_PHASE_MS,
            update_ms: DEFAULT_PHASE_MS,
            render_ms: DEFAULT_PHASE_MS,
            encode_ms: DEFAULT_PHASE_MS,
            shutdown_ms: DEFAULT_SHUTDOWN_MS,
        }
    }
}

impl PhaseTimeouts {
    /// Resolve timeouts for a lens.
    ///
    /// `decode`, `update` and `encode` come from the manifest's budgets;
    /// the others from the defaults. Any caller override wins.
    pub fn resolve(budgets: &ResourceBudgets, overrides: &TimeoutOverrides) -> Self {
        let defaults = Self::default();
        Self {
            init_ms: overrides.init_ms.unwrap_or(defaults.init_ms),
            decode_ms: overrides.decode_ms.unwrap_or(budgets.max_decode_ms),
            update_ms: overrides.update_ms.unwrap_or(budgets.max_update_ms),
            render_ms: overrides.render_ms.unwrap_or(defaults.render_ms),
            encode_ms: overrides.encode_ms.unwrap_or(budgets.max_encode_ms),
            shutdown_ms: overrides.shutdown_ms.unwrap_or(defaults.shutdown_ms),
        }
    }
}

/// Caller-supplied timeout overrides. Unset fields fall back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutOverrides {
    /// Override for `init`.
    pub init_ms: Option<u64>,
    /// Override for `decode`.
    pub decode_ms: Option<u64>,
    /// Override for `update`.
    pub update_ms: Option<u64>,
    /// Override for `render`.
    pub render_ms: Option<u64>,
    /// Override for `encode`.
    pub encode_ms: Option<u64>,
    /// Override for `shutdown`.
    pub shutdown_ms: Option<u64>,
}

/// Host-side ceilings for one runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeLimits {
    /// Aggregate wall-clock ceiling for one `run_frame`, checked afterwards.
    pub max_frame_ms: u64,
    /// Largest `maxHeapMb` a manifest may declare.
    pub max_heap_mb: u64,
    /// Seed for the lens's [`HostContext`].
    pub deterministic_seed: u64,
    /// Seconds passed to `update` on every frame.
    pub dt: f64,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_frame_ms: 50,
            max_heap_mb: 64,
            deterministic_seed: 42,
            dt: DEFAULT_STEP_DT,
        }
    }
}

type SharedPlugin = Arc<Mutex<Box<dyn LensPlugin>>>;

/// Drives one lens through its lifecycle.
pub struct LensRuntime {
    plugin: SharedPlugin,
    manifest: PluginManifest,
    limits: RuntimeLimits,
    timeouts: PhaseTimeouts,
    state: LifecycleState,
    clock: HostClock,
}

impl core::fmt::Debug for LensRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LensRuntime")
            .field("lens_id", &self.manifest.lens_id)
            .field("limits", &self.limits)
            .field("timeouts", &self.timeouts)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl LensRuntime {
    /// Validate a plugin and run its `init`.
    ///
    /// Fails with [`LensError::Incompatible`] before any lifecycle method is
    /// called if the manifest does not satisfy `requirements` or declares
    /// more heap than `limits.max_heap_mb`.
    pub async fn create(
        plugin: Box<dyn LensPlugin>,
        host: HostContext,
        limits: RuntimeLimits,
        requirements: &CompatibilityRequirements,
        overrides: &TimeoutOverrides,
    ) -> Result<Self, LensError> {
        let manifest = plugin.manifest().clone();

        let mut errors = compat::check(&manifest, requirements).errors;
        if manifest.resource_budgets.max_heap_mb > limits.max_heap_mb {
            errors.push(format!(
                "resourceBudgets.maxHeapMb ({}) exceeds host limit ({})",
                manifest.resource_budgets.max_heap_mb, limits.max_heap_mb
            ));
        }
        if !errors.is_empty() {
            warn!(
                lens_id = %manifest.lens_id,
                violations = errors.len(),
                "Rejected incompatible lens"
            );
            return Err(LensError::Incompatible {
                lens_id: manifest.lens_id,
                errors,
            });
        }

        if !limits.dt.is_finite() || limits.dt < 0.0 {
            return Err(LensError::InvalidStep { dt: limits.dt });
        }

        let timeouts = PhaseTimeouts::resolve(&manifest.resource_budgets, overrides);
        let mut runtime = Self {
            plugin: Arc::new(Mutex::new(plugin)),
            manifest,
            limits,
            timeouts,
            state: LifecycleState::Created,
            clock: host.clock(),
        };

        let ctx = LifecycleContext {
            host,
            manifest: runtime.manifest.clone(),
        };
        run_phase(&runtime.plugin, Phase::Init, timeouts.init_ms, move |p| {
            p.init(ctx)
        })
        .await?;
        runtime.state = LifecycleState::Initialized;

        info!(
            lens_id = %runtime.manifest.lens_id,
            seed = limits.deterministic_seed,
            max_frame_ms = limits.max_frame_ms,
            "Lens initialized"
        );
        Ok(runtime)
    }

    /// Run `decode -> update -> encode` on `frame` and return the new frame.
    ///
    /// The input frame is never modified. On any error the caller should
    /// keep its previous canonical frame.
    pub async fn run_frame(&mut self, frame: &Frame) -> Result<Frame, LensError> {
        self.require_initialized("run a frame")?;
        let start = Instant::now();

        let input = frame.clone();
        let decoded = run_phase(
            &self.plugin,
            Phase::Decode,
            self.timeouts.decode_ms,
            move |p| p.decode(&input),
        )
        .await?;
        decoded
            .validate()
            .map_err(|source| LensError::NonDeterministic {
                phase: Phase::Decode,
                source,
            })?;

        let dt = self.limits.dt;
        run_phase(
            &self.plugin,
            Phase::Update,
            self.timeouts.update_ms,
            move |p| p.update(&decoded, dt),
        )
        .await?;

        let encoded = run_phase(
            &self.plugin,
            Phase::Encode,
            self.timeouts.encode_ms,
            |p| p.encode(),
        )
        .await?;
        let next = encoded.into_validated()?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if elapsed_ms > duration_ms(self.limits.max_frame_ms) {
            warn!(
                lens_id = %self.manifest.lens_id,
                elapsed_ms,
                budget_ms = self.limits.max_frame_ms,
                "Lens exceeded frame budget"
            );
            return Err(LensError::FrameBudgetExceeded {
                elapsed_ms,
                budget_ms: self.limits.max_frame_ms,
            });
        }

        self.clock.advance(self.limits.dt * 1000.0);
        debug!(
            lens_id = %self.manifest.lens_id,
            tick = next.tick,
            entities = next.len(),
            elapsed_ms,
            "Frame complete"
        );
        Ok(next)
    }

    /// Run the optional `render` phase.
    pub async fn render(&mut self) -> Result<Option<LensValue>, LensError> {
        self.require_initialized("render")?;
        let rendered = run_phase(
            &self.plugin,
            Phase::Render,
            self.timeouts.render_ms,
            |p| p.render(),
        )
        .await?;
        if let Some(value) = &rendered {
            value
                .validate()
                .map_err(|source| LensError::NonDeterministic {
                    phase: Phase::Render,
                    source,
                })?;
        }
        Ok(rendered)
    }

    /// Tear the lens down. The runtime is unusable afterwards even if the
    /// lens reports a failure.
    pub async fn shutdown(&mut self) -> Result<(), LensError> {
        if self.state == LifecycleState::ShutDown {
            return Err(LensError::InvalidState {
                operation: "shut down",
                state: self.state,
            });
        }
        self.state = LifecycleState::ShutDown;

        let result = run_phase(
            &self.plugin,
            Phase::Shutdown,
            self.timeouts.shutdown_ms,
            |p| p.shutdown(),
        )
        .await;
        match &result {
            Ok(()) => info!(lens_id = %self.manifest.lens_id, "Lens shut down"),
            Err(e) => warn!(lens_id = %self.manifest.lens_id, error = %e, "Lens shutdown failed"),
        }
        result
    }

    /// The validated manifest.
    pub const fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Id of the running lens.
    pub fn lens_id(&self) -> &str {
        &self.manifest.lens_id
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// The resolved phase timeouts.
    pub const fn timeouts(&self) -> &PhaseTimeouts {
        &self.timeouts
    }

    /// Simulated milliseconds the lens has seen: completed frames times `dt`.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// The host limits this runtime enforces.
    pub const fn limits(&self) -> &RuntimeLimits {
        &self.limits
    }

    const fn require_initialized(&self, operation: &'static str) -> Result<(), LensError> {
        match self.state {
            LifecycleState::Initialized => Ok(()),
            state => Err(LensError::InvalidState { operation, state }),
        }
    }
}

fn duration_ms(ms: u64) -> f64 {
    Duration::from_millis(ms).as_secs_f64() * 1000.0
}

/// Run one phase on the blocking pool under `budget_ms`.
async fn run_phase<T, F>(
    plugin: &SharedPlugin,
    phase: Phase,
    budget_ms: u64,
    op: F,
) -> Result<T, LensError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn LensPlugin) -> Result<T, PluginError> + Send + 'static,
{
    let plugin = Arc::clone(plugin);
    let task = tokio::task::spawn_blocking(move || {
        let mut guard = plugin
            .lock()
            .map_err(|_poisoned| LensError::Panicked { phase })?;
        op(guard.as_mut()).map_err(|source| LensError::Plugin { phase, source })
    });

    match tokio::time::timeout(Duration::from_millis(budget_ms), task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            warn!(%phase, error = %join_error, "Lens phase panicked");
            Err(LensError::Panicked { phase })
        }
        Err(_elapsed) => {
            warn!(%phase, budget_ms, "Lens phase timed out");
            Err(LensError::Timeout { phase, budget_ms })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use prism_types::{EntityState, PLUGIN_API_VERSION, Vec2};

    use super::*;
    use crate::lenses::EchoLens;

    fn manifest(lens_id: &str, api_version: &str) -> PluginManifest {
        PluginManifest {
            api_version: api_version.to_owned(),
            lens_id: lens_id.to_owned(),
            capabilities: BTreeSet::new(),
            resource_budgets: ResourceBudgets {
                max_update_ms: 200,
                max_decode_ms: 200,
                max_encode_ms: 200,
                max_heap_mb: 32,
            },
        }
    }

    fn frame() -> Frame {
        Frame::new(
            1,
            vec![EntityState {
                id: "p1".to_owned(),
                kind: "player".to_owned(),
                position: Vec2::new(1.0, 1.0),
                tick: 1,
            }],
        )
        .unwrap()
    }

    fn limits() -> RuntimeLimits {
        RuntimeLimits {
            max_frame_ms: 1_000,
            ..RuntimeLimits::default()
        }
    }

    /// Configurable misbehaving lens.
    struct ScriptedLens {
        manifest: PluginManifest,
        inits: Arc<AtomicUsize>,
        decoded: LensValue,
        init_sleep: Duration,
        update_sleep: Duration,
        rendered: Option<LensValue>,
        encoded: Option<Frame>,
    }

    impl ScriptedLens {
        fn new(manifest: PluginManifest, inits: &Arc<AtomicUsize>) -> Self {
            Self {
                manifest,
                inits: Arc::clone(inits),
                decoded: LensValue::Null,
                init_sleep: Duration::ZERO,
                update_sleep: Duration::ZERO,
                rendered: None,
                encoded: None,
            }
        }
    }

    impl LensPlugin for ScriptedLens {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }
        fn init(&mut self, _ctx: LifecycleContext) -> Result<(), PluginError> {
            std::thread::sleep(self.init_sleep);
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn decode(&mut self, frame: &Frame) -> Result<LensValue, PluginError> {
            if self.encoded.is_none() {
                self.encoded = Some(frame.clone());
            }
            Ok(self.decoded.clone())
        }
        fn update(&mut self, _decoded: &LensValue, _dt: f64) -> Result<(), PluginError> {
            std::thread::sleep(self.update_sleep);
            Ok(())
        }
        fn render(&mut self) -> Result<Option<LensValue>, PluginError> {
            Ok(self.rendered.clone())
        }
        fn encode(&mut self) -> Result<Frame, PluginError> {
            self.encoded
                .clone()
                .ok_or_else(|| PluginError::new("nothing decoded"))
        }
        fn shutdown(&mut self) -> Result<(), PluginError> {
            Err(PluginError::new("teardown failed"))
        }
    }

    async fn create(plugin: Box<dyn LensPlugin>) -> Result<LensRuntime, LensError> {
        LensRuntime::create(
            plugin,
            HostContext::new("test", 7),
            limits(),
            &CompatibilityRequirements::default(),
            &TimeoutOverrides::default(),
        )
        .await
    }

    #[tokio::test]
    async fn incompatible_manifest_never_runs_init() {
        let inits = Arc::new(AtomicUsize::new(0));
        let lens = ScriptedLens::new(manifest("lens/old", "0.9.0"), &inits);

        let err = create(Box::new(lens)).await.unwrap_err();
        assert!(matches!(
            &err,
            LensError::Incompatible { errors, .. }
                if errors == &["apiVersion mismatch: expected 1.0.0, got 0.9.0"]
        ));
        assert_eq!(inits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn heap_above_host_limit_is_rejected() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut m = manifest("lens/greedy", PLUGIN_API_VERSION);
        m.resource_budgets.max_heap_mb = 512;
        let err = create(Box::new(ScriptedLens::new(m, &inits))).await.unwrap_err();
        assert!(err.to_string().contains("exceeds host limit (64)"));
        assert_eq!(inits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_step_is_rejected() {
        let inits = Arc::new(AtomicUsize::new(0));
        let lens = ScriptedLens::new(manifest("lens/x", PLUGIN_API_VERSION), &inits);
        let err = LensRuntime::create(
            Box::new(lens),
            HostContext::new("lens/x", 0),
            RuntimeLimits {
                dt: -1.0,
                ..limits()
            },
            &CompatibilityRequirements::default(),
            &TimeoutOverrides::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LensError::InvalidStep { .. }));
    }

    #[tokio::test]
    async fn echo_lens_round_trips_frame() {
        let mut runtime = create(Box::new(EchoLens::new(manifest(
            "lens/echo",
            PLUGIN_API_VERSION,
        ))))
        .await
        .unwrap();
        assert_eq!(runtime.state(), LifecycleState::Initialized);

        let input = frame();
        let output = runtime.run_frame(&input).await.unwrap();
        assert_eq!(output, input);

        let rendered = runtime.render().await.unwrap();
        assert_eq!(rendered.unwrap().get("status").and_then(LensValue::as_str), Some("ok"));
    }

    #[tokio::test]
    async fn non_finite_decode_output_is_a_contract_violation() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut lens = ScriptedLens::new(manifest("lens/nan", PLUGIN_API_VERSION), &inits);
        lens.decoded = LensValue::map([("speed", LensValue::Number(f64::INFINITY))]);
        let mut runtime = create(Box::new(lens)).await.unwrap();

        let err = runtime.run_frame(&frame()).await.unwrap_err();
        assert!(matches!(
            err,
            LensError::NonDeterministic {
                phase: Phase::Decode,
                ..
            }
        ));
        assert!(err.to_string().contains("$.speed"));
    }

    #[tokio::test]
    async fn non_finite_render_output_fails_the_call() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut lens = ScriptedLens::new(manifest("lens/glitch", PLUGIN_API_VERSION), &inits);
        lens.rendered = Some(LensValue::map([("fps", LensValue::Number(f64::NAN))]));
        let mut runtime = create(Box::new(lens)).await.unwrap();

        let err = runtime.render().await.unwrap_err();
        assert!(matches!(
            err,
            LensError::NonDeterministic {
                phase: Phase::Render,
                ..
            }
        ));
        assert_eq!(runtime.state(), LifecycleState::Initialized);
    }

    #[tokio::test]
    async fn slow_init_fails_creation() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut lens = ScriptedLens::new(manifest("lens/drowsy", PLUGIN_API_VERSION), &inits);
        lens.init_sleep = Duration::from_millis(200);
        let err = LensRuntime::create(
            Box::new(lens),
            HostContext::new("lens/drowsy", 0),
            limits(),
            &CompatibilityRequirements::default(),
            &TimeoutOverrides {
                init_ms: Some(10),
                ..TimeoutOverrides::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            LensError::Timeout {
                phase: Phase::Init,
                budget_ms: 10
            }
        ));
    }

    #[tokio::test]
    async fn clock_advances_one_step_per_completed_frame() {
        let mut runtime = create(Box::new(EchoLens::new(manifest(
            "lens/echo",
            PLUGIN_API_VERSION,
        ))))
        .await
        .unwrap();
        assert!(runtime.now_ms().abs() < f64::EPSILON);

        runtime.run_frame(&frame()).await.unwrap();
        runtime.run_frame(&frame()).await.unwrap();
        let expected = 2.0 * DEFAULT_STEP_DT * 1000.0;
        assert!((runtime.now_ms() - expected).abs() < 1e-9);

        let inits = Arc::new(AtomicUsize::new(0));
        let mut lens = ScriptedLens::new(manifest("lens/nan", PLUGIN_API_VERSION), &inits);
        lens.decoded = LensValue::Number(f64::NAN);
        let mut failing = create(Box::new(lens)).await.unwrap();
        assert!(failing.run_frame(&frame()).await.is_err());
        assert!(failing.now_ms().abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn slow_update_times_out() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut lens = ScriptedLens::new(manifest("lens/slow", PLUGIN_API_VERSION), &inits);
        lens.update_sleep = Duration::from_millis(300);
        let mut runtime = LensRuntime::create(
            Box::new(lens),
            HostContext::new("lens/slow", 0),
            limits(),
            &CompatibilityRequirements::default(),
            &TimeoutOverrides {
                update_ms: Some(20),
                ..TimeoutOverrides::default()
            },
        )
        .await
        .unwrap();

        let err = runtime.run_frame(&frame()).await.unwrap_err();
        assert!(matches!(
            err,
            LensError::Timeout {
                phase: Phase::Update,
                budget_ms: 20
            }
        ));
        assert_eq!(err.to_string(), "update exceeded timeout (20ms)");
        // A timeout does not end the lifecycle.
        assert_eq!(runtime.state(), LifecycleState::Initialized);
    }

    #[tokio::test]
    async fn frame_budget_is_checked_after_the_fact() {
        let inits = Arc::new(AtomicUsize::new(0));
        let mut lens = ScriptedLens::new(manifest("lens/sluggish", PLUGIN_API_VERSION), &inits);
        lens.update_sleep = Duration::from_millis(30);
        let mut runtime = LensRuntime::create(
            Box::new(lens),
            HostContext::new("lens/sluggish", 0),
            RuntimeLimits {
                max_frame_ms: 5,
                ..limits()
            },
            &CompatibilityRequirements::default(),
            &TimeoutOverrides::default(),
        )
        .await
        .unwrap();

        let err = runtime.run_frame(&frame()).await.unwrap_err();
        assert!(matches!(err, LensError::FrameBudgetExceeded { budget_ms: 5, .. }));
    }

    #[tokio::test]
    async fn no_frames_after_shutdown() {
        let inits = Arc::new(AtomicUsize::new(0));
        let lens = ScriptedLens::new(manifest("lens/x", PLUGIN_API_VERSION), &inits);
        let mut runtime = create(Box::new(lens)).await.unwrap();

        // The lens reports a teardown failure; the runtime still ends.
        let err = runtime.shutdown().await.unwrap_err();
        assert!(matches!(err, LensError::Plugin { phase: Phase::Shutdown, .. }));
        assert_eq!(runtime.state(), LifecycleState::ShutDown);

        let err = runtime.run_frame(&frame()).await.unwrap_err();
        assert!(matches!(err, LensError::InvalidState { .. }));
        assert!(matches!(
            runtime.shutdown().await,
            Err(LensError::InvalidState { .. })
        ));
    }

    #[test]
    fn timeouts_resolve_from_budgets_then_overrides() {
        let budgets = ResourceBudgets {
            max_update_ms: 4,
            max_decode_ms: 5,
            max_encode_ms: 6,
            max_heap_mb: 1,
        };
        let resolved = PhaseTimeouts::resolve(
            &budgets,
            &TimeoutOverrides {
                encode_ms: Some(9),
                ..TimeoutOverrides::default()
            },
        );
        assert_eq!(resolved.init_ms, DEFAULT_INIT_MS);
        assert_eq!(resolved.decode_ms, 5);
        assert_eq!(resolved.update_ms, 4);
        assert_eq!(resolved.encode_ms, 9);
        assert_eq!(resolved.render_ms, DEFAULT_PHASE_MS);
        assert_eq!(resolved.shutdown_ms, DEFAULT_SHUTDOWN_MS);
    }
}
