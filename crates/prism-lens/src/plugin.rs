//! The lens plugin contract.
//!
//! A lens is a hot-swappable unit of simulation logic. Every lens exposes
//! the same closed lifecycle through [`LensPlugin`]:
//!
//! ```text
//! init -> (decode -> update -> encode)* -> shutdown
//! ```
//!
//! with an optional `render` between frames. Concrete lenses are variants
//! selected by their manifest `lens_id`; the runtime drives all of them
//! through the same code path and never inspects what a lens does inside
//! a phase.
//!
//! Lenses get randomness, time and logging exclusively through the
//! [`HostContext`] handed to them at `init`, so a fixed seed reproduces a
//! run bit for bit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use prism_types::{Frame, LensValue, PluginManifest};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Number of distinct values one 32-bit draw can take.
const DRAW_SPAN: f64 = 4_294_967_296.0;

/// A failure reported by a lens from inside one of its phases.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PluginError {
    /// Description supplied by the lens.
    pub message: String,
}

impl PluginError {
    /// Create a plugin error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Simulated time shared between a lens and the runtime driving it.
///
/// Starts at zero and only moves when the runtime completes a frame, by
/// that frame's step. Clones observe the same clock.
#[derive(Debug, Clone, Default)]
pub struct HostClock {
    bits: Arc<AtomicU64>,
}

impl HostClock {
    /// A clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated milliseconds elapsed.
    pub fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Move the clock forward by `ms`.
    pub fn advance(&self, ms: f64) {
        let next = self.now_ms() + ms;
        self.bits.store(next.to_bits(), Ordering::Release);
    }
}

/// Deterministic host services available to a lens.
///
/// The random stream is ChaCha8 keyed by the little-endian seed, so its
/// output does not depend on the `rand` release in use.
#[derive(Debug, Clone)]
pub struct HostContext {
    seed: u64,
    lens_id: String,
    rng: ChaCha8Rng,
    clock: HostClock,
}

impl HostContext {
    /// A context whose random stream is fully determined by `seed`.
    pub fn new(lens_id: impl Into<String>, seed: u64) -> Self {
        let mut key = [0_u8; 32];
        for (slot, byte) in key.iter_mut().zip(seed.to_le_bytes()) {
            *slot = byte;
        }
        Self {
            seed,
            lens_id: lens_id.into(),
            rng: ChaCha8Rng::from_seed(key),
            clock: HostClock::new(),
        }
    }

    /// The seed this context was created with.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Next value in `[0, 1)` from the seeded stream, in steps of 2^-32.
    pub fn random(&mut self) -> f64 {
        f64::from(self.rng.next_u32()) / DRAW_SPAN
    }

    /// Simulated milliseconds since the lens started.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// A handle on this context's clock.
    pub fn clock(&self) -> HostClock {
        self.clock.clone()
    }

    /// Emit a log line attributed to the lens.
    pub fn log(&self, message: &str) {
        tracing::info!(lens_id = %self.lens_id, "{message}");
    }
}

/// Everything a lens receives at `init`.
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    /// Host services. The lens keeps this for later phases.
    pub host: HostContext,
    /// The manifest the host validated before calling `init`.
    pub manifest: PluginManifest,
}

/// The five-phase lifecycle every lens implements.
///
/// All methods run on the blocking pool under a per-phase timeout, so an
/// implementation may block, but a phase that overruns its budget has its
/// result discarded.
pub trait LensPlugin: Send {
    /// The lens's declared contract.
    fn manifest(&self) -> &PluginManifest;

    /// Prepare the lens. Called exactly once, before any frame.
    fn init(&mut self, ctx: LifecycleContext) -> Result<(), PluginError>;

    /// Turn the canonical frame into the lens's own working state.
    ///
    /// The returned value must be deterministic (no non-finite numbers).
    fn decode(&mut self, frame: &Frame) -> Result<LensValue, PluginError>;

    /// Advance the lens's internal state by `dt` seconds.
    fn update(&mut self, decoded: &LensValue, dt: f64) -> Result<(), PluginError>;

    /// Optional presentation summary. Lenses without one return `None`.
    fn render(&mut self) -> Result<Option<LensValue>, PluginError> {
        Ok(None)
    }

    /// Produce the next canonical frame.
    fn encode(&mut self) -> Result<Frame, PluginError>;

    /// Release resources. Called at most once.
    fn shutdown(&mut self) -> Result<(), PluginError>;
}
