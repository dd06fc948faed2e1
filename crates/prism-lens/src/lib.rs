//! Lens plugin contract, sandboxed runtime and transition protocol.
//!
//! A lens is a hot-swappable unit of simulation logic. This crate defines
//! what a lens must implement, decides whether the host will run it, runs
//! it under per-phase time budgets, and moves universe state between lenses
//! without losing identity data.
//!
//! # Modules
//!
//! - [`plugin`] -- The [`LensPlugin`] lifecycle trait and [`HostContext`].
//! - [`compat`] -- Manifest compatibility checker.
//! - [`runtime`] -- [`LensRuntime`]: compatibility gate, timeouts, lifecycle.
//! - [`transition`] -- Universe hand-over between lenses.
//! - [`lenses`] -- Built-in lenses and the [`LensCatalog`].
//!
//! [`LensPlugin`]: plugin::LensPlugin
//! [`HostContext`]: plugin::HostContext
//! [`LensRuntime`]: runtime::LensRuntime
//! [`LensCatalog`]: lenses::LensCatalog

pub mod compat;
pub mod lenses;
pub mod plugin;
pub mod runtime;
pub mod transition;

pub use plugin::{HostClock, HostContext, LensPlugin, LifecycleContext, PluginError};
pub use runtime::{
    LensError, LensRuntime, LifecycleState, Phase, PhaseTimeouts, RuntimeLimits, TimeoutOverrides,
};
pub use transition::{
    DecodedLensState, TransitionContext, TransitionRegistry, TransitionResult,
    compute_lens_transition_context, transition_lens,
};
