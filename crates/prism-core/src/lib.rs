//! Authoritative room state, lobby, tick loop and run planning.
//!
//! This crate owns everything that happens inside a room: the single-writer
//! reconciliation of client input, dispatch of inbound messages, per-tick
//! lens execution, lens swaps, and the deterministic replay harness that
//! checks the whole pipeline.
//!
//! # Modules
//!
//! - [`authority`] -- [`AuthoritativeState`]: input buffering, acks and
//!   ordered reconciliation into the canonical frame.
//! - [`lobby`] -- Rooms, members and ready checks.
//! - [`room`] -- [`RoomHost`]: message dispatch, ticking and lens transitions.
//! - [`runner`] -- The bounded async tick loop and its [`InputSource`] and
//!   [`TickCallback`] seams.
//! - [`run_plan`] -- Seeded lens sequence and mutator selection for a run.
//! - [`replay`] -- Deterministic replay of recorded input.
//! - [`config`] -- Configuration loading from `prism-config.yaml`.
//!
//! [`AuthoritativeState`]: authority::AuthoritativeState
//! [`RoomHost`]: room::RoomHost
//! [`InputSource`]: runner::InputSource
//! [`TickCallback`]: runner::TickCallback

pub mod authority;
pub mod config;
pub mod lobby;
pub mod replay;
pub mod room;
pub mod run_plan;
pub mod runner;
