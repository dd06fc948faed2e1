//! Built-in lenses and the catalog that instantiates them by id.
//!
//! - [`EchoLens`] -- passes frames through unchanged. Every gameplay lens in
//!   the catalog is an echo variant with its own manifest until it grows
//!   real rules.
//! - [`JitterLens`] -- nudges every entity by a seeded random step. Used by
//!   the replay harness to exercise the host's random stream.

mod catalog;
mod echo;
mod jitter;

pub use catalog::{CatalogEntry, Genre, LensCatalog, LensKind, standard_manifest};
pub use echo::EchoLens;
pub use jitter::JitterLens;
