//! Shared data model and wire types for the Prism lens host.
//!
//! This crate is the single source of truth for every value that crosses a
//! component boundary: the canonical [`Frame`], the cross-lens
//! [`UniverseState`], client/host messages, and plugin manifests. Wire types
//! flow downstream to `TypeScript` via `ts-rs` for the web client.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for room identifiers
//! - [`value`] -- [`LensValue`], the deterministic value exchanged with lenses
//! - [`frame`] -- Entity and frame snapshots plus the frame wire codec
//! - [`universe`] -- Identity anchors, universe state and delta merging
//! - [`messages`] -- Inbound client messages and outbound host messages
//! - [`manifest`] -- Plugin manifests and host compatibility requirements
//! - [`canonical`] -- Sorted-key JSON serialization and SHA-256 checksums

pub mod canonical;
pub mod frame;
pub mod ids;
pub mod manifest;
pub mod messages;
pub mod universe;
pub mod value;

pub use canonical::{canonical_json, checksum, sha256_hex};
pub use frame::{EntityState, Frame, FrameError, Vec2, decode_frame, encode_frame};
pub use ids::RoomId;
pub use manifest::{
    BudgetBounds, BudgetField, CompatibilityReport, CompatibilityRequirements,
    PLUGIN_API_VERSION, PluginManifest, ResourceBudgets,
};
pub use messages::{
    AckMessage, ClientMessage, HostMessage, InputMessage, LensTransitionMessage,
    SnapshotMessage,
};
pub use universe::{AnchorPatch, DeltaState, IdentityAnchors, UniverseState};
pub use value::{LensValue, ValueError};

#[cfg(test)]
mod tests {
    //! Export test for `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Exporting writes the `.ts` files to `bindings/` relative to the
        // crate root.
        use ts_rs::TS;

        let _ = crate::ids::RoomId::export_all();

        let _ = crate::frame::Vec2::export_all();
        let _ = crate::frame::EntityState::export_all();
        let _ = crate::frame::Frame::export_all();

        let _ = crate::universe::IdentityAnchors::export_all();
        let _ = crate::universe::AnchorPatch::export_all();
        let _ = crate::universe::UniverseState::export_all();
        let _ = crate::universe::DeltaState::export_all();

        let _ = crate::messages::InputMessage::export_all();
        let _ = crate::messages::AckMessage::export_all();
        let _ = crate::messages::SnapshotMessage::export_all();
        let _ = crate::messages::LensTransitionMessage::export_all();
        let _ = crate::messages::ClientMessage::export_all();
        let _ = crate::messages::HostMessage::export_all();

        let _ = crate::manifest::ResourceBudgets::export_all();
        let _ = crate::manifest::PluginManifest::export_all();
    }
}
