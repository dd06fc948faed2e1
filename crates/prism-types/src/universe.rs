//! Universe state: the frame plus everything that must outlive a lens.
//!
//! A [`UniverseState`] wraps the canonical [`Frame`] with the party's
//! [`IdentityAnchors`] (health, inventory, relics, story flags) and the
//! opaque per-lens state and outcomes recorded so far. It changes in exactly
//! two ways: per-tick frame replacement ([`UniverseState::with_frame`]) and
//! delta merging ([`UniverseState::apply_delta`]) during a lens transition.
//!
//! Delta merging is a partial update. Fields a [`DeltaState`] leaves out are
//! untouched, and the keyed maps (`flags`, `lens_states`, `lens_outcomes`)
//! are merged key by key instead of being replaced wholesale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::frame::Frame;
use crate::value::LensValue;

/// Identity data that must survive every lens transition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct IdentityAnchors {
    /// Hit points.
    pub hp: f64,
    /// Carried items. A set; see [`canonicalized`](Self::canonicalized).
    #[serde(default)]
    pub inventory: Vec<String>,
    /// Collected relics. A set; see [`canonicalized`](Self::canonicalized).
    #[serde(default)]
    pub relics: Vec<String>,
    /// Story flags, sorted by key.
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl IdentityAnchors {
    /// The canonical form: inventory and relics deduplicated and sorted.
    ///
    /// Flags are a [`BTreeMap`] and therefore already sorted.
    #[must_use]
    pub fn canonicalized(&self) -> Self {
        Self {
            hp: self.hp,
            inventory: sorted_set(&self.inventory),
            relics: sorted_set(&self.relics),
            flags: self.flags.clone(),
        }
    }

    /// Apply a partial patch, merging flags key by key.
    #[must_use]
    pub fn patched(&self, patch: &AnchorPatch) -> Self {
        let mut flags = self.flags.clone();
        flags.extend(patch.flags.iter().map(|(k, v)| (k.clone(), *v)));
        Self {
            hp: patch.hp.unwrap_or(self.hp),
            inventory: patch
                .inventory
                .clone()
                .unwrap_or_else(|| self.inventory.clone()),
            relics: patch.relics.clone().unwrap_or_else(|| self.relics.clone()),
            flags,
        }
    }
}

fn sorted_set(items: &[String]) -> Vec<String> {
    let mut out = items.to_vec();
    out.sort();
    out.dedup();
    out
}

/// A partial update to [`IdentityAnchors`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct AnchorPatch {
    /// Replacement hit points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<f64>,
    /// Replacement inventory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Vec<String>>,
    /// Replacement relics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relics: Option<Vec<String>>,
    /// Flags to set; other flags are kept.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, bool>,
}

impl From<IdentityAnchors> for AnchorPatch {
    fn from(anchors: IdentityAnchors) -> Self {
        Self {
            hp: Some(anchors.hp),
            inventory: Some(anchors.inventory),
            relics: Some(anchors.relics),
            flags: anchors.flags,
        }
    }
}

/// The host-owned state spanning every lens of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct UniverseState {
    /// Host tick.
    pub tick: u64,
    /// Id of the lens currently driving the simulation.
    pub active_lens_id: String,
    /// The canonical frame.
    pub frame: Frame,
    /// Cross-lens identity data.
    pub anchors: IdentityAnchors,
    /// Opaque per-lens state, keyed by lens id.
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub lens_states: BTreeMap<String, LensValue>,
    /// Opaque per-lens outcome history, keyed by lens id.
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub lens_outcomes: BTreeMap<String, LensValue>,
}

impl UniverseState {
    /// A universe running `lens_id` at the tick of `frame`, with no lens state yet.
    pub fn new(lens_id: impl Into<String>, frame: Frame, anchors: IdentityAnchors) -> Self {
        Self {
            tick: frame.tick,
            active_lens_id: lens_id.into(),
            frame,
            anchors,
            lens_states: BTreeMap::new(),
            lens_outcomes: BTreeMap::new(),
        }
    }

    /// Merge a delta into a copy of this state.
    #[must_use]
    pub fn apply_delta(&self, delta: &DeltaState) -> Self {
        let mut lens_states = self.lens_states.clone();
        lens_states.extend(delta.lens_states.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut lens_outcomes = self.lens_outcomes.clone();
        lens_outcomes.extend(
            delta
                .lens_outcomes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        Self {
            tick: delta.tick.unwrap_or(self.tick),
            active_lens_id: delta
                .active_lens_id
                .clone()
                .unwrap_or_else(|| self.active_lens_id.clone()),
            frame: delta.frame.clone().unwrap_or_else(|| self.frame.clone()),
            anchors: delta
                .anchors
                .as_ref()
                .map_or_else(|| self.anchors.clone(), |patch| self.anchors.patched(patch)),
            lens_states,
            lens_outcomes,
        }
    }

    /// Replace the frame after a tick, advancing the universe tick with it.
    #[must_use]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.tick = frame.tick;
        self.frame = frame;
        self
    }
}

/// A partial patch over [`UniverseState`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct DeltaState {
    /// Replacement tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
    /// Replacement active lens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_lens_id: Option<String>,
    /// Replacement frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
    /// Partial anchor update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchors: Option<AnchorPatch>,
    /// Lens states to set; other lenses keep theirs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[ts(type = "Record<string, unknown>")]
    pub lens_states: BTreeMap<String, LensValue>,
    /// Lens outcomes to set; other lenses keep theirs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[ts(type = "Record<string, unknown>")]
    pub lens_outcomes: BTreeMap<String, LensValue>,
}
