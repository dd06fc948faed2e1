//! Lens transition protocol.
//!
//! Switching the active lens moves a [`UniverseState`] from one lens's
//! representation to another's:
//!
//! 1. [`compute_lens_transition_context`] canonicalizes the identity anchors.
//! 2. A decoder keyed by the outgoing lens extracts `{frame, state, outcomes}`.
//! 3. An encoder keyed by the incoming lens turns that into a [`DeltaState`].
//! 4. The delta's `active_lens_id`, `anchors` and the incoming lens's outcome
//!    entry are overwritten by the host, whatever the encoder returned.
//! 5. The delta is merged into the universe.
//!
//! Lenses without a registered decoder or encoder use the defaults, which
//! copy state and outcomes verbatim under the new lens id. The protocol is
//! synchronous and cannot fail.

use std::collections::BTreeMap;

use prism_types::{AnchorPatch, DeltaState, Frame, IdentityAnchors, LensValue, UniverseState};
use serde::Serialize;

/// The canonical facts a transition is computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionContext {
    /// Lens being left.
    pub from_lens_id: String,
    /// Lens being entered.
    pub to_lens_id: String,
    /// Universe tick at the switch.
    pub tick: u64,
    /// Canonicalized anchors carried across.
    pub anchors: IdentityAnchors,
}

/// What a decoder extracts from the outgoing lens.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLensState {
    /// The frame to hand over.
    pub frame: Frame,
    /// Opaque lens state.
    pub state: LensValue,
    /// Opaque outcome history.
    pub outcomes: LensValue,
}

/// A lens-specific decoder.
pub type DecodeFn = Box<dyn Fn(&UniverseState, &TransitionContext) -> DecodedLensState + Send + Sync>;

/// A lens-specific encoder.
pub type EncodeFn = Box<dyn Fn(&DecodedLensState, &TransitionContext) -> DeltaState + Send + Sync>;

/// Decoders and encoders keyed by lens id.
#[derive(Default)]
pub struct TransitionRegistry {
    decoders: BTreeMap<String, DecodeFn>,
    encoders: BTreeMap<String, EncodeFn>,
}

impl core::fmt::Debug for TransitionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransitionRegistry")
            .field("decoders", &self.decoders.keys().collect::<Vec<_>>())
            .field("encoders", &self.encoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TransitionRegistry {
    /// An empty registry; every lens uses the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the decoder used when leaving `lens_id`.
    pub fn register_decoder<F>(&mut self, lens_id: impl Into<String>, decode: F)
    where
        F: Fn(&UniverseState, &TransitionContext) -> DecodedLensState + Send + Sync + 'static,
    {
        self.decoders.insert(lens_id.into(), Box::new(decode));
    }

    /// Register the encoder used when entering `lens_id`.
    pub fn register_encoder<F>(&mut self, lens_id: impl Into<String>, encode: F)
    where
        F: Fn(&DecodedLensState, &TransitionContext) -> DeltaState + Send + Sync + 'static,
    {
        self.encoders.insert(lens_id.into(), Box::new(encode));
    }

    fn decode(&self, universe: &UniverseState, context: &TransitionContext) -> DecodedLensState {
        self.decoders
            .get(&context.from_lens_id)
            .map_or_else(|| default_decode(universe, context), |f| f(universe, context))
    }

    fn encode(&self, decoded: &DecodedLensState, context: &TransitionContext) -> DeltaState {
        self.encoders
            .get(&context.to_lens_id)
            .map_or_else(|| default_encode(decoded, context), |f| f(decoded, context))
    }
}

/// Outcome of a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    /// The context the transition was computed from.
    pub context: TransitionContext,
    /// The delta that was applied, after host overrides.
    pub delta: DeltaState,
    /// The universe after the transition.
    pub next: UniverseState,
}

/// Build the transition context, canonicalizing anchors.
pub fn compute_lens_transition_context(
    universe: &UniverseState,
    to_lens_id: &str,
) -> TransitionContext {
    TransitionContext {
        from_lens_id: universe.active_lens_id.clone(),
        to_lens_id: to_lens_id.to_owned(),
        tick: universe.tick,
        anchors: universe.anchors.canonicalized(),
    }
}

/// Decoder used when the outgoing lens has none registered.
///
/// Reads the outgoing lens's stored state and outcomes, or empty maps.
pub fn default_decode(universe: &UniverseState, context: &TransitionContext) -> DecodedLensState {
    DecodedLensState {
        frame: universe.frame.clone(),
        state: universe
            .lens_states
            .get(&context.from_lens_id)
            .cloned()
            .unwrap_or_else(LensValue::empty_map),
        outcomes: universe
            .lens_outcomes
            .get(&context.from_lens_id)
            .cloned()
            .unwrap_or_else(LensValue::empty_map),
    }
}

/// Encoder used when the incoming lens has none registered.
///
/// Writes the decoded frame, state and outcomes under the incoming lens id.
pub fn default_encode(decoded: &DecodedLensState, context: &TransitionContext) -> DeltaState {
    DeltaState {
        active_lens_id: Some(context.to_lens_id.clone()),
        frame: Some(decoded.frame.clone()),
        lens_states: BTreeMap::from([(context.to_lens_id.clone(), decoded.state.clone())]),
        lens_outcomes: BTreeMap::from([(context.to_lens_id.clone(), decoded.outcomes.clone())]),
        ..DeltaState::default()
    }
}

/// Move `universe` to `to_lens_id`.
///
/// The returned universe always has `active_lens_id == to_lens_id` and the
/// canonicalized pre-transition anchors, regardless of what a registered
/// encoder produced.
pub fn transition_lens(
    universe: &UniverseState,
    to_lens_id: &str,
    registry: &TransitionRegistry,
) -> TransitionResult {
    let context = compute_lens_transition_context(universe, to_lens_id);
    let decoded = registry.decode(universe, &context);
    let mut delta = registry.encode(&decoded, &context);

    delta.active_lens_id = Some(context.to_lens_id.clone());
    delta.anchors = Some(AnchorPatch::from(context.anchors.clone()));
    delta
        .lens_outcomes
        .insert(context.to_lens_id.clone(), decoded.outcomes);

    let next = universe.apply_delta(&delta);
    tracing::info!(
        from = %context.from_lens_id,
        to = %context.to_lens_id,
        tick = context.tick,
        "Lens transition applied"
    );

    TransitionResult {
        context,
        delta,
        next,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use prism_types::{EntityState, Vec2};

    use super::*;

    fn universe() -> UniverseState {
        let frame = Frame::new(
            12,
            vec![EntityState {
                id: "p1".to_owned(),
                kind: "player".to_owned(),
                position: Vec2::new(3.0, 4.0),
                tick: 12,
            }],
        )
        .unwrap();
        let mut u = UniverseState::new(
            "lens/echo",
            frame,
            IdentityAnchors {
                hp: 80.0,
                inventory: vec!["potion".to_owned(), "key".to_owned(), "potion".to_owned()],
                relics: vec!["sun-dial".to_owned()],
                flags: BTreeMap::from([("met-oracle".to_owned(), true)]),
            },
        );
        u.lens_states
            .insert("lens/echo".to_owned(), LensValue::map([("wave", LensValue::Number(3.0))]));
        u.lens_outcomes
            .insert("lens/echo".to_owned(), LensValue::map([("cleared", LensValue::Bool(true))]));
        u
    }

    #[test]
    fn context_canonicalizes_anchors() {
        let context = compute_lens_transition_context(&universe(), "lens/arcade-skirmish");
        assert_eq!(context.from_lens_id, "lens/echo");
        assert_eq!(context.to_lens_id, "lens/arcade-skirmish");
        assert_eq!(context.tick, 12);
        assert_eq!(context.anchors.inventory, ["key", "potion"]);
    }

    #[test]
    fn default_path_carries_state_and_outcomes() {
        let before = universe();
        let result = transition_lens(&before, "lens/stealth-infiltration", &TransitionRegistry::new());
        let next = &result.next;

        assert_eq!(next.active_lens_id, "lens/stealth-infiltration");
        assert_eq!(next.frame, before.frame);
        assert_eq!(
            next.lens_states.get("lens/stealth-infiltration"),
            before.lens_states.get("lens/echo")
        );
        assert_eq!(
            next.lens_outcomes.get("lens/stealth-infiltration"),
            before.lens_outcomes.get("lens/echo")
        );
        // The outgoing lens keeps its entries.
        assert!(next.lens_states.contains_key("lens/echo"));
        assert_eq!(next.anchors, before.anchors.canonicalized());
    }

    #[test]
    fn unknown_outgoing_lens_decodes_to_empty_maps() {
        let mut before = universe();
        before.active_lens_id = "lens/unregistered".to_owned();
        let result = transition_lens(&before, "lens/echo", &TransitionRegistry::new());
        assert_eq!(
            result.next.lens_outcomes.get("lens/echo"),
            Some(&LensValue::empty_map())
        );
    }

    #[test]
    fn hostile_encoder_cannot_corrupt_anchors_or_lens_id() {
        let mut registry = TransitionRegistry::new();
        registry.register_encoder("lens/boss", |decoded, _ctx| DeltaState {
            active_lens_id: Some("lens/hijacked".to_owned()),
            anchors: Some(AnchorPatch {
                hp: Some(9_999.0),
                inventory: Some(vec!["contraband".to_owned()]),
                ..AnchorPatch::default()
            }),
            lens_outcomes: BTreeMap::from([
                ("lens/boss".to_owned(), LensValue::Null),
                ("lens/other".to_owned(), LensValue::from("kept")),
            ]),
            frame: Some(decoded.frame.clone()),
            ..DeltaState::default()
        });

        let before = universe();
        let result = transition_lens(&before, "lens/boss", &registry);

        assert_eq!(result.next.active_lens_id, "lens/boss");
        assert_eq!(result.next.anchors, before.anchors.canonicalized());
        assert_eq!(
            result.next.lens_outcomes.get("lens/boss"),
            before.lens_outcomes.get("lens/echo")
        );
        // Entries the host does not override survive.
        assert_eq!(
            result.next.lens_outcomes.get("lens/other"),
            Some(&LensValue::from("kept"))
        );
    }

    #[test]
    fn registered_decoder_is_used_for_outgoing_lens() {
        let mut registry = TransitionRegistry::new();
        registry.register_decoder("lens/echo", |u, _ctx| DecodedLensState {
            frame: Frame::empty(u.tick),
            state: LensValue::from("summarized"),
            outcomes: LensValue::from("won"),
        });

        let result = transition_lens(&universe(), "lens/arcade-skirmish", &registry);
        assert!(result.next.frame.is_empty());
        assert_eq!(
            result.next.lens_states.get("lens/arcade-skirmish"),
            Some(&LensValue::from("summarized"))
        );
        assert_eq!(
            result.next.lens_outcomes.get("lens/arcade-skirmish"),
            Some(&LensValue::from("won"))
        );
    }
}
