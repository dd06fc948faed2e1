//! The canonical per-tick world snapshot.
//!
//! A [`Frame`] is the value every other component exchanges: the
//! authoritative state machine owns one, lenses decode and re-encode it, and
//! snapshots carry it to clients. Frames are validated eagerly at every
//! boundary so that a malformed frame is rejected where it enters instead of
//! corrupting the canonical state later.
//!
//! Entities are kept sorted by id. Equality, serialization and checksums are
//! therefore independent of the order in which entities were created.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Errors raised when a frame or entity violates the data model.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An entity has an empty id.
    #[error("entity at index {index} has an empty id")]
    EmptyEntityId {
        /// Position of the entity in the submitted list.
        index: usize,
    },

    /// An entity has an empty kind.
    #[error("entity {id} has an empty kind")]
    EmptyEntityKind {
        /// The offending entity.
        id: String,
    },

    /// Two entities share an id.
    #[error("duplicate entity id {id}")]
    DuplicateEntityId {
        /// The repeated id.
        id: String,
    },

    /// Entities are not in ascending id order.
    #[error("entity {id} is out of id order")]
    Unsorted {
        /// The first entity found out of order.
        id: String,
    },

    /// An entity position is `NaN` or infinite.
    #[error("entity {id} has a non-finite position")]
    NonFinitePosition {
        /// The offending entity.
        id: String,
    },

    /// An entity claims a tick later than its frame.
    #[error("entity {id} is at tick {entity_tick}, ahead of frame tick {frame_tick}")]
    EntityAheadOfFrame {
        /// The offending entity.
        id: String,
        /// The entity's tick.
        entity_tick: u64,
        /// The enclosing frame's tick.
        frame_tick: u64,
    },

    /// The serialized frame could not be parsed.
    #[error("malformed frame: {source}")]
    Malformed {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// A 2D position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Vec2 {
    /// Horizontal component.
    pub x: f64,
    /// Vertical component.
    pub y: f64,
}

impl Vec2 {
    /// Create a vector from its components.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether both components are finite.
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Component-wise sum.
    #[must_use]
    pub fn offset(self, delta: Self) -> Self {
        Self {
            x: self.x + delta.x,
            y: self.y + delta.y,
        }
    }
}

/// One simulated entity inside a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EntityState {
    /// Unique id within the frame. For player entities this is the client id.
    pub id: String,
    /// Free-form entity kind (`player`, `projectile`, ...).
    pub kind: String,
    /// Current position.
    pub position: Vec2,
    /// Tick at which this entity last changed. Never ahead of the frame tick.
    pub tick: u64,
}

/// The canonical per-tick snapshot of simulated entities.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Frame {
    /// Host tick this frame describes.
    pub tick: u64,
    /// Entities sorted by id.
    pub entities: Vec<EntityState>,
}

impl Frame {
    /// Build a validated frame, sorting the entities by id.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if any entity violates the data model.
    pub fn new(tick: u64, entities: Vec<EntityState>) -> Result<Self, FrameError> {
        Self { tick, entities }.into_validated()
    }

    /// An empty frame at the given tick.
    pub const fn empty(tick: u64) -> Self {
        Self {
            tick,
            entities: Vec::new(),
        }
    }

    /// Sort entities by id and validate the result.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if any entity violates the data model.
    pub fn into_validated(mut self) -> Result<Self, FrameError> {
        self.entities.sort_by(|a, b| a.id.cmp(&b.id));
        self.validate()?;
        Ok(self)
    }

    /// Check every frame invariant without modifying the frame.
    ///
    /// Entities must have a non-empty id and kind, a finite position, a tick
    /// not ahead of the frame, and appear in strictly ascending id order.
    /// Use [`into_validated`](Self::into_validated) to sort first.
    ///
    /// # Errors
    ///
    /// Returns the first [`FrameError`] found.
    pub fn validate(&self) -> Result<(), FrameError> {
        let mut previous: Option<&str> = None;
        for (index, entity) in self.entities.iter().enumerate() {
            if entity.id.is_empty() {
                return Err(FrameError::EmptyEntityId { index });
            }
            if entity.kind.is_empty() {
                return Err(FrameError::EmptyEntityKind {
                    id: entity.id.clone(),
                });
            }
            if !entity.position.is_finite() {
                return Err(FrameError::NonFinitePosition {
                    id: entity.id.clone(),
                });
            }
            if entity.tick > self.tick {
                return Err(FrameError::EntityAheadOfFrame {
                    id: entity.id.clone(),
                    entity_tick: entity.tick,
                    frame_tick: self.tick,
                });
            }
            match previous.map(|p| p.cmp(entity.id.as_str())) {
                Some(std::cmp::Ordering::Equal) => {
                    return Err(FrameError::DuplicateEntityId {
                        id: entity.id.clone(),
                    });
                }
                Some(std::cmp::Ordering::Greater) => {
                    return Err(FrameError::Unsorted {
                        id: entity.id.clone(),
                    });
                }
                _ => {}
            }
            previous = Some(entity.id.as_str());
        }
        Ok(())
    }

    /// Look up an entity by id.
    pub fn entity(&self, id: &str) -> Option<&EntityState> {
        self.entities
            .binary_search_by(|e| e.id.as_str().cmp(id))
            .ok()
            .and_then(|i| self.entities.get(i))
    }

    /// Insert or replace an entity, keeping the id order.
    pub fn upsert(&mut self, entity: EntityState) {
        match self
            .entities
            .binary_search_by(|e| e.id.as_str().cmp(entity.id.as_str()))
        {
            Ok(i) => {
                if let Some(slot) = self.entities.get_mut(i) {
                    *slot = entity;
                }
            }
            Err(i) => self.entities.insert(i, entity),
        }
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the frame has no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Serialize a frame for the wire.
///
/// # Errors
///
/// Returns a [`FrameError::Malformed`] if serialization fails.
pub fn encode_frame(frame: &Frame) -> Result<String, FrameError> {
    Ok(serde_json::to_string(frame)?)
}

/// Parse and validate a frame received from the wire.
///
/// # Errors
///
/// Returns a [`FrameError`] if the text is not a frame or the frame violates
/// the data model.
pub fn decode_frame(serialized: &str) -> Result<Frame, FrameError> {
    let frame: Frame = serde_json::from_str(serialized)?;
    frame.into_validated()
}
