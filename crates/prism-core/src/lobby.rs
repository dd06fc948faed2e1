//! Room lifecycle at the session boundary.
//!
//! The lobby tracks which clients sit in which room and whether they are
//! ready. It does not simulate anything; [`Lobby::start_lens`] only checks
//! that a room may begin and records which lens it starts with. Every
//! operation on an unknown room or client is rejected synchronously.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prism_types::RoomId;
use tracing::info;

/// Errors raised at the lobby boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// No room with this id exists.
    #[error("unknown room {room_id}")]
    UnknownRoom {
        /// The requested room.
        room_id: RoomId,
    },

    /// The client is not a member of the room.
    #[error("client {client_id} is not in room {room_id}")]
    UnknownClient {
        /// The room.
        room_id: RoomId,
        /// The missing client.
        client_id: String,
    },

    /// A client id was empty.
    #[error("client id must not be empty")]
    EmptyClientId,

    /// A lens cannot start in a room without members.
    #[error("room {room_id} has no members")]
    EmptyRoom {
        /// The empty room.
        room_id: RoomId,
    },

    /// A lens cannot start while any member is not ready.
    #[error("room {room_id} has members not ready: {}", .client_ids.join(", "))]
    NotReady {
        /// The room.
        room_id: RoomId,
        /// Members that are not ready, sorted.
        client_ids: Vec<String>,
    },
}

/// One seated client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Client id.
    pub client_id: String,
    /// Whether the client has readied up.
    pub ready: bool,
    /// When the client joined.
    pub joined_at: DateTime<Utc>,
}

/// A room as the lobby sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyRoom {
    /// Room id.
    pub room_id: RoomId,
    /// Display name.
    pub name: String,
    /// Members keyed by client id.
    pub members: BTreeMap<String, Member>,
    /// Lens the room was last started with.
    pub active_lens: Option<String>,
    /// When the room was created.
    pub created_at: DateTime<Utc>,
}

/// Confirmation that a room may start a lens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedLens {
    /// The room.
    pub room_id: RoomId,
    /// The lens it starts.
    pub lens_id: String,
    /// Members at start, sorted.
    pub members: Vec<String>,
}

/// All rooms on this host.
#[derive(Debug, Clone, Default)]
pub struct Lobby {
    rooms: BTreeMap<RoomId, LobbyRoom>,
}

impl Lobby {
    /// An empty lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new room.
    pub fn create_room(&mut self, name: impl Into<String>) -> RoomId {
        let room_id = RoomId::new();
        let name = name.into();
        info!(%room_id, name = %name, "Room created");
        self.rooms.insert(
            room_id,
            LobbyRoom {
                room_id,
                name,
                members: BTreeMap::new(),
                active_lens: None,
                created_at: Utc::now(),
            },
        );
        room_id
    }

    /// Seat a client. Joining twice is a no-op and keeps the ready flag.
    pub fn join_room(&mut self, room_id: RoomId, client_id: &str) -> Result<(), LobbyError> {
        if client_id.is_empty() {
            return Err(LobbyError::EmptyClientId);
        }
        let room = self.room_mut(room_id)?;
        if !room.members.contains_key(client_id) {
            room.members.insert(
                client_id.to_owned(),
                Member {
                    client_id: client_id.to_owned(),
                    ready: false,
                    joined_at: Utc::now(),
                },
            );
            info!(%room_id, client_id, members = room.members.len(), "Client joined");
        }
        Ok(())
    }

    /// Unseat a client.
    pub fn leave_room(&mut self, room_id: RoomId, client_id: &str) -> Result<(), LobbyError> {
        let room = self.room_mut(room_id)?;
        if room.members.remove(client_id).is_none() {
            return Err(LobbyError::UnknownClient {
                room_id,
                client_id: client_id.to_owned(),
            });
        }
        info!(%room_id, client_id, members = room.members.len(), "Client left");
        Ok(())
    }

    /// Set a member's ready flag.
    pub fn set_ready(&mut self, room_id: RoomId, client_id: &str, ready: bool) -> Result<(), LobbyError> {
        let room = self.room_mut(room_id)?;
        let member = room
            .members
            .get_mut(client_id)
            .ok_or_else(|| LobbyError::UnknownClient {
                room_id,
                client_id: client_id.to_owned(),
            })?;
        member.ready = ready;
        Ok(())
    }

    /// Start a lens in a room whose members are all ready.
    pub fn start_lens(&mut self, room_id: RoomId, lens_id: &str) -> Result<StartedLens, LobbyError> {
        let room = self.room_mut(room_id)?;
        if room.members.is_empty() {
            return Err(LobbyError::EmptyRoom { room_id });
        }
        let not_ready: Vec<String> = room
            .members
            .values()
            .filter(|m| !m.ready)
            .map(|m| m.client_id.clone())
            .collect();
        if !not_ready.is_empty() {
            return Err(LobbyError::NotReady {
                room_id,
                client_ids: not_ready,
            });
        }

        room.active_lens = Some(lens_id.to_owned());
        info!(%room_id, lens_id, members = room.members.len(), "Lens started");
        Ok(StartedLens {
            room_id,
            lens_id: lens_id.to_owned(),
            members: room.members.keys().cloned().collect(),
        })
    }

    /// Look up a room.
    pub fn room(&self, room_id: RoomId) -> Option<&LobbyRoom> {
        self.rooms.get(&room_id)
    }

    /// Every room, ordered by id (and therefore creation time).
    pub fn rooms(&self) -> impl Iterator<Item = &LobbyRoom> {
        self.rooms.values()
    }

    fn room_mut(&mut self, room_id: RoomId) -> Result<&mut LobbyRoom, LobbyError> {
        self.rooms
            .get_mut(&room_id)
            .ok_or(LobbyError::UnknownRoom { room_id })
    }
}
