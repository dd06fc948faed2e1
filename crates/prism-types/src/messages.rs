//! Messages exchanged between clients and the host.
//!
//! Inbound traffic arrives as [`ClientMessage`] values tagged by a `type`
//! discriminant (`join`, `input`, `ack`, `snapshot`, `lens-transition`).
//! The transport may deliver them late, out of order or more than once; the
//! authoritative state machine absorbs that through input sequence numbers.
//!
//! Outbound traffic is a [`HostMessage`]: an ack, a snapshot, or a lens
//! transition notice. All of them are plain values whose maps are
//! [`BTreeMap`]s, so any stable encoding emits keys in sorted order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::frame::Frame;
use crate::ids::RoomId;
use crate::value::LensValue;

/// One client input addressed at a host tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct InputMessage {
    /// Sending client.
    pub client_id: String,
    /// Per-client sequence number, strictly increasing.
    pub input_seq: u64,
    /// Host tick the input should take effect at.
    pub target_tick: u64,
    /// Input payload. Movement inputs carry `{"x": dx, "y": dy}`.
    #[ts(type = "unknown")]
    pub payload: LensValue,
}

/// Acknowledgement of an input sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct AckMessage {
    /// Room the ack belongs to.
    pub room_id: RoomId,
    /// Client being acknowledged.
    pub client_id: String,
    /// Highest sequence number the host has accepted for this client.
    pub acked_input_seq: u64,
    /// Host tick at the time of the ack.
    pub host_tick: u64,
}

/// Full authoritative state broadcast to every client of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SnapshotMessage {
    /// Room the snapshot belongs to.
    pub room_id: RoomId,
    /// Tick of the canonical frame.
    pub host_tick: u64,
    /// The canonical frame.
    pub frame: Frame,
    /// Highest applied sequence number per client, sorted by client id.
    pub last_applied_input_seq: BTreeMap<String, u64>,
}

/// Notice that a room switched its active lens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct LensTransitionMessage {
    /// Room that switched.
    pub room_id: RoomId,
    /// Lens that was active before the switch.
    pub from: String,
    /// Lens that is active after the switch.
    pub to: String,
    /// Active lens id after the transition.
    pub lens_id: String,
    /// Host tick at which the switch happened.
    pub at_tick: u64,
}

/// Inbound message from a client, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[ts(export, export_to = "bindings/")]
pub enum ClientMessage {
    /// A client announces itself to the room.
    #[serde(rename_all = "camelCase")]
    Join {
        /// The joining client.
        client_id: String,
    },
    /// A gameplay input.
    Input(InputMessage),
    /// A client confirms it has seen the snapshot for `host_tick`.
    #[serde(rename_all = "camelCase")]
    Ack {
        /// The acknowledging client.
        client_id: String,
        /// Host tick of the snapshot being acknowledged.
        host_tick: u64,
    },
    /// A client asks for a fresh snapshot.
    #[serde(rename_all = "camelCase")]
    Snapshot {
        /// The requesting client.
        client_id: String,
    },
    /// A request to switch the room to another lens.
    #[serde(rename_all = "camelCase")]
    LensTransition {
        /// Lens to switch to.
        lens_id: String,
    },
}

/// Outbound message from the host, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[ts(export, export_to = "bindings/")]
pub enum HostMessage {
    /// Input acknowledgement.
    Ack(AckMessage),
    /// Authoritative snapshot.
    Snapshot(SnapshotMessage),
    /// Active lens changed.
    LensTransition(LensTransitionMessage),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn input_message_parses_from_tagged_json() {
        let raw = r#"{"type":"input","clientId":"p1","inputSeq":2,"targetTick":5,"payload":{"x":1,"y":-1}}"#;
        let message: ClientMessage = serde_json::from_str(raw).unwrap();
        let ClientMessage::Input(input) = message else {
            panic!("expected input message");
        };
        assert_eq!(input.client_id, "p1");
        assert_eq!(input.input_seq, 2);
        assert_eq!(input.target_tick, 5);
        assert_eq!(input.payload.get("x").and_then(LensValue::as_f64), Some(1.0));
    }

    #[test]
    fn lens_transition_uses_kebab_case_tag() {
        let message = ClientMessage::LensTransition {
            lens_id: "lens/stealth-infiltration".to_owned(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(
            json,
            r#"{"type":"lens-transition","lensId":"lens/stealth-infiltration"}"#
        );
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"teleport","clientId":"p1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn snapshot_seq_map_serializes_sorted() {
        let mut seqs = BTreeMap::new();
        seqs.insert("zed".to_owned(), 1);
        seqs.insert("amy".to_owned(), 4);
        let snapshot = SnapshotMessage {
            room_id: RoomId::from(uuid::Uuid::nil()),
            host_tick: 3,
            frame: Frame::empty(3),
            last_applied_input_seq: seqs,
        };
        let json = serde_json::to_string(&HostMessage::Snapshot(snapshot)).unwrap();
        assert!(json.starts_with(r#"{"type":"snapshot","#));
        assert!(json.ends_with(r#""lastAppliedInputSeq":{"amy":4,"zed":1}}"#));
    }
}
