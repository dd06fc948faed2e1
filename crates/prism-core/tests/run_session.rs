//! End-to-end session: lobby ready check, a planned run of lens swaps on a
//! ticking room, and anchor preservation across the whole run.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use prism_core::lobby::Lobby;
use prism_core::room::{RoomHost, RoomSettings};
use prism_core::run_plan::{MIN_LENS_DURATION_MS, build_run_plan};
use prism_core::runner::{InputSource, NoOpCallback, RunSettings, run_room};
use prism_lens::lenses::LensCatalog;
use prism_lens::{RuntimeLimits, TimeoutOverrides, TransitionRegistry};
use prism_types::{ClientMessage, Frame, IdentityAnchors, InputMessage, LensValue};

struct Scripted {
    clients: Vec<String>,
    seq: u64,
}

impl InputSource for Scripted {
    fn poll(&mut self, host_tick: u64) -> Vec<ClientMessage> {
        self.seq = self.seq.saturating_add(1);
        self.clients
            .iter()
            .map(|client| {
                ClientMessage::Input(InputMessage {
                    client_id: client.clone(),
                    input_seq: self.seq,
                    target_tick: host_tick,
                    payload: LensValue::map([("y", LensValue::Number(0.5))]),
                })
            })
            .collect()
    }
}

#[tokio::test]
async fn planned_run_swaps_every_lens_and_keeps_anchors() {
    let catalog = Arc::new(LensCatalog::standard());
    let plan = build_run_plan(11, MIN_LENS_DURATION_MS, &catalog).unwrap();

    let mut lobby = Lobby::new();
    let room_id = lobby.create_room("nexus");
    for client in ["p1", "p2"] {
        lobby.join_room(room_id, client).unwrap();
        lobby.set_ready(room_id, client, true).unwrap();
    }
    let first = &plan.lens_sequence.first().unwrap().lens_id;
    let started = lobby.start_lens(room_id, first).unwrap();

    let anchors = IdentityAnchors {
        hp: 80.0,
        inventory: vec!["torch".to_owned()],
        ..IdentityAnchors::default()
    };
    let mut room = RoomHost::new(
        room_id,
        Frame::empty(0),
        anchors.clone(),
        Arc::clone(&catalog),
        Arc::new(TransitionRegistry::new()),
        RoomSettings {
            limits: RuntimeLimits {
                max_frame_ms: 1_000,
                ..RuntimeLimits::default()
            },
            timeouts: TimeoutOverrides {
                decode_ms: Some(500),
                update_ms: Some(500),
                encode_ms: Some(500),
                ..TimeoutOverrides::default()
            },
            ..RoomSettings::default()
        },
    )
    .unwrap();
    for client in &started.members {
        room.handle(ClientMessage::Join {
            client_id: client.clone(),
        })
        .await
        .unwrap();
    }
    room.start_lens(&started.lens_id).await.unwrap();

    let mut source = Scripted {
        clients: started.members.clone(),
        seq: 0,
    };
    let settings = RunSettings {
        tick_interval_ms: 0,
        max_ticks: 3,
    };

    for (index, planned) in plan.lenses().enumerate() {
        if index > 0 {
            let notice = room.transition_lens(&planned.lens_id).await.unwrap();
            assert_eq!(notice.to, planned.lens_id);
        }
        let result = run_room(&mut room, settings, &mut source, &mut NoOpCallback)
            .await
            .unwrap();
        assert_eq!(result.lens_failures, 0);
    }

    assert_eq!(room.authority().host_tick(), 12);
    assert_eq!(room.active_lens_id(), Some(plan.boss_lens.lens_id.as_str()));
    assert_eq!(room.universe().anchors, anchors.canonicalized());
    assert_eq!(room.universe().lens_outcomes.len(), 3);
    let p1 = room.authority().frame().entity("p1").unwrap();
    assert!((p1.position.y - 6.0).abs() < f64::EPSILON);
    assert_eq!(room.authority().last_applied("p2"), Some(12));

    room.shutdown().await.unwrap();
}
