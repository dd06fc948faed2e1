//! Seeded stand-in for networked clients.
//!
//! Each tick every client sends one movement input. The stream is made
//! deliberately unreliable: some inputs are sent twice, some target a later
//! tick, and the order clients speak in is shuffled. The room's ordering
//! and duplicate rules must absorb all of it.

use std::collections::BTreeMap;

use prism_core::runner::InputSource;
use prism_types::{ClientMessage, HostMessage, InputMessage, LensValue};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

const DUPLICATE_CHANCE: f64 = 0.1;
const LATE_CHANCE: f64 = 0.15;

/// Seeded bot clients for one room.
#[derive(Debug)]
pub struct ScriptedClients {
    rng: StdRng,
    clients: Vec<String>,
    next_seq: BTreeMap<String, u64>,
    joined: bool,
    acks: u64,
    snapshots: u64,
}

impl ScriptedClients {
    /// Bots named `clients`, drawing from `seed`.
    pub fn new(seed: u64, clients: Vec<String>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            clients,
            next_seq: BTreeMap::new(),
            joined: false,
            acks: 0,
            snapshots: 0,
        }
    }

    /// Acks received so far.
    pub const fn acks(&self) -> u64 {
        self.acks
    }

    /// Snapshots received so far.
    pub const fn snapshots(&self) -> u64 {
        self.snapshots
    }

    fn step(&mut self) -> f64 {
        f64::from(self.rng.random_range(-1_i8..=1))
    }
}

impl InputSource for ScriptedClients {
    fn poll(&mut self, host_tick: u64) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        if !self.joined {
            self.joined = true;
            out.extend(self.clients.iter().map(|client_id| ClientMessage::Join {
                client_id: client_id.clone(),
            }));
        }

        let mut order = self.clients.clone();
        order.shuffle(&mut self.rng);
        for client_id in order {
            let seq = self.next_seq.entry(client_id.clone()).or_insert(0);
            *seq = seq.saturating_add(1);
            let input_seq = *seq;

            let late = self.rng.random::<f64>() < LATE_CHANCE;
            let payload = LensValue::map([
                ("x", LensValue::Number(self.step())),
                ("y", LensValue::Number(self.step())),
            ]);
            let input = InputMessage {
                client_id,
                input_seq,
                target_tick: if late { host_tick.saturating_add(1) } else { host_tick },
                payload,
            };
            if self.rng.random::<f64>() < DUPLICATE_CHANCE {
                out.push(ClientMessage::Input(input.clone()));
            }
            out.push(ClientMessage::Input(input));
        }
        out
    }

    fn deliver(&mut self, replies: &[HostMessage]) {
        for reply in replies {
            match reply {
                HostMessage::Ack(ack) => {
                    self.acks = self.acks.saturating_add(1);
                    debug!(
                        client_id = %ack.client_id,
                        acked_input_seq = ack.acked_input_seq,
                        "Ack received"
                    );
                }
                HostMessage::Snapshot(_) => self.snapshots = self.snapshots.saturating_add(1),
                HostMessage::LensTransition(_) => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn clients() -> Vec<String> {
        vec!["a".to_owned(), "b".to_owned()]
    }

    #[test]
    fn first_poll_joins_everyone_once() {
        let mut bots = ScriptedClients::new(3, clients());
        let first = bots.poll(1);
        let joins = first
            .iter()
            .filter(|m| matches!(m, ClientMessage::Join { .. }))
            .count();
        assert_eq!(joins, 2);
        assert!(
            !bots
                .poll(2)
                .iter()
                .any(|m| matches!(m, ClientMessage::Join { .. }))
        );
    }

    #[test]
    fn same_seed_same_traffic() {
        let mut a = ScriptedClients::new(9, clients());
        let mut b = ScriptedClients::new(9, clients());
        for tick in 1..=10 {
            assert_eq!(a.poll(tick), b.poll(tick));
        }
    }

    #[test]
    fn sequence_numbers_rise_per_client() {
        let mut bots = ScriptedClients::new(5, clients());
        let mut seen: BTreeMap<String, u64> = BTreeMap::new();
        for tick in 1..=20 {
            for message in bots.poll(tick) {
                if let ClientMessage::Input(input) = message {
                    let last = seen.entry(input.client_id).or_insert(0);
                    assert!(input.input_seq >= *last);
                    assert!(input.target_tick >= tick);
                    *last = input.input_seq;
                }
            }
        }
        assert_eq!(seen.get("a"), Some(&20));
    }
}
