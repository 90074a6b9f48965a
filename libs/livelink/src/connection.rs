// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Provider connection state machine.
//!
//! ```text
//! Disconnected ──start/tick──▶ Discovering ──subscribe/heartbeat──▶ Connected
//!       ▲                                                              │
//!       └──────────── all peers timed out / disconnected ──────────────┘
//! ```
//!
//! The machine is pure: every input carries the `Instant` it happened at
//! and every output says what the caller has to send. The connection
//! worker feeds it real time; tests feed it synthetic time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use livelink_types::EndpointId;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected = 0,
    Discovering = 1,
    Connected = 2,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimings {
    /// Period of discovery announcements while discovering.
    pub discovery_interval: Duration,
    /// Length of one discovery window before it is restarted.
    pub discovery_timeout: Duration,
    /// Period of our heartbeats while connected.
    pub heartbeat_interval: Duration,
    /// Silence after which a peer is considered gone.
    pub heartbeat_timeout: Duration,
}

impl Default for ConnectionTimings {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(1),
            discovery_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(3),
        }
    }
}

/// A state change, reported to callers and event pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub previous: ConnectionState,
    pub current: ConnectionState,
    /// Peer whose message or silence caused the change, if any.
    pub peer: Option<EndpointId>,
}

#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub engine_name: String,
    pub last_heard: Instant,
}

/// Result of applying an inbound message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InboundOutcome {
    pub event: Option<ConnectionEvent>,
    /// The sender was not a peer before; it needs every subject's static data.
    pub new_peer: bool,
}

/// What a tick asks the caller to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub events: Vec<ConnectionEvent>,
    pub announce: bool,
    pub heartbeat: bool,
    pub expired_peers: Vec<EndpointId>,
}

#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    timings: ConnectionTimings,
    peers: HashMap<EndpointId, PeerInfo>,
    discovery_started: Option<Instant>,
    discovery_attempts: u32,
    next_announce: Option<Instant>,
    next_heartbeat: Option<Instant>,
    halted: bool,
}

impl ConnectionMachine {
    pub fn new(timings: ConnectionTimings) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            timings,
            peers: HashMap::new(),
            discovery_started: None,
            discovery_attempts: 0,
            next_announce: None,
            next_heartbeat: None,
            halted: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn timings(&self) -> &ConnectionTimings {
        &self.timings
    }

    pub fn peers(&self) -> impl Iterator<Item = (&EndpointId, &PeerInfo)> {
        self.peers.iter()
    }

    pub fn peer_ids(&self) -> Vec<EndpointId> {
        self.peers.keys().copied().collect()
    }

    /// Begin discovery. No-op unless disconnected and not torn down.
    pub fn start(&mut self, now: Instant) -> Option<ConnectionEvent> {
        if self.halted || self.state != ConnectionState::Disconnected {
            return None;
        }
        Some(self.enter_discovering(now))
    }

    /// An engine asked to receive our subjects.
    pub fn on_subscribe(
        &mut self,
        peer: EndpointId,
        engine_name: &str,
        now: Instant,
    ) -> InboundOutcome {
        self.on_peer_message(peer, Some(engine_name), now)
    }

    pub fn on_heartbeat(&mut self, peer: EndpointId, now: Instant) -> InboundOutcome {
        self.on_peer_message(peer, None, now)
    }

    /// A peer said goodbye.
    pub fn on_disconnect(&mut self, peer: EndpointId) -> Option<ConnectionEvent> {
        if self.peers.remove(&peer).is_none() {
            return None;
        }
        tracing::debug!(%peer, "peer disconnected");
        if self.state == ConnectionState::Connected && self.peers.is_empty() {
            return Some(self.enter_disconnected(Some(peer)));
        }
        None
    }

    /// Advance timers.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.halted {
            return outcome;
        }

        match self.state {
            ConnectionState::Disconnected => {
                outcome.events.push(self.enter_discovering(now));
                outcome.announce = self.take_due_announce(now);
            }
            ConnectionState::Discovering => {
                if let Some(started) = self.discovery_started {
                    if now.duration_since(started) >= self.timings.discovery_timeout {
                        self.discovery_attempts += 1;
                        self.discovery_started = Some(now);
                        tracing::debug!(
                            attempts = self.discovery_attempts,
                            "no engine answered discovery, restarting window"
                        );
                    }
                }
                outcome.announce = self.take_due_announce(now);
            }
            ConnectionState::Connected => {
                let timeout = self.timings.heartbeat_timeout;
                self.peers.retain(|id, peer| {
                    let alive = now.duration_since(peer.last_heard) < timeout;
                    if !alive {
                        outcome.expired_peers.push(*id);
                    }
                    alive
                });
                for peer in &outcome.expired_peers {
                    tracing::info!(%peer, "peer heartbeat timed out");
                }

                if self.peers.is_empty() {
                    let cause = outcome.expired_peers.first().copied();
                    outcome.events.push(self.enter_disconnected(cause));
                } else if self.next_heartbeat.is_none_or(|due| now >= due) {
                    self.next_heartbeat = Some(now + self.timings.heartbeat_interval);
                    outcome.heartbeat = true;
                }
            }
        }

        outcome
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do, given
    /// the current time. `None` once torn down.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        if self.halted {
            return None;
        }
        let deadline = match self.state {
            ConnectionState::Disconnected => now,
            ConnectionState::Discovering => {
                let announce = self.next_announce.unwrap_or(now);
                match self.discovery_started {
                    Some(started) => announce.min(started + self.timings.discovery_timeout),
                    None => announce,
                }
            }
            ConnectionState::Connected => {
                let heartbeat = self.next_heartbeat.unwrap_or(now);
                self.peers
                    .values()
                    .map(|peer| peer.last_heard + self.timings.heartbeat_timeout)
                    .fold(heartbeat, Instant::min)
            }
        };
        Some(deadline)
    }

    /// Stop for good: drop every peer and never rediscover.
    /// Returns the peers that should be told we are leaving.
    pub fn teardown(&mut self) -> (Option<ConnectionEvent>, Vec<EndpointId>) {
        self.halted = true;
        let peers = self.peer_ids();
        if self.state == ConnectionState::Disconnected {
            return (None, peers);
        }
        (Some(self.enter_disconnected(None)), peers)
    }

    fn on_peer_message(
        &mut self,
        peer: EndpointId,
        engine_name: Option<&str>,
        now: Instant,
    ) -> InboundOutcome {
        match self.state {
            // Only discovery can lead to a connection.
            ConnectionState::Disconnected => InboundOutcome::default(),
            ConnectionState::Discovering => {
                self.add_or_refresh_peer(peer, engine_name, now);
                let event = self.enter_connected(peer);
                InboundOutcome {
                    event: Some(event),
                    new_peer: true,
                }
            }
            ConnectionState::Connected => {
                let new_peer = self.add_or_refresh_peer(peer, engine_name, now);
                InboundOutcome {
                    event: None,
                    new_peer,
                }
            }
        }
    }

    fn add_or_refresh_peer(
        &mut self,
        peer: EndpointId,
        engine_name: Option<&str>,
        now: Instant,
    ) -> bool {
        match self.peers.get_mut(&peer) {
            Some(info) => {
                info.last_heard = now;
                if let Some(name) = engine_name {
                    info.engine_name = name.to_string();
                }
                false
            }
            None => {
                tracing::info!(%peer, engine = engine_name.unwrap_or("unknown"), "peer joined");
                self.peers.insert(
                    peer,
                    PeerInfo {
                        engine_name: engine_name.unwrap_or_default().to_string(),
                        last_heard: now,
                    },
                );
                true
            }
        }
    }

    fn take_due_announce(&mut self, now: Instant) -> bool {
        if self.next_announce.is_none_or(|due| now >= due) {
            self.next_announce = Some(now + self.timings.discovery_interval);
            return true;
        }
        false
    }

    fn enter_discovering(&mut self, now: Instant) -> ConnectionEvent {
        self.discovery_started = Some(now);
        self.discovery_attempts = 0;
        self.next_announce = None;
        self.transition(ConnectionState::Discovering, None)
    }

    fn enter_connected(&mut self, peer: EndpointId) -> ConnectionEvent {
        self.discovery_started = None;
        self.next_heartbeat = None;
        self.transition(ConnectionState::Connected, Some(peer))
    }

    fn enter_disconnected(&mut self, peer: Option<EndpointId>) -> ConnectionEvent {
        self.peers.clear();
        self.discovery_started = None;
        self.next_heartbeat = None;
        self.transition(ConnectionState::Disconnected, peer)
    }

    fn transition(&mut self, to: ConnectionState, peer: Option<EndpointId>) -> ConnectionEvent {
        let event = ConnectionEvent {
            previous: self.state,
            current: to,
            peer,
        };
        tracing::info!(from = %self.state, to = %to, "connection state changed");
        self.state = to;
        event
    }
}
