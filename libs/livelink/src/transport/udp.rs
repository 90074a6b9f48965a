// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! UDP transport: multicast discovery plus unicast replies.
//!
//! The socket is a non-blocking mio socket. A receive thread sleeps in
//! [`Poll`] until it is readable, decodes every pending datagram and hands
//! the envelopes to [`Transport::try_recv`] through a bounded queue,
//! signalling readiness as it goes. Sends go straight out on the caller's
//! thread.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use livelink_types::{EndpointId, Envelope, MAX_DATAGRAM_SIZE};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::Transport;
use crate::config::UdpConfig;
use crate::error::{LiveLinkError, Result};

const SOCKET: Token = Token(0);
const SHUTDOWN: Token = Token(1);

/// Decoded envelopes waiting for `try_recv`. Datagrams beyond this are
/// dropped, as the network would drop them.
const INBOUND_CAPACITY: usize = 1024;

pub struct UdpTransport {
    id: EndpointId,
    socket: Arc<UdpSocket>,
    multicast: SocketAddr,
    static_endpoints: Mutex<Vec<SocketAddr>>,
    /// Source address of each peer's most recent datagram.
    peers: Mutex<HashMap<EndpointId, SocketAddr>>,
    inbound: Receiver<(Envelope, SocketAddr)>,
    ready: Receiver<()>,
    waker: Waker,
    receiver: Option<JoinHandle<()>>,
}

impl UdpTransport {
    pub fn bind(config: &UdpConfig) -> Result<Self> {
        let mut socket = UdpSocket::bind(config.unicast_endpoint).map_err(|e| {
            LiveLinkError::Transport(format!("Failed to bind {}: {}", config.unicast_endpoint, e))
        })?;

        if let IpAddr::V4(group) = config.multicast_endpoint.ip() {
            socket.set_multicast_ttl_v4(config.multicast_ttl)?;
            socket.set_multicast_loop_v4(true)?;
            // Replies come back unicast, so failing to join only costs us
            // announcements from other providers.
            if let Err(e) = socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
                warn!("Failed to join multicast group {}: {}", group, e);
            }
        }

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut socket, SOCKET, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), SHUTDOWN)?;
        let socket = Arc::new(socket);

        let id = EndpointId::new_random();
        let (inbound_tx, inbound_rx) = crossbeam_channel::bounded(INBOUND_CAPACITY);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let receive = ReceiveLoop {
            id,
            poll,
            socket: Arc::clone(&socket),
            inbound: inbound_tx,
            ready: ready_tx,
        };
        let receiver = std::thread::Builder::new()
            .name("livelink-udp-rx".into())
            .spawn(move || receive.run())?;

        let transport = Self {
            id,
            socket,
            multicast: config.multicast_endpoint,
            static_endpoints: Mutex::new(config.static_endpoints.clone()),
            peers: Mutex::new(HashMap::new()),
            inbound: inbound_rx,
            ready: ready_rx,
            waker,
            receiver: Some(receiver),
        };
        debug!(
            endpoint = %transport.id,
            local = ?transport.socket.local_addr().ok(),
            multicast = %transport.multicast,
            "UDP transport bound"
        );
        Ok(transport)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn broadcast_targets(&self) -> Vec<SocketAddr> {
        let mut targets = vec![self.multicast];
        targets.extend(self.static_endpoints.lock().iter().copied());
        targets
    }

    fn send_to(&self, bytes: &[u8], target: SocketAddr) -> Result<()> {
        self.socket.send_to(bytes, target).map_err(|e| {
            LiveLinkError::Transport(format!("Failed to send to {}: {}", target, e))
        })?;
        Ok(())
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Err(e) = self.waker.wake() {
            warn!(endpoint = %self.id, "failed to stop UDP receive thread: {}", e);
            return;
        }
        if let Some(receiver) = self.receiver.take() {
            if receiver.join().is_err() {
                warn!(endpoint = %self.id, "UDP receive thread panicked");
            }
        }
    }
}

/// Receive side of one [`UdpTransport`], run on its own thread.
struct ReceiveLoop {
    id: EndpointId,
    poll: Poll,
    socket: Arc<UdpSocket>,
    inbound: Sender<(Envelope, SocketAddr)>,
    ready: Sender<()>,
}

impl ReceiveLoop {
    fn run(mut self) {
        let mut events = Events::with_capacity(16);
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                warn!(endpoint = %self.id, "UDP poll failed, receive thread stopping: {}", e);
                return;
            }
            for event in events.iter() {
                match event.token() {
                    SHUTDOWN => {
                        debug!(endpoint = %self.id, "UDP receive thread stopped");
                        return;
                    }
                    SOCKET => {
                        if !self.drain(&mut buffer) {
                            return;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Read until the socket would block; readiness is edge-triggered.
    /// Returns `false` once the transport is gone.
    fn drain(&self, buffer: &mut [u8]) -> bool {
        loop {
            let (len, from) = match self.socket.recv_from(buffer) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
                // Windows reports ICMP port-unreachable on the next recv.
                Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::Interrupted) => {
                    continue;
                }
                Err(e) => {
                    warn!(endpoint = %self.id, "UDP receive failed: {}", e);
                    return true;
                }
            };

            let envelope = match Envelope::decode(&buffer[..len]) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Dropping malformed datagram from {}: {}", from, e);
                    continue;
                }
            };

            if envelope.sender == self.id || !envelope.is_for(self.id) {
                trace!(%from, kind = envelope.message.kind(), "ignoring datagram");
                continue;
            }

            match self.inbound.try_send((envelope, from)) {
                Ok(()) => {
                    let _ = self.ready.try_send(());
                }
                Err(TrySendError::Full(_)) => {
                    warn!(endpoint = %self.id, %from, "inbound queue full, dropping datagram");
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}

fn parse_endpoint(endpoint: &str) -> Result<SocketAddr> {
    endpoint.trim().parse().map_err(|e| {
        LiveLinkError::InvalidArgument(format!("'{}' is not a host:port endpoint: {}", endpoint, e))
    })
}

impl Transport for UdpTransport {
    fn local_endpoint(&self) -> EndpointId {
        self.id
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        let bytes = envelope.encode()?;

        let addressed = envelope
            .recipient
            .and_then(|recipient| self.peers.lock().get(&recipient).copied());
        if let Some(target) = addressed {
            return self.send_to(&bytes, target);
        }

        // Broadcasts, and recipients we have not heard from yet, go to
        // every discoverable target. Receivers filter on the recipient.
        let mut last_error = None;
        for target in self.broadcast_targets() {
            if let Err(e) = self.send_to(&bytes, target) {
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn try_recv(&self) -> Result<Option<Envelope>> {
        match self.inbound.try_recv() {
            Ok((envelope, from)) => {
                self.peers.lock().insert(envelope.sender, from);
                Ok(Some(envelope))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(LiveLinkError::Transport(
                "UDP receive thread is not running".into(),
            )),
        }
    }

    fn add_static_endpoint(&self, endpoint: &str) -> Result<()> {
        let addr = parse_endpoint(endpoint)?;
        let mut endpoints = self.static_endpoints.lock();
        if !endpoints.contains(&addr) {
            endpoints.push(addr);
            debug!(%addr, "added static endpoint");
        }
        Ok(())
    }

    fn remove_static_endpoint(&self, endpoint: &str) -> Result<()> {
        let addr = parse_endpoint(endpoint)?;
        let mut endpoints = self.static_endpoints.lock();
        let before = endpoints.len();
        endpoints.retain(|existing| *existing != addr);
        if endpoints.len() == before {
            return Err(LiveLinkError::NotFound(format!("static endpoint {}", addr)));
        }
        debug!(%addr, "removed static endpoint");
        Ok(())
    }

    fn retain_peers(&self, peers: &[EndpointId]) {
        let mut known = self.peers.lock();
        let before = known.len();
        known.retain(|id, _| peers.contains(id));
        if known.len() < before {
            debug!(evicted = before - known.len(), "forgot peer addresses");
        }
    }

    fn readiness(&self) -> Option<Receiver<()>> {
        Some(self.ready.clone())
    }
}
