// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-process transport.
//!
//! Keeps providers and engine peers in the same process without touching
//! the network stack. Envelopes still go through the wire encoding so the
//! size limit and decode path behave as they do over UDP. Used by tests
//! and by engines embedded in the host process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use livelink_types::{EndpointId, Envelope};
use parking_lot::Mutex;
use tracing::warn;

use super::Transport;
use crate::error::Result;

static NAMED_BUSES: Mutex<BTreeMap<String, Arc<LoopbackBus>>> = Mutex::new(BTreeMap::new());

/// Shared hub every [`LoopbackTransport`] on it talks through.
#[derive(Debug, Default)]
pub struct LoopbackBus {
    endpoints: Mutex<HashMap<EndpointId, Inbox>>,
}

#[derive(Debug)]
struct Inbox {
    bytes: Sender<Vec<u8>>,
    ready: Sender<()>,
}

impl Inbox {
    fn push(&self, bytes: Vec<u8>) {
        if self.bytes.send(bytes).is_ok() {
            let _ = self.ready.try_send(());
        }
    }
}

impl LoopbackBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Look up a process-wide bus by name, creating it on first use.
    pub fn named(name: &str) -> Arc<Self> {
        NAMED_BUSES
            .lock()
            .entry(name.to_string())
            .or_insert_with(LoopbackBus::new)
            .clone()
    }

    /// Attach a new endpoint with a fresh identity.
    pub fn endpoint(self: &Arc<Self>) -> LoopbackTransport {
        let id = EndpointId::new_random();
        let (bytes_tx, bytes_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        self.endpoints.lock().insert(
            id,
            Inbox {
                bytes: bytes_tx,
                ready: ready_tx,
            },
        );
        LoopbackTransport {
            id,
            bus: Arc::clone(self),
            inbox: bytes_rx,
            ready: ready_rx,
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.lock().len()
    }

    fn deliver(&self, envelope: &Envelope, bytes: Vec<u8>) {
        let endpoints = self.endpoints.lock();
        match envelope.recipient {
            Some(recipient) => {
                // Unknown recipients are dropped, as a datagram would be.
                if let Some(inbox) = endpoints.get(&recipient) {
                    inbox.push(bytes);
                }
            }
            None => {
                for (id, inbox) in endpoints.iter() {
                    if *id != envelope.sender {
                        inbox.push(bytes.clone());
                    }
                }
            }
        }
    }

    fn detach(&self, id: EndpointId) {
        self.endpoints.lock().remove(&id);
    }
}

/// One endpoint on a [`LoopbackBus`]. Detaches itself on drop.
#[derive(Debug)]
pub struct LoopbackTransport {
    id: EndpointId,
    bus: Arc<LoopbackBus>,
    inbox: Receiver<Vec<u8>>,
    ready: Receiver<()>,
}

impl LoopbackTransport {
    /// Block up to `timeout` for the next envelope.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let bytes = self.inbox.recv_deadline(deadline).ok()?;
            if let Some(envelope) = self.decode(&bytes) {
                return Some(envelope);
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Option<Envelope> {
        match Envelope::decode(bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(endpoint = %self.id, "dropping malformed envelope: {}", e);
                None
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn local_endpoint(&self) -> EndpointId {
        self.id
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        let bytes = envelope.encode()?;
        self.bus.deliver(envelope, bytes);
        Ok(())
    }

    fn try_recv(&self) -> Result<Option<Envelope>> {
        while let Ok(bytes) = self.inbox.try_recv() {
            if let Some(envelope) = self.decode(&bytes) {
                return Ok(Some(envelope));
            }
        }
        Ok(None)
    }

    fn add_static_endpoint(&self, endpoint: &str) -> Result<()> {
        tracing::debug!(endpoint, "static endpoints have no effect on a loopback bus");
        Ok(())
    }

    fn remove_static_endpoint(&self, endpoint: &str) -> Result<()> {
        tracing::debug!(endpoint, "static endpoints have no effect on a loopback bus");
        Ok(())
    }

    fn readiness(&self) -> Option<Receiver<()>> {
        Some(self.ready.clone())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.bus.detach(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livelink_types::BusMessage;

    #[test]
    fn broadcast_reaches_everyone_but_sender() {
        let bus = LoopbackBus::new();
        let a = bus.endpoint();
        let b = bus.endpoint();
        let c = bus.endpoint();

        a.send(&Envelope::broadcast(a.local_endpoint(), BusMessage::Heartbeat))
            .unwrap();

        assert!(a.try_recv().unwrap().is_none());
        assert_eq!(b.try_recv().unwrap().unwrap().sender, a.local_endpoint());
        assert_eq!(c.try_recv().unwrap().unwrap().sender, a.local_endpoint());
    }

    #[test]
    fn addressed_envelopes_reach_only_recipient() {
        let bus = LoopbackBus::new();
        let a = bus.endpoint();
        let b = bus.endpoint();
        let c = bus.endpoint();

        a.send(&Envelope::to(
            a.local_endpoint(),
            b.local_endpoint(),
            BusMessage::Disconnect,
        ))
        .unwrap();

        assert_eq!(b.try_recv().unwrap().unwrap().message, BusMessage::Disconnect);
        assert!(c.try_recv().unwrap().is_none());
    }

    #[test]
    fn delivery_signals_readiness() {
        let bus = LoopbackBus::new();
        let a = bus.endpoint();
        let b = bus.endpoint();
        let ready = b.readiness().unwrap();
        assert!(ready.try_recv().is_err());

        for _ in 0..3 {
            a.send(&Envelope::broadcast(a.local_endpoint(), BusMessage::Heartbeat))
                .unwrap();
        }
        // Signals coalesce; the envelopes do not.
        assert!(ready.recv_timeout(Duration::from_secs(1)).is_ok());
        assert!(ready.try_recv().is_err());
        for _ in 0..3 {
            assert!(b.try_recv().unwrap().is_some());
        }
        assert!(a.readiness().unwrap().try_recv().is_err());
    }

    #[test]
    fn dropping_detaches_endpoint() {
        let bus = LoopbackBus::new();
        let a = bus.endpoint();
        {
            let _b = bus.endpoint();
            assert_eq!(bus.endpoint_count(), 2);
        }
        assert_eq!(bus.endpoint_count(), 1);
        a.send(&Envelope::broadcast(a.local_endpoint(), BusMessage::Heartbeat))
            .unwrap();
    }

    #[test]
    fn named_buses_are_shared() {
        let first = LoopbackBus::named("loopback-named-test");
        let second = LoopbackBus::named("loopback-named-test");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &LoopbackBus::named("loopback-other-test")));
    }

    #[test]
    fn recv_timeout_expires() {
        let bus = LoopbackBus::new();
        let a = bus.endpoint();
        assert!(a.recv_timeout(Duration::from_millis(10)).is_none());
    }
}
