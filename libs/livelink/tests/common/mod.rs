// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Fake engine peer and timing helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use livelink::types::{BusMessage, EndpointId, Envelope};
use livelink::{LoopbackBus, LoopbackTransport, ProviderConfig, Transport};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Short timers so connection tests finish quickly.
pub fn fast_config() -> ProviderConfig {
    ProviderConfig {
        discovery_interval_ms: 20,
        discovery_timeout_ms: 200,
        heartbeat_interval_ms: 20,
        heartbeat_timeout_ms: 150,
        worker_tick_ms: 5,
        ..ProviderConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Minimal engine: answers discovery and records what it receives.
pub struct FakeEngine {
    pub transport: LoopbackTransport,
}

impl FakeEngine {
    pub fn join(bus: &Arc<LoopbackBus>) -> Self {
        Self {
            transport: bus.endpoint(),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.transport.local_endpoint()
    }

    /// Wait for an announcement from `provider_name` and return its endpoint.
    pub fn discover(&self, provider_name: &str) -> EndpointId {
        let envelope = self
            .next_matching(TIMEOUT, |e| {
                matches!(&e.message, BusMessage::Announce { provider_name: name, .. } if name == provider_name)
            })
            .expect("provider never announced itself");
        envelope.sender
    }

    pub fn send(&self, provider: EndpointId, message: BusMessage) {
        self.transport
            .send(&Envelope::to(self.id(), provider, message))
            .unwrap();
    }

    pub fn subscribe(&self, provider: EndpointId) {
        self.send(
            provider,
            BusMessage::Subscribe {
                engine_name: "fake-engine".into(),
            },
        );
    }

    pub fn heartbeat(&self, provider: EndpointId) {
        self.send(provider, BusMessage::Heartbeat);
    }

    /// Skip envelopes until one satisfies `predicate`.
    pub fn next_matching(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&Envelope) -> bool,
    ) -> Option<Envelope> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let envelope = self.transport.recv_timeout(remaining)?;
            if predicate(&envelope) {
                return Some(envelope);
            }
        }
    }

    /// Next non-heartbeat, non-announce message.
    pub fn next_data(&self, timeout: Duration) -> Option<BusMessage> {
        self.next_matching(timeout, |e| {
            !matches!(e.message, BusMessage::Heartbeat | BusMessage::Announce { .. })
        })
        .map(|e| e.message)
    }
}
