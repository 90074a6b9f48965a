// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Helpers for driving the `ll_*` entry points against a fake engine.

#![allow(dead_code)]

use std::ffi::CString;
use std::time::{Duration, Instant};

use livelink::types::{BusMessage, EndpointId, Envelope};
use livelink::{LoopbackBus, LoopbackTransport, Transport};
use livelink_c::*;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Fast timers on the named loopback bus `bus`.
pub fn loopback_yaml(bus: &str) -> CString {
    CString::new(format!(
        "discovery_interval_ms: 20\n\
         discovery_timeout_ms: 200\n\
         heartbeat_interval_ms: 20\n\
         heartbeat_timeout_ms: 150\n\
         worker_tick_ms: 5\n\
         transport:\n  kind: loopback\n  bus: {bus}\n"
    ))
    .unwrap()
}

pub fn cstr(text: &str) -> CString {
    CString::new(text).unwrap()
}

/// Create a provider called `name` on the loopback bus `bus`.
pub fn create_provider(name: &str, bus: &str) -> u64 {
    let mut handle = 0;
    let status = unsafe {
        ll_provider_create_with_config(
            cstr(name).as_ptr(),
            loopback_yaml(bus).as_ptr(),
            &mut handle,
        )
    };
    assert_eq!(status, LL_OK, "create {name}");
    assert_ne!(handle, 0);
    handle
}

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

pub fn drain_events(handle: u64) -> Vec<LlConnectionEvent> {
    let mut events = Vec::new();
    let mut event = LlConnectionEvent::default();
    while unsafe { ll_poll_connection_event(handle, &mut event) } == LL_OK {
        events.push(event);
    }
    events
}

pub struct FakeEngine {
    pub transport: LoopbackTransport,
}

impl FakeEngine {
    pub fn join(bus: &str) -> Self {
        Self {
            transport: LoopbackBus::named(bus).endpoint(),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.transport.local_endpoint()
    }

    pub fn discover(&self, provider_name: &str) -> EndpointId {
        self.next_matching(TIMEOUT, |e| {
            matches!(&e.message, BusMessage::Announce { provider_name: name, .. } if name == provider_name)
        })
        .expect("provider never announced itself")
        .sender
    }

    pub fn heartbeat(&self, provider: EndpointId) {
        self.transport
            .send(&Envelope::to(self.id(), provider, BusMessage::Heartbeat))
            .unwrap();
    }

    /// Discover `provider_name`, answer it and wait until it reports a
    /// connection.
    pub fn connect(&self, provider_name: &str, handle: u64) -> EndpointId {
        let provider = self.discover(provider_name);
        assert!(wait_until(TIMEOUT, || {
            self.heartbeat(provider);
            ll_has_connection(handle)
        }));
        provider
    }

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

    pub fn next_data(&self, timeout: Duration) -> Option<BusMessage> {
        self.next_matching(timeout, |e| {
            !matches!(e.message, BusMessage::Heartbeat | BusMessage::Announce { .. })
        })
        .map(|e| e.message)
    }

    /// Next frame for `subject`, skipping everything else.
    pub fn next_frame(&self, subject: &str) -> Option<livelink::types::FrameData> {
        self.next_matching(TIMEOUT, |e| {
            matches!(&e.message, BusMessage::FrameData { subject: s, .. } if s == subject)
        })
        .and_then(|e| match e.message {
            BusMessage::FrameData { frame, .. } => Some(frame),
            _ => None,
        })
    }
}
