// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Message-bus transports.
//!
//! A transport moves [`Envelope`]s between endpoints. It never blocks:
//! `try_recv` returns `None` when nothing is pending, and delivery is
//! fire-and-forget. Malformed datagrams are dropped inside the transport.
//! Transports that can tell when input arrives expose a readiness channel
//! so their owner sleeps instead of polling.

mod loopback;
mod udp;

pub use loopback::{LoopbackBus, LoopbackTransport};
pub use udp::UdpTransport;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use livelink_types::{EndpointId, Envelope};

use crate::config::TransportConfig;
use crate::error::Result;

pub trait Transport: Send + Sync {
    /// Identity this transport sends as.
    fn local_endpoint(&self) -> EndpointId;

    /// Send one envelope. Broadcasts reach every discoverable endpoint;
    /// addressed envelopes reach only their recipient.
    fn send(&self, envelope: &Envelope) -> Result<()>;

    /// Next inbound envelope addressed to us (or broadcast), if any.
    fn try_recv(&self) -> Result<Option<Envelope>>;

    /// Add an extra endpoint (`host:port`) that receives broadcasts.
    fn add_static_endpoint(&self, endpoint: &str) -> Result<()>;

    fn remove_static_endpoint(&self, endpoint: &str) -> Result<()>;

    /// Forget whatever the transport learned about endpoints outside
    /// `peers`, such as their source addresses.
    fn retain_peers(&self, _peers: &[EndpointId]) {}

    /// Signalled whenever inbound envelopes arrive; signals may coalesce.
    /// Owners of a transport that returns `None` have to poll `try_recv`.
    fn readiness(&self) -> Option<Receiver<()>> {
        None
    }
}

/// Build the transport described by `config`.
pub fn from_config(config: &TransportConfig) -> Result<Arc<dyn Transport>> {
    match config {
        TransportConfig::Udp(udp) => Ok(Arc::new(UdpTransport::bind(udp)?)),
        TransportConfig::Loopback(loopback) => {
            Ok(Arc::new(LoopbackBus::named(&loopback.bus).endpoint()))
        }
    }
}
