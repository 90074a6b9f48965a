// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-provider connection worker.
//!
//! One thread per provider drives discovery, heartbeats and frame
//! delivery. It sleeps on a `select!` over its command channel, a wake-up
//! channel poked by `push_frame`, the transport's readiness channel and a
//! timer set to the connection machine's next deadline, then runs a
//! single [`service`] pass. Transports without readiness are polled every
//! `poll_interval` instead.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, select};
use livelink_types::{BusMessage, EndpointId, Envelope, LIVELINK_API_VERSION};
use tracing::{debug, trace, warn};

use crate::connection::{ConnectionEvent, InboundOutcome};
use crate::error::Result;
use crate::session::Shared;

enum Command {
    Shutdown,
}

pub(crate) struct Worker {
    commands: Sender<Command>,
    wake: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(shared: Arc<Shared>, poll_interval: Duration) -> Result<Self> {
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        // One pending wake-up is enough; extra pokes coalesce.
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);

        let thread = std::thread::Builder::new()
            .name(format!("livelink-{}", shared.name))
            .spawn(move || run(shared, commands_rx, wake_rx, poll_interval))?;

        Ok(Self {
            commands: commands_tx,
            wake: wake_tx,
            thread: Some(thread),
        })
    }

    pub(crate) fn wake(&self) {
        let _ = self.wake.try_send(());
    }

    /// Stop the thread and wait for it, unless called from the worker
    /// itself (a connection callback destroying its own provider).
    pub(crate) fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!("livelink worker thread panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    wake: Receiver<()>,
    poll_interval: Duration,
) {
    let readiness = shared.transport.readiness();
    let poll_interval = match readiness {
        Some(_) => None,
        None => Some(poll_interval),
    };
    let inbound = readiness.unwrap_or_else(crossbeam_channel::never);
    debug!(provider = %shared.name, ?poll_interval, "worker started");

    let mut deadline = Some(Instant::now());
    loop {
        let timer = match wake_at(deadline, poll_interval, Instant::now()) {
            Some(at) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        };
        select! {
            recv(commands) -> command => match command {
                Ok(Command::Shutdown) | Err(_) => break,
            },
            recv(wake) -> _ => {}
            recv(inbound) -> _ => {}
            recv(timer) -> _ => {}
        }

        let pass = service(&shared, Instant::now());
        deadline = pass.deadline;
        shared.publish(&pass.events, true);
    }

    debug!(provider = %shared.name, "worker stopped");
}

/// When the worker next has to run on its own, without input.
fn wake_at(
    deadline: Option<Instant>,
    poll_interval: Option<Duration>,
    now: Instant,
) -> Option<Instant> {
    let poll = poll_interval.map(|interval| now + interval);
    match (deadline, poll) {
        (Some(deadline), Some(poll)) => Some(deadline.min(poll)),
        (deadline, poll) => deadline.or(poll),
    }
}

/// Outcome of one [`service`] pass.
#[derive(Debug, Default)]
pub(crate) struct ServicePass {
    pub(crate) events: Vec<ConnectionEvent>,
    /// Next timer the connection machine is waiting for.
    pub(crate) deadline: Option<Instant>,
}

/// One pass: apply inbound messages, advance timers and flush outbound
/// messages.
///
/// The provider lock is held only while deciding what to send; sends and
/// callbacks happen after it is released.
pub(crate) fn service(shared: &Shared, now: Instant) -> ServicePass {
    let mut events = Vec::new();
    let mut outgoing: Vec<Envelope> = Vec::new();
    let me = shared.endpoint;
    let deadline;

    {
        let mut guard = shared.state.lock();
        let state = &mut *guard;
        if state.destroyed {
            return ServicePass::default();
        }

        loop {
            let envelope = match shared.transport.try_recv() {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break,
                Err(e) => {
                    warn!(provider = %shared.name, "receive failed: {}", e);
                    break;
                }
            };
            let peer = envelope.sender;
            trace!(provider = %shared.name, %peer, kind = envelope.message.kind(), "received");

            let outcome = match envelope.message {
                BusMessage::Subscribe { engine_name } => {
                    state.machine.on_subscribe(peer, &engine_name, now)
                }
                BusMessage::Heartbeat => state.machine.on_heartbeat(peer, now),
                BusMessage::Disconnect => InboundOutcome {
                    event: state.machine.on_disconnect(peer),
                    new_peer: false,
                },
                other => {
                    trace!(provider = %shared.name, kind = other.kind(), "ignoring message");
                    InboundOutcome::default()
                }
            };

            if outcome.new_peer {
                for subject in state.registry.iter() {
                    outgoing.push(Envelope::to(
                        me,
                        peer,
                        BusMessage::SubjectStatic {
                            subject: subject.name.clone(),
                            data: subject.schema.to_static_data(),
                        },
                    ));
                }
            }
            events.extend(outcome.event);
        }

        let tick = state.machine.tick(now);
        events.extend(tick.events);

        if tick.announce {
            outgoing.push(Envelope::broadcast(
                me,
                BusMessage::Announce {
                    provider_name: shared.name.clone(),
                    api_version: LIVELINK_API_VERSION,
                },
            ));
        }

        let peers = state.machine.peer_ids();
        shared.transport.retain_peers(&peers);
        let pending = if shared.outbound.has_pending() {
            shared.outbound.drain()
        } else {
            Vec::new()
        };
        if state.machine.is_connected() {
            for message in pending {
                address_to_all(&mut outgoing, me, &peers, &message);
            }
            if tick.heartbeat {
                address_to_all(&mut outgoing, me, &peers, &BusMessage::Heartbeat);
            }
        } else if !pending.is_empty() {
            // New peers get every subject's static data when they join.
            debug!(provider = %shared.name, discarded = pending.len(), "no peers, discarding outbound messages");
        }

        deadline = state.machine.next_deadline(now);
    }

    for envelope in &outgoing {
        if let Err(e) = shared.transport.send(envelope) {
            warn!(
                provider = %shared.name,
                kind = envelope.message.kind(),
                "send failed, dropping: {}",
                e
            );
        }
    }

    ServicePass { events, deadline }
}

fn address_to_all(
    outgoing: &mut Vec<Envelope>,
    me: EndpointId,
    peers: &[EndpointId],
    message: &BusMessage,
) {
    for peer in peers {
        outgoing.push(Envelope::to(me, *peer, message.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleeps_until_the_earlier_of_deadline_and_poll() {
        let now = Instant::now();
        let soon = now + Duration::from_millis(3);
        let later = now + Duration::from_millis(500);
        let poll = Some(Duration::from_millis(10));

        assert_eq!(wake_at(Some(soon), poll, now), Some(soon));
        assert_eq!(wake_at(Some(later), poll, now), Some(now + Duration::from_millis(10)));
        assert_eq!(wake_at(Some(later), None, now), Some(later));
        assert_eq!(wake_at(None, poll, now), Some(now + Duration::from_millis(10)));
    }

    #[test]
    fn halted_machine_without_polling_sleeps_until_woken() {
        assert_eq!(wake_at(None, None, Instant::now()), None);
    }
}
