// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Provider sessions.
//!
//! A [`ProviderSession`] is one named live-link source. It owns a subject
//! registry, a connection state machine and a worker thread that talks
//! to engine peers over a [`Transport`]. Every mutation goes through one
//! per-provider lock, shared with the worker.

use std::collections::{BTreeSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use livelink_types::{BusMessage, EndpointId};
use parking_lot::Mutex;

use crate::codec::{self, CodecSettings, FrameInput};
use crate::config::ProviderConfig;
use crate::connection::{ConnectionEvent, ConnectionMachine, ConnectionState};
use crate::error::{LiveLinkError, Result};
use crate::outbound::OutboundQueue;
use crate::registry::{Registration, SubjectId, SubjectRegistry};
use crate::schema::SubjectSchema;
use crate::transport::{self, Transport};
use crate::worker::Worker;

/// Names of providers alive in this process.
static ACTIVE_PROVIDERS: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());

/// Connection events kept for [`ProviderSession::poll_event`].
const EVENT_BACKLOG: usize = 64;

pub type ConnectionCallback = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Result of a successful [`ProviderSession::push_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// `world_time` was lower than the subject's previous frame.
    pub out_of_order: bool,
    /// Older pending frames displaced from the subject's mailbox.
    pub dropped: usize,
}

pub(crate) struct ProviderState {
    pub(crate) registry: SubjectRegistry,
    pub(crate) machine: ConnectionMachine,
    pub(crate) codec: CodecSettings,
    pub(crate) destroyed: bool,
}

/// State shared between the session handle and its worker thread.
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) endpoint: EndpointId,
    pub(crate) state: Mutex<ProviderState>,
    pub(crate) outbound: OutboundQueue,
    pub(crate) transport: Arc<dyn Transport>,
    events: Mutex<VecDeque<ConnectionEvent>>,
    callback: Mutex<Option<ConnectionCallback>>,
}

impl Shared {
    /// Queue events for pollers and run the callback. Never call with the
    /// provider lock held.
    pub(crate) fn publish(&self, events: &[ConnectionEvent], notify: bool) {
        if events.is_empty() {
            return;
        }

        {
            let mut queue = self.events.lock();
            for event in events {
                if queue.len() == EVENT_BACKLOG {
                    queue.pop_front();
                }
                queue.push_back(*event);
            }
        }

        if !notify {
            return;
        }
        let Some(callback) = self.callback.lock().clone() else {
            return;
        };
        for event in events {
            let callback = Arc::clone(&callback);
            let event = *event;
            if catch_unwind(AssertUnwindSafe(move || callback(event))).is_err() {
                tracing::error!(provider = %self.name, "connection callback panicked");
            }
        }
    }
}

pub struct ProviderSession {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl ProviderSession {
    /// Create a provider whose transport is described by `config`.
    pub fn create(name: &str, config: ProviderConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let claim = NameClaim::acquire(name)?;
        let transport = transport::from_config(&config.transport)?;
        Self::start(claim, config, transport)
    }

    /// Create a provider on an existing transport.
    pub fn with_transport(
        name: &str,
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let claim = NameClaim::acquire(name)?;
        Self::start(claim, config, transport)
    }

    fn start(
        claim: NameClaim,
        config: ProviderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>> {
        let mut machine = ConnectionMachine::new(config.timings());
        let started = machine.start(Instant::now());

        let shared = Arc::new(Shared {
            name: claim.name().to_string(),
            endpoint: transport.local_endpoint(),
            state: Mutex::new(ProviderState {
                registry: SubjectRegistry::new(),
                machine,
                codec: config.codec_settings(),
                destroyed: false,
            }),
            outbound: OutboundQueue::new(config.outbound_queue_depth),
            transport,
            events: Mutex::new(VecDeque::new()),
            callback: Mutex::new(None),
        });
        shared.publish(started.as_slice(), false);

        let worker = Worker::spawn(Arc::clone(&shared), config.worker_tick())?;

        tracing::info!(
            provider = %shared.name,
            endpoint = %shared.endpoint,
            "provider created"
        );
        // The name stays claimed until destroy.
        claim.keep();

        Ok(Arc::new(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Bus identity of this provider.
    pub fn endpoint(&self) -> EndpointId {
        self.shared.endpoint
    }

    pub fn register_subject(&self, name: &str, schema: SubjectSchema) -> Result<SubjectId> {
        let mut state = self.lock_live()?;
        let registration = state.registry.register(name, schema)?;
        if let Registration::Added(id) = registration {
            let subject = state.registry.get(id)?;
            self.shared.outbound.open(id, name);
            self.shared.outbound.push_control(BusMessage::SubjectStatic {
                subject: name.to_string(),
                data: codec::encode_static(&subject.schema)?,
            });
            tracing::info!(provider = %self.shared.name, subject = name, %id, role = %subject.schema.role(), "subject registered");
        }
        drop(state);
        self.wake();
        Ok(registration.id())
    }

    /// Replace a subject's schema. The old id becomes stale and the engine
    /// sees the subject removed and added again.
    pub fn update_subject_schema(&self, name: &str, schema: SubjectSchema) -> Result<SubjectId> {
        let mut state = self.lock_live()?;
        let registration = state.registry.update_schema(name, schema)?;
        if let Registration::Replaced { old, new } = registration {
            let subject = state.registry.get(new)?;
            let outbound = &self.shared.outbound;
            outbound.close(old);
            outbound.push_control(BusMessage::SubjectRemoved {
                subject: name.to_string(),
            });
            outbound.open(new, name);
            outbound.push_control(BusMessage::SubjectStatic {
                subject: name.to_string(),
                data: codec::encode_static(&subject.schema)?,
            });
            tracing::info!(provider = %self.shared.name, subject = name, %old, %new, "subject schema replaced");
        }
        drop(state);
        self.wake();
        Ok(registration.id())
    }

    pub fn unregister_subject(&self, id: SubjectId) -> Result<()> {
        let mut state = self.lock_live()?;
        let subject = state.registry.unregister(id)?;
        let cancelled = self.shared.outbound.close(id);
        self.shared.outbound.push_control(BusMessage::SubjectRemoved {
            subject: subject.name.clone(),
        });
        drop(state);

        tracing::info!(provider = %self.shared.name, subject = %subject.name, %id, cancelled, "subject unregistered");
        self.wake();
        Ok(())
    }

    pub fn lookup_subject(&self, name: &str) -> Result<SubjectId> {
        self.lock_live()?.registry.lookup(name)
    }

    pub fn subject_schema(&self, id: SubjectId) -> Result<SubjectSchema> {
        Ok(self.lock_live()?.registry.get(id)?.schema.clone())
    }

    pub fn subject_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Encode a frame and queue it for every connected peer.
    ///
    /// Fails with `UnknownSubject` for a stale id, with a codec error for
    /// a malformed frame or one too large for a datagram, and with
    /// `NotConnected` while no engine is connected. A rejected frame is
    /// dropped, never queued.
    pub fn push_frame(&self, id: SubjectId, input: &FrameInput<'_>) -> Result<PushOutcome> {
        let mut guard = self.lock_live()?;
        let state = &mut *guard;

        let subject = state.registry.get_mut(id)?;
        let mut frame = codec::encode(&subject.schema, input, &state.codec)?;
        codec::check_frame_size(&subject.name, subject.frame_bound, &frame)?;

        if !state.machine.is_connected() {
            return Err(LiveLinkError::NotConnected(self.shared.name.clone()));
        }

        let out_of_order = subject
            .last_world_time
            .is_some_and(|last| frame.world_time < last);
        if out_of_order {
            tracing::debug!(subject = %subject.name, world_time = frame.world_time, "out-of-order frame");
        }
        subject.last_world_time = Some(frame.world_time);
        frame.out_of_order = out_of_order;

        let dropped = self
            .shared
            .outbound
            .push_frame(id, frame)
            .ok_or(LiveLinkError::UnknownSubject(id.raw()))?;
        drop(guard);

        tracing::trace!(provider = %self.shared.name, %id, dropped, "frame queued");
        self.wake();
        Ok(PushOutcome {
            out_of_order,
            dropped,
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().machine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn peers(&self) -> Vec<EndpointId> {
        self.shared.state.lock().machine.peer_ids()
    }

    /// Oldest undelivered connection event.
    pub fn poll_event(&self) -> Option<ConnectionEvent> {
        self.shared.events.lock().pop_front()
    }

    /// Run `callback` on the worker thread for every connection change.
    /// Replaces any previous callback.
    pub fn on_connection_change<F>(&self, callback: F)
    where
        F: Fn(ConnectionEvent) + Send + Sync + 'static,
    {
        *self.shared.callback.lock() = Some(Arc::new(callback));
    }

    pub fn clear_connection_callback(&self) {
        *self.shared.callback.lock() = None;
    }

    pub fn add_static_endpoint(&self, endpoint: &str) -> Result<()> {
        drop(self.lock_live()?);
        self.shared.transport.add_static_endpoint(endpoint)
    }

    pub fn remove_static_endpoint(&self, endpoint: &str) -> Result<()> {
        drop(self.lock_live()?);
        self.shared.transport.remove_static_endpoint(endpoint)
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.state.lock().destroyed
    }

    /// Release every subject, say goodbye to peers and stop the worker.
    /// Safe to call more than once.
    pub fn destroy(&self) {
        let (event, peers, subjects) = {
            let mut state = self.shared.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            let subjects = state.registry.clear().len();
            let (event, peers) = state.machine.teardown();
            (event, peers, subjects)
        };

        let cancelled = self.shared.outbound.cancel_all();

        // Callbacks on the worker thread may still call `wake()`, which
        // takes this lock, so it must be free while we join.
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.shutdown();
        }

        for peer in peers {
            let goodbye = livelink_types::Envelope::to(self.shared.endpoint, peer, BusMessage::Disconnect);
            if let Err(e) = self.shared.transport.send(&goodbye) {
                tracing::warn!(provider = %self.shared.name, %peer, "failed to send disconnect: {}", e);
            }
        }
        self.shared.transport.retain_peers(&[]);

        // Pollers still see the final transition; callbacks do not fire
        // once the owner has asked for teardown.
        self.shared.publish(event.as_slice(), false);
        ACTIVE_PROVIDERS.lock().remove(&self.shared.name);

        tracing::info!(
            provider = %self.shared.name,
            subjects,
            cancelled,
            "provider destroyed"
        );
    }

    fn lock_live(&self) -> Result<parking_lot::MutexGuard<'_, ProviderState>> {
        let state = self.shared.state.lock();
        if state.destroyed {
            return Err(LiveLinkError::InvalidHandle(format!(
                "provider '{}' was destroyed",
                self.shared.name
            )));
        }
        Ok(state)
    }

    fn wake(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.wake();
        }
    }
}

impl Drop for ProviderSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("name", &self.shared.name)
            .field("endpoint", &self.shared.endpoint)
            .finish_non_exhaustive()
    }
}

/// Reservation of a provider name; released on drop unless kept.
struct NameClaim {
    name: String,
    kept: bool,
}

impl NameClaim {
    fn acquire(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(LiveLinkError::InvalidArgument("empty provider name".into()));
        }
        if !ACTIVE_PROVIDERS.lock().insert(name.to_string()) {
            return Err(LiveLinkError::DuplicateName(format!(
                "provider '{name}' already exists"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            kept: false,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for NameClaim {
    fn drop(&mut self) {
        if !self.kept {
            ACTIVE_PROVIDERS.lock().remove(&self.name);
        }
    }
}
