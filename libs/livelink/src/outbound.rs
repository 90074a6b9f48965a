// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Outbound queues between `push_frame` and the connection worker.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_queue::{ArrayQueue, SegQueue};
use livelink_types::{BusMessage, FrameData};
use parking_lot::RwLock;

use crate::registry::SubjectId;

/// Per-subject frame mailbox with a fixed depth.
///
/// Uses a crossbeam ArrayQueue internally for lock-free, thread-safe access.
/// When full, the oldest pending frame is dropped so the engine always
/// receives the most recent motion.
pub struct FrameMailbox {
    subject: String,
    queue: ArrayQueue<FrameData>,
}

impl FrameMailbox {
    pub fn new(subject: impl Into<String>, depth: usize) -> Self {
        Self {
            subject: subject.into(),
            queue: ArrayQueue::new(depth.max(1)),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Push a frame, returning how many older frames were dropped for it.
    pub fn push(&self, frame: FrameData) -> usize {
        let mut dropped = 0;
        let mut frame = frame;
        // Another producer may refill the slot between pop and push; retry.
        while let Err(rejected) = self.queue.push(frame) {
            if self.queue.pop().is_some() {
                dropped += 1;
            }
            frame = rejected;
        }
        dropped
    }

    /// Pop the oldest pending frame (FIFO).
    pub fn pop(&self) -> Option<FrameData> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Drain all pending frames, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = FrameData> + '_ {
        std::iter::from_fn(move || self.queue.pop())
    }

    pub fn clear(&self) -> usize {
        self.drain().count()
    }
}

/// Everything waiting to go out for one provider.
///
/// Control messages (subject static data and removals) are unbounded and
/// always drained before frames so an engine never sees a frame for a
/// subject it has not been told about.
pub struct OutboundQueue {
    control: SegQueue<BusMessage>,
    mailboxes: RwLock<HashMap<SubjectId, Arc<FrameMailbox>>>,
    depth: usize,
}

impl OutboundQueue {
    pub fn new(depth: usize) -> Self {
        Self {
            control: SegQueue::new(),
            mailboxes: RwLock::new(HashMap::new()),
            depth: depth.max(1),
        }
    }

    pub fn push_control(&self, message: BusMessage) {
        self.control.push(message);
    }

    /// Create the mailbox for a newly registered subject.
    pub fn open(&self, id: SubjectId, subject: &str) {
        self.mailboxes
            .write()
            .insert(id, Arc::new(FrameMailbox::new(subject, self.depth)));
    }

    /// Remove a subject's mailbox, cancelling its pending frames.
    pub fn close(&self, id: SubjectId) -> usize {
        match self.mailboxes.write().remove(&id) {
            Some(mailbox) => mailbox.clear(),
            None => 0,
        }
    }

    /// Queue a frame for `id`. Returns the number of frames dropped to
    /// make room, or `None` when the subject has no mailbox.
    pub fn push_frame(&self, id: SubjectId, frame: FrameData) -> Option<usize> {
        let mailbox = self.mailboxes.read().get(&id).cloned()?;
        Some(mailbox.push(frame))
    }

    /// Drain control messages first, then pending frames of every subject.
    pub fn drain(&self) -> Vec<BusMessage> {
        let mut out: Vec<BusMessage> = std::iter::from_fn(|| self.control.pop()).collect();

        let mailboxes: Vec<Arc<FrameMailbox>> = self.mailboxes.read().values().cloned().collect();
        for mailbox in mailboxes {
            out.extend(mailbox.drain().map(|frame| BusMessage::FrameData {
                subject: mailbox.subject().to_string(),
                frame,
            }));
        }
        out
    }

    /// Drop everything, including mailboxes.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = std::iter::from_fn(|| self.control.pop()).count();
        for (_, mailbox) in self.mailboxes.write().drain() {
            cancelled += mailbox.clear();
        }
        cancelled
    }

    pub fn pending_frames(&self) -> usize {
        self.mailboxes.read().values().map(|m| m.len()).sum()
    }

    pub fn has_pending(&self) -> bool {
        !self.control.is_empty() || self.pending_frames() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(world_time: f64) -> FrameData {
        FrameData::new(world_time)
    }

    fn times(messages: &[BusMessage]) -> Vec<f64> {
        messages
            .iter()
            .filter_map(|m| match m {
                BusMessage::FrameData { frame, .. } => Some(frame.world_time),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn mailbox_drops_oldest_when_full() {
        let mailbox = FrameMailbox::new("Cam1", 2);
        assert_eq!(mailbox.push(frame(1.0)), 0);
        assert_eq!(mailbox.push(frame(2.0)), 0);
        assert_eq!(mailbox.push(frame(3.0)), 1);
        assert_eq!(mailbox.len(), 2);
        let drained: Vec<f64> = mailbox.drain().map(|f| f.world_time).collect();
        assert_eq!(drained, vec![2.0, 3.0]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn zero_depth_is_clamped() {
        let mailbox = FrameMailbox::new("Cam1", 0);
        assert_eq!(mailbox.capacity(), 1);
        mailbox.push(frame(1.0));
        mailbox.push(frame(2.0));
        assert_eq!(mailbox.pop().map(|f| f.world_time), Some(2.0));
    }

    #[test]
    fn control_drains_before_frames() {
        let queue = OutboundQueue::new(4);
        let id = SubjectId::from_raw(0);
        queue.open(id, "Cam1");
        queue.push_frame(id, frame(1.0));
        queue.push_control(BusMessage::SubjectRemoved {
            subject: "Old".into(),
        });

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], BusMessage::SubjectRemoved { .. }));
        assert!(matches!(
            &drained[1],
            BusMessage::FrameData { subject, .. } if subject == "Cam1"
        ));
        assert!(!queue.has_pending());
    }

    #[test]
    fn push_without_mailbox_is_rejected() {
        let queue = OutboundQueue::new(4);
        assert_eq!(queue.push_frame(SubjectId::from_raw(7), frame(0.0)), None);
    }

    #[test]
    fn closing_cancels_pending_frames() {
        let queue = OutboundQueue::new(4);
        let id = SubjectId::from_raw(0);
        queue.open(id, "Cam1");
        queue.push_frame(id, frame(1.0));
        queue.push_frame(id, frame(2.0));
        assert_eq!(queue.close(id), 2);
        assert!(times(&queue.drain()).is_empty());
        assert_eq!(queue.push_frame(id, frame(3.0)), None);
    }

    #[test]
    fn bounded_per_subject() {
        let queue = OutboundQueue::new(4);
        let a = SubjectId::from_raw(0);
        let b = SubjectId::from_raw(1);
        queue.open(a, "A");
        queue.open(b, "B");
        for i in 0..10 {
            queue.push_frame(a, frame(i as f64));
        }
        queue.push_frame(b, frame(100.0));
        assert_eq!(queue.pending_frames(), 5);

        let mut sent = times(&queue.drain());
        sent.sort_by(f64::total_cmp);
        assert_eq!(sent, vec![6.0, 7.0, 8.0, 9.0, 100.0]);
    }

    #[test]
    fn cancel_all_clears_control_and_frames() {
        let queue = OutboundQueue::new(4);
        let id = SubjectId::from_raw(0);
        queue.open(id, "Cam1");
        queue.push_frame(id, frame(1.0));
        queue.push_control(BusMessage::Heartbeat);
        assert_eq!(queue.cancel_all(), 2);
        assert!(!queue.has_pending());
        assert_eq!(queue.push_frame(id, frame(2.0)), None);
    }

    #[test]
    fn concurrent_producers_never_exceed_depth() {
        let queue = Arc::new(OutboundQueue::new(3));
        let id = SubjectId::from_raw(0);
        queue.open(id, "Cam1");

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        queue.push_frame(id, frame((t * 1000 + i) as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.pending_frames(), 3);
    }
}
