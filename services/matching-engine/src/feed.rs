//! Ordered change feed
//!
//! Every subscriber gets its own unbounded channel, so a slow consumer never
//! blocks the writer. The most recent `retention` events are kept, which lets
//! a consumer that fell behind (or restarted) resume with `subscribe_from`
//! and see every event exactly in generation order. Asking for a sequence
//! older than the retained window fails with `FeedError::Evicted` instead of
//! silently skipping events. Delivery is at-least-once from the consumer's
//! point of view: resuming from an older sequence repeats events.

use parking_lot::Mutex;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::events::{FeedEvent, FeedPayload};

/// Events kept for `subscribe_from` when no bound is configured
pub const DEFAULT_FEED_RETENTION: usize = 100_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Feed sequence {requested} was evicted; oldest retained is {oldest}")]
    Evicted { requested: u64, oldest: u64 },
}

struct FeedState {
    history: VecDeque<FeedEvent>,
    last_sequence: u64,
    subscribers: Vec<UnboundedSender<FeedEvent>>,
}

pub struct EventFeed {
    state: Mutex<FeedState>,
    retention: usize,
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::with_retention(DEFAULT_FEED_RETENTION)
    }
}

/// Receiving end of a feed subscription
pub struct FeedSubscription {
    receiver: UnboundedReceiver<FeedEvent>,
}

impl FeedSubscription {
    /// Wait for the next event; `None` once the feed is dropped
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued right now
    pub fn drain(&mut self) -> Vec<FeedEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Blocking receive for non-async consumers
    pub fn blocking_recv(&mut self) -> Option<FeedEvent> {
        self.receiver.blocking_recv()
    }
}

impl EventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed keeping at most `retention` events for replay (at least one)
    pub fn with_retention(retention: usize) -> Self {
        Self {
            state: Mutex::new(FeedState {
                history: VecDeque::new(),
                last_sequence: 0,
                subscribers: Vec::new(),
            }),
            retention: retention.max(1),
        }
    }

    /// Number and fan out a group of payloads, returning the numbered events
    pub fn publish(&self, timestamp: i64, payloads: Vec<FeedPayload>) -> Vec<FeedEvent> {
        let mut state = self.state.lock();
        let mut published = Vec::with_capacity(payloads.len());

        for payload in payloads {
            state.last_sequence += 1;
            let event = FeedEvent {
                sequence: state.last_sequence,
                timestamp,
                payload,
            };
            state
                .subscribers
                .retain(|tx| tx.send(event.clone()).is_ok());
            if state.history.len() == self.retention {
                state.history.pop_front();
            }
            state.history.push_back(event.clone());
            published.push(event);
        }

        if let Some(last) = published.last() {
            debug!(
                last_sequence = last.sequence,
                count = published.len(),
                subscribers = state.subscribers.len(),
                "feed events published"
            );
        }
        published
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> FeedSubscription {
        let mut state = self.state.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(tx);
        FeedSubscription { receiver: rx }
    }

    /// Replay retained events with `sequence >= from`, then continue live
    ///
    /// Fails when events at or after `from` are no longer retained.
    pub fn subscribe_from(&self, from: u64) -> Result<FeedSubscription, FeedError> {
        let from = from.max(1);
        let mut state = self.state.lock();
        let oldest = state.oldest_sequence();
        if from < oldest {
            return Err(FeedError::Evicted {
                requested: from,
                oldest,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let skip = (from - oldest) as usize;
        for event in state.history.iter().skip(skip) {
            // Receiver is held locally, so this cannot fail
            let _ = tx.send(event.clone());
        }
        state.subscribers.push(tx);
        Ok(FeedSubscription { receiver: rx })
    }

    /// Sequence of the latest event, 0 when empty
    pub fn last_sequence(&self) -> u64 {
        self.state.lock().last_sequence
    }

    /// Smallest sequence `subscribe_from` still accepts
    pub fn oldest_sequence(&self) -> u64 {
        self.state.lock().oldest_sequence()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Retained events, oldest first
    pub fn history(&self) -> Vec<FeedEvent> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

impl FeedState {
    fn oldest_sequence(&self) -> u64 {
        match self.history.front() {
            Some(event) => event.sequence,
            // Everything evicted or nothing published: only new events remain
            None => self.last_sequence + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::OrderId;
    use types::order::CloseReason;

    fn cancelled(id: u64) -> FeedPayload {
        FeedPayload::OrderCancelled {
            order_id: OrderId::new(id),
            reason: CloseReason::Cancelled,
        }
    }

    #[test]
    fn test_sequences_are_gapless() {
        let feed = EventFeed::new();
        let first = feed.publish(1, vec![cancelled(1), cancelled(2)]);
        let second = feed.publish(2, vec![cancelled(3)]);

        assert_eq!(first[0].sequence, 1);
        assert_eq!(first[1].sequence, 2);
        assert_eq!(second[0].sequence, 3);
        assert_eq!(feed.last_sequence(), 3);
    }

    #[test]
    fn test_subscribe_sees_only_future_events() {
        let feed = EventFeed::new();
        feed.publish(1, vec![cancelled(1)]);

        let mut sub = feed.subscribe();
        feed.publish(2, vec![cancelled(2)]);

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 2);
    }

    #[test]
    fn test_subscribe_from_replays_then_continues() {
        let feed = EventFeed::new();
        feed.publish(1, vec![cancelled(1), cancelled(2), cancelled(3)]);

        let mut sub = feed.subscribe_from(2).unwrap();
        feed.publish(2, vec![cancelled(4)]);

        let sequences: Vec<u64> = sub.drain().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let feed = EventFeed::new();
        let sub = feed.subscribe();
        let _kept = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        drop(sub);
        feed.publish(1, vec![cancelled(1)]);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_async_receive() {
        let feed = EventFeed::new();
        let mut sub = feed.subscribe();
        feed.publish(7, vec![cancelled(1)]);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.timestamp, 7);
    }

    #[test]
    fn test_subscribe_from_zero_replays_everything() {
        let feed = EventFeed::new();
        feed.publish(1, vec![cancelled(1), cancelled(2)]);

        let sequences: Vec<u64> = feed
            .subscribe_from(0)
            .unwrap()
            .drain()
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_retention_evicts_oldest_events() {
        let feed = EventFeed::with_retention(3);
        feed.publish(1, (1..=5).map(cancelled).collect());

        assert_eq!(feed.last_sequence(), 5);
        assert_eq!(feed.oldest_sequence(), 3);
        let retained: Vec<u64> = feed.history().iter().map(|e| e.sequence).collect();
        assert_eq!(retained, vec![3, 4, 5]);

        // Sequences keep counting past eviction
        let next = feed.publish(2, vec![cancelled(6)]);
        assert_eq!(next[0].sequence, 6);
        assert_eq!(feed.history().len(), 3);
    }

    #[test]
    fn test_subscribe_from_evicted_sequence_fails() {
        let feed = EventFeed::with_retention(2);
        feed.publish(1, (1..=4).map(cancelled).collect());

        match feed.subscribe_from(2) {
            Err(FeedError::Evicted { requested, oldest }) => {
                assert_eq!(requested, 2);
                assert_eq!(oldest, 3);
            }
            Ok(_) => panic!("Expected Evicted for an evicted sequence"),
        }
        assert_eq!(feed.subscriber_count(), 0);

        let sequences: Vec<u64> = feed
            .subscribe_from(3)
            .unwrap()
            .drain()
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[test]
    fn test_subscribe_from_future_sequence_only_sees_live_events() {
        let feed = EventFeed::new();
        feed.publish(1, vec![cancelled(1)]);

        let mut sub = feed.subscribe_from(5).unwrap();
        assert!(sub.drain().is_empty());
        feed.publish(2, vec![cancelled(2)]);
        assert_eq!(sub.drain().len(), 1);
    }
}
