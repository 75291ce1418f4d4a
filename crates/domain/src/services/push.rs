//! Live push hub.
//!
//! One broadcast channel carries every message; each subscriber filters by
//! the groups its client joined. Sending never waits on receivers, and a
//! receiver that falls behind skips the messages it missed.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::ports::PushBroadcaster;
use crate::models::{PushGroup, PushMessage};

#[derive(Debug, Clone)]
pub struct PushHub {
    sender: broadcast::Sender<Arc<PushMessage>>,
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> PushSubscriber {
        PushSubscriber {
            receiver: self.sender.subscribe(),
            groups: HashSet::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl PushBroadcaster for PushHub {
    fn broadcast(&self, message: PushMessage) {
        let event = message.event;
        // Err only means nobody is listening.
        if let Ok(count) = self.sender.send(Arc::new(message)) {
            debug!(event, receivers = count, "Push message sent");
        }
        metrics::counter!("push_messages_total", "event" => event).increment(1);
    }
}

/// One live client's view of the hub.
#[derive(Debug)]
pub struct PushSubscriber {
    receiver: broadcast::Receiver<Arc<PushMessage>>,
    groups: HashSet<PushGroup>,
}

impl PushSubscriber {
    pub fn join(&mut self, group: PushGroup) -> bool {
        self.groups.insert(group)
    }

    pub fn leave(&mut self, group: PushGroup) -> bool {
        self.groups.remove(&group)
    }

    pub fn groups(&self) -> &HashSet<PushGroup> {
        &self.groups
    }

    /// Next message for a joined group, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<PushMessage>> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.groups.contains(&message.group) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Live client lagging, skipping missed messages");
                    metrics::counter!("push_messages_skipped_total").increment(skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
