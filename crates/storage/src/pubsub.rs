// storage/src/pubsub.rs

use consensus::{ConsensusEvent, PubSub};
use tokio::sync::broadcast;

/// A `PubSub` backed by a `tokio::sync::broadcast` channel. Consensus
/// updates publish from whatever thread calls `ConsensusDriver::update`;
/// subscribers (mempool eviction, wallet notification, RPC subscriptions)
/// each get their own receiver and drop events if they fall too far behind.
pub struct BroadcastPubSub {
    sender: broadcast::Sender<ConsensusEvent>,
}

impl BroadcastPubSub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsensusEvent> {
        self.sender.subscribe()
    }
}

impl PubSub for BroadcastPubSub {
    fn publish(&self, event: ConsensusEvent) {
        // No receivers is the common case in tests and single-shot tools;
        // a send error there is not a bug.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dag_core::{Hash, Record};

    #[test]
    fn test_subscriber_receives_published_event() {
        let pubsub = BroadcastPubSub::new(16);
        let mut rx = pubsub.subscribe();

        let record = Record::genesis_block(Hash::zero(), 1.0, 0);
        pubsub.publish(ConsensusEvent::RecordUpdated { record: record.clone() });

        let received = rx.try_recv().unwrap();
        match received {
            ConsensusEvent::RecordUpdated { record: got } => assert_eq!(got.hash, record.hash),
            _ => panic!("wrong event variant"),
        }
    }
}
