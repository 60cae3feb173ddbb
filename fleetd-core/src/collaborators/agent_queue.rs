//! Outbound queue to node agents: RPCs the controller pushes rather than
//! answers (launch requests, signals, reconfigure notices). A bounded
//! `flume` channel per agent keeps a single slow or dead agent from
//! backing up sends to the rest of the cluster.

use dashmap::DashMap;
use flume::{Receiver, Sender};

#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub node: String,
    pub payload: Vec<u8>,
}

pub struct AgentQueue {
    capacity: usize,
    senders: DashMap<String, Sender<AgentMessage>>,
}

impl AgentQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            senders: DashMap::new(),
        }
    }

    /// Register a node agent, returning the receiver its connection handler
    /// should drain. Re-registering drops the previous channel's sender,
    /// which disconnects any prior receiver.
    pub fn register(&self, node: &str) -> Receiver<AgentMessage> {
        let (tx, rx) = flume::bounded(self.capacity);
        self.senders.insert(node.to_string(), tx);
        rx
    }

    pub fn unregister(&self, node: &str) {
        self.senders.remove(node);
    }

    /// Enqueue a message for a node's agent. Drops the message and logs if
    /// the node is unregistered or its queue is full, rather than blocking
    /// the caller (spec.md C9 non-goal: no guaranteed agent delivery).
    pub fn send(&self, node: &str, payload: Vec<u8>) {
        let Some(sender) = self.senders.get(node) else {
            tracing::warn!(node, "agent queue send dropped: node not registered");
            return;
        };
        if sender
            .try_send(AgentMessage {
                node: node.to_string(),
                payload,
            })
            .is_err()
        {
            tracing::warn!(node, "agent queue send dropped: queue full or agent disconnected");
        }
    }

    pub fn is_registered(&self, node: &str) -> bool {
        self.senders.contains_key(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_node_receives_message() {
        let queue = AgentQueue::new(4);
        let rx = queue.register("n1");
        queue.send("n1", vec![1, 2, 3]);
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.node, "n1");
        assert_eq!(msg.payload, vec![1, 2, 3]);
    }

    #[test]
    fn unregistered_node_send_is_a_noop_drop() {
        let queue = AgentQueue::new(4);
        queue.send("ghost", vec![1]);
    }

    #[test]
    fn full_queue_drops_rather_than_blocks() {
        let queue = AgentQueue::new(1);
        let _rx = queue.register("n1");
        queue.send("n1", vec![1]);
        queue.send("n1", vec![2]); // dropped, queue full
    }
}
