//! Group transport: membership, reliable broadcast and unicast
//!
//! `Cluster` is the switchboard for one replication group. Members join with
//! a unique id and get back a `NodeLink` (send side) plus an event stream
//! (deliveries and view changes on a single ordered channel). Delivery is
//! FIFO per sender and broadcasts are self-delivered, so receive handlers
//! must discard messages whose sender equals the local id.
//!
//! The group runs in one supervisor process; a network transport would sit
//! behind the same `NodeLink`/`NodeEvent` surface. Payloads cross the
//! channel as encoded bytes so the wire codec is exercised either way.

use crate::cluster::locks::LockService;
use crate::cluster::registry::ServiceRegistry;
use crate::cluster::view::ClusterView;
use crate::common::{Error, Result};
use bytes::Bytes;
use rand::RngCore;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A message delivered to a member, tagged with its sender.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: String,
    pub payload: Bytes,
}

/// Events delivered to a member, in order.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Message(Envelope),
    ViewChange(ClusterView),
}

pub type EventStream = mpsc::UnboundedReceiver<NodeEvent>;

struct Member {
    id: String,
    tx: mpsc::UnboundedSender<NodeEvent>,
}

struct ClusterInner {
    epoch: u64,
    members: Vec<Member>,
}

impl ClusterInner {
    fn view(&self) -> ClusterView {
        ClusterView::new(
            self.epoch,
            self.members.iter().map(|m| m.id.clone()).collect(),
        )
    }
}

/// One replication group.
pub struct Cluster {
    name: String,
    inner: Mutex<ClusterInner>,
    locks: Arc<LockService>,
    registry: Arc<ServiceRegistry>,
    auth_secret: Vec<u8>,
}

impl Cluster {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);

        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(ClusterInner {
                epoch: 0,
                members: Vec::new(),
            }),
            locks: Arc::new(LockService::new()),
            registry: Arc::new(ServiceRegistry::new()),
            auth_secret: secret,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group-wide distributed lock service
    pub fn locks(&self) -> Arc<LockService> {
        self.locks.clone()
    }

    /// Name registry shared by the group and its gateways
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    /// Secret shared by all members for signing session tokens
    pub fn auth_secret(&self) -> &[u8] {
        &self.auth_secret
    }

    /// Join the group. Returns the send-side link, the event stream, and
    /// the view the member joined in. Every member (including the joiner)
    /// receives a `ViewChange` for the new view.
    pub fn join(
        self: &Arc<Self>,
        node_id: impl Into<String>,
    ) -> Result<(NodeLink, EventStream, ClusterView)> {
        let node_id = node_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let view = {
            let mut inner = self.inner.lock().unwrap();
            if inner.members.iter().any(|m| m.id == node_id) {
                return Err(Error::Transport(format!(
                    "member '{}' already joined group '{}'",
                    node_id, self.name
                )));
            }
            inner.members.push(Member {
                id: node_id.clone(),
                tx,
            });
            inner.epoch += 1;
            let view = inner.view();
            for member in &inner.members {
                let _ = member.tx.send(NodeEvent::ViewChange(view.clone()));
            }
            view
        };

        tracing::info!("{} joined group '{}', view {}", node_id, self.name, view);

        let link = NodeLink {
            node_id,
            cluster: self.clone(),
        };
        Ok((link, rx, view))
    }

    /// Current membership view, replaced atomically on every change.
    pub fn current_view(&self) -> ClusterView {
        self.inner.lock().unwrap().view()
    }

    fn leave(&self, node_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.members.len();
        inner.members.retain(|m| m.id != node_id);
        if inner.members.len() == before {
            return;
        }
        inner.epoch += 1;
        let view = inner.view();
        tracing::info!("{} left group '{}', view {}", node_id, self.name, view);
        for member in &inner.members {
            let _ = member.tx.send(NodeEvent::ViewChange(view.clone()));
        }
    }

    fn broadcast(&self, sender: &str, payload: Bytes) {
        let inner = self.inner.lock().unwrap();
        for member in &inner.members {
            let _ = member.tx.send(NodeEvent::Message(Envelope {
                sender: sender.to_string(),
                payload: payload.clone(),
            }));
        }
    }

    fn unicast(&self, sender: &str, target: &str, payload: Bytes) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        let member = inner
            .members
            .iter()
            .find(|m| m.id == target)
            .ok_or_else(|| Error::Transport(format!("unknown member: {}", target)))?;
        member
            .tx
            .send(NodeEvent::Message(Envelope {
                sender: sender.to_string(),
                payload,
            }))
            .map_err(|_| Error::Transport(format!("member gone: {}", target)))
    }
}

/// Send side of one member's connection to the group.
#[derive(Clone)]
pub struct NodeLink {
    node_id: String,
    cluster: Arc<Cluster>,
}

impl NodeLink {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn current_view(&self) -> ClusterView {
        self.cluster.current_view()
    }

    /// Reliable broadcast to every member of the current view, self included.
    pub fn broadcast(&self, payload: Bytes) {
        self.cluster.broadcast(&self.node_id, payload);
    }

    /// Point-to-point delivery to one member.
    pub fn unicast(&self, target: &str, payload: Bytes) -> Result<()> {
        self.cluster.unicast(&self.node_id, target, payload)
    }

    /// Leave the group. Remaining members observe a new view; this member's
    /// event stream closes once buffered events are drained.
    pub fn leave(&self) {
        self.cluster.leave(&self.node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recv_now(rx: &mut EventStream) -> NodeEvent {
        rx.try_recv().expect("expected a pending event")
    }

    #[tokio::test]
    async fn test_join_delivers_view_to_everyone() {
        let cluster = Cluster::new("test-group");
        let (_l1, mut rx1, v1) = cluster.join("n1").unwrap();
        assert_eq!(v1.members, vec!["n1"]);

        let (_l2, mut rx2, v2) = cluster.join("n2").unwrap();
        assert_eq!(v2.members, vec!["n1", "n2"]);
        assert_eq!(v2.coordinator(), Some("n1"));

        // n1 sees both views, n2 sees only the one it joined in
        match recv_now(&mut rx1) {
            NodeEvent::ViewChange(v) => assert_eq!(v.epoch, 1),
            other => panic!("unexpected event: {:?}", other),
        }
        match recv_now(&mut rx1) {
            NodeEvent::ViewChange(v) => assert_eq!(v.epoch, 2),
            other => panic!("unexpected event: {:?}", other),
        }
        match recv_now(&mut rx2) {
            NodeEvent::ViewChange(v) => assert_eq!(v.members.len(), 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_member_rejected() {
        let cluster = Cluster::new("test-group");
        let (_l1, _rx1, _) = cluster.join("n1").unwrap();
        assert!(cluster.join("n1").is_err());
    }

    #[tokio::test]
    async fn test_broadcast_is_self_delivered() {
        let cluster = Cluster::new("test-group");
        let (l1, mut rx1, _) = cluster.join("n1").unwrap();
        let (_l2, mut rx2, _) = cluster.join("n2").unwrap();

        // drain view events
        while let Ok(NodeEvent::ViewChange(_)) = rx1.try_recv() {}
        while let Ok(NodeEvent::ViewChange(_)) = rx2.try_recv() {}

        l1.broadcast(Bytes::from_static(b"hello"));

        match recv_now(&mut rx1) {
            NodeEvent::Message(env) => {
                assert_eq!(env.sender, "n1");
                assert_eq!(&env.payload[..], b"hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match recv_now(&mut rx2) {
            NodeEvent::Message(env) => assert_eq!(env.sender, "n1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unicast_targets_one_member() {
        let cluster = Cluster::new("test-group");
        let (l1, _rx1, _) = cluster.join("n1").unwrap();
        let (_l2, mut rx2, _) = cluster.join("n2").unwrap();

        while let Ok(NodeEvent::ViewChange(_)) = rx2.try_recv() {}

        l1.unicast("n2", Bytes::from_static(b"direct")).unwrap();
        match recv_now(&mut rx2) {
            NodeEvent::Message(env) => assert_eq!(&env.payload[..], b"direct"),
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(l1.unicast("n9", Bytes::from_static(b"x")).is_err());
    }

    #[tokio::test]
    async fn test_leave_updates_view() {
        let cluster = Cluster::new("test-group");
        let (l1, _rx1, _) = cluster.join("n1").unwrap();
        let (_l2, mut rx2, _) = cluster.join("n2").unwrap();

        while rx2.try_recv().is_ok() {}

        l1.leave();
        match recv_now(&mut rx2) {
            NodeEvent::ViewChange(v) => {
                assert_eq!(v.members, vec!["n2"]);
                assert_eq!(v.coordinator(), Some("n2"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(cluster.current_view().size(), 1);
    }
}
