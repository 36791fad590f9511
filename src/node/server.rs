//! A storage node of the data group
//!
//! `DataNode` composes the group transport, the replication coordinator,
//! the distributed lock service and the per-node storage backend into the
//! operation surface the gateway calls. The flow for every mutation is:
//! local write first (hard failure aborts here), then register the expected
//! ack count, broadcast the mutation, and run a bounded wait for the rest
//! of the group. A degraded quorum is logged, never surfaced: the local write
//! already succeeded and replication is eventually consistent.

use crate::cluster::{
    Cluster, ClusterView, EventStream, LockService, NodeEvent, NodeLink, NodeStatus, RoleTracker,
    RoleTransition, DATA_SERVICE,
};
use crate::common::{
    format_bytes, resource_key, timestamp_now_millis, validate_file_name, Error, NodeConfig, Result,
};
use crate::node::sessions::{SessionManager, SessionRecord};
use crate::replication::{
    ClusterMessage, FileOperation, FileReplication, ReplicationAck, ReplicationCoordinator,
    SessionUpdate, StateSnapshot, UserReplication,
};
use crate::storage::{self, FileRecord, FileStore, UserRecord, UserStore};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone)]
pub struct DataNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    id: String,
    endpoint: String,
    config: NodeConfig,
    link: NodeLink,
    view: RwLock<ClusterView>,
    status_tx: watch::Sender<NodeStatus>,
    status_rx: watch::Receiver<NodeStatus>,
    users: UserStore,
    files: FileStore,
    replication: ReplicationCoordinator,
    locks: Arc<LockService>,
    sessions: SessionManager,
    role: Mutex<RoleTracker>,
    // Mutations delivered while the state snapshot is still in flight;
    // replayed in arrival order once the snapshot has been applied.
    sync_buffer: Mutex<Vec<(String, ClusterMessage)>>,
}

impl DataNode {
    /// Join the group, run state transfer if needed, and start serving.
    /// The node is `Active` when this returns.
    pub async fn start(
        cluster: &Arc<Cluster>,
        node_id: impl Into<String>,
        endpoint: impl Into<String>,
        config: NodeConfig,
    ) -> Result<DataNode> {
        let node_id = node_id.into();
        let endpoint = endpoint.into();
        tracing::info!("Starting node {} ({})", node_id, endpoint);

        std::fs::create_dir_all(&config.data_dir)?;
        let db = storage::open_database(config.data_dir.join("records.db"))?;
        let users = UserStore::new(db.clone());
        let files = FileStore::new(db, config.data_dir.join("uploads"))?;

        let (link, events, joined_view) = cluster.join(node_id.clone())?;
        let is_coordinator = joined_view.coordinator() == Some(node_id.as_str());

        let initial_status = if is_coordinator {
            // Coordinators are the most authoritative member of the first
            // view they coordinate; they never request state.
            NodeStatus::Active
        } else {
            NodeStatus::Syncing
        };
        let (status_tx, status_rx) = watch::channel(initial_status);

        let sessions = SessionManager::new(cluster.auth_secret(), config.session_ttl());

        let inner = Arc::new(NodeInner {
            id: node_id.clone(),
            endpoint,
            config,
            link,
            view: RwLock::new(joined_view.clone()),
            status_tx,
            status_rx,
            users,
            files,
            replication: ReplicationCoordinator::new(),
            locks: cluster.locks(),
            sessions,
            role: Mutex::new(RoleTracker::new(node_id.clone())),
            sync_buffer: Mutex::new(Vec::new()),
        });

        tokio::spawn(run_event_loop(inner.clone(), events));

        if !is_coordinator {
            if let Some(coordinator) = joined_view.coordinator() {
                tracing::info!("{} requesting state from {}", node_id, coordinator);
                let request = ClusterMessage::StateRequest {
                    requester: node_id.clone(),
                };
                if let Err(e) = inner.link.unicast(coordinator, request.encode()?) {
                    tracing::warn!("State request failed: {}", e);
                }
            }

            let mut status = inner.status_rx.clone();
            let timeout = inner.config.state_transfer_timeout();
            let synced = tokio::time::timeout(timeout, async {
                let _ = status.wait_for(|s| *s == NodeStatus::Active).await;
            })
            .await;

            if synced.is_err() {
                // Go active with whatever partial state arrived; live
                // replication fills the gaps over time.
                tracing::warn!(
                    "{}: state transfer timed out after {:?}, going active with partial state",
                    node_id,
                    timeout
                );
                inner.finish_sync();
            }
        }

        tracing::info!(
            "Node {} active (coordinator: {})",
            node_id,
            is_coordinator
        );
        Ok(DataNode { inner })
    }

    // === Identity & membership ===

    pub fn node_id(&self) -> &str {
        &self.inner.id
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn status(&self) -> NodeStatus {
        *self.inner.status_rx.borrow()
    }

    pub fn is_coordinator(&self) -> bool {
        self.inner.view.read().unwrap().coordinator() == Some(self.inner.id.as_str())
    }

    pub fn current_view(&self) -> ClusterView {
        self.inner.view.read().unwrap().clone()
    }

    pub fn ping(&self) -> bool {
        true
    }

    pub fn cluster_size(&self) -> usize {
        self.inner.view.read().unwrap().size()
    }

    /// The endpoint the current coordinator advertised, if any.
    pub fn registry_endpoint(&self) -> Option<String> {
        self.inner.link.cluster().registry().lookup(DATA_SERVICE)
    }

    /// Leave the group. Remaining members re-elect on the resulting view.
    pub fn shutdown(&self) {
        tracing::info!("Node {} leaving the group", self.inner.id);
        self.inner.link.leave();
    }

    // === File operations ===

    pub async fn save_file(&self, user_id: &str, file_name: &str, content: &[u8]) -> Result<bool> {
        tracing::info!(
            "Saving file {} for user {} ({})",
            file_name,
            user_id,
            format_bytes(content.len() as u64)
        );
        validate_file_name(file_name)?;

        let key = resource_key(user_id, file_name);
        let _lock = self
            .inner
            .locks
            .acquire(&key, self.inner.config.lock_timeout())
            .await?;

        let user_name = self.user_name(user_id)?;
        let record = self.inner.files.save(user_id, &user_name, file_name, content)?;

        let rep = FileReplication::save(record, content.to_vec());
        let operation_id = rep.operation_id;
        self.replicate(operation_id, ClusterMessage::File(rep)).await;
        Ok(true)
    }

    pub fn read_file(&self, user_id: &str, file_name: &str) -> Result<Option<Vec<u8>>> {
        self.inner.files.read(user_id, file_name)
    }

    /// Lock-guarded read, so a download never observes a resource
    /// mid-mutation. `NotFound` if the file is absent.
    pub async fn download_file(&self, user_id: &str, file_name: &str) -> Result<Vec<u8>> {
        tracing::info!("Downloading file {} for user {}", file_name, user_id);

        let key = resource_key(user_id, file_name);
        let _lock = self
            .inner
            .locks
            .acquire(&key, self.inner.config.lock_timeout())
            .await?;

        self.inner
            .files
            .read(user_id, file_name)?
            .ok_or_else(|| Error::NotFound(format!("file '{}' for user '{}'", file_name, user_id)))
    }

    pub async fn delete_file(&self, user_id: &str, file_name: &str) -> Result<bool> {
        tracing::info!("Deleting file {} for user {}", file_name, user_id);

        let key = resource_key(user_id, file_name);
        let _lock = self
            .inner
            .locks
            .acquire(&key, self.inner.config.lock_timeout())
            .await?;

        let record = self.inner.files.delete(user_id, file_name)?;

        let rep = FileReplication::delete(record);
        let operation_id = rep.operation_id;
        self.replicate(operation_id, ClusterMessage::File(rep)).await;
        Ok(true)
    }

    pub async fn edit_file(&self, user_id: &str, file_name: &str, content: &[u8]) -> Result<bool> {
        tracing::info!("Editing file {} for user {}", file_name, user_id);

        let key = resource_key(user_id, file_name);
        let _lock = self
            .inner
            .locks
            .acquire(&key, self.inner.config.lock_timeout())
            .await?;

        let record = self.inner.files.edit(user_id, file_name, content)?;

        let rep = FileReplication::edit(record, content.to_vec());
        let operation_id = rep.operation_id;
        self.replicate(operation_id, ClusterMessage::File(rep)).await;
        Ok(true)
    }

    pub fn list_files(&self, user_id: &str) -> Result<Vec<String>> {
        self.inner.files.list_user_files(user_id)
    }

    pub fn find_files_by_name(&self, file_name: &str) -> Result<Vec<FileRecord>> {
        tracing::info!("Searching files named {}", file_name);
        self.inner.files.find_by_name(file_name)
    }

    // === User operations ===

    /// Register a new user. Returns false when the email is already in use;
    /// nothing is broadcast in that case.
    pub async fn register_user(
        &self,
        user_id: &str,
        name: &str,
        credential: &str,
        email: &str,
    ) -> Result<bool> {
        tracing::info!("Registering user {}", email);

        let created_at = timestamp_now_millis();
        if !self
            .inner
            .users
            .register(user_id, name, credential, email, created_at)?
        {
            tracing::info!("Email already in use: {}", email);
            return Ok(false);
        }

        let rep = UserReplication::new(UserRecord {
            id: user_id.to_string(),
            name: name.to_string(),
            credential: credential.to_string(),
            email: email.to_string(),
            created_at,
        });
        let operation_id = rep.operation_id;
        self.replicate(operation_id, ClusterMessage::User(rep)).await;
        Ok(true)
    }

    /// Credential check. The returned record has its credential stripped.
    pub fn login(&self, email: &str, credential: &str) -> Result<Option<UserRecord>> {
        tracing::info!("Login attempt: {}", email);
        Ok(self
            .inner
            .users
            .login(email, credential)?
            .map(|u| u.sanitized()))
    }

    // === Sessions (ack-free replication) ===

    /// Issue a session token and fan it out to the group without waiting
    /// for acknowledgements.
    pub fn create_session(&self, user: &UserRecord) -> Result<SessionRecord> {
        let record = self.inner.sessions.create(user)?;
        self.broadcast_unchecked(ClusterMessage::Session(SessionUpdate::Put(record.clone())));
        Ok(record)
    }

    pub fn validate_session(&self, token: &str) -> Option<SessionRecord> {
        self.inner.sessions.validate(token)
    }

    pub fn logout(&self, token: &str) -> bool {
        match self.inner.sessions.remove(token) {
            Some(record) => {
                tracing::info!("Logout: {}", record.user_id);
                self.broadcast_unchecked(ClusterMessage::Session(SessionUpdate::Remove {
                    token: token.to_string(),
                }));
                true
            }
            None => false,
        }
    }

    // === Internals ===

    fn user_name(&self, user_id: &str) -> Result<String> {
        Ok(self
            .inner
            .users
            .find_by_id(user_id)?
            .map(|u| u.name)
            .unwrap_or_else(|| "Unknown".to_string()))
    }

    /// Quorum-tracked broadcast: register the wait entry first (so an ack
    /// can never beat it), then send, then wait out the bounded completion.
    async fn replicate(&self, operation_id: Uuid, message: ClusterMessage) {
        let payload = match message.encode() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to encode replication message: {}", e);
                return;
            }
        };

        let expected = self.inner.view.read().unwrap().expected_acks();
        if expected == 0 {
            // Single-node group: trivially complete.
            self.inner.link.broadcast(payload);
            return;
        }

        self.inner.replication.start_operation(operation_id, expected);
        self.inner.link.broadcast(payload);

        let timeout = self.inner.config.replication_timeout();
        if !self
            .inner
            .replication
            .await_completion(operation_id, timeout)
            .await
        {
            tracing::warn!(
                "{}",
                Error::ReplicationDegraded(format!(
                    "operation {} not fully acknowledged by {} peer(s) within {:?}",
                    operation_id, expected, timeout
                ))
            );
        }
    }

    /// Fire-and-forget broadcast for the ack-free session path.
    fn broadcast_unchecked(&self, message: ClusterMessage) {
        match message.encode() {
            Ok(payload) => self.inner.link.broadcast(payload),
            Err(e) => tracing::error!("Failed to encode session message: {}", e),
        }
    }
}

async fn run_event_loop(inner: Arc<NodeInner>, mut events: EventStream) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::ViewChange(view) => inner.handle_view_change(view),
            NodeEvent::Message(envelope) => inner.handle_message(&envelope.sender, &envelope.payload),
        }
    }
    tracing::debug!("Event loop for {} terminated", inner.id);
}

impl NodeInner {
    fn handle_view_change(&self, view: ClusterView) {
        tracing::info!("{}: new view {}", self.id, view);
        *self.view.write().unwrap() = view.clone();

        let transition = self.role.lock().unwrap().observe(&view);
        match transition {
            RoleTransition::BecameCoordinator => {
                tracing::info!("{} is the new coordinator", self.id);
                self.link
                    .cluster()
                    .registry()
                    .publish(DATA_SERVICE, &self.endpoint);
            }
            RoleTransition::LostCoordinator => {
                // Best effort: the new coordinator's publish overwrites ours.
                tracing::info!("{} is no longer coordinator", self.id);
            }
            RoleTransition::StillCoordinator | RoleTransition::Follower => {}
        }
    }

    fn handle_message(&self, sender: &str, payload: &[u8]) {
        let message = match ClusterMessage::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Failed to decode message from {}: {}", sender, e);
                return;
            }
        };

        // A snapshot describes the store as of some point before it was
        // sent; a mutation committed after that point can still beat the
        // snapshot to this node. Mutations arriving while Syncing are held
        // back and replayed after the snapshot, so the snapshot can never
        // overwrite newer state or resurrect a concurrently deleted key.
        if matches!(
            message,
            ClusterMessage::File(_) | ClusterMessage::User(_) | ClusterMessage::Session(_)
        ) {
            let mut held = self.sync_buffer.lock().unwrap();
            if *self.status_rx.borrow() == NodeStatus::Syncing {
                tracing::debug!("{}: holding message from {} until synced", self.id, sender);
                held.push((sender.to_string(), message));
                return;
            }
        }

        self.dispatch_message(sender, message);
    }

    fn dispatch_message(&self, sender: &str, message: ClusterMessage) {
        match message {
            ClusterMessage::File(rep) => self.handle_file_replication(sender, rep),
            ClusterMessage::User(rep) => self.handle_user_replication(sender, rep),
            ClusterMessage::Ack(ack) => {
                self.replication
                    .register_ack(ack.operation_id, &ack.sender_id, ack.success);
            }
            ClusterMessage::Session(update) => self.handle_session_update(sender, update),
            ClusterMessage::StateRequest { requester } => self.handle_state_request(&requester),
            ClusterMessage::State(snapshot) => self.handle_state_snapshot(*snapshot),
        }
    }

    fn handle_file_replication(&self, sender: &str, rep: FileReplication) {
        if sender == self.id {
            tracing::debug!("Ignoring own message: {}", rep.operation_id);
            return;
        }

        let result = match rep.operation {
            FileOperation::Save | FileOperation::Edit => {
                let content = rep.content.as_deref().unwrap_or_default();
                self.files.apply_replica(&rep.record, content)
            }
            FileOperation::Delete => self
                .files
                .apply_delete(&rep.record.user_id, &rep.record.file_name),
        };

        self.send_ack(sender, rep.operation_id, result);
    }

    fn handle_user_replication(&self, sender: &str, rep: UserReplication) {
        if sender == self.id {
            tracing::debug!("Ignoring own message: {}", rep.operation_id);
            return;
        }

        let result = self.users.upsert(&rep.user);
        self.send_ack(sender, rep.operation_id, result);
    }

    /// Apply the result of a replicated mutation and tell the originator,
    /// regardless of whether the apply worked.
    fn send_ack(&self, target: &str, operation_id: Uuid, result: crate::common::Result<()>) {
        let (success, error) = match result {
            Ok(()) => (true, None),
            Err(e) => {
                tracing::error!("Failed to apply replication {}: {}", operation_id, e);
                (false, Some(e.to_string()))
            }
        };

        let ack = ClusterMessage::Ack(ReplicationAck {
            operation_id,
            sender_id: self.id.clone(),
            success,
            error,
        });

        match ack.encode() {
            Ok(payload) => {
                if let Err(e) = self.link.unicast(target, payload) {
                    tracing::error!("Failed to send ack to {}: {}", target, e);
                }
            }
            Err(e) => tracing::error!("Failed to encode ack: {}", e),
        }
    }

    fn handle_session_update(&self, sender: &str, update: SessionUpdate) {
        if sender == self.id {
            return;
        }
        match update {
            SessionUpdate::Put(record) => self.sessions.insert(record),
            SessionUpdate::Remove { token } => {
                self.sessions.remove(&token);
            }
        }
    }

    fn handle_state_request(&self, requester: &str) {
        let is_coordinator = self.view.read().unwrap().coordinator() == Some(self.id.as_str());
        if !is_coordinator {
            tracing::debug!(
                "{}: ignoring state request from {} (not coordinator)",
                self.id,
                requester
            );
            return;
        }

        tracing::info!("{}: serving state to {}", self.id, requester);
        match StateSnapshot::build(&self.users, &self.files, self.sessions.all()) {
            Ok(snapshot) => {
                let message = ClusterMessage::State(Box::new(snapshot));
                match message.encode() {
                    Ok(payload) => {
                        if let Err(e) = self.link.unicast(requester, payload) {
                            tracing::error!("Failed to send state to {}: {}", requester, e);
                        }
                    }
                    Err(e) => tracing::error!("Failed to encode state snapshot: {}", e),
                }
            }
            Err(e) => tracing::error!("Failed to build state snapshot: {}", e),
        }
    }

    fn handle_state_snapshot(&self, snapshot: StateSnapshot) {
        if *self.status_rx.borrow() != NodeStatus::Syncing {
            tracing::debug!("{}: discarding late state snapshot", self.id);
            return;
        }

        let (users, files) = snapshot.apply(&self.users, &self.files);
        for session in snapshot.sessions {
            self.sessions.insert(session);
        }

        tracing::info!(
            "{}: state transfer complete ({} users, {} files)",
            self.id,
            users,
            files
        );
        self.finish_sync();
    }

    /// Flip to Active and replay messages held back during the snapshot
    /// wait, oldest first. The buffer lock is held across the status
    /// change and the replay: a mutation delivered mid-replay is applied
    /// only after every held message.
    fn finish_sync(&self) {
        let mut held = self.sync_buffer.lock().unwrap();
        if *self.status_rx.borrow() != NodeStatus::Syncing {
            return;
        }
        let _ = self.status_tx.send(NodeStatus::Active);

        let replay = std::mem::take(&mut *held);
        if !replay.is_empty() {
            tracing::info!("{}: replaying {} held messages", self.id, replay.len());
        }
        for (sender, message) in replay {
            self.dispatch_message(&sender, message);
        }
    }
}
