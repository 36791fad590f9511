//! Replication tests: quorum-acknowledged mutations across a group

use replifs::cluster::Cluster;
use replifs::common::{resource_key, NodeConfig};
use replifs::{DataNode, Error};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_config(dir: &TempDir, name: &str) -> NodeConfig {
    NodeConfig {
        data_dir: dir.path().join(name),
        replication_timeout_secs: 5,
        lock_timeout_secs: 2,
        state_transfer_timeout_secs: 5,
        session_ttl_secs: 3600,
    }
}

async fn start_group(dir: &TempDir, n: usize) -> (Arc<Cluster>, Vec<DataNode>) {
    let cluster = Cluster::new("test-group");
    let mut nodes = Vec::new();
    for i in 0..n {
        let id = format!("node-{}", i + 1);
        let endpoint = format!("http://127.0.0.1:{}", 7000 + i);
        let node = DataNode::start(&cluster, &id, &endpoint, test_config(dir, &id))
            .await
            .unwrap();
        nodes.push(node);
    }
    (cluster, nodes)
}

async fn wait_until<F: Fn() -> bool>(f: F) -> bool {
    for _ in 0..200 {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    f()
}

async fn register(node: &DataNode, id: &str, email: &str) {
    assert!(node.register_user(id, "Tester", "secret", email).await.unwrap());
}

#[tokio::test]
async fn test_save_visible_on_all_members() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 3).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    nodes[0].save_file("u1", "notes.txt", b"hello").await.unwrap();

    for node in &nodes {
        let content = node.read_file("u1", "notes.txt").unwrap();
        assert_eq!(content.as_deref(), Some(b"hello".as_ref()), "node {}", node.node_id());
    }
}

#[tokio::test]
async fn test_delete_propagates() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 3).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    nodes[0].save_file("u1", "doomed.txt", b"bye").await.unwrap();
    nodes[1].delete_file("u1", "doomed.txt").await.unwrap();

    for node in &nodes {
        assert!(node.read_file("u1", "doomed.txt").unwrap().is_none());
    }

    let err = nodes[2].download_file("u1", "doomed.txt").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_delete_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 2).await;

    let err = nodes[0].delete_file("u1", "never-saved.txt").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_edit_updates_content_everywhere() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 3).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    nodes[0].save_file("u1", "draft.txt", b"v1").await.unwrap();
    nodes[2].edit_file("u1", "draft.txt", b"v2").await.unwrap();

    for node in &nodes {
        let content = node.read_file("u1", "draft.txt").unwrap();
        assert_eq!(content.as_deref(), Some(b"v2".as_ref()), "node {}", node.node_id());
    }
}

#[tokio::test]
async fn test_edit_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 2).await;

    let err = nodes[0].edit_file("u1", "ghost.txt", b"x").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_edits_converge() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 3).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    nodes[0].save_file("u1", "shared.txt", b"base").await.unwrap();

    // Two members edit the same resource at once. The group-wide lock
    // serializes them, so every member ends up with exactly one of the
    // two payloads, the same one everywhere.
    let a = nodes[0].clone();
    let b = nodes[1].clone();
    let edit_a = tokio::spawn(async move { a.edit_file("u1", "shared.txt", b"from-a").await });
    let edit_b = tokio::spawn(async move { b.edit_file("u1", "shared.txt", b"from-b").await });
    edit_a.await.unwrap().unwrap();
    edit_b.await.unwrap().unwrap();

    let reference = nodes[0].read_file("u1", "shared.txt").unwrap().unwrap();
    assert!(reference == b"from-a" || reference == b"from-b");
    for node in &nodes[1..] {
        let content = node.read_file("u1", "shared.txt").unwrap().unwrap();
        assert_eq!(content, reference, "node {} diverged", node.node_id());
    }
}

#[tokio::test]
async fn test_single_node_group_operations() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 1).await;

    // No peers means zero expected acks; mutations complete immediately.
    register(&nodes[0], "u1", "u1@example.com").await;
    nodes[0].save_file("u1", "solo.txt", b"alone").await.unwrap();
    nodes[0].edit_file("u1", "solo.txt", b"still alone").await.unwrap();
    assert_eq!(
        nodes[0].read_file("u1", "solo.txt").unwrap().as_deref(),
        Some(b"still alone".as_ref())
    );
    nodes[0].delete_file("u1", "solo.txt").await.unwrap();
    assert!(nodes[0].read_file("u1", "solo.txt").unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_email_registration() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 2).await;

    let a = nodes[0].clone();
    let b = nodes[0].clone();
    let reg_a =
        tokio::spawn(async move { a.register_user("u-a", "A", "pw", "same@example.com").await });
    let reg_b =
        tokio::spawn(async move { b.register_user("u-b", "B", "pw", "same@example.com").await });
    let ok_a = reg_a.await.unwrap().unwrap();
    let ok_b = reg_b.await.unwrap().unwrap();

    assert!(ok_a != ok_b, "exactly one registration must win");
}

#[tokio::test]
async fn test_list_files_is_per_user() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 2).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    register(&nodes[0], "u2", "u2@example.com").await;
    nodes[0].save_file("u1", "mine.txt", b"1").await.unwrap();
    nodes[0].save_file("u2", "yours.txt", b"2").await.unwrap();

    let listing = nodes[1].list_files("u1").unwrap();
    assert_eq!(listing, vec!["mine.txt".to_string()]);
}

#[tokio::test]
async fn test_search_spans_all_users() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 2).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    register(&nodes[0], "u2", "u2@example.com").await;
    nodes[0].save_file("u1", "report.txt", b"1").await.unwrap();
    nodes[0].save_file("u2", "report.txt", b"2").await.unwrap();

    let hits = nodes[1].find_files_by_name("report.txt").unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_session_token_valid_on_peers() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 3).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    let user = nodes[0].login("u1@example.com", "secret").unwrap().unwrap();
    let session = nodes[0].create_session(&user).unwrap();

    // Session fan-out carries no acks, so give the peers a moment.
    let token = session.token.clone();
    let peer = nodes[2].clone();
    assert!(wait_until(|| peer.validate_session(&token).is_some()).await);
}

#[tokio::test]
async fn test_logout_revokes_on_peers() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 2).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    let user = nodes[0].login("u1@example.com", "secret").unwrap().unwrap();
    let session = nodes[0].create_session(&user).unwrap();

    let token = session.token.clone();
    let peer = nodes[1].clone();
    assert!(wait_until(|| peer.validate_session(&token).is_some()).await);

    assert!(nodes[0].logout(&session.token));
    let token = session.token.clone();
    assert!(wait_until(move || peer.validate_session(&token).is_none()).await);
}

#[tokio::test]
async fn test_login_strips_credential() {
    let dir = TempDir::new().unwrap();
    let (_cluster, nodes) = start_group(&dir, 1).await;

    register(&nodes[0], "u1", "u1@example.com").await;
    let user = nodes[0].login("u1@example.com", "secret").unwrap().unwrap();
    assert!(user.credential.is_empty());
    assert!(nodes[0].login("u1@example.com", "wrong").unwrap().is_none());
}

#[tokio::test]
async fn test_unacked_member_degrades_but_call_succeeds() {
    let dir = TempDir::new().unwrap();
    let cluster = Cluster::new("test-group");
    let config = NodeConfig {
        replication_timeout_secs: 1,
        ..test_config(&dir, "node-1")
    };
    let node = DataNode::start(&cluster, "node-1", "http://127.0.0.1:7000", config)
        .await
        .unwrap();
    // A member that never acknowledges anything; every quorum wait
    // against it runs into the timeout.
    let (_silent, _silent_events, _) = cluster.join("silent").unwrap();

    assert!(node.register_user("u1", "Tester", "secret", "u1@example.com").await.unwrap());
    assert!(node.save_file("u1", "notes.txt", b"hello").await.unwrap());
    assert_eq!(
        node.read_file("u1", "notes.txt").unwrap().as_deref(),
        Some(b"hello".as_ref())
    );
    assert!(node.delete_file("u1", "notes.txt").await.unwrap());
}

#[tokio::test]
async fn test_held_lock_times_out_edit() {
    let dir = TempDir::new().unwrap();
    let cluster = Cluster::new("test-group");
    let config = NodeConfig {
        lock_timeout_secs: 1,
        ..test_config(&dir, "node-1")
    };
    let node = DataNode::start(&cluster, "node-1", "http://127.0.0.1:7000", config)
        .await
        .unwrap();

    register(&node, "u1", "u1@example.com").await;
    node.save_file("u1", "a.txt", b"before").await.unwrap();

    let _guard = cluster
        .locks()
        .acquire(&resource_key("u1", "a.txt"), Duration::from_secs(5))
        .await
        .unwrap();

    let err = node.edit_file("u1", "a.txt", b"after").await.unwrap_err();
    assert!(matches!(err, Error::LockTimeout(_)));
    assert_eq!(
        node.read_file("u1", "a.txt").unwrap().as_deref(),
        Some(b"before".as_ref())
    );
}
