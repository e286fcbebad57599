//! End-to-end scenarios over the full operation surface.

use hive_mail_db::{Cursor, Store, StoreConfig};
use hive_mail_tools::{
    GetInbox, InitAgent, ReadMessage, ReleaseFiles, ReserveFiles, SendMessage,
    acknowledge_message, get_inbox, init_agent, read_message, release_files, reserve_files,
    send_message,
};
use tokio_util::sync::CancellationToken;

fn store() -> Store {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_default())
        .try_init();
    Store::in_memory("/proj").unwrap()
}

async fn register(store: &Store, cancel: &CancellationToken, name: &str) {
    init_agent(
        store,
        cancel,
        InitAgent {
            agent_name: Some(name.into()),
            program: "claude-code".into(),
            model: "opus".into(),
            task_description: None,
        },
    )
    .await
    .unwrap();
}

fn simple_send(from: &str, to: &[&str], subject: &str, body: &str) -> SendMessage {
    SendMessage {
        from: from.into(),
        to: to.iter().map(|s| (*s).to_string()).collect(),
        subject: subject.into(),
        body: body.into(),
        thread_id: None,
        importance: None,
        ack_required: false,
    }
}

fn inbox_req(agent: &str) -> GetInbox {
    GetInbox {
        agent: agent.into(),
        limit: None,
        urgent_only: false,
        unread_only: false,
        include_bodies: false,
    }
}

/// S1 — send and read.
#[tokio::test]
async fn send_and_read() {
    let store = store();
    let cancel = CancellationToken::new();
    register(&store, &cancel, "BlueLake").await;

    let sent = send_message(
        &store,
        &cancel,
        simple_send("BlueLake", &["GreenRiver"], "hello", "world"),
    )
    .await
    .unwrap();
    assert_eq!(sent.recipient_count, 1);

    let inbox = get_inbox(&store, &cancel, inbox_req("GreenRiver")).await.unwrap();
    assert_eq!(inbox.messages.len(), 1);
    assert_eq!(inbox.total, 1);
    let header = &inbox.messages[0];
    assert_eq!(header.from, "BlueLake");
    assert_eq!(header.subject, "hello");
    assert!(header.body.is_none(), "headers stay cheap without include_bodies");

    let view = read_message(
        &store,
        &cancel,
        ReadMessage {
            message_id: sent.message_id,
            agent: Some("GreenRiver".into()),
            mark_as_read: true,
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(view.body, "world");
    assert!(view.read_at.is_some());

    let unread = get_inbox(
        &store,
        &cancel,
        GetInbox {
            unread_only: true,
            ..inbox_req("GreenRiver")
        },
    )
    .await
    .unwrap();
    assert!(unread.messages.is_empty());
    assert_eq!(unread.total, 0);
}

/// S2 — the inbox hard cap.
#[tokio::test]
async fn inbox_cap() {
    let store = store();
    let cancel = CancellationToken::new();

    for i in 0..10 {
        send_message(
            &store,
            &cancel,
            simple_send("BlueLake", &["GreenRiver"], &format!("m{i}"), "body"),
        )
        .await
        .unwrap();
    }

    let inbox = get_inbox(
        &store,
        &cancel,
        GetInbox {
            limit: Some(20),
            ..inbox_req("GreenRiver")
        },
    )
    .await
    .unwrap();

    assert_eq!(inbox.messages.len(), 5, "limit=20 clamps to the hard cap");
    assert_eq!(inbox.total, 10);
    let subjects: Vec<&str> = inbox.messages.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, vec!["m9", "m8", "m7", "m6", "m5"], "newest first");
}

/// S3 — reservation conflicts are advisory.
#[tokio::test]
async fn reservation_conflict_is_advisory() {
    let store = store();
    let cancel = CancellationToken::new();

    reserve_files(
        &store,
        &cancel,
        ReserveFiles {
            agent: "BlueLake".into(),
            paths: vec!["src/a.ts".into()],
            reason: None,
            exclusive: true,
            ttl_seconds: Some(3600),
            force: false,
        },
    )
    .await
    .unwrap();

    let resp = reserve_files(
        &store,
        &cancel,
        ReserveFiles {
            agent: "GreenRiver".into(),
            paths: vec!["src/a.ts".into(), "src/b.ts".into()],
            reason: None,
            exclusive: true,
            ttl_seconds: Some(3600),
            force: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(resp.granted.len(), 2);
    assert_eq!(resp.conflicts.len(), 1);
    assert_eq!(resp.conflicts[0].path, "src/a.ts");
    assert_eq!(resp.conflicts[0].holder, "BlueLake");
    assert_eq!(resp.conflicts[0].pattern, "src/a.ts");
}

/// S4 — release by path is idempotent on the second call.
#[tokio::test]
async fn release_by_path() {
    let store = store();
    let cancel = CancellationToken::new();

    reserve_files(
        &store,
        &cancel,
        ReserveFiles {
            agent: "GreenRiver".into(),
            paths: vec!["src/a.ts".into(), "src/b.ts".into()],
            reason: None,
            exclusive: true,
            ttl_seconds: Some(3600),
            force: false,
        },
    )
    .await
    .unwrap();

    let release = |paths: Vec<String>| ReleaseFiles {
        agent: "GreenRiver".into(),
        paths: Some(paths),
        reservation_ids: None,
    };

    let first = release_files(&store, &cancel, release(vec!["src/a.ts".into()]))
        .await
        .unwrap();
    assert_eq!(first.released, 1);

    let second = release_files(&store, &cancel, release(vec!["src/a.ts".into()]))
        .await
        .unwrap();
    assert_eq!(second.released, 0, "already-released path matches nothing");
}

/// S5 — double acknowledgement returns the original timestamp.
#[tokio::test]
async fn ack_idempotence() {
    let store = store();
    let cancel = CancellationToken::new();

    let sent = send_message(
        &store,
        &cancel,
        SendMessage {
            ack_required: true,
            ..simple_send("BlueLake", &["GreenRiver"], "please confirm", "body")
        },
    )
    .await
    .unwrap();

    let first = acknowledge_message(&store, &cancel, sent.message_id, "GreenRiver")
        .await
        .unwrap();
    assert!(first.acknowledged);

    let second = acknowledge_message(&store, &cancel, sent.message_id, "GreenRiver")
        .await
        .unwrap();
    assert!(second.acknowledged);
    assert_eq!(
        first.acknowledged_at, second.acknowledged_at,
        "re-ack must return the original timestamp"
    );
}

/// S6 — cursor resumability: uncommitted reads are redelivered.
#[tokio::test]
async fn cursor_resumability() {
    let store = store();
    let cancel = CancellationToken::new();

    for i in 0..3 {
        send_message(
            &store,
            &cancel,
            simple_send("BlueLake", &["GreenRiver"], &format!("m{i}"), "body"),
        )
        .await
        .unwrap();
    }

    let cursor = Cursor::open(store.db(), &cancel, store.project_key(), "C")
        .await
        .unwrap();
    let (drained, offset) = cursor.next_batch(store.db(), &cancel, 10).await.unwrap();
    assert_eq!(drained.len(), 3);
    assert_eq!(offset, 3);
    // Crash before commit: drop the cursor without committing.
    drop(cursor);

    send_message(
        &store,
        &cancel,
        simple_send("BlueLake", &["GreenRiver"], "m3", "body"),
    )
    .await
    .unwrap();

    let mut reopened = Cursor::open(store.db(), &cancel, store.project_key(), "C")
        .await
        .unwrap();
    let (redelivered, _) = reopened.next_batch(store.db(), &cancel, 10).await.unwrap();
    assert_eq!(
        redelivered.iter().map(|e| e.seq).collect::<Vec<_>>(),
        vec![1, 2, 3, 4],
        "the same three events come back, plus the new one"
    );

    reopened.commit(store.db(), &cancel, 3).await.unwrap();
    let (tail, _) = reopened.next_batch(store.db(), &cancel, 10).await.unwrap();
    assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4]);
}

/// Messages survive a store reopen when persistent.
#[tokio::test]
async fn persistent_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let message_id = {
        let store = Store::open(tmp.path(), StoreConfig::default()).unwrap();
        register(&store, &cancel, "BlueLake").await;
        send_message(
            &store,
            &cancel,
            simple_send("BlueLake", &["GreenRiver"], "durable", "still here"),
        )
        .await
        .unwrap()
        .message_id
    };

    let store = Store::open(tmp.path(), StoreConfig::default()).unwrap();
    let view = read_message(
        &store,
        &cancel,
        ReadMessage {
            message_id,
            agent: Some("GreenRiver".into()),
            mark_as_read: false,
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(view.body, "still here");
}
