// Copyright 2024 Gigi Team.
//
// Tests for MessageStore

use parley_store::{MessageId, MessageTarget, NewMessage, Store, StoreConfig, StoredMessage, UserId};
use tempfile::NamedTempFile;

async fn create_test_store(path: &NamedTempFile) -> Store {
    Store::open(StoreConfig {
        db_path: path.path().to_path_buf(),
    })
    .await
    .expect("Failed to open store")
}

fn direct(from: &str, to: &str, content: &str) -> NewMessage {
    NewMessage {
        sender_id: UserId::from(from),
        target: MessageTarget::Direct(UserId::from(to)),
        content: content.to_string(),
    }
}

async fn send(store: &Store, from: &str, to: &str, content: &str) -> StoredMessage {
    store
        .messages()
        .insert(direct(from, to, content))
        .await
        .expect("Failed to insert message")
}

#[tokio::test]
async fn test_insert_and_get_message() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    let stored = send(&store, "alice", "bob", "Hello Bob").await;
    assert!(!stored.is_read);
    assert!(stored.read_at.is_none());
    assert_eq!(stored.receiver_id(), Some(&UserId::from("bob")));
    assert_eq!(stored.group_id(), None);

    let fetched = store
        .messages()
        .get(&stored.id)
        .await
        .expect("Failed to get message")
        .expect("Message should exist");
    assert_eq!(fetched, stored);

    let missing = store
        .messages()
        .get(&MessageId::from("nope"))
        .await
        .expect("Failed to query message");
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_timestamps_strictly_increase() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    let mut prev = None;
    for i in 0..20 {
        let msg = send(&store, "alice", "bob", &format!("msg {}", i)).await;
        if let Some(prev) = prev {
            assert!(msg.created_at > prev);
        }
        prev = Some(msg.created_at);
    }
}

#[tokio::test]
async fn test_clock_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let first = {
        let store = create_test_store(&temp_file).await;
        send(&store, "alice", "bob", "before").await
    };

    let store = create_test_store(&temp_file).await;
    let second = send(&store, "alice", "bob", "after").await;
    assert!(second.created_at > first.created_at);
}

#[tokio::test]
async fn test_direct_history_is_ascending_and_scoped() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    send(&store, "alice", "bob", "one").await;
    send(&store, "bob", "alice", "two").await;
    send(&store, "alice", "carol", "elsewhere").await;
    send(&store, "alice", "bob", "three").await;

    let history = store
        .messages()
        .direct_history(&UserId::from("bob"), &UserId::from("alice"))
        .await
        .expect("Failed to load history");

    let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_mark_read_only_transitions_once() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;
    let messages = store.messages();

    let msg = send(&store, "alice", "bob", "read me").await;

    assert!(messages.mark_read(&msg.id).await.unwrap());
    let first = messages.get(&msg.id).await.unwrap().unwrap();
    assert!(first.is_read);
    let stamped = first.read_at.expect("read_at should be set");

    assert!(!messages.mark_read(&msg.id).await.unwrap());
    let second = messages.get(&msg.id).await.unwrap().unwrap();
    assert!(second.is_read);
    assert_eq!(second.read_at, Some(stamped));
}

#[tokio::test]
async fn test_unread_counts_ignore_groups_and_sent_messages() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;
    let messages = store.messages();
    let bob = UserId::from("bob");

    send(&store, "alice", "bob", "a1").await;
    send(&store, "alice", "bob", "a2").await;
    send(&store, "carol", "bob", "c1").await;
    send(&store, "bob", "alice", "reply").await;
    messages
        .insert(NewMessage {
            sender_id: UserId::from("alice"),
            target: MessageTarget::Group("g1".into()),
            content: "group".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(messages.unread_count(&bob).await.unwrap(), 3);
    assert_eq!(
        messages
            .unread_from(&bob, &UserId::from("alice"))
            .await
            .unwrap(),
        2
    );

    let flipped = messages
        .mark_conversation_read(&bob, &UserId::from("alice"))
        .await
        .unwrap();
    assert_eq!(flipped, 2);
    assert_eq!(messages.unread_count(&bob).await.unwrap(), 1);

    let again = messages
        .mark_conversation_read(&bob, &UserId::from("alice"))
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn test_direct_summaries_one_per_counterpart() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;
    let alice = UserId::from("alice");

    send(&store, "alice", "bob", "hi bob").await;
    send(&store, "bob", "alice", "hi alice").await;
    send(&store, "carol", "alice", "from carol").await;
    send(&store, "bob", "alice", "latest from bob").await;
    send(&store, "bob", "carol", "not alice's business").await;

    let summaries = store.messages().direct_summaries(&alice).await.unwrap();
    assert_eq!(summaries.len(), 2);

    assert_eq!(summaries[0].counterpart_id, UserId::from("bob"));
    assert_eq!(summaries[0].last_content, "latest from bob");
    assert_eq!(summaries[0].unread_count, 2);

    assert_eq!(summaries[1].counterpart_id, UserId::from("carol"));
    assert_eq!(summaries[1].last_content, "from carol");
    assert_eq!(summaries[1].unread_count, 1);
    assert!(summaries[0].last_at > summaries[1].last_at);
}

#[tokio::test]
async fn test_group_history_and_latest() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;
    let messages = store.messages();
    let group = parley_store::GroupId::from("g1");

    assert!(messages.latest_group_message(&group).await.unwrap().is_none());

    for content in ["first", "second", "third"] {
        messages
            .insert(NewMessage {
                sender_id: UserId::from("alice"),
                target: MessageTarget::Group(group.clone()),
                content: content.to_string(),
            })
            .await
            .unwrap();
    }

    let history = messages.group_history(&group).await.unwrap();
    let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    assert!(history.iter().all(|m| m.receiver_id().is_none()));

    let latest = messages.latest_group_message(&group).await.unwrap().unwrap();
    assert_eq!(latest.content, "third");
}
