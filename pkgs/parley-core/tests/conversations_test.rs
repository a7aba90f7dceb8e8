// Tests for the conversation aggregator

mod common;

use parley_core::ChatError;
use parley_store::UserId;

#[tokio::test]
async fn test_direct_and_group_items_ranked_by_activity() {
    let h = common::harness().await;
    let a = h.user("a").await;
    let b = h.user("b").await;
    let c = h.user("c").await;
    h.befriend(&a, &b).await;
    h.befriend(&c, &a).await;

    // t0: group created, no messages
    let group = h.group(&a, "G", &[]).await;
    // t1: a -> b
    h.service.send_direct(&a, &b, "hello b").await.unwrap();
    // t2: c -> a
    h.service.send_direct(&c, &a, "hello a").await.unwrap();

    let items = h.service.list_conversations(&a).await.unwrap();
    let ids: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
    assert_eq!(ids, vec!["c".to_string(), "b".to_string(), group.id.to_string()]);

    let with_c = &items[0];
    assert!(!with_c.is_group);
    assert_eq!(with_c.name, "c");
    assert_eq!(with_c.last_message.as_deref(), Some("hello a"));
    assert_eq!(with_c.unread_count, 1);

    let with_b = &items[1];
    assert_eq!(with_b.last_message.as_deref(), Some("hello b"));
    assert_eq!(with_b.unread_count, 0);

    let g = &items[2];
    assert!(g.is_group);
    assert_eq!(g.last_message, None);
    assert_eq!(g.last_message_timestamp, group.created_at);
    assert_eq!(g.unread_count, 0);
    assert_eq!(g.members_id.as_deref(), Some(&[a.clone()][..]));
    assert_eq!(g.creator_id.as_ref(), Some(&a));

    assert!(items[0].last_message_timestamp > items[1].last_message_timestamp);
    assert!(items[1].last_message_timestamp > items[2].last_message_timestamp);
}

#[tokio::test]
async fn test_one_item_per_counterpart() {
    let h = common::harness().await;
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.befriend(&alice, &bob).await;

    for i in 0..5 {
        h.service
            .send_direct(&alice, &bob, &format!("a{}", i))
            .await
            .unwrap();
        h.service
            .send_direct(&bob, &alice, &format!("b{}", i))
            .await
            .unwrap();
    }

    let items = h.service.list_conversations(&alice).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "bob");
    assert_eq!(items[0].last_message.as_deref(), Some("b4"));
    assert_eq!(items[0].unread_count, 5);

    let items = h.service.list_conversations(&bob).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unread_count, 5);
}

#[tokio::test]
async fn test_group_message_moves_group_up() {
    let h = common::harness().await;
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.befriend(&alice, &bob).await;
    let group = h.group(&alice, "Team", &[bob.clone()]).await;

    h.service.send_direct(&bob, &alice, "direct").await.unwrap();
    let posted = h.service.send_group(&bob, &group.id, "to the team").await.unwrap();

    let items = h.service.list_conversations(&alice).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items[0].is_group);
    assert_eq!(items[0].last_message.as_deref(), Some("to the team"));
    assert_eq!(items[0].last_message_timestamp, posted.created_at);
    // Group messages never count as unread
    assert_eq!(items[0].unread_count, 0);
    assert_eq!(items[1].id, "bob");
}

#[tokio::test]
async fn test_user_without_history_has_empty_feed() {
    let h = common::harness().await;
    let loner = h.user("loner").await;

    assert!(h.service.list_conversations(&loner).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conversation_with() {
    let h = common::harness().await;
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.befriend(&alice, &bob).await;

    // No messages yet: falls back to the counterpart's creation time
    let empty = h.service.conversation_with(&alice, &bob).await.unwrap();
    assert_eq!(empty.last_message, None);
    assert_eq!(empty.unread_count, 0);
    let profile = h.store.users().get(&bob).await.unwrap().unwrap();
    assert_eq!(empty.last_message_timestamp, profile.created_at);

    h.service.send_direct(&bob, &alice, "one").await.unwrap();
    h.service.send_direct(&bob, &alice, "two").await.unwrap();

    let item = h.service.conversation_with(&alice, &bob).await.unwrap();
    assert_eq!(item.last_message.as_deref(), Some("two"));
    assert_eq!(item.unread_count, 2);
    assert_eq!(item.name, "bob");

    let err = h
        .service
        .conversation_with(&alice, &UserId::from("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}
