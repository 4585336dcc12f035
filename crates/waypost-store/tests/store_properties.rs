//! Property-based tests for the chat store.

use chrono::{DateTime, TimeDelta, Utc};
use proptest::prelude::*;
use waypost_core::{
    Conversation, ConversationId, Counterpart, Message, MessageId, MessageStatus, UserId,
};
use waypost_store::{ChatStore, StoreEvent};

fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

fn inbound(sender: &str, id: u32, offset_secs: i64) -> Message {
    Message {
        status: MessageStatus::Confirmed { id: MessageId::new(format!("{sender}-m{id}")) },
        sender_id: UserId::new(sender),
        receiver_id: UserId::new("me"),
        content: format!("msg {id}"),
        sent_at: base_time() + TimeDelta::seconds(offset_secs),
        read: false,
    }
}

fn seeded_store(counterparts: &[&str]) -> ChatStore {
    let mut store = ChatStore::new(UserId::new("me"));
    let _ = store.load_conversations();
    let conversations = counterparts
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut conversation = Conversation::new(
                Counterpart {
                    user_id: UserId::new(*name),
                    display_name: (*name).to_owned(),
                    avatar_url: None,
                    online: false,
                },
                base_time() - TimeDelta::hours(i as i64 + 1),
            );
            conversation.id = Some(ConversationId::new(format!("c{i}")));
            conversation
        })
        .collect();
    let _ = store.handle(StoreEvent::ConversationsLoaded { token: 1, result: Ok(conversations) });
    store
}

/// Property: arbitrary interleavings of inbound messages (with replays)
/// never produce a duplicate canonical id or break time ordering in the
/// open thread.
#[test]
fn prop_open_thread_stays_unique_and_ordered() {
    proptest!(|(arrivals in prop::collection::vec((0u32..15, -300i64..300), 1..80))| {
        let mut store = seeded_store(&["bob"]);
        let _ = store.open_conversation(Counterpart {
            user_id: UserId::new("bob"),
            display_name: "bob".into(),
            avatar_url: None,
            online: false,
        });

        for (id, offset) in &arrivals {
            let _ = store.handle(StoreEvent::MessageReceived(inbound("bob", *id, *offset)));
        }

        let mut ids: Vec<String> = store
            .messages()
            .iter()
            .filter_map(|m| m.canonical_id().map(|id| id.0.clone()))
            .collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), total);

        for pair in store.messages().windows(2) {
            prop_assert!(pair[0].sent_at <= pair[1].sent_at);
        }
    });
}

/// Property: for a deselected conversation, N distinct inbound messages
/// raise unread by exactly N; the open conversation stays at zero.
#[test]
fn prop_unread_accounting() {
    proptest!(|(count in 1u32..20)| {
        let mut store = seeded_store(&["alice", "bob"]);
        let _ = store.open_conversation(Counterpart {
            user_id: UserId::new("alice"),
            display_name: "alice".into(),
            avatar_url: None,
            online: false,
        });

        for i in 0..count {
            let _ = store.handle(StoreEvent::MessageReceived(inbound("bob", i, i as i64)));
        }

        let bob = store
            .conversations()
            .iter()
            .find(|c| c.counterpart.user_id == UserId::new("bob"));
        prop_assert_eq!(bob.map(|c| c.unread_count), Some(count));

        let alice = store
            .conversations()
            .iter()
            .find(|c| c.counterpart.user_id == UserId::new("alice"));
        prop_assert_eq!(alice.map(|c| c.unread_count), Some(0));

        // Opening bob resets to exactly zero.
        let _ = store.open_conversation(Counterpart {
            user_id: UserId::new("bob"),
            display_name: "bob".into(),
            avatar_url: None,
            online: false,
        });
        let bob = store
            .conversations()
            .iter()
            .find(|c| c.counterpart.user_id == UserId::new("bob"));
        prop_assert_eq!(bob.map(|c| c.unread_count), Some(0));
    });
}

/// Property: after any sequence of inbound messages, the conversation
/// list is ordered by activity, most recent first, and the conversation
/// that received the latest message is at the front.
#[test]
fn prop_conversation_recency() {
    proptest!(|(arrivals in prop::collection::vec((0usize..3, 0u32..50), 1..60))| {
        let mut store = seeded_store(&["alice", "bob", "carol"]);
        let names = ["alice", "bob", "carol"];

        let mut last_sender = None;
        let mut delivered = std::collections::HashSet::new();
        for (step, (who, id)) in arrivals.iter().enumerate() {
            // Timestamps strictly increase with the step, so every message
            // that is not a replay becomes the freshest activity.
            let message = inbound(names[*who], *id, step as i64);
            let replay = !delivered.insert((*who, *id));
            let _ = store.handle(StoreEvent::MessageReceived(message));
            if !replay {
                last_sender = Some(names[*who]);
            }
        }

        for pair in store.conversations().windows(2) {
            prop_assert!(pair[0].activity_time() >= pair[1].activity_time());
        }
        if let Some(sender) = last_sender {
            prop_assert_eq!(store.conversations()[0].counterpart.user_id.0.as_str(), sender);
        }
    });
}
