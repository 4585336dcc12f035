//! Runtime integration tests with scripted transport fakes.
//!
//! Exercises the delivery ladder (real-time first, REST fallback) and
//! the end-to-end open/send/receive flow against in-memory collaborators.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use waypost_core::{
    ChatConfig, ChatError, Conversation, ConversationId, CorrelationId, Counterpart, Message,
    MessageId, MessageStatus, UserId,
};
use waypost_store::{ChatHandle, ChatRuntime, ChatSnapshot};
use waypost_transport::{ChatApi, RealtimeChannel, TransportEvent};

fn confirmed(id: &str, sender: &str, receiver: &str, content: &str) -> Message {
    Message {
        status: MessageStatus::Confirmed { id: MessageId::new(id) },
        sender_id: UserId::new(sender),
        receiver_id: UserId::new(receiver),
        content: content.to_owned(),
        sent_at: Utc::now(),
        read: false,
    }
}

/// REST fake: records sends, optionally rejects them.
#[derive(Default)]
struct FakeApi {
    reject_sends: bool,
    sent: Mutex<Vec<String>>,
}

impl ChatApi for FakeApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        Ok(Vec::new())
    }

    async fn create_or_get_conversation(
        &self,
        counterpart: &UserId,
    ) -> Result<Conversation, ChatError> {
        let mut conversation = Conversation::new(
            Counterpart {
                user_id: counterpart.clone(),
                display_name: counterpart.0.clone(),
                avatar_url: None,
                online: false,
            },
            Utc::now(),
        );
        conversation.id = Some(ConversationId::new(format!("conv-{counterpart}")));
        Ok(conversation)
    }

    async fn fetch_messages(
        &self,
        _conversation: &ConversationId,
        _page: u32,
        _page_size: u32,
    ) -> Result<Vec<Message>, ChatError> {
        Ok(Vec::new())
    }

    async fn send_message(&self, receiver: &UserId, content: &str) -> Result<Message, ChatError> {
        if self.reject_sends {
            return Err(ChatError::Api("rest send refused".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(content.to_owned());
        }
        Ok(confirmed("rest-1", "me", &receiver.0, content))
    }

    async fn mark_read(&self, _message_ids: &[MessageId]) -> Result<(), ChatError> {
        Ok(())
    }

    async fn delete_conversation(&self, _conversation: &ConversationId) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Real-time fake with a scripted send outcome.
struct FakeRealtime {
    connected: AtomicBool,
    ack: bool,
}

impl FakeRealtime {
    fn acking() -> Self {
        Self { connected: AtomicBool::new(true), ack: true }
    }

    fn timing_out() -> Self {
        Self { connected: AtomicBool::new(true), ack: false }
    }

    fn down() -> Self {
        Self { connected: AtomicBool::new(false), ack: false }
    }
}

impl RealtimeChannel for FakeRealtime {
    async fn send(
        &self,
        receiver: &UserId,
        content: &str,
        _correlation_id: CorrelationId,
    ) -> Result<Message, ChatError> {
        if self.ack {
            Ok(confirmed("rt-1", "me", &receiver.0, content))
        } else {
            Err(ChatError::AckTimeout(Duration::from_millis(1)))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn spawn_session(
    api: FakeApi,
    realtime: FakeRealtime,
) -> (ChatHandle, tokio::sync::mpsc::Sender<TransportEvent>) {
    let (events_tx, events_rx) = tokio::sync::mpsc::channel(16);
    let (runtime, handle) = ChatRuntime::new(
        UserId::new("me"),
        ChatConfig::default(),
        api,
        realtime,
        events_rx,
    );
    tokio::spawn(runtime.run());
    (handle, events_tx)
}

/// Wait until the published snapshot satisfies `predicate`.
async fn wait_for(
    handle: &ChatHandle,
    predicate: impl Fn(&ChatSnapshot) -> bool,
) -> ChatSnapshot {
    let mut rx = handle.subscribe();
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return snapshot.clone();
                }
            }
            if rx.changed().await.is_err() {
                return ChatSnapshot::default();
            }
        }
    });
    deadline.await.unwrap_or_default()
}

#[tokio::test]
async fn send_confirms_over_realtime() {
    let (handle, _events) = spawn_session(FakeApi::default(), FakeRealtime::acking());

    let open = handle.open_conversation(Counterpart {
        user_id: UserId::new("bob"),
        display_name: "Bob".into(),
        avatar_url: None,
        online: true,
    });
    assert!(open.await.is_ok());
    let _ = wait_for(&handle, |s| s.selected.is_some()).await;

    assert!(handle.send_message("hi from the trail").await.is_ok());

    let snapshot = wait_for(&handle, |s| {
        s.messages.len() == 1 && !s.messages[0].is_pending()
    })
    .await;
    assert_eq!(
        snapshot.messages[0].canonical_id(),
        Some(&MessageId::new("rt-1"))
    );
}

#[tokio::test]
async fn ack_timeout_falls_back_to_rest() {
    let (handle, _events) = spawn_session(FakeApi::default(), FakeRealtime::timing_out());

    let _ = handle
        .open_conversation(Counterpart {
            user_id: UserId::new("bob"),
            display_name: "Bob".into(),
            avatar_url: None,
            online: true,
        })
        .await;
    let _ = wait_for(&handle, |s| s.selected.is_some()).await;
    let _ = handle.send_message("hello").await;

    let snapshot = wait_for(&handle, |s| {
        s.messages.len() == 1 && !s.messages[0].is_pending()
    })
    .await;
    // The confirmation came from the REST path.
    assert_eq!(
        snapshot.messages[0].canonical_id(),
        Some(&MessageId::new("rest-1"))
    );
}

#[tokio::test]
async fn disconnected_channel_goes_straight_to_rest() {
    let (handle, _events) = spawn_session(FakeApi::default(), FakeRealtime::down());

    let _ = handle
        .open_conversation(Counterpart {
            user_id: UserId::new("bob"),
            display_name: "Bob".into(),
            avatar_url: None,
            online: false,
        })
        .await;
    let _ = wait_for(&handle, |s| s.selected.is_some()).await;
    let _ = handle.send_message("offline still works").await;

    let snapshot =
        wait_for(&handle, |s| s.messages.len() == 1 && !s.messages[0].is_pending()).await;
    assert_eq!(snapshot.messages[0].canonical_id(), Some(&MessageId::new("rest-1")));
}

#[tokio::test]
async fn failure_on_both_paths_rolls_back_and_surfaces_error() {
    let api = FakeApi { reject_sends: true, ..FakeApi::default() };
    let (handle, _events) = spawn_session(api, FakeRealtime::down());

    let _ = handle
        .open_conversation(Counterpart {
            user_id: UserId::new("bob"),
            display_name: "Bob".into(),
            avatar_url: None,
            online: false,
        })
        .await;
    let _ = wait_for(&handle, |s| s.selected.is_some()).await;
    let _ = handle.send_message("doomed").await;

    let snapshot = wait_for(&handle, |s| s.error.is_some()).await;
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.conversations[0].last_message.is_none());
}

#[tokio::test]
async fn send_without_selection_is_rejected_before_any_io() {
    let (handle, _events) = spawn_session(FakeApi::default(), FakeRealtime::acking());

    assert_eq!(handle.send_message("hi").await, Err(ChatError::NoActiveConversation));
    assert_eq!(handle.send_message("  ").await, Err(ChatError::EmptyMessage));
}

#[tokio::test]
async fn inbound_event_reaches_the_open_thread() {
    let (handle, events) = spawn_session(FakeApi::default(), FakeRealtime::acking());

    let _ = handle
        .open_conversation(Counterpart {
            user_id: UserId::new("bob"),
            display_name: "Bob".into(),
            avatar_url: None,
            online: true,
        })
        .await;
    let _ = wait_for(&handle, |s| s.selected.is_some()).await;

    let _ = events
        .send(TransportEvent::NewMessage(confirmed("m1", "bob", "me", "hello back")))
        .await;

    let snapshot = wait_for(&handle, |s| s.messages.len() == 1).await;
    // Open conversation: the message is read immediately, unread stays 0.
    assert!(snapshot.messages[0].read);
    assert_eq!(snapshot.conversations[0].unread_count, 0);
}

#[tokio::test]
async fn connection_loss_flips_the_flag_only() {
    let (handle, events) = spawn_session(FakeApi::default(), FakeRealtime::acking());

    let _ = events
        .send(TransportEvent::ConnectionChanged {
            connected: false,
            error: Some("socket reset".into()),
        })
        .await;

    let snapshot = wait_for(&handle, |s| !s.connection.connected).await;
    assert_eq!(snapshot.connection.last_error.as_deref(), Some("socket reset"));
}
