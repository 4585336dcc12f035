//! Pure reconciliation helpers.
//!
//! The store funnels every message arrival - optimistic append, server
//! ack, live push, history fetch, reconnect replay - through these
//! functions so the ordering and uniqueness invariants hold no matter how
//! arrivals interleave:
//!
//! - a conversation's message list is ascending by creation time, ties
//!   keeping insertion order
//! - at most one message per canonical id
//!
//! All helpers accept empty inputs and never panic.

use chrono::{DateTime, Utc};

use crate::model::{Conversation, CorrelationId, Message, UserId};

/// Insert `incoming` into `messages`, preserving the uniqueness and
/// ordering invariants.
///
/// When `correlation` is supplied and a pending message carries it, the
/// pending entry is replaced in place (optimistic send turning into its
/// confirmation), or simply removed if the confirmed copy already entered
/// the list by another path. Otherwise the message is appended unless an
/// entry with the same canonical id already exists (duplicate delivery,
/// e.g. a reconnect replay racing a history fetch).
///
/// Returns true if the list changed.
pub fn reconcile_incoming(
    messages: &mut Vec<Message>,
    incoming: Message,
    correlation: Option<CorrelationId>,
) -> bool {
    if let Some(correlation_id) = correlation
        && let Some(pos) = messages.iter().position(|m| m.correlation_id() == Some(correlation_id))
    {
        // The confirmed copy may have raced in ahead of the ack (history
        // fetch, reconnect replay). Dropping the pending entry keeps the
        // one-copy-per-canonical-id invariant.
        if let Some(id) = incoming.canonical_id()
            && messages.iter().any(|m| m.canonical_id() == Some(id))
        {
            messages.remove(pos);
        } else {
            messages[pos] = incoming;
            ensure_ordered(messages);
        }
        return true;
    }

    if let Some(id) = incoming.canonical_id()
        && messages.iter().any(|m| m.canonical_id() == Some(id))
    {
        return false;
    }

    messages.push(incoming);
    ensure_ordered(messages);
    true
}

/// Remove the pending message carrying `correlation_id`.
///
/// Rollback primitive for a send that failed on every transport path.
/// Returns true if a message was removed.
pub fn remove_by_correlation(messages: &mut Vec<Message>, correlation_id: CorrelationId) -> bool {
    let before = messages.len();
    messages.retain(|m| m.correlation_id() != Some(correlation_id));
    messages.len() != before
}

/// Restore ascending creation-time order if an out-of-order arrival broke
/// it. Stable, so equal timestamps keep their insertion order.
fn ensure_ordered(messages: &mut [Message]) {
    if messages.windows(2).any(|w| w[0].sent_at > w[1].sent_at) {
        messages.sort_by_key(|m| m.sent_at);
    }
}

/// Stable sort, most recent activity first.
///
/// A conversation that has never seen a message orders by creation time.
pub fn sort_conversations(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.activity_time().cmp(&a.activity_time()));
}

/// Index of the first conversation whose counterpart is `user_id`.
pub fn position_by_counterpart(conversations: &[Conversation], user_id: &UserId) -> Option<usize> {
    conversations.iter().position(|c| &c.counterpart.user_id == user_id)
}

/// Parse an RFC 3339 timestamp, falling back to the current time.
///
/// The fallback keeps a malformed server timestamp from poisoning the
/// recency sort.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
