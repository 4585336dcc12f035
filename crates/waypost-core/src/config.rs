//! Tunable constants for the chat client.
//!
//! All timeouts and bounds live here so call sites never hard-code them.

use std::time::Duration;

/// Default wait for a real-time send acknowledgment before falling back
/// to REST (5 seconds: long enough for a slow round trip, short enough
/// that the composer does not appear hung).
pub const DEFAULT_SEND_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default initial reconnect backoff (1 second).
pub const DEFAULT_RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default reconnect backoff ceiling (30 seconds).
pub const DEFAULT_RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Default page size for message-history fetches.
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

/// Configuration for the chat store and transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Bound on waiting for a real-time ack before the REST fallback.
    pub send_ack_timeout: Duration,
    /// First delay after an unexpected disconnect.
    pub reconnect_initial_backoff: Duration,
    /// Ceiling for the doubling reconnect backoff.
    pub reconnect_max_backoff: Duration,
    /// Messages per history page.
    pub history_page_size: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            send_ack_timeout: DEFAULT_SEND_ACK_TIMEOUT,
            reconnect_initial_backoff: DEFAULT_RECONNECT_INITIAL_BACKOFF,
            reconnect_max_backoff: DEFAULT_RECONNECT_MAX_BACKOFF,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }
}

impl ChatConfig {
    /// Next backoff delay: doubled, capped at the configured ceiling.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.reconnect_max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let config = ChatConfig::default();
        let mut delay = config.reconnect_initial_backoff;

        delay = config.next_backoff(delay);
        assert_eq!(delay, Duration::from_secs(2));

        for _ in 0..10 {
            delay = config.next_backoff(delay);
        }
        assert_eq!(delay, config.reconnect_max_backoff);
    }
}
