//! # Client Events
//!
//! A broadcast channel for observing what the client is doing: requests going
//! out, rate limits, edit attempts and silent re-logins. Every clone of a
//! client shares one broadcaster, so a subscriber sees activity from all of
//! them.

use crate::edit::ExactScrobbleEdit;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

/// Method and path of a request, for event consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    /// Path and query, without scheme and host
    pub path: String,
}

impl RequestInfo {
    pub fn from_url(method: &str, url: &str) -> Self {
        let path = match url.parse::<http_types::Url>() {
            Ok(parsed) => match parsed.query() {
                Some(query) => format!("{}?{query}", parsed.path()),
                None => parsed.path().to_string(),
            },
            Err(_) => url.to_string(),
        };
        Self {
            method: method.to_string(),
            path,
        }
    }

    /// Get a short description of the request for logging
    pub fn short_description(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// How a rate limit was recognised
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateLimitType {
    /// HTTP 429 Too Many Requests
    Http429,
    /// HTTP 403 Forbidden on an authenticated request
    Http403,
    /// A rate limit pattern in the response body
    ResponsePattern,
}

/// Event type to describe client activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    RequestStarted {
        request: RequestInfo,
    },
    RequestCompleted {
        request: RequestInfo,
        status_code: u16,
        duration_ms: u64,
    },
    /// Rate limiting detected; `delay_seconds` is what the backend asked for
    RateLimited {
        delay_seconds: u64,
        request: Option<RequestInfo>,
        rate_limit_type: RateLimitType,
    },
    /// One submission of a concrete scrobble edit finished
    EditAttempted {
        edit: ExactScrobbleEdit,
        success: bool,
        error_message: Option<String>,
        duration_ms: u64,
    },
    /// The session was replaced by a silent re-login
    SessionRenewed {
        username: String,
    },
}

/// Type alias for the broadcast receiver
pub type ClientEventReceiver = broadcast::Receiver<ClientEvent>;

/// Type alias for the watch receiver
pub type ClientEventWatcher = watch::Receiver<Option<ClientEvent>>;

/// Event fan-out shared by all clones of a client
pub struct SharedEventBroadcaster {
    event_tx: broadcast::Sender<ClientEvent>,
    last_event_tx: watch::Sender<Option<ClientEvent>>,
}

impl SharedEventBroadcaster {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (last_event_tx, _) = watch::channel(None);

        Self {
            event_tx,
            last_event_tx,
        }
    }

    /// Broadcast an event to all subscribers. Dropped when nobody listens.
    pub fn broadcast_event(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event.clone());
        self.last_event_tx.send_replace(Some(event));
    }

    pub fn subscribe(&self) -> ClientEventReceiver {
        self.event_tx.subscribe()
    }

    pub fn watch(&self) -> ClientEventWatcher {
        self.last_event_tx.subscribe()
    }

    pub fn latest_event(&self) -> Option<ClientEvent> {
        self.last_event_tx.borrow().clone()
    }
}

impl Default for SharedEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEventBroadcaster")
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_info_strips_host() {
        let info = RequestInfo::from_url("GET", "https://www.last.fm/user/u/library?page=2");
        assert_eq!(info.path, "/user/u/library?page=2");
        assert_eq!(info.short_description(), "GET /user/u/library?page=2");
    }

    #[tokio::test]
    async fn latest_event_is_kept_without_subscribers() {
        let broadcaster = SharedEventBroadcaster::new();
        assert_eq!(broadcaster.latest_event(), None);

        broadcaster.broadcast_event(ClientEvent::SessionRenewed {
            username: "u".to_string(),
        });
        assert!(matches!(
            broadcaster.latest_event(),
            Some(ClientEvent::SessionRenewed { .. })
        ));

        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast_event(ClientEvent::RequestStarted {
            request: RequestInfo::from_url("GET", "https://www.last.fm/login"),
        });
        assert!(matches!(
            rx.recv().await.unwrap(),
            ClientEvent::RequestStarted { .. }
        ));
    }
}
