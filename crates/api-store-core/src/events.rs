//! Process-global registry of live WebSocket channels and the fan-out that
//! delivers mutation events to the subscribers authorized to see them.

use crate::model::Event;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub type ChannelId = Uuid;

#[derive(Clone)]
pub struct ChannelInfo {
    pub url: String,
    pub user: Option<String>,
    pub sid: Option<String>,
    sender: UnboundedSender<String>,
}

/// Who a notification is allowed to reach: matched by URL pattern and,
/// when present, further restricted to a set of user keys (plus the
/// default user in single-user mode, which always sees everything).
pub struct NotifyFilter<'a> {
    pub url: &'a str,
    pub users: Option<&'a [String]>,
}

#[derive(Default)]
pub struct WsClients {
    channels: DashMap<ChannelId, ChannelInfo>,
}

impl WsClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, url: String, user: Option<String>, sid: Option<String>, sender: UnboundedSender<String>) -> ChannelId {
        let id = Uuid::new_v4();
        self.channels.insert(id, ChannelInfo { url, user, sid, sender });
        id
    }

    pub fn unregister(&self, id: &ChannelId) {
        self.channels.remove(id);
    }

    pub fn close_by_url(&self, url: &str) {
        self.channels.retain(|_, c| c.url != url);
    }

    /// Drops every channel, used during graceful shutdown to drain
    /// subscribers before the process exits.
    pub fn close_all(&self) {
        self.channels.clear();
    }

    pub fn count(&self, url: &str) -> usize {
        self.channels.iter().filter(|c| c.url == url).count()
    }

    pub fn user_by_channel(&self, id: &ChannelId) -> Option<String> {
        self.channels.get(id).and_then(|c| c.user.clone())
    }

    /// Snapshot iteration: `dashmap`'s `.iter()` already locks
    /// per-shard rather than globally, so a concurrent register/unregister
    /// during fan-out cannot deadlock or be observed half-applied.
    fn matching_channels(&self, filter: &NotifyFilter<'_>) -> Vec<ChannelId> {
        self.channels
            .iter()
            .filter(|entry| url_matches(filter.url, &entry.value().url))
            .filter(|entry| authorized(filter.users, entry.value().user.as_deref()))
            .map(|entry| *entry.key())
            .collect()
    }

    fn send(&self, id: &ChannelId, payload: &str) {
        let closed = match self.channels.get(id) {
            Some(c) => c.sender.send(payload.to_string()).is_err(),
            None => return,
        };
        if closed {
            self.unregister(id);
        }
    }
}

const DEFAULT_USER_KEY: &str = "default";

fn authorized(users: Option<&[String]>, channel_user: Option<&str>) -> bool {
    match users {
        None => true,
        Some(allowed) => match channel_user {
            Some(u) => u == DEFAULT_USER_KEY || allowed.iter().any(|a| a == u),
            None => false,
        },
    }
}

/// URL matching rules: exact match, or `S` names a collection
/// and `U` is `S/<one-segment>` (a member of that collection), with
/// `?alt=media` treated as part of the URL so distinct `alt` values are
/// distinct subscriptions.
pub fn url_matches(notification_url: &str, subscription_url: &str) -> bool {
    if notification_url == subscription_url {
        return true;
    }
    let (sub_path, sub_query) = split_query(subscription_url);
    let (notif_path, notif_query) = split_query(notification_url);
    if sub_query != notif_query {
        return false;
    }
    if let Some(rest) = notif_path.strip_prefix(sub_path) {
        if let Some(segment) = rest.strip_prefix('/') {
            return !segment.is_empty() && !segment.contains('/');
        }
    }
    false
}

fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

pub struct EventBus {
    clients: Arc<WsClients>,
}

impl EventBus {
    pub fn new(clients: Arc<WsClients>) -> Self {
        Self { clients }
    }

    /// Delivers `event` to every channel matching `filter`. Best-effort: a
    /// send failure unregisters the channel instead of erroring the caller.
    pub fn notify(&self, event: &Event, filter: NotifyFilter<'_>) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize event");
                return;
            }
        };
        for id in self.clients.matching_channels(&filter) {
            self.clients.send(&id, &payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_url_matches() {
        assert!(url_matches("/files/F1", "/files/F1"));
    }

    #[test]
    fn collection_subscriber_sees_member_change() {
        assert!(url_matches("/files/F1", "/files"));
        assert!(!url_matches("/files/F1/revisions", "/files"));
    }

    #[test]
    fn distinct_alt_values_are_distinct_subscriptions() {
        assert!(!url_matches("/files/P1?alt=media", "/files/P1"));
        assert!(url_matches("/files/P1?alt=media", "/files/P1?alt=media"));
    }

    #[test]
    fn unrelated_paths_do_not_match() {
        assert!(!url_matches("/history", "/files"));
    }

    #[tokio::test]
    async fn notify_reaches_only_authorized_matching_channel() {
        let clients = Arc::new(WsClients::new());
        let bus = EventBus::new(Arc::clone(&clients));

        let (tx1, mut rx1) = tokio::sync::mpsc::unbounded_channel();
        let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
        clients.register("/files".to_string(), Some("u1".to_string()), None, tx1);
        clients.register("/files".to_string(), Some("u2".to_string()), None, tx2);

        let event = Event::new(crate::model::EventOperation::Created, "File", "F1", None);
        bus.notify(&event, NotifyFilter { url: "/files/F1", users: Some(&["u1".to_string()]) });

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }
}
