use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{group::TabGroup, tab::Tab};

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Payload of the tabs-changed channel. Handles are the live objects.
#[derive(Debug, Clone, Default)]
pub struct TabChangeEvent {
    pub opened: Vec<Tab>,
    /// Already detached: readable, but never resolvable for requests.
    pub closed: Vec<Tab>,
    pub changed: Vec<Tab>,
}

/// Payload of the groups-changed channel.
#[derive(Debug, Clone, Default)]
pub struct TabGroupChangeEvent {
    pub opened: Vec<TabGroup>,
    pub closed: Vec<TabGroup>,
    pub changed: Vec<TabGroup>,
}

impl TabGroupChangeEvent {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty() && self.changed.is_empty()
    }
}

pub(crate) struct NotificationBus {
    groups: broadcast::Sender<TabGroupChangeEvent>,
    tabs: broadcast::Sender<TabChangeEvent>,
}

impl NotificationBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (groups, _) = broadcast::channel(capacity.max(1));
        let (tabs, _) = broadcast::channel(capacity.max(1));
        Self { groups, tabs }
    }

    pub(crate) fn emit_groups(&self, event: TabGroupChangeEvent) {
        // No subscribers is not an error.
        let _ = self.groups.send(event);
    }

    pub(crate) fn emit_tabs(&self, event: TabChangeEvent) {
        let _ = self.tabs.send(event);
    }

    pub(crate) fn subscribe_groups(&self) -> broadcast::Receiver<TabGroupChangeEvent> {
        self.groups.subscribe()
    }

    pub(crate) fn subscribe_tabs(&self) -> broadcast::Receiver<TabChangeEvent> {
        self.tabs.subscribe()
    }

    pub(crate) fn group_stream(&self) -> BroadcastStream<TabGroupChangeEvent> {
        BroadcastStream::new(self.groups.subscribe())
    }

    pub(crate) fn tab_stream(&self) -> BroadcastStream<TabChangeEvent> {
        BroadcastStream::new(self.tabs.subscribe())
    }
}
