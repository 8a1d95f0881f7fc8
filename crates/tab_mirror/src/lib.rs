use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared::{
    domain::{GroupId, TabAddress, ViewColumn},
    protocol::{AuthorityNotification, GroupRecord, TabOperation, TabOperationKind},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, warn};

pub mod error;
mod events;
mod group;
mod tab;
pub mod transport;

pub use error::{MirrorError, ProtocolViolation, ResolutionFailure};
pub use events::{TabChangeEvent, TabGroupChangeEvent, DEFAULT_EVENT_CAPACITY};
pub use group::TabGroup;
pub use tab::{Tab, TabKind};

use events::NotificationBus;

/// Requests the mirror forwards to the side that owns the real layout.
#[async_trait]
pub trait EditorTabsAuthority: Send + Sync {
    /// Resolves to `false` when not every tab was closed (e.g. the user kept
    /// unsaved changes).
    async fn close_tabs(&self, tabs: Vec<TabAddress>, preserve_focus: bool) -> Result<bool>;
    async fn close_groups(&self, group_ids: Vec<GroupId>, preserve_focus: bool) -> Result<bool>;
    async fn move_tab(
        &self,
        tab: TabAddress,
        index: usize,
        view_column: ViewColumn,
        preserve_focus: bool,
    ) -> Result<()>;
}

pub struct MissingEditorTabsAuthority;

#[async_trait]
impl EditorTabsAuthority for MissingEditorTabsAuthority {
    async fn close_tabs(&self, _tabs: Vec<TabAddress>, _preserve_focus: bool) -> Result<bool> {
        Err(anyhow!("editor authority is unavailable"))
    }

    async fn close_groups(
        &self,
        _group_ids: Vec<GroupId>,
        _preserve_focus: bool,
    ) -> Result<bool> {
        Err(anyhow!("editor authority is unavailable"))
    }

    async fn move_tab(
        &self,
        _tab: TabAddress,
        _index: usize,
        _view_column: ViewColumn,
        _preserve_focus: bool,
    ) -> Result<()> {
        Err(anyhow!("editor authority is unavailable"))
    }
}

pub(crate) struct StoreCell {
    state: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    groups: Vec<TabGroup>,
    active_group_id: Option<GroupId>,
}

impl StoreCell {
    pub(crate) fn is_active_group(&self, group_id: GroupId) -> bool {
        self.state.read().active_group_id == Some(group_id)
    }

    fn find_group(&self, group_id: GroupId) -> Option<TabGroup> {
        self.state
            .read()
            .groups
            .iter()
            .find(|group| group.group_id() == group_id)
            .cloned()
    }
}

/// Read-only projection of the authority's editor groups and tabs.
pub struct EditorTabsMirror {
    authority: Arc<dyn EditorTabsAuthority>,
    store: Arc<StoreCell>,
    bus: NotificationBus,
}

impl EditorTabsMirror {
    pub fn new(authority: Arc<dyn EditorTabsAuthority>) -> Arc<Self> {
        Self::with_event_capacity(authority, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(
        authority: Arc<dyn EditorTabsAuthority>,
        event_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            authority,
            store: Arc::new(StoreCell {
                state: RwLock::new(StoreState::default()),
            }),
            bus: NotificationBus::new(event_capacity),
        })
    }

    pub fn groups(&self) -> Vec<TabGroup> {
        self.store.state.read().groups.clone()
    }

    /// `None` until the first snapshot arrives.
    pub fn active_group(&self) -> Option<TabGroup> {
        let state = self.store.state.read();
        let active_group_id = state.active_group_id?;
        state
            .groups
            .iter()
            .find(|group| group.group_id() == active_group_id)
            .cloned()
    }

    pub fn subscribe_group_changes(&self) -> broadcast::Receiver<TabGroupChangeEvent> {
        self.bus.subscribe_groups()
    }

    pub fn subscribe_tab_changes(&self) -> broadcast::Receiver<TabChangeEvent> {
        self.bus.subscribe_tabs()
    }

    pub fn group_change_stream(&self) -> BroadcastStream<TabGroupChangeEvent> {
        self.bus.group_stream()
    }

    pub fn tab_change_stream(&self) -> BroadcastStream<TabChangeEvent> {
        self.bus.tab_stream()
    }

    /// Replaces the whole model. Every previously handed out handle goes stale.
    pub fn apply_snapshot(&self, groups: Vec<GroupRecord>) -> Result<(), ProtocolViolation> {
        let mut active_group_id = None;
        for (position, record) in groups.iter().enumerate() {
            if groups[..position]
                .iter()
                .any(|earlier| earlier.group_id == record.group_id)
            {
                return Err(ProtocolViolation::DuplicateGroup(record.group_id));
            }
            if record.is_active {
                if let Some(previous) = active_group_id.replace(record.group_id) {
                    warn!(
                        previous = previous.0,
                        group_id = record.group_id.0,
                        "tabs: snapshot flags several groups active, keeping the last"
                    );
                }
            }
        }
        let active_group_id = active_group_id.ok_or(ProtocolViolation::NoActiveGroup)?;

        let opened: Vec<TabGroup> = groups
            .into_iter()
            .map(|record| TabGroup::new(record, Arc::downgrade(&self.store)))
            .collect();
        let closed = {
            let mut state = self.store.state.write();
            state.active_group_id = Some(active_group_id);
            let closed = std::mem::replace(&mut state.groups, opened.clone());
            for group in &closed {
                group.detach();
            }
            closed
        };

        info!(
            groups = opened.len(),
            active_group_id = active_group_id.0,
            "tabs: applied snapshot"
        );
        self.bus.emit_groups(TabGroupChangeEvent {
            opened,
            closed,
            changed: Vec::new(),
        });
        Ok(())
    }

    /// Replaces group metadata only. Tabs are left untouched.
    pub fn apply_group_update(&self, record: GroupRecord) -> Result<(), ProtocolViolation> {
        let group = self
            .store
            .find_group(record.group_id)
            .ok_or(ProtocolViolation::UnknownGroup(record.group_id))?;
        group.accept_group_update(&record);

        let mut changed = vec![group];
        if record.is_active {
            let previous = self
                .store
                .state
                .write()
                .active_group_id
                .replace(record.group_id);
            if let Some(previous) = previous.filter(|previous| *previous != record.group_id) {
                changed.extend(self.store.find_group(previous));
            }
        }

        debug!(
            group_id = record.group_id.0,
            view_column = record.view_column.0,
            is_active = record.is_active,
            "tabs: applied group update"
        );
        self.bus.emit_groups(TabGroupChangeEvent {
            changed,
            ..TabGroupChangeEvent::default()
        });
        Ok(())
    }

    pub fn apply_tab_operation(&self, operation: TabOperation) -> Result<(), ProtocolViolation> {
        let group_id = operation.group_id;
        let group = self
            .store
            .find_group(group_id)
            .ok_or(ProtocolViolation::UnknownGroup(group_id))?;
        let kind = operation.kind;
        let outcome = group.accept_tab_operation(operation)?;

        debug!(
            group_id = group_id.0,
            ?kind,
            active_tab = ?group.active_tab_id(),
            "tabs: applied tab operation"
        );

        let mut event = TabChangeEvent::default();
        match kind {
            TabOperationKind::Open => event.opened.push(outcome.tab),
            TabOperationKind::Close => event.closed.push(outcome.tab),
            TabOperationKind::Update | TabOperationKind::Move { .. } => {
                event.changed.push(outcome.tab)
            }
        }
        event.changed.extend(outcome.deactivated);
        self.bus.emit_tabs(event);
        Ok(())
    }

    pub fn handle_notification(
        &self,
        notification: AuthorityNotification,
    ) -> Result<(), ProtocolViolation> {
        match notification {
            AuthorityNotification::Snapshot { groups } => self.apply_snapshot(groups),
            AuthorityNotification::GroupUpdate { group } => self.apply_group_update(group),
            AuthorityNotification::TabOperation(operation) => self.apply_tab_operation(operation),
        }
    }

    /// Applies notifications in arrival order until the sender side closes.
    ///
    /// A rejected notification is logged and skipped; the mirror keeps the
    /// state it had before it.
    pub fn spawn_notification_pump(
        self: &Arc<Self>,
        mut notifications: mpsc::UnboundedReceiver<AuthorityNotification>,
    ) -> JoinHandle<()> {
        let mirror = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                if let Err(err) = mirror.handle_notification(notification) {
                    error!(error = %err, "tabs: rejected authority notification");
                }
            }
            debug!("tabs: notification channel closed");
        })
    }

    /// Closes the given tabs in one request. Fails without contacting the
    /// authority if any handle is stale or foreign.
    pub async fn close_tabs(&self, tabs: &[Tab], preserve_focus: bool) -> Result<bool, MirrorError> {
        if tabs.is_empty() {
            return Ok(true);
        }
        let addresses = tabs
            .iter()
            .map(|tab| self.resolve_tab(tab))
            .collect::<Result<Vec<_>, _>>()?;

        info!(tabs = addresses.len(), preserve_focus, "tabs: requesting close");
        self.authority
            .close_tabs(addresses, preserve_focus)
            .await
            .map_err(|source| MirrorError::Authority { source })
    }

    pub async fn close_groups(
        &self,
        groups: &[TabGroup],
        preserve_focus: bool,
    ) -> Result<bool, MirrorError> {
        if groups.is_empty() {
            return Ok(true);
        }
        let group_ids = groups
            .iter()
            .map(|group| self.resolve_group(group))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            groups = group_ids.len(),
            preserve_focus, "tabs: requesting group close"
        );
        self.authority
            .close_groups(group_ids, preserve_focus)
            .await
            .map_err(|source| MirrorError::Authority { source })
    }

    /// Forwards a move. The mirror changes only when the authority reports it.
    pub async fn move_tab(
        &self,
        tab: &Tab,
        view_column: ViewColumn,
        index: usize,
        preserve_focus: bool,
    ) -> Result<(), MirrorError> {
        let address = self.resolve_tab(tab)?;
        info!(
            group_id = address.group_id.0,
            tab_id = %address.tab_id,
            view_column = view_column.0,
            index,
            "tabs: requesting move"
        );
        self.authority
            .move_tab(address, index, view_column, preserve_focus)
            .await
            .map_err(|source| MirrorError::Authority { source })
    }

    fn resolve_tab(&self, tab: &Tab) -> Result<TabAddress, ResolutionFailure> {
        let state = self.store.state.read();
        state
            .groups
            .iter()
            .find(|group| group.contains(tab))
            .map(|group| TabAddress {
                group_id: group.group_id(),
                tab_id: tab.id().clone(),
            })
            .ok_or_else(|| ResolutionFailure::Tab { label: tab.label() })
    }

    fn resolve_group(&self, group: &TabGroup) -> Result<GroupId, ResolutionFailure> {
        let state = self.store.state.read();
        state
            .groups
            .iter()
            .find(|candidate| candidate.ptr_eq(group))
            .map(TabGroup::group_id)
            .ok_or(ResolutionFailure::Group {
                group_id: group.group_id(),
            })
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
