//! In-memory editor layout that plays the authority side of the tab protocol.
//!
//! Every mutation is published as an [`AuthorityNotification`]; requests from
//! a mirror arrive as [`AuthorityCall`]s and are answered in order.

use std::sync::Arc;

use shared::{
    channel::AuthorityCall,
    domain::{GroupId, TabAddress, ViewColumn},
    error::ApiError,
    protocol::{
        AuthorityNotification, GroupRecord, MirrorReply, MirrorRequest, TabOperation, TabRecord,
    },
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

pub struct EditorLayout {
    groups: Vec<GroupRecord>,
    next_group_id: i64,
    confirm_dirty_close: bool,
    notifications: mpsc::UnboundedSender<AuthorityNotification>,
}

impl EditorLayout {
    /// Starts with a single, active, empty group in column 1.
    pub fn new(notifications: mpsc::UnboundedSender<AuthorityNotification>) -> Self {
        let mut layout = Self {
            groups: Vec::new(),
            next_group_id: 1,
            confirm_dirty_close: true,
            notifications,
        };
        let group = layout.fresh_group();
        layout.groups.push(GroupRecord {
            is_active: true,
            ..group
        });
        layout
    }

    /// When `false`, closing a dirty tab behaves like the user cancelling the
    /// save prompt: the tab stays open and the close reports `false`.
    pub fn set_confirm_dirty_close(&mut self, confirm: bool) {
        self.confirm_dirty_close = confirm;
    }

    pub fn snapshot_records(&self) -> Vec<GroupRecord> {
        self.groups.clone()
    }

    pub fn publish_snapshot(&self) {
        self.emit(AuthorityNotification::Snapshot {
            groups: self.groups.clone(),
        });
    }

    pub fn active_group_id(&self) -> Option<GroupId> {
        self.groups
            .iter()
            .find(|group| group.is_active)
            .map(|group| group.group_id)
    }

    /// Appends a group in the next free column and republishes the snapshot.
    pub fn add_group(&mut self) -> GroupId {
        let group = self.fresh_group();
        let group_id = group.group_id;
        self.groups.push(group);
        info!(group_id = group_id.0, "layout: added group");
        self.publish_snapshot();
        group_id
    }

    pub fn activate_group(&mut self, group_id: GroupId) -> Result<(), ApiError> {
        let target = self.group_position(group_id)?;
        if let Some(previous) = self.groups.iter().position(|group| group.is_active) {
            if previous == target {
                return Ok(());
            }
            self.groups[previous].is_active = false;
            let record = group_metadata(&self.groups[previous]);
            self.emit(AuthorityNotification::GroupUpdate { group: record });
        }
        self.groups[target].is_active = true;
        let record = group_metadata(&self.groups[target]);
        self.emit(AuthorityNotification::GroupUpdate { group: record });
        Ok(())
    }

    /// Inserts a tab at `index` (appended when `None`). An active record takes
    /// activation from the group's current active tab.
    pub fn open_tab(
        &mut self,
        group_id: GroupId,
        index: Option<usize>,
        record: TabRecord,
    ) -> Result<(), ApiError> {
        let position = self.group_position(group_id)?;
        if self.groups[position]
            .tabs
            .iter()
            .any(|tab| tab.id == record.id)
        {
            return Err(ApiError::validation(format!(
                "group {group_id} already has tab {}",
                record.id
            )));
        }
        if record.is_active {
            self.deactivate_current(position);
        }
        let len = self.groups[position].tabs.len();
        let index = index.unwrap_or(len).min(len);
        self.groups[position].tabs.insert(index, record.clone());
        debug!(group_id = group_id.0, tab_id = %record.id, index, "layout: opened tab");
        self.emit(AuthorityNotification::TabOperation(TabOperation::open(
            group_id, index, record,
        )));
        Ok(())
    }

    pub fn activate_tab(&mut self, address: &TabAddress) -> Result<(), ApiError> {
        let (position, index) = self.tab_position(address)?;
        if self.groups[position].tabs[index].is_active {
            return Ok(());
        }
        self.deactivate_current(position);
        self.set_active(position, index, true);
        Ok(())
    }

    pub fn set_dirty(&mut self, address: &TabAddress, dirty: bool) -> Result<(), ApiError> {
        let (position, index) = self.tab_position(address)?;
        let tab = &mut self.groups[position].tabs[index];
        tab.is_dirty = dirty;
        let record = tab.clone();
        self.emit(AuthorityNotification::TabOperation(TabOperation::update(
            address.group_id,
            record,
        )));
        Ok(())
    }

    pub fn handle(&mut self, request: MirrorRequest) -> MirrorReply {
        let result = match request {
            MirrorRequest::CloseTabs { tabs, .. } => self.close_tabs(&tabs),
            MirrorRequest::CloseGroups { group_ids, .. } => self.close_groups(&group_ids),
            MirrorRequest::MoveTab {
                tab,
                index,
                view_column,
                ..
            } => self
                .move_tab(&tab, index, view_column)
                .map(|()| MirrorReply::Moved),
        };
        result.unwrap_or_else(MirrorReply::Error)
    }

    fn close_tabs(&mut self, tabs: &[TabAddress]) -> Result<MirrorReply, ApiError> {
        for address in tabs {
            self.tab_position(address)?;
        }
        let mut all_closed = true;
        for address in tabs {
            // Listed twice in one request.
            let Ok((position, index)) = self.tab_position(address) else {
                continue;
            };
            if self.groups[position].tabs[index].is_dirty && !self.confirm_dirty_close {
                debug!(tab = %address, "layout: kept dirty tab open");
                all_closed = false;
                continue;
            }
            self.remove_tab(position, index);
        }
        Ok(MirrorReply::Closed { all_closed })
    }

    fn close_groups(&mut self, group_ids: &[GroupId]) -> Result<MirrorReply, ApiError> {
        for group_id in group_ids {
            self.group_position(*group_id)?;
        }
        let mut all_closed = true;
        for group_id in group_ids {
            let Ok(position) = self.group_position(*group_id) else {
                continue;
            };
            let has_dirty = self.groups[position].tabs.iter().any(|tab| tab.is_dirty);
            if has_dirty && !self.confirm_dirty_close {
                all_closed = false;
                continue;
            }
            let removed = self.groups.remove(position);
            info!(group_id = removed.group_id.0, "layout: closed group");
        }
        if self.groups.is_empty() {
            let group = self.fresh_group();
            self.groups.push(group);
        }
        for (column, group) in self.groups.iter_mut().enumerate() {
            group.view_column = ViewColumn(column as u32 + 1);
        }
        if !self.groups.iter().any(|group| group.is_active) {
            self.groups[0].is_active = true;
        }
        self.publish_snapshot();
        Ok(MirrorReply::Closed { all_closed })
    }

    fn move_tab(
        &mut self,
        address: &TabAddress,
        index: usize,
        view_column: ViewColumn,
    ) -> Result<(), ApiError> {
        let (source, old_index) = self.tab_position(address)?;
        let target = self
            .groups
            .iter()
            .position(|group| group.view_column == view_column)
            .ok_or_else(|| ApiError::not_found(format!("no group in column {view_column}")))?;

        if source == target {
            let mut record = self.groups[source].tabs.remove(old_index);
            let index = index.min(self.groups[source].tabs.len());
            if !record.is_active {
                self.deactivate_current(source);
                record.is_active = true;
            }
            self.groups[source].tabs.insert(index, record.clone());
            self.emit(AuthorityNotification::TabOperation(TabOperation::moved(
                address.group_id,
                old_index,
                index,
                record,
            )));
            return Ok(());
        }

        let target_group_id = self.groups[target].group_id;
        if self.groups[target]
            .tabs
            .iter()
            .any(|tab| tab.id == address.tab_id)
        {
            return Err(ApiError::validation(format!(
                "group {target_group_id} already has tab {}",
                address.tab_id
            )));
        }
        let mut record = self.remove_tab(source, old_index);
        record.is_active = true;
        self.open_tab(target_group_id, Some(index), record)
    }

    /// Removes the tab and hands activation to its right neighbour (or the
    /// new last tab) when it was active.
    fn remove_tab(&mut self, position: usize, index: usize) -> TabRecord {
        let group_id = self.groups[position].group_id;
        let record = self.groups[position].tabs.remove(index);
        self.emit(AuthorityNotification::TabOperation(TabOperation::close(
            group_id,
            index,
            record.clone(),
        )));
        let remaining = self.groups[position].tabs.len();
        if record.is_active && remaining > 0 {
            self.set_active(position, index.min(remaining - 1), true);
        }
        record
    }

    fn deactivate_current(&mut self, position: usize) {
        if let Some(index) = self.groups[position]
            .tabs
            .iter()
            .position(|tab| tab.is_active)
        {
            self.set_active(position, index, false);
        }
    }

    fn set_active(&mut self, position: usize, index: usize, active: bool) {
        let group_id = self.groups[position].group_id;
        let tab = &mut self.groups[position].tabs[index];
        tab.is_active = active;
        let record = tab.clone();
        self.emit(AuthorityNotification::TabOperation(TabOperation::update(
            group_id, record,
        )));
    }

    fn fresh_group(&mut self) -> GroupRecord {
        let group_id = GroupId(self.next_group_id);
        self.next_group_id += 1;
        GroupRecord {
            group_id,
            is_active: false,
            view_column: ViewColumn(self.groups.len() as u32 + 1),
            tabs: Vec::new(),
        }
    }

    fn group_position(&self, group_id: GroupId) -> Result<usize, ApiError> {
        self.groups
            .iter()
            .position(|group| group.group_id == group_id)
            .ok_or_else(|| ApiError::not_found(format!("group {group_id} not found")))
    }

    fn tab_position(&self, address: &TabAddress) -> Result<(usize, usize), ApiError> {
        let position = self.group_position(address.group_id)?;
        let index = self.groups[position]
            .tabs
            .iter()
            .position(|tab| tab.id == address.tab_id)
            .ok_or_else(|| ApiError::not_found(format!("tab {address} not found")))?;
        Ok((position, index))
    }

    fn emit(&self, notification: AuthorityNotification) {
        if self.notifications.send(notification).is_err() {
            debug!("layout: no mirror is listening for notifications");
        }
    }
}

/// Group record without its tabs, as sent in group updates.
fn group_metadata(group: &GroupRecord) -> GroupRecord {
    GroupRecord {
        tabs: Vec::new(),
        ..group.clone()
    }
}

/// Answers mirror requests until every [`AuthorityCall`] sender is dropped.
pub fn spawn_request_handler(
    layout: Arc<Mutex<EditorLayout>>,
    mut calls: mpsc::Receiver<AuthorityCall>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(call) = calls.recv().await {
            let reply = layout.lock().await.handle(call.request);
            if call.reply.send(reply).is_err() {
                debug!("layout: requester went away before the reply");
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
