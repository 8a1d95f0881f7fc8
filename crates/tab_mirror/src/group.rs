use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use shared::{
    domain::{GroupId, TabId, ViewColumn},
    protocol::{GroupRecord, TabOperation, TabOperationKind, TabRecord},
};
use tracing::warn;

use crate::{error::ProtocolViolation, tab::Tab, StoreCell};

pub(crate) struct GroupCell {
    group_id: GroupId,
    state: RwLock<GroupState>,
}

struct GroupState {
    view_column: ViewColumn,
    active_tab_id: Option<TabId>,
    tabs: Vec<Tab>,
    store: Weak<StoreCell>,
}

impl GroupCell {
    pub(crate) fn is_active_tab(&self, tab_id: &TabId) -> bool {
        self.state.read().active_tab_id.as_ref() == Some(tab_id)
    }
}

impl GroupState {
    /// Applies the activation rule for an incoming record and returns the id of
    /// a different tab that lost activation, if any.
    ///
    /// An inactive record only clears the active id when it still names this
    /// tab, so a stale deactivation arriving after a newer activation of some
    /// other tab is a no-op, and replaying it is idempotent.
    fn reconcile_active(&mut self, record: &TabRecord) -> Option<TabId> {
        if record.is_active {
            return self
                .active_tab_id
                .replace(record.id.clone())
                .filter(|previous| previous != &record.id);
        }
        if self.active_tab_id.as_ref() == Some(&record.id) {
            self.active_tab_id = None;
        }
        None
    }

    fn find(&self, tab_id: &TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id() == tab_id)
    }
}

/// Result of one applied tab operation.
pub(crate) struct TabOperationOutcome {
    pub tab: Tab,
    /// Another tab of the group whose derived `is_active` flipped to false.
    pub deactivated: Option<Tab>,
}

/// Read-only handle to one mirrored editor group.
#[derive(Clone)]
pub struct TabGroup {
    cell: Arc<GroupCell>,
}

impl TabGroup {
    pub(crate) fn new(record: GroupRecord, store: Weak<StoreCell>) -> Self {
        let cell = Arc::new_cyclic(|weak_cell: &Weak<GroupCell>| {
            let mut active_tab_id = None;
            let tabs = record
                .tabs
                .into_iter()
                .map(|tab| {
                    if tab.is_active {
                        active_tab_id = Some(tab.id.clone());
                    }
                    Tab::new(tab, weak_cell.clone())
                })
                .collect();
            GroupCell {
                group_id: record.group_id,
                state: RwLock::new(GroupState {
                    view_column: record.view_column,
                    active_tab_id,
                    tabs,
                    store,
                }),
            }
        });
        Self { cell }
    }

    pub(crate) fn from_cell(cell: Arc<GroupCell>) -> Self {
        Self { cell }
    }

    pub(crate) fn group_id(&self) -> GroupId {
        self.cell.group_id
    }

    pub(crate) fn active_tab_id(&self) -> Option<TabId> {
        self.cell.state.read().active_tab_id.clone()
    }

    pub(crate) fn contains(&self, tab: &Tab) -> bool {
        self.cell
            .state
            .read()
            .tabs
            .iter()
            .any(|candidate| candidate.ptr_eq(tab))
    }

    /// Drop every link to the store and to this group's tabs.
    pub(crate) fn detach(&self) {
        let mut state = self.cell.state.write();
        state.store = Weak::new();
        state.active_tab_id = None;
        for tab in &state.tabs {
            tab.detach();
        }
    }

    pub(crate) fn accept_group_update(&self, record: &GroupRecord) {
        let mut state = self.cell.state.write();
        state.view_column = record.view_column;
    }

    pub(crate) fn accept_tab_operation(
        &self,
        operation: TabOperation,
    ) -> Result<TabOperationOutcome, ProtocolViolation> {
        let group_id = self.cell.group_id;
        let mut state = self.cell.state.write();
        let len = state.tabs.len();

        match operation.kind {
            TabOperationKind::Open => {
                if state.find(&operation.tab.id).is_some() {
                    return Err(ProtocolViolation::DuplicateTab {
                        group_id,
                        tab_id: operation.tab.id,
                    });
                }
                let index = clamp_insert_index(group_id, operation.index, len);
                let deactivated = if operation.tab.is_active {
                    state.reconcile_active(&operation.tab)
                } else {
                    None
                };
                let tab = Tab::new(operation.tab, Arc::downgrade(&self.cell));
                state.tabs.insert(index, tab.clone());
                let deactivated = deactivated.and_then(|id| state.find(&id).cloned());
                Ok(TabOperationOutcome { tab, deactivated })
            }
            TabOperationKind::Close => {
                if operation.index >= len {
                    return Err(ProtocolViolation::NoTabAtIndex {
                        group_id,
                        index: operation.index,
                        len,
                    });
                }
                let tab = state.tabs.remove(operation.index);
                if tab.id() != &operation.tab.id {
                    warn!(
                        group_id = group_id.0,
                        index = operation.index,
                        expected = %operation.tab.id,
                        found = %tab.id(),
                        "tabs: close addressed a different tab than the record names"
                    );
                }
                if state.active_tab_id.as_ref() == Some(tab.id()) {
                    state.active_tab_id = None;
                }
                tab.detach();
                Ok(TabOperationOutcome {
                    tab,
                    deactivated: None,
                })
            }
            TabOperationKind::Update => {
                let tab = state
                    .find(&operation.tab.id)
                    .cloned()
                    .ok_or_else(|| ProtocolViolation::UnknownTab {
                        group_id,
                        tab_id: operation.tab.id.clone(),
                    })?;
                let deactivated = state
                    .reconcile_active(&operation.tab)
                    .and_then(|id| state.find(&id).cloned());
                tab.accept_update(operation.tab);
                Ok(TabOperationOutcome { tab, deactivated })
            }
            TabOperationKind::Move { old_index } => {
                let Some(current) = state.tabs.get(old_index) else {
                    return Err(ProtocolViolation::NoTabAtIndex {
                        group_id,
                        index: old_index,
                        len,
                    });
                };
                if current.id() != &operation.tab.id {
                    return Err(ProtocolViolation::TabIdMismatch {
                        group_id,
                        index: old_index,
                        expected: operation.tab.id,
                        found: current.id().clone(),
                    });
                }
                let tab = state.tabs.remove(old_index);
                let index = clamp_insert_index(group_id, operation.index, len - 1);
                state.tabs.insert(index, tab.clone());
                let deactivated = state
                    .reconcile_active(&operation.tab)
                    .and_then(|id| state.find(&id).cloned());
                tab.accept_update(operation.tab);
                Ok(TabOperationOutcome { tab, deactivated })
            }
        }
    }

    pub fn is_active(&self) -> bool {
        let store = self.cell.state.read().store.upgrade();
        store.is_some_and(|store| store.is_active_group(self.cell.group_id))
    }

    pub fn view_column(&self) -> ViewColumn {
        self.cell.state.read().view_column
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.cell.state.read().tabs.clone()
    }

    pub fn active_tab(&self) -> Option<Tab> {
        let state = self.cell.state.read();
        let active = state.active_tab_id.as_ref()?;
        state.find(active).cloned()
    }

    pub fn ptr_eq(&self, other: &TabGroup) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

fn clamp_insert_index(group_id: GroupId, index: usize, len: usize) -> usize {
    if index > len {
        warn!(
            group_id = group_id.0,
            index, len, "tabs: insert index past the end, appending"
        );
        return len;
    }
    index
}

impl PartialEq for TabGroup {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TabGroup {}

impl fmt::Debug for TabGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.cell.state.read();
        f.debug_struct("TabGroup")
            .field("group_id", &self.cell.group_id)
            .field("view_column", &state.view_column)
            .field("tabs", &state.tabs.len())
            .finish_non_exhaustive()
    }
}
