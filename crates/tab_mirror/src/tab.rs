use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use shared::{
    domain::TabId,
    protocol::{TabInput, TabRecord},
};
use url::Url;

use crate::group::{GroupCell, TabGroup};

/// What a tab shows, as seen by mirror consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabKind {
    Text {
        uri: Url,
    },
    TextDiff {
        original: Url,
        modified: Url,
    },
    Custom {
        uri: Url,
        view_type: String,
    },
    Webview {
        view_type: String,
    },
    Notebook {
        uri: Url,
        notebook_type: String,
    },
    NotebookDiff {
        original: Url,
        modified: Url,
        notebook_type: String,
    },
    Terminal,
}

impl TabKind {
    /// Inputs this mirror does not understand map to `None`.
    pub fn from_input(input: &TabInput) -> Option<Self> {
        let kind = match input {
            TabInput::Text { uri } => Self::Text { uri: uri.clone() },
            TabInput::TextDiff { original, modified } => Self::TextDiff {
                original: original.clone(),
                modified: modified.clone(),
            },
            TabInput::Custom { uri, view_type } => Self::Custom {
                uri: uri.clone(),
                view_type: view_type.clone(),
            },
            TabInput::Webview { view_type } => Self::Webview {
                view_type: view_type.clone(),
            },
            TabInput::Notebook { uri, notebook_type } => Self::Notebook {
                uri: uri.clone(),
                notebook_type: notebook_type.clone(),
            },
            TabInput::NotebookDiff {
                original,
                modified,
                notebook_type,
            } => Self::NotebookDiff {
                original: original.clone(),
                modified: modified.clone(),
                notebook_type: notebook_type.clone(),
            },
            TabInput::Terminal => Self::Terminal,
            TabInput::Unknown => return None,
        };
        Some(kind)
    }
}

pub(crate) struct TabCell {
    id: TabId,
    state: RwLock<TabState>,
}

struct TabState {
    record: TabRecord,
    kind: Option<TabKind>,
    group: Weak<GroupCell>,
}

/// Read-only handle to one mirrored tab.
///
/// Clones share identity: every handle for the same logical tab observes
/// later updates in place. `is_active` is derived from the owning group on
/// each read and never cached here.
#[derive(Clone)]
pub struct Tab {
    cell: Arc<TabCell>,
}

impl Tab {
    pub(crate) fn new(record: TabRecord, group: Weak<GroupCell>) -> Self {
        let kind = TabKind::from_input(&record.input);
        Self {
            cell: Arc::new(TabCell {
                id: record.id.clone(),
                state: RwLock::new(TabState {
                    record,
                    kind,
                    group,
                }),
            }),
        }
    }

    pub(crate) fn id(&self) -> &TabId {
        &self.cell.id
    }

    pub(crate) fn accept_update(&self, record: TabRecord) {
        let mut state = self.cell.state.write();
        state.kind = TabKind::from_input(&record.input);
        state.record = record;
    }

    /// Cut the link to the owning group. The handle stays readable but is stale.
    pub(crate) fn detach(&self) {
        self.cell.state.write().group = Weak::new();
    }

    fn group_cell(&self) -> Option<Arc<GroupCell>> {
        self.cell.state.read().group.upgrade()
    }

    pub fn label(&self) -> String {
        self.cell.state.read().record.label.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.cell.state.read().record.is_dirty
    }

    pub fn is_pinned(&self) -> bool {
        self.cell.state.read().record.is_pinned
    }

    pub fn is_preview(&self) -> bool {
        self.cell.state.read().record.is_preview
    }

    pub fn kind(&self) -> Option<TabKind> {
        self.cell.state.read().kind.clone()
    }

    pub fn is_active(&self) -> bool {
        self.group_cell()
            .is_some_and(|group| group.is_active_tab(&self.cell.id))
    }

    /// `None` once the tab has been closed or its group dropped.
    pub fn group(&self) -> Option<TabGroup> {
        self.group_cell().map(TabGroup::from_cell)
    }

    pub fn ptr_eq(&self, other: &Tab) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for Tab {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Tab {}

impl fmt::Debug for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.cell.state.read();
        f.debug_struct("Tab")
            .field("id", &self.cell.id)
            .field("label", &state.record.label)
            .field("is_dirty", &state.record.is_dirty)
            .finish_non_exhaustive()
    }
}
