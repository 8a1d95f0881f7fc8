use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    domain::{GroupId, TabAddress, TabId, ViewColumn},
    error::ApiError,
};

/// What a tab displays. Tags the mirror does not know decode to `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TabInput {
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
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRecord {
    pub id: TabId,
    pub label: String,
    pub input: TabInput,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_dirty: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_preview: bool,
}

impl TabRecord {
    pub fn new(id: impl Into<TabId>, label: impl Into<String>, input: TabInput) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            input,
            is_active: false,
            is_dirty: false,
            is_pinned: false,
            is_preview: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_id: GroupId,
    #[serde(default)]
    pub is_active: bool,
    pub view_column: ViewColumn,
    #[serde(default)]
    pub tabs: Vec<TabRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabOperationKind {
    Open,
    Close,
    Update,
    /// In-group reorder from `old_index` to the operation's `index`.
    Move { old_index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabOperation {
    pub group_id: GroupId,
    pub kind: TabOperationKind,
    /// Position for open, close and move. Ignored for update.
    #[serde(default)]
    pub index: usize,
    pub tab: TabRecord,
}

impl TabOperation {
    pub fn open(group_id: GroupId, index: usize, tab: TabRecord) -> Self {
        Self {
            group_id,
            kind: TabOperationKind::Open,
            index,
            tab,
        }
    }

    pub fn close(group_id: GroupId, index: usize, tab: TabRecord) -> Self {
        Self {
            group_id,
            kind: TabOperationKind::Close,
            index,
            tab,
        }
    }

    pub fn update(group_id: GroupId, tab: TabRecord) -> Self {
        Self {
            group_id,
            kind: TabOperationKind::Update,
            index: 0,
            tab,
        }
    }

    pub fn moved(group_id: GroupId, old_index: usize, index: usize, tab: TabRecord) -> Self {
        Self {
            group_id,
            kind: TabOperationKind::Move { old_index },
            index,
            tab,
        }
    }
}

/// Authority to mirror, fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AuthorityNotification {
    Snapshot { groups: Vec<GroupRecord> },
    GroupUpdate { group: GroupRecord },
    TabOperation(TabOperation),
}

/// Mirror to authority. Entities are always named by id, never by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MirrorRequest {
    CloseTabs {
        tabs: Vec<TabAddress>,
        preserve_focus: bool,
    },
    CloseGroups {
        group_ids: Vec<GroupId>,
        preserve_focus: bool,
    },
    MoveTab {
        tab: TabAddress,
        index: usize,
        view_column: ViewColumn,
        preserve_focus: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MirrorReply {
    Closed { all_closed: bool },
    Moved,
    Error(ApiError),
}
