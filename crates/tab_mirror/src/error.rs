use shared::domain::{GroupId, TabId};
use thiserror::Error;

/// An inbound notification referenced state the mirror does not have.
///
/// These indicate an ordering or logic bug between authority and mirror. The
/// triggering notification is rejected and the mirror is left as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("no tab group with id {0}")]
    UnknownGroup(GroupId),
    #[error("group {group_id} has no tab with id {tab_id}")]
    UnknownTab { group_id: GroupId, tab_id: TabId },
    #[error("group {group_id} has no tab at index {index} (len {len})")]
    NoTabAtIndex {
        group_id: GroupId,
        index: usize,
        len: usize,
    },
    #[error("group {group_id} expected tab {expected} at index {index}, found {found}")]
    TabIdMismatch {
        group_id: GroupId,
        index: usize,
        expected: TabId,
        found: TabId,
    },
    #[error("group {group_id} already has a tab with id {tab_id}")]
    DuplicateTab { group_id: GroupId, tab_id: TabId },
    #[error("snapshot lists group {0} more than once")]
    DuplicateGroup(GroupId),
    #[error("snapshot does not flag any group as active")]
    NoActiveGroup,
}

/// A caller-supplied handle could not be traced back to a live entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    #[error("tab {label:?} is closed or does not belong to this mirror")]
    Tab { label: String },
    #[error("tab group {group_id} is closed or does not belong to this mirror")]
    Group { group_id: GroupId },
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error("failed to resolve handle: {0}")]
    Resolution(#[from] ResolutionFailure),
    #[error("editor authority request failed: {source}")]
    Authority { source: anyhow::Error },
}
