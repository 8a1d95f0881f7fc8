use super::*;
use shared::{
    domain::TabId,
    protocol::{TabInput, TabOperationKind},
};
use url::Url;

fn text_tab(id: &str, active: bool) -> TabRecord {
    let uri = Url::parse(&format!("file:///work/{id}.rs")).expect("uri");
    TabRecord {
        is_active: active,
        ..TabRecord::new(id, format!("{id}.rs"), TabInput::Text { uri })
    }
}

fn layout() -> (EditorLayout, mpsc::UnboundedReceiver<AuthorityNotification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EditorLayout::new(tx), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<AuthorityNotification>) -> Vec<AuthorityNotification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

fn tab_operations(notifications: &[AuthorityNotification]) -> Vec<(TabOperationKind, TabId, bool)> {
    notifications
        .iter()
        .filter_map(|notification| match notification {
            AuthorityNotification::TabOperation(operation) => Some((
                operation.kind,
                operation.tab.id.clone(),
                operation.tab.is_active,
            )),
            _ => None,
        })
        .collect()
}

#[test]
fn starts_with_one_active_group() {
    let (layout, _rx) = layout();
    let groups = layout.snapshot_records();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].is_active);
    assert_eq!(groups[0].view_column, ViewColumn(1));
    assert_eq!(layout.active_group_id(), Some(groups[0].group_id));
}

#[test]
fn opening_an_active_tab_deactivates_the_previous_one_first() {
    let (mut layout, mut rx) = layout();
    let group_id = layout.active_group_id().expect("group");
    layout
        .open_tab(group_id, None, text_tab("a", true))
        .expect("open a");
    layout
        .open_tab(group_id, Some(0), text_tab("b", true))
        .expect("open b");

    let operations = tab_operations(&drain(&mut rx));
    assert_eq!(
        operations,
        vec![
            (TabOperationKind::Open, TabId::new("a"), true),
            (TabOperationKind::Update, TabId::new("a"), false),
            (TabOperationKind::Open, TabId::new("b"), true),
        ]
    );
    let tabs = &layout.snapshot_records()[0].tabs;
    assert_eq!(tabs[0].id, TabId::new("b"));
    assert_eq!(tabs[1].id, TabId::new("a"));
}

#[test]
fn closing_the_active_tab_activates_its_neighbour() {
    let (mut layout, mut rx) = layout();
    let group_id = layout.active_group_id().expect("group");
    layout.open_tab(group_id, None, text_tab("a", true)).expect("a");
    layout.open_tab(group_id, None, text_tab("b", false)).expect("b");
    drain(&mut rx);

    let reply = layout.handle(MirrorRequest::CloseTabs {
        tabs: vec![TabAddress::new(group_id, "a")],
        preserve_focus: false,
    });

    assert_eq!(reply, MirrorReply::Closed { all_closed: true });
    let notifications = drain(&mut rx);
    let AuthorityNotification::TabOperation(close) = &notifications[0] else {
        panic!("expected close operation first");
    };
    assert_eq!(close.kind, TabOperationKind::Close);
    assert_eq!(close.index, 0);
    assert_eq!(
        tab_operations(&notifications[1..]),
        vec![(TabOperationKind::Update, TabId::new("b"), true)]
    );
}

#[test]
fn dirty_tabs_survive_close_when_the_prompt_is_declined() {
    let (mut layout, mut rx) = layout();
    let group_id = layout.active_group_id().expect("group");
    layout.open_tab(group_id, None, text_tab("a", true)).expect("a");
    layout.open_tab(group_id, None, text_tab("b", false)).expect("b");
    layout
        .set_dirty(&TabAddress::new(group_id, "a"), true)
        .expect("dirty");
    layout.set_confirm_dirty_close(false);
    drain(&mut rx);

    let reply = layout.handle(MirrorRequest::CloseTabs {
        tabs: vec![
            TabAddress::new(group_id, "a"),
            TabAddress::new(group_id, "b"),
        ],
        preserve_focus: true,
    });

    assert_eq!(reply, MirrorReply::Closed { all_closed: false });
    let tabs = &layout.snapshot_records()[0].tabs;
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].id, TabId::new("a"));
}

#[test]
fn unknown_tab_rejects_the_whole_close() {
    let (mut layout, _rx) = layout();
    let group_id = layout.active_group_id().expect("group");
    layout.open_tab(group_id, None, text_tab("a", true)).expect("a");

    let reply = layout.handle(MirrorRequest::CloseTabs {
        tabs: vec![
            TabAddress::new(group_id, "a"),
            TabAddress::new(group_id, "missing"),
        ],
        preserve_focus: false,
    });

    assert!(matches!(reply, MirrorReply::Error(_)));
    assert_eq!(layout.snapshot_records()[0].tabs.len(), 1);
}

#[test]
fn move_within_a_group_emits_a_move_operation() {
    let (mut layout, mut rx) = layout();
    let group_id = layout.active_group_id().expect("group");
    for id in ["a", "b", "c"] {
        layout
            .open_tab(group_id, None, text_tab(id, id == "a"))
            .expect("open");
    }
    drain(&mut rx);

    let reply = layout.handle(MirrorRequest::MoveTab {
        tab: TabAddress::new(group_id, "a"),
        index: 2,
        view_column: ViewColumn(1),
        preserve_focus: false,
    });

    assert_eq!(reply, MirrorReply::Moved);
    let operations = tab_operations(&drain(&mut rx));
    assert_eq!(
        operations,
        vec![(
            TabOperationKind::Move { old_index: 0 },
            TabId::new("a"),
            true
        )]
    );
    let ids: Vec<_> = layout.snapshot_records()[0]
        .tabs
        .iter()
        .map(|tab| tab.id.clone())
        .collect();
    assert_eq!(ids, vec![TabId::new("b"), TabId::new("c"), TabId::new("a")]);
}

#[test]
fn move_across_groups_closes_then_opens() {
    let (mut layout, mut rx) = layout();
    let first = layout.active_group_id().expect("group");
    layout.open_tab(first, None, text_tab("a", true)).expect("a");
    let second = layout.add_group();
    drain(&mut rx);

    let reply = layout.handle(MirrorRequest::MoveTab {
        tab: TabAddress::new(first, "a"),
        index: 0,
        view_column: ViewColumn(2),
        preserve_focus: false,
    });

    assert_eq!(reply, MirrorReply::Moved);
    let notifications = drain(&mut rx);
    let targets: Vec<_> = notifications
        .iter()
        .filter_map(|notification| match notification {
            AuthorityNotification::TabOperation(operation) => {
                Some((operation.group_id, operation.kind))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        targets,
        vec![
            (first, TabOperationKind::Close),
            (second, TabOperationKind::Open)
        ]
    );
}

#[test]
fn closing_the_last_group_leaves_a_fresh_active_one() {
    let (mut layout, mut rx) = layout();
    let only = layout.active_group_id().expect("group");
    drain(&mut rx);

    let reply = layout.handle(MirrorRequest::CloseGroups {
        group_ids: vec![only],
        preserve_focus: false,
    });

    assert_eq!(reply, MirrorReply::Closed { all_closed: true });
    let groups = layout.snapshot_records();
    assert_eq!(groups.len(), 1);
    assert_ne!(groups[0].group_id, only);
    assert!(groups[0].is_active);
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [AuthorityNotification::Snapshot { .. }]
    ));
}

#[test]
fn activating_a_group_updates_both_groups() {
    let (mut layout, mut rx) = layout();
    let first = layout.active_group_id().expect("group");
    let second = layout.add_group();
    drain(&mut rx);

    layout.activate_group(second).expect("activate");

    let updates: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|notification| match notification {
            AuthorityNotification::GroupUpdate { group } => Some((group.group_id, group.is_active)),
            _ => None,
        })
        .collect();
    assert_eq!(updates, vec![(first, false), (second, true)]);
    assert_eq!(layout.active_group_id(), Some(second));
}

#[tokio::test]
async fn request_handler_replies_on_the_call_channel() {
    let (tx, _notifications) = mpsc::unbounded_channel();
    let layout = Arc::new(Mutex::new(EditorLayout::new(tx)));
    let (calls_tx, calls_rx) = mpsc::channel(8);
    let handler = spawn_request_handler(Arc::clone(&layout), calls_rx);

    let (call, reply) = AuthorityCall::new(MirrorRequest::CloseGroups {
        group_ids: vec![GroupId(99)],
        preserve_focus: false,
    });
    calls_tx.send(call).await.expect("send call");

    let reply = reply.await.expect("reply");
    assert!(matches!(reply, MirrorReply::Error(err) if err.code == shared::error::ErrorCode::NotFound));

    drop(calls_tx);
    handler.await.expect("handler exits");
}
