use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use layout_authority::{spawn_request_handler, EditorLayout};
use shared::{
    domain::{GroupId, TabAddress, ViewColumn},
    protocol::{TabInput, TabRecord},
};
use tab_mirror::{
    transport::ChannelAuthority, EditorTabsMirror, MirrorError, TabGroup, TabKind,
};
use tokio::{
    sync::{mpsc, Mutex},
    time::{sleep, timeout},
};
use url::Url;

struct Session {
    layout: Arc<Mutex<EditorLayout>>,
    mirror: Arc<EditorTabsMirror>,
}

fn start() -> Session {
    let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
    let layout = Arc::new(Mutex::new(EditorLayout::new(notifications_tx)));
    let (authority, calls) = ChannelAuthority::channel(8);
    spawn_request_handler(Arc::clone(&layout), calls);
    let mirror = EditorTabsMirror::new(Arc::new(authority));
    mirror.spawn_notification_pump(notifications_rx);
    Session { layout, mirror }
}

fn text_tab(id: &str, active: bool) -> TabRecord {
    let uri = Url::parse(&format!("file:///work/{id}.rs")).expect("uri");
    TabRecord {
        is_active: active,
        ..TabRecord::new(id, format!("{id}.rs"), TabInput::Text { uri })
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("mirror caught up");
}

fn labels(group: &TabGroup) -> Vec<String> {
    group.tabs().iter().map(|tab| tab.label()).collect()
}

async fn seeded() -> (Session, GroupId) {
    let session = start();
    let group_id = {
        let mut layout = session.layout.lock().await;
        layout.publish_snapshot();
        let group_id = layout.active_group_id().expect("group");
        layout
            .open_tab(group_id, None, text_tab("a", true))
            .expect("open a");
        layout
            .open_tab(group_id, None, text_tab("b", false))
            .expect("open b");
        group_id
    };
    let mirror = Arc::clone(&session.mirror);
    wait_until(|| {
        mirror
            .active_group()
            .is_some_and(|group| group.tabs().len() == 2)
    })
    .await;
    (session, group_id)
}

#[tokio::test]
async fn close_request_round_trips_through_the_authority() {
    let (session, _group_id) = seeded().await;
    let mirror = &session.mirror;
    let group = mirror.active_group().expect("group");
    let tabs = group.tabs();
    let mut tab_events = mirror.tab_change_stream();

    let all_closed = mirror
        .close_tabs(&[tabs[0].clone()], false)
        .await
        .expect("close a");
    assert!(all_closed);

    let closed = tab_events
        .next()
        .await
        .expect("stream open")
        .expect("no lag");
    assert!(closed.closed[0].ptr_eq(&tabs[0]));
    wait_until(|| tabs[1].is_active()).await;
    assert_eq!(labels(&group), vec!["b.rs"]);
    assert!(tabs[0].group().is_none());
    assert_eq!(group.active_tab(), Some(tabs[1].clone()));
    assert!(matches!(tabs[1].kind(), Some(TabKind::Text { .. })));
}

#[tokio::test]
async fn declined_dirty_close_reports_false_and_keeps_the_tab() {
    let (session, group_id) = seeded().await;
    {
        let mut layout = session.layout.lock().await;
        layout
            .set_dirty(&TabAddress::new(group_id, "a"), true)
            .expect("dirty");
        layout.set_confirm_dirty_close(false);
    }
    let group = session.mirror.active_group().expect("group");
    let a = group.tabs()[0].clone();
    wait_until(|| a.is_dirty()).await;

    let all_closed = session
        .mirror
        .close_tabs(&group.tabs(), true)
        .await
        .expect("close");

    assert!(!all_closed);
    wait_until(|| group.tabs().len() == 1).await;
    assert!(group.tabs()[0].ptr_eq(&a));
}

#[tokio::test]
async fn move_to_another_column_shows_up_as_close_and_open() {
    let (session, _group_id) = seeded().await;
    session.layout.lock().await.add_group();
    let mirror = Arc::clone(&session.mirror);
    wait_until(|| mirror.groups().len() == 2).await;
    let groups = mirror.groups();
    let b = groups[0].tabs()[1].clone();

    mirror
        .move_tab(&b, ViewColumn(2), 0, false)
        .await
        .expect("move");

    wait_until(|| groups[1].tabs().len() == 1).await;
    assert_eq!(labels(&groups[0]), vec!["a.rs"]);
    assert_eq!(labels(&groups[1]), vec!["b.rs"]);
    assert!(b.group().is_none());
    assert!(groups[1].tabs()[0].is_active());
    assert!(groups[0].tabs()[0].is_active());
}

#[tokio::test]
async fn closing_a_group_replaces_every_handle() {
    let (session, _group_id) = seeded().await;
    let old_group = session.mirror.active_group().expect("group");
    let old_tab = old_group.tabs()[0].clone();

    assert!(session
        .mirror
        .close_groups(&[old_group.clone()], false)
        .await
        .expect("close group"));

    let mirror = Arc::clone(&session.mirror);
    let stale = old_group.clone();
    wait_until(move || {
        mirror
            .active_group()
            .is_some_and(|group| !group.ptr_eq(&stale))
    })
    .await;
    assert!(!old_group.is_active());
    assert!(old_tab.group().is_none());
    let err = session
        .mirror
        .close_tabs(&[old_tab], false)
        .await
        .expect_err("stale tab");
    assert!(matches!(err, MirrorError::Resolution(_)));
}

#[tokio::test]
async fn authority_rejection_surfaces_to_the_caller() {
    let (session, _group_id) = seeded().await;
    let group = session.mirror.active_group().expect("group");
    let a = group.tabs()[0].clone();
    // The authority drops the tab without the mirror hearing about it yet.
    {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut detached = EditorLayout::new(tx);
        std::mem::swap(&mut *session.layout.lock().await, &mut detached);
    }

    let err = session
        .mirror
        .close_tabs(&[a], false)
        .await
        .expect_err("unknown to authority");

    assert!(matches!(err, MirrorError::Authority { .. }));
    assert!(err.to_string().contains("not found"));
}
