use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use layout_authority::{spawn_request_handler, EditorLayout};
use shared::{
    domain::{TabAddress, ViewColumn},
    protocol::{AuthorityNotification, TabInput, TabRecord},
};
use tab_mirror::{
    transport::ChannelAuthority, EditorTabsMirror, MissingEditorTabsAuthority, Tab,
    TabChangeEvent, TabGroupChangeEvent,
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "mirror-tools", about = "Inspect and exercise the editor tab mirror")]
struct Cli {
    #[arg(long, default_value = "mirror-tools.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a JSON-lines file of authority notifications to a fresh mirror.
    Replay { path: PathBuf },
    /// Drive the in-memory layout through a short editing session.
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;
    let filter = EnvFilter::try_new(&settings.log_filter)
        .with_context(|| format!("invalid log filter '{}'", settings.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Replay { path } => replay(&settings, path),
        Command::Demo => demo(&settings).await,
    }
}

fn replay(settings: &Settings, path: PathBuf) -> Result<()> {
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read notifications from '{}'", path.display()))?;
    let mirror = EditorTabsMirror::with_event_capacity(
        Arc::new(MissingEditorTabsAuthority),
        settings.event_capacity,
    );
    let mut group_events = mirror.subscribe_group_changes();
    let mut tab_events = mirror.subscribe_tab_changes();

    let mut applied = 0usize;
    let mut rejected = 0usize;
    for (line_no, line) in raw.lines().enumerate().map(|(i, line)| (i + 1, line.trim())) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let notification: AuthorityNotification = serde_json::from_str(line)
            .with_context(|| format!("{}:{line_no}: malformed notification", path.display()))?;
        match mirror.handle_notification(notification) {
            Ok(()) => applied += 1,
            Err(err) if settings.stop_on_violation => {
                bail!("{}:{line_no}: {err}", path.display())
            }
            Err(err) => {
                warn!(line = line_no, error = %err, "replay: skipped notification");
                rejected += 1;
            }
        }
        print_events(&mut group_events, &mut tab_events);
    }

    info!(applied, rejected, "replay: finished");
    println!("{}", render_layout(&mirror));
    Ok(())
}

async fn demo(settings: &Settings) -> Result<()> {
    let (notifications_tx, mut notifications) = mpsc::unbounded_channel();
    let layout = Arc::new(Mutex::new(EditorLayout::new(notifications_tx)));
    let (authority, calls) = ChannelAuthority::channel(8);
    let handler = spawn_request_handler(Arc::clone(&layout), calls);
    let mirror =
        EditorTabsMirror::with_event_capacity(Arc::new(authority), settings.event_capacity);

    let group_id = {
        let layout = layout.lock().await;
        layout.publish_snapshot();
        layout
            .active_group_id()
            .context("layout starts without an active group")?
    };
    sync(&mirror, &mut notifications, settings)?;
    step("initial layout", &mirror);

    {
        let mut layout = layout.lock().await;
        layout.open_tab(group_id, None, demo_tab("main", true)?)?;
        layout.open_tab(group_id, None, demo_tab("lib", false)?)?;
    }
    sync(&mirror, &mut notifications, settings)?;
    step("opened main.rs and lib.rs", &mirror);

    layout
        .lock()
        .await
        .activate_tab(&TabAddress::new(group_id, "lib"))?;
    sync(&mirror, &mut notifications, settings)?;
    step("activated lib.rs", &mirror);

    let main_tab = find_tab(&mirror, "main.rs")?;
    let all_closed = mirror.close_tabs(&[main_tab.clone()], false).await?;
    sync(&mirror, &mut notifications, settings)?;
    step(&format!("closed main.rs (all closed: {all_closed})"), &mirror);
    if let Err(err) = mirror.close_tabs(&[main_tab], false).await {
        println!("closing main.rs again is refused: {err}");
    }

    {
        let mut layout = layout.lock().await;
        layout.set_dirty(&TabAddress::new(group_id, "lib"), true)?;
        layout.set_confirm_dirty_close(false);
    }
    sync(&mirror, &mut notifications, settings)?;
    let lib_tab = find_tab(&mirror, "lib.rs")?;
    let all_closed = mirror.close_tabs(&[lib_tab.clone()], false).await?;
    sync(&mirror, &mut notifications, settings)?;
    step(
        &format!("tried to close dirty lib.rs (all closed: {all_closed})"),
        &mirror,
    );

    layout.lock().await.add_group();
    sync(&mirror, &mut notifications, settings)?;
    let lib_tab = find_tab(&mirror, "lib.rs")?;
    mirror.move_tab(&lib_tab, ViewColumn(2), 0, false).await?;
    sync(&mirror, &mut notifications, settings)?;
    step("moved lib.rs to column 2", &mirror);

    drop(mirror);
    drop(layout);
    handler.await.context("request handler panicked")?;
    Ok(())
}

/// Applies everything the layout has published so far.
fn sync(
    mirror: &EditorTabsMirror,
    notifications: &mut mpsc::UnboundedReceiver<AuthorityNotification>,
    settings: &Settings,
) -> Result<()> {
    while let Ok(notification) = notifications.try_recv() {
        if let Err(err) = mirror.handle_notification(notification) {
            if settings.stop_on_violation {
                return Err(err.into());
            }
            warn!(error = %err, "demo: skipped notification");
        }
    }
    Ok(())
}

fn demo_tab(name: &str, active: bool) -> Result<TabRecord> {
    let uri = Url::parse(&format!("file:///demo/src/{name}.rs")).context("demo uri")?;
    Ok(TabRecord {
        is_active: active,
        ..TabRecord::new(name, format!("{name}.rs"), TabInput::Text { uri })
    })
}

fn find_tab(mirror: &EditorTabsMirror, label: &str) -> Result<Tab> {
    mirror
        .groups()
        .iter()
        .flat_map(|group| group.tabs())
        .find(|tab| tab.label() == label)
        .with_context(|| format!("no tab labelled {label}"))
}

fn step(title: &str, mirror: &EditorTabsMirror) {
    println!("== {title}");
    println!("{}", render_layout(mirror));
}

fn render_layout(mirror: &EditorTabsMirror) -> String {
    let mut lines = Vec::new();
    for group in mirror.groups() {
        let marker = if group.is_active() { "*" } else { " " };
        let tabs: Vec<String> = group.tabs().iter().map(render_tab).collect();
        lines.push(format!(
            "{marker} column {}: [{}]",
            group.view_column(),
            tabs.join(", ")
        ));
    }
    if lines.is_empty() {
        lines.push("(no groups)".into());
    }
    lines.join("\n")
}

fn render_tab(tab: &Tab) -> String {
    let mut rendered = tab.label();
    if tab.is_dirty() {
        rendered.push_str(" (dirty)");
    }
    if tab.is_preview() {
        rendered = format!("~{rendered}");
    }
    if tab.is_active() {
        rendered.insert(0, '>');
    }
    rendered
}

fn print_events(
    group_events: &mut broadcast::Receiver<TabGroupChangeEvent>,
    tab_events: &mut broadcast::Receiver<TabChangeEvent>,
) {
    while let Ok(event) = group_events.try_recv() {
        if !event.is_empty() {
            println!(
                "groups changed: +{} -{} ~{}",
                event.opened.len(),
                event.closed.len(),
                event.changed.len()
            );
        }
    }
    while let Ok(event) = tab_events.try_recv() {
        let labels = |tabs: &[Tab]| tabs.iter().map(Tab::label).collect::<Vec<_>>().join(", ");
        println!(
            "tabs changed: opened [{}] closed [{}] changed [{}]",
            labels(&event.opened),
            labels(&event.closed),
            labels(&event.changed)
        );
    }
}
