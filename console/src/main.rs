//! Modboard console
//!
//! Terminal driver for the admin data layer:
//! 1. Log in (falls back to the demo pair when the backend is down)
//! 2. Watch a screen: bulk fetch, then live push updates until Ctrl-C
//! 3. Run moderation actions against a single record
//!
//! Usage:
//!   modboard-console login admin --password admin123
//!   modboard-console watch posts
//!   modboard-console watch users --status active --search ada
//!   modboard-console act users ban 42

use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use modboard_console::{
    TerminalRenderer, build_action, parse_assignment, parse_panel, parse_range, render_screen,
    render_stats, search_fields,
};
use modboard_store::EntityStore;
use modboard_sync::{
    AggregateBinding, AggregateSnapshot, ConsoleConfig, HttpTransport, LoginMode, PushChannel,
    ScreenBinding, SessionContext, SessionFile, Transport, login, logout,
};
use modboard_types::{AnalyticsPanel, DashboardStats, EntityKind, ListQuery, RecordId, TimeRange};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "modboard-console")]
#[command(about = "Modboard admin console")]
struct Args {
    /// REST base URL (overrides MODBOARD_API_BASE_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Push channel URL (overrides MODBOARD_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Path to the persisted session
    #[arg(short, long, global = true, default_value = "modboard-session.json")]
    session: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and persist the session
    Login {
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// End the session
    Logout,
    /// Show a screen and follow live changes until Ctrl-C
    Watch {
        kind: EntityKind,
        #[command(flatten)]
        filter: ListFilter,
    },
    /// Fetch a screen once and filter it
    Search { kind: EntityKind, term: String },
    /// Run a moderation action (delete, update, ban, unban, approve, flag,
    /// resolve, dismiss, reject, verify, assign, unassign)
    Act {
        kind: EntityKind,
        verb: String,
        id: String,
        /// Field to send with `update`, as field=value
        #[arg(long = "set", value_parser = parse_assignment)]
        fields: Vec<(String, Value)>,
    },
    /// Dashboard counters, or analytics for a range
    Stats {
        /// Analytics window: 7d, 30d, 90d or 1y
        #[arg(long, value_parser = parse_range)]
        range: Option<TimeRange>,
        /// Analytics panel (stats, user-growth, post-engagement,
        /// top-communities, recent-activity); defaults to stats
        #[arg(long, value_parser = parse_panel, requires = "range")]
        panel: Option<AnalyticsPanel>,
        /// Keep following pushed updates until Ctrl-C
        #[arg(long)]
        follow: bool,
    },
    /// Recent dashboard activity
    Activity,
}

/// Server-side list filters
#[derive(clap::Args, Debug)]
struct ListFilter {
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    role: Option<String>,
}

impl From<ListFilter> for ListQuery {
    fn from(filter: ListFilter) -> Self {
        ListQuery {
            page: filter.page,
            limit: filter.limit,
            search: filter.search,
            status: filter.status,
            role: filter.role,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = ConsoleConfig::from_env();
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if let Some(url) = args.ws_url {
        config.push_url = url;
    }

    let session = SessionContext::restore(SessionFile::new(&args.session))
        .with_context(|| format!("Failed to read session file {:?}", args.session))?;
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(&config, session.clone()).context("Failed to build HTTP client")?,
    );
    let push = Arc::new(PushChannel::new(&config, session.clone()));

    match args.command {
        Command::Login { username, password } => {
            match login(transport.as_ref(), &config, &username, &password).await? {
                LoginMode::Server => println!("Logged in as {username}"),
                LoginMode::Demo => println!("Backend unreachable; logged in with demo credentials"),
            }
        }
        Command::Logout => {
            logout(transport.as_ref(), &push).await;
            println!("Logged out");
        }
        Command::Watch { kind, filter } => {
            require_session(&session)?;
            connect_push(&push).await;
            let binding = ScreenBinding::mount_with_query(
                kind,
                filter.into(),
                transport,
                push.clone(),
                Arc::new(TerminalRenderer),
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            binding.unmount();
            push.disconnect();
        }
        Command::Search { kind, term } => {
            require_session(&session)?;
            let payload = transport.get(kind.collection_path()).await?;
            let mut store = EntityStore::new(kind);
            store.replace_all(payload.records(kind).records);
            store.sort_newest_first();
            let hits: Vec<_> = store
                .search(&term, search_fields(kind))
                .into_iter()
                .cloned()
                .collect();
            print!("{}", render_screen(kind, &hits));
        }
        Command::Act {
            kind,
            verb,
            id,
            fields,
        } => {
            require_session(&session)?;
            let fields: Map<String, Value> = fields.into_iter().collect();
            let action =
                build_action(kind, &verb, RecordId::new(id), fields).map_err(anyhow::Error::msg)?;
            let mutation = action.execute(transport.as_ref(), kind).await?;
            info!("Applied {mutation:?}");
            println!("{} {} on {kind}: ok", action.name(), action.target());
        }
        Command::Stats {
            range,
            panel,
            follow,
        } => {
            require_session(&session)?;
            let panel = panel.unwrap_or(AnalyticsPanel::Stats);
            match (range, follow) {
                (None, false) => {
                    let payload = transport.get("/admin/dashboard/stats").await?;
                    print!("{}", render_stats(&DashboardStats::from_json(&payload.data)));
                }
                (Some(range), false) => {
                    let payload = transport.get(&panel.path(range)).await?;
                    println!("{}", serde_json::to_string_pretty(&payload.data)?);
                }
                (None, true) => {
                    connect_push(&push).await;
                    let binding = AggregateBinding::dashboard(transport, push.clone());
                    follow_aggregate(binding.watch(), |stats| print!("{}", render_stats(stats)))
                        .await?;
                }
                (Some(range), true) => {
                    connect_push(&push).await;
                    let binding =
                        AggregateBinding::analytics_panel(panel, range, transport, push.clone());
                    follow_aggregate(binding.watch(), |value| {
                        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default())
                    })
                    .await?;
                }
            }
            push.disconnect();
        }
        Command::Activity => {
            require_session(&session)?;
            let payload = transport.get("/admin/dashboard/activity").await?;
            println!("{}", serde_json::to_string_pretty(&payload.data)?);
        }
    }

    Ok(())
}

fn require_session(session: &SessionContext) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Not logged in; run `modboard-console login` first");
    }
    Ok(())
}

// Screens still work from the initial fetch when the push channel is down.
async fn connect_push(push: &PushChannel) {
    match push.connect().await {
        Ok(state) => info!("Push channel {state:?}"),
        Err(e) => warn!("Live updates unavailable: {e}"),
    }
}

async fn follow_aggregate<T: Clone>(
    mut rx: watch::Receiver<AggregateSnapshot<T>>,
    show: impl Fn(&T),
) -> Result<()> {
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let value = rx.borrow_and_update().value.clone();
                if let Some(value) = value {
                    show(&value);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                return Ok(());
            }
        }
    }
}
