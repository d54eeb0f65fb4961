//! # happywatch
//!
//! Command-line front end: opens the activity database, then runs one of
//! the views, the live monitor, an export or a single write.

#![deny(unsafe_code)]

mod render;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use happywatch_aggregate::{Monitor, WindowAggregator};
use happywatch_core::{Clock, NewActivity, SystemClock};
use happywatch_settings::HappywatchSettings;
use happywatch_store::{ConnectionConfig, ConnectionPool, EventStore, RateLimiter};
use happywatch_telemetry::{init_telemetry, TelemetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Activity monitor and rate limiter over a shared SQLite log.
#[derive(Parser, Debug)]
#[command(name = "happywatch", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.happywatch/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding settings.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the database schema.
    InitDb,
    /// Refresh live activity until Ctrl+C.
    Live {
        /// Also print events appended since the previous refresh.
        #[arg(long)]
        tail: bool,
    },
    /// Traffic summary over the summary window or since an instant.
    Summary {
        /// RFC 3339 lower bound, e.g. `2026-10-18T09:00:00Z`.
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Actor progress followed by inactive actors.
    Students,
    /// Write the activity log as CSV to stdout.
    Export {
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        #[arg(long)]
        actor: Option<String>,
    },
    /// All views as one JSON document.
    Dashboard,
    /// Count one request for SOURCE and print the decision.
    Check { source: String },
    /// Append one activity event.
    Record {
        endpoint: String,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        status: Option<u16>,
        #[arg(long)]
        duration_ms: Option<i64>,
    },
    /// Requests logged since the start of the current UTC day.
    Status,
}

struct App {
    settings: HappywatchSettings,
    pool: ConnectionPool,
    clock: Arc<dyn Clock>,
}

impl App {
    fn open(settings: HappywatchSettings) -> Result<Self> {
        let config = ConnectionConfig {
            pool_size: settings.database.pool_size,
            busy_timeout_ms: settings.database.busy_timeout_ms,
            ..ConnectionConfig::default()
        };
        let path = &settings.database.path;
        let pool = happywatch_store::open_file(path, &config)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Ok(Self {
            settings,
            pool,
            clock: Arc::new(SystemClock),
        })
    }

    fn events(&self) -> EventStore {
        EventStore::new(self.pool.clone(), Arc::clone(&self.clock))
    }

    fn limiter(&self) -> Result<RateLimiter> {
        let config = self.settings.rate_limit.to_config()?;
        Ok(RateLimiter::new(self.pool.clone(), Arc::clone(&self.clock), config)?)
    }

    fn aggregator(&self) -> Result<WindowAggregator> {
        let windows = self.settings.windows.to_config()?;
        Ok(WindowAggregator::new(self.pool.clone(), Arc::clone(&self.clock), windows)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match cli.config {
        Some(ref path) => happywatch_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => happywatch_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(db) = cli.db {
        settings.database.path = db;
    }

    init_telemetry(&TelemetryConfig::from(&settings.logging));

    let app = App::open(settings)?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::InitDb => {
            info!(path = %app.settings.database.path.display(), "database ready");
            writeln!(stdout, "database ready: {}", app.settings.database.path.display())?;
        }
        Command::Live { tail } => {
            drop(stdout);
            run_live(&app, tail).await?;
        }
        Command::Summary { since } => {
            let agg = app.aggregator()?;
            let summary = match since {
                Some(since) => agg.summary_since(since)?,
                None => agg.traffic_summary()?,
            };
            write!(stdout, "{}", render::summary(&summary))?;
        }
        Command::Students => {
            let agg = app.aggregator()?;
            write!(stdout, "{}", render::progress(&agg.actor_progress()?))?;
            writeln!(stdout)?;
            write!(
                stdout,
                "{}",
                render::inactive(&agg.inactive_actors()?, app.clock.now())
            )?;
        }
        Command::Export { since, actor } => {
            let events = app.events().export(since, actor.as_deref())?;
            write!(stdout, "{}", render::csv(&events))?;
            info!(rows = events.len(), "export complete");
        }
        Command::Dashboard => {
            let snapshot = app.aggregator()?.snapshot()?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&snapshot)?)?;
        }
        Command::Check { source } => {
            let decision = app.limiter()?.admit(&source)?;
            writeln!(stdout, "{}", render::decision(&source, &decision))?;
        }
        Command::Record {
            endpoint,
            actor,
            session,
            source,
            agent,
            status,
            duration_ms,
        } => {
            let events = app.events();
            let id = events.append(NewActivity {
                endpoint: endpoint.clone(),
                actor: actor.clone(),
                session,
                source,
                agent,
                status,
                duration_ms,
            })?;
            match actor.filter(|a| !a.trim().is_empty()) {
                Some(actor) => {
                    let seq = events.count_for_actor(&actor, &endpoint)?;
                    writeln!(stdout, "recorded #{id} ({actor} {endpoint} #{seq})")?;
                }
                None => writeln!(stdout, "recorded #{id}")?,
            }
        }
        Command::Status => {
            let now = app.clock.now();
            let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
            let today = app.events().count_since(midnight)?;
            writeln!(stdout, "requests today: {today}")?;
        }
    }

    Ok(())
}

async fn run_live(app: &App, tail: bool) -> Result<()> {
    let monitor = Monitor::new(
        app.aggregator()?,
        app.events(),
        app.settings.monitor.refresh_interval(),
    )
    .with_tail(tail || app.settings.monitor.tail);

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    let _ = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        stopper.cancel();
    });

    info!(interval_ms = app.settings.monitor.refresh_interval_ms, "monitor started");
    monitor
        .run(cancel, |tick| {
            print!("{}", render::live(&tick));
            let _ = std::io::stdout().flush();
        })
        .await;
    info!("monitor stopped");
    Ok(())
}
