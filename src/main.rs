use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use time::UtcOffset;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vpos_reset::clock;
use vpos_reset::engine::{select_accessible, Engine};
use vpos_reset::settings::{load_settings, Settings};
use vpos_reset::types::{GroupRecord, Progress};
use vpos_reset::server;

/// vpos-reset — find reachable self-checkout shares and set their VPOS reset flag safely.
#[derive(Debug, Parser)]
#[command(
    name = "vpos-reset",
    version,
    about = "Find reachable self-checkout shares and set their ResetVPOSData flag (backup before every write).",
    long_about = None
)]
struct Cli {
    /// Settings file (YAML). If omitted, loads ./vpos-reset.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Max endpoints probed at once.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Per-endpoint probe timeout in milliseconds.
    #[arg(long = "timeout-ms", global = true)]
    timeout_ms: Option<u64>,

    /// Append-only activity log.
    #[arg(long = "log-file", global = true)]
    log_file: Option<PathBuf>,

    /// Reach shares below this directory instead of through UNC paths.
    #[arg(long = "mount-root", global = true)]
    mount_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan all stores (or one) and show accessible checkouts with their current value
    Scan {
        /// Only scan this store number
        #[arg(long)]
        group: Option<u16>,
        /// Write results as pretty JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Scan, then write a new ResetVPOSData value to the selected checkouts
    Reset {
        /// Value to write
        #[arg(long)]
        value: i32,
        /// Every accessible checkout found by the scan
        #[arg(long, conflicts_with = "target")]
        all: bool,
        /// Checkouts as STORE:SCO, e.g. 002:031 (repeatable)
        #[arg(long)]
        target: Vec<String>,
        /// Apply the change; without this only the plan is printed
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Serve the JSON API for front ends
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

fn main() -> Result<()> {
    // Only possible while the process is still single-threaded.
    let offset = clock::pin_local_offset();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(run(offset))
}

async fn run(offset: Option<UtcOffset>) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vpos_reset=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = apply_overrides(load_settings(cli.config.as_deref())?, &cli);
    print_settings(&settings, offset);

    let engine = Engine::new(&settings).context("failed to start engine")?;

    match cli.command {
        Commands::Scan { group, output } => {
            let (tx, printer) = progress_printer();
            let groups = match group {
                Some(g) => vec![engine.scan_group(g, Some(&tx)).await?],
                None => engine.scan_all(Some(&tx)).await?,
            };
            drop(tx);
            let _ = printer.await;

            print_groups(&groups);
            if let Some(path) = output.as_deref() {
                if let Err(e) = write_results_json(path, &groups) {
                    eprintln!("Failed to write JSON to {}: {}", path.display(), e);
                } else {
                    println!("Wrote JSON results to {}", path.display());
                }
            }
        }
        Commands::Reset { value, all, target, yes } => {
            if !all && target.is_empty() {
                bail!("select checkouts with --all or --target STORE:SCO");
            }
            let targets = engine.parse_targets(target.as_slice())?;

            let (tx, printer) = progress_printer();
            let groups = if all {
                engine.scan_all(Some(&tx)).await?
            } else {
                let mut stores: Vec<u16> = targets.iter().map(|t| t.group).collect();
                stores.sort_unstable();
                stores.dedup();
                let mut groups = Vec::new();
                for g in stores {
                    groups.push(engine.scan_group(g, Some(&tx)).await?);
                }
                groups
            };

            let filter = if all { None } else { Some(targets.as_slice()) };
            let mut selection = select_accessible(&groups, filter);
            if selection.is_empty() {
                drop(tx);
                let _ = printer.await;
                bail!("none of the selected checkouts is accessible");
            }

            println!("\nSet ResetVPOSData to {value} on {} checkout(s):", selection.len());
            for rec in &selection {
                println!("  Store {} {}  ({})", rec.id.group_label(), rec.id.display_name(), rec.status);
            }
            if !yes {
                drop(tx);
                let _ = printer.await;
                println!("\nNothing changed. Re-run with --yes to apply.");
                return Ok(());
            }

            let tally = engine.apply_value(&mut selection, value, Some(&tx)).await;
            drop(tx);
            let _ = printer.await;

            println!();
            for rec in &selection {
                println!("  Store {} {}  {}", rec.id.group_label(), rec.id.display_name(), rec.status);
            }
            println!("\nReset operation completed: {} successful, {} failed", tally.success, tally.failure);
            println!("Log: {}", engine.journal().path().display());
        }
        Commands::Serve { bind } => {
            println!("API server starting at http://{} (Ctrl+C to stop)", bind);
            tokio::select! {
                res = server::spawn_server(&bind, engine) => res?,
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    Ok(())
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(c) = cli.concurrency {
        settings.concurrency = c;
    }
    if let Some(t) = cli.timeout_ms {
        settings.probe_timeout_ms = t;
    }
    if let Some(p) = &cli.log_file {
        settings.log_file = p.clone();
    }
    if let Some(p) = &cli.mount_root {
        settings.mount_root = Some(p.clone());
    }
    settings
}

fn print_settings(s: &Settings, offset: Option<UtcOffset>) {
    println!("vpos-reset configuration:");
    println!("  stores       : {:03}-{:03}", s.first_store, s.last_store);
    println!("  units        : {}", s.units);
    println!(
        "  shares       : {}",
        s.mount_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<UNC>".to_string())
    );
    println!("  concurrency  : {}", s.concurrency);
    println!("  timeout_ms   : {}", s.probe_timeout_ms);
    println!("  log_file     : {}", s.log_file.display());
    match offset {
        Some(o) => println!("  timestamps   : local (UTC{:+03}:{:02})", o.whole_hours(), o.minutes_past_hour().abs()),
        None => println!("  timestamps   : UTC (local offset unavailable)"),
    }
}

fn progress_printer() -> (mpsc::UnboundedSender<Progress>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
    let handle = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            if p.total > 0 {
                eprintln!("[{:>3}/{:<3}] {}", p.done, p.total, p.message);
            } else {
                eprintln!("{}", p.message);
            }
        }
    });
    (tx, handle)
}

fn print_groups(groups: &[GroupRecord]) {
    let accessible: usize = groups.iter().map(GroupRecord::accessible_count).sum();
    println!(
        "\nAccessible checkouts: {} in {} store(s)",
        accessible,
        groups.iter().filter(|g| g.has_accessible()).count()
    );

    let addr_w = groups
        .iter()
        .flat_map(|g| g.endpoints.iter())
        .map(|e| e.address.len())
        .max()
        .unwrap_or(0)
        .max("address".len());
    let status_w = 18usize;

    println!(
        "{:<5}  {:<3}  {:<addr_w$}  {:<status_w$}",
        "store",
        "sco",
        "address",
        "status",
        addr_w = addr_w,
        status_w = status_w
    );
    println!(
        "{:-<5}  {:-<3}  {:-<addr_w$}  {:-<status_w$}",
        "",
        "",
        "",
        "",
        addr_w = addr_w,
        status_w = status_w
    );
    for g in groups {
        for e in &g.endpoints {
            println!(
                "{:<5}  {:<3}  {:<addr_w$}  {:<status_w$}",
                e.id.group_label(),
                e.id.unit_label(),
                e.address,
                e.status.label(),
                addr_w = addr_w,
                status_w = status_w
            );
        }
    }
}

fn write_results_json(path: &Path, groups: &[GroupRecord]) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, groups)?;
    Ok(())
}
