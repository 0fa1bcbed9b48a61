//! Mockserve - CLI Entry Point

use anyhow::Result;
use clap::{Parser, ValueEnum};
use mockserve::reload::{debounce, DEFAULT_DEBOUNCE};
use mockserve::{load_spec, HistoryRecorder, ReloadOrchestrator, SpecLauncher, SpecWatcher};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mockserve",
    about = "Declarative HTTP mock server driven by a JSON spec file",
    version
)]
struct Args {
    /// Path to the spec JSON file
    #[arg(short, long, default_value = "mock.spec.json")]
    spec: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    host: IpAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Do not reload when the spec file changes
    #[arg(long)]
    no_watch: bool,

    /// Validate the spec file and exit
    #[arg(long)]
    validate: bool,

    /// Print a sample spec and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    match args.log_format {
        LogFormat::Pretty => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(args.log_level)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(args.log_level)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    if args.print_config {
        println!("{}", include_str!("../demos/mock.spec.json"));
        return Ok(());
    }

    if args.validate {
        let spec = load_spec(&args.spec)?;
        println!(
            "Spec is valid ({} endpoints, {} variants)",
            spec.endpoints.len(),
            spec.variant_count()
        );
        return Ok(());
    }

    let addr = SocketAddr::new(args.host, args.port);
    let history = Arc::new(HistoryRecorder::default());
    let mut orchestrator = ReloadOrchestrator::new(SpecLauncher::new(&args.spec, addr, history));
    orchestrator.start().await?;
    info!(
        url = %format!("http://localhost:{}", args.port),
        spec = %args.spec.display(),
        "Mock server running"
    );

    if args.no_watch {
        wait_for_ctrl_c().await;
    } else {
        let (watcher, events) = SpecWatcher::new(&args.spec);
        let _watcher = watcher.run()?;

        let (trigger_tx, triggers) = mpsc::unbounded_channel();
        let debouncer = tokio::spawn(debounce(events, trigger_tx, DEFAULT_DEBOUNCE));

        orchestrator.run(triggers, wait_for_ctrl_c()).await;
        debouncer.abort();
    }

    info!("Shutting down");
    orchestrator.shutdown().await?;
    Ok(())
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
