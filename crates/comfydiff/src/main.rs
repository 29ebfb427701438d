mod cli;
mod opener;
mod session;

use std::sync::Arc;
use std::time::Duration;

use cli::{CliError, CliOptions};
use opener::SystemOpener;
use session::{Session, SessionExit};
use shared::checker::ComfyDiffChecker;
use shared::config::{CheckerConfig, load_dotenv};
use shared::snapshot_store::SnapshotStore;
use shared::source::GithubManifestSource;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "comfydiff=info,shared=info".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = match CliOptions::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(CliError::HelpRequested) => {
            print_usage();
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    let mut config = match CheckerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("failed to read comfydiff config: {err}");
            std::process::exit(1);
        }
    };
    options.apply(&mut config);

    let store = match SnapshotStore::open(config.snapshot_dir.clone()) {
        Ok(store) => store,
        Err(err) => {
            error!("failed to open snapshot folder: {err}");
            std::process::exit(1);
        }
    };

    let source = match GithubManifestSource::new(config.github.clone()) {
        Ok(source) => source,
        Err(err) => {
            error!("failed to build manifest source: {err}");
            std::process::exit(1);
        }
    };

    let checker = ComfyDiffChecker::new(store, Arc::new(source), config.diff_write_mode);
    let opener = SystemOpener::from_config(&config);

    info!(
        dir = %config.snapshot_dir.display(),
        auto = options.auto,
        "comfydiff starting (idle timeout {} seconds)",
        config.idle_timeout_seconds
    );

    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            interrupt_tx.send_replace(true);
        }
    });

    let session = Session::new(
        &checker,
        &opener,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
        Duration::from_secs(config.idle_timeout_seconds),
    )
    .with_interrupt(interrupt_rx);

    let result = if options.auto {
        session.run_auto_action().await
    } else {
        session.run().await
    };

    // A pending stdin read would otherwise hold the runtime open on shutdown.
    match result {
        Ok(SessionExit::Interrupted) => {
            info!("shutdown signal received");
            std::process::exit(130);
        }
        Ok(exit) => {
            info!(?exit, "comfydiff exiting");
            std::process::exit(0);
        }
        Err(err) => {
            error!("session failed: {err}");
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!(
        "Usage: comfydiff [--auto] [--append] [--dir PATH] [--timeout SECONDS]\n\
         \n\
         Without --auto an interactive menu runs; after SECONDS of inactivity\n\
         (default 30) today's snapshot is refreshed and the diff file opened.\n\
         \n\
         Options:\n\
         - --auto             Run the automatic refresh once and exit\n\
         - --append           Append to the diff file instead of overwriting it\n\
         - --dir PATH         Snapshot folder (default: comfydiff)\n\
         - --timeout SECONDS  Idle timeout before the automatic refresh\n\
         - --help             Show this help text"
    );
}
