// Always-on scheduler: polls the schedule file and uploads due entries

use chrono::Utc;
use clap::Parser;
use shorts_uploader::accounts::AccountStore;
use shorts_uploader::config::{AppPaths, ConfigManager};
use shorts_uploader::error::Result;
use shorts_uploader::logging::{init_logging, log_configuration};
use shorts_uploader::schedule::{install_shutdown_handler, ScheduleRunner};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "shorts-scheduler", version, about = "Upload scheduled YouTube Shorts when they come due")]
struct Args {
    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Seconds between passes (default: check_interval_secs from config)
    #[arg(long)]
    interval: Option<u64>,

    /// Config directory (default: ~/.youtube_shorts_uploader)
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = init_logging("shorts-scheduler") {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(args).await {
        tracing::error!("Scheduler failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    // before anything slow, so a stop request never hits the default handler
    let shutdown = if args.once { None } else { Some(install_shutdown_handler()?) };

    let paths = AppPaths::resolve(args.config_dir.as_deref());
    paths.ensure()?;
    let config = ConfigManager::open(&paths)?;
    let settings = config.settings();

    let accounts = AccountStore::load(paths.accounts_file())?;
    let tokens = paths.token_store(settings);
    let signed_in = accounts
        .list()
        .iter()
        .filter(|a| matches!(tokens.load(&a.id), Ok(Some(_))))
        .count();
    log_configuration(settings, signed_in > 0);
    if signed_in == 0 {
        tracing::warn!("No account has a stored token; run `shorts-uploader auth login` first");
    }

    let runner = ScheduleRunner::from_settings(&paths, settings);

    let Some(shutdown) = shutdown else {
        runner.process_due(Utc::now()).await?;
        return Ok(());
    };

    let interval = Duration::from_secs(args.interval.unwrap_or(settings.check_interval_secs).max(1));
    runner.run_service(interval, shutdown).await
}
