use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use qb_report_tap::{
    auth,
    config::{Config, AUTH_REQUIRED_CONFIG_KEYS, SYNC_REQUIRED_CONFIG_KEYS},
    reporter::ErrorReporter,
    singer::StdoutSink,
    streams,
};
use reqwest::Client;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "qb-report-tap", version, about = "Extracts QuickBooks Profit & Loss reports as a Singer record stream")]
struct Args {
    /// Config file
    #[arg(short, long)]
    config: PathBuf,

    /// State file
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Establish user consent to retrieve OAuth2.0 credentials
    #[arg(short, long)]
    auth: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    // Records own stdout; everything else goes to stderr.
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();
    info!("startup");

    let args = Args::parse();
    let http = Client::new();
    let reporter = ErrorReporter::from_env(http.clone());

    // ─── 2) run, with one boundary for every failure ─────────────────
    if let Err(err) = run(&args, &http).await {
        error!("fatal: {err:#}");
        reporter.report(&err).await;
        return Err(err);
    }
    Ok(())
}

async fn run(args: &Args, http: &Client) -> Result<()> {
    if args.auth {
        info!("starting user consent");
        let mut config = Config::load(&args.config, AUTH_REQUIRED_CONFIG_KEYS)?;
        return auth::user_consent(http, &mut config, &args.config).await;
    }

    info!("starting sync");
    let mut config = Config::load(&args.config, SYNC_REQUIRED_CONFIG_KEYS)?;
    if let Some(state_path) = &args.state {
        load_state(state_path)?;
    }

    let schema_dir = Path::new("schemas");
    let mut sink = StdoutSink::new();
    streams::sync_all(http, &mut config, &args.config, schema_dir, &mut sink).await
}

/// Both streams are FULL_TABLE, so state carries no bookmarks; a supplied
/// state file is still parsed so a bad one fails before any network call.
fn load_state(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading state `{}`", path.display()))?;
    let _: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing state `{}`", path.display()))?;
    info!("loaded state file `{}`", path.display());
    Ok(())
}
