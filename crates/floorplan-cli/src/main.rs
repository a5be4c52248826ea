mod report;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use floorplan_client::config::base_url_for;
use floorplan_client::preloaded::pick_preloaded;
use floorplan_client::upload::guess_content_type;
use floorplan_client::{
    Anonymous, ApiClient, AuthProvider, ClientConfig, DirResourceStore, Environment,
    PlanUploader, Slot, StaticSession, UploadFile, User,
};

#[derive(Debug, Parser)]
#[command(name = "floorplan", version, about = "Floor-plan recognition demo client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EnvArg {
    Production,
    Development,
}

impl From<EnvArg> for Environment {
    fn from(value: EnvArg) -> Self {
        match value {
            EnvArg::Production => Environment::Production,
            EnvArg::Development => Environment::Development,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a plan and wait for every recognition result
    Upload(UploadArgs),
    /// Print up to three randomly chosen example plans
    Examples {
        /// Candidate plan paths or URLs
        #[arg(required = true)]
        plans: Vec<String>,
    },
}

#[derive(Debug, clap::Args)]
struct UploadArgs {
    /// Plan image: a local .jpg/.jpeg/.png file or an http(s) URL
    source: String,

    /// Directory receiving the overlays and statistics
    #[arg(long, default_value = "floorplan-results")]
    out_dir: PathBuf,

    /// Base API URL (overrides --env)
    #[arg(long, env = "FLOORPLAN_API_URL")]
    api_url: Option<String>,

    #[arg(long, value_enum, env = "FLOORPLAN_ENV")]
    env: Option<EnvArg>,

    /// Site origin serving the production API
    #[arg(long, env = "FLOORPLAN_ORIGIN")]
    origin: Option<String>,

    /// Access token issued by the identity provider
    #[arg(long, env = "FLOORPLAN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Email reported as the uploading user
    #[arg(long, env = "FLOORPLAN_EMAIL")]
    email: Option<String>,

    /// Seconds between result polls
    #[arg(long, value_parser = parse_interval)]
    poll_interval: Option<Duration>,

    /// Pending polls tolerated per result before giving up
    #[arg(long)]
    max_poll_iterations: Option<u32>,
}

/// Parse a positive, finite number of seconds.
fn parse_interval(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    if secs <= 0.0 {
        return Err("poll interval must be positive".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid poll interval: {e}"))
}

impl UploadArgs {
    fn config(&self) -> ClientConfig {
        self.config_from(ClientConfig::default())
    }

    /// Apply the command-line overrides on top of `config`.
    fn config_from(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(env) = self.env {
            let origin = self
                .origin
                .as_deref()
                .unwrap_or(floorplan_client::config::DEFAULT_PRODUCTION_ORIGIN);
            config.base_url = base_url_for(env.into(), origin);
        }
        if let Some(url) = &self.api_url {
            config.base_url = url.clone();
        }
        if let Some(interval) = self.poll_interval {
            config.poll.interval = interval;
        }
        if let Some(max) = self.max_poll_iterations {
            config.poll.max_iterations = max.max(1);
        }
        config
    }

    fn auth(&self) -> Arc<dyn AuthProvider> {
        if self.token.is_none() && self.email.is_none() {
            return Arc::new(Anonymous);
        }
        let user = self.email.as_ref().map(|email| User {
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: Some(email.clone()),
        });
        Arc::new(StaticSession {
            user,
            token: self.token.clone(),
        })
    }
}

/// Initialize tracing with FLOORPLAN_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("FLOORPLAN_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("floorplan_client={level},floorplan={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Load the plan from disk or download it.
async fn load_plan(api: &ApiClient, source: &str) -> anyhow::Result<UploadFile> {
    if !is_remote(source) {
        return UploadFile::from_path(source)
            .await
            .with_context(|| format!("failed to read {source}"));
    }

    let (content_type, bytes) = api
        .fetch_bytes(source)
        .await
        .with_context(|| format!("failed to download {source}"))?;
    let name = source
        .split(['?', '#'])
        .next()
        .and_then(|s| s.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .unwrap_or("plan")
        .to_string();
    let content_type = content_type.unwrap_or_else(|| guess_content_type(&name));
    Ok(UploadFile::from_bytes(name, content_type, bytes))
}

async fn upload(args: UploadArgs) -> anyhow::Result<()> {
    let config = args.config();
    info!(api = %config.base_url, "Using recognition back end");

    let store = Arc::new(
        DirResourceStore::new(&args.out_dir)
            .with_context(|| format!("failed to create {}", args.out_dir.display()))?,
    );
    let uploader = PlanUploader::from_config(&config, args.auth(), store)
        .context("invalid client configuration")?;

    let file = load_plan(uploader.api(), &args.source).await?;

    let watchers: Vec<_> = Slot::ALL
        .iter()
        .map(|&slot| {
            let mut rx = uploader.results().subscribe(slot);
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    if let Some(result) = rx.borrow_and_update().clone() {
                        report::print_published(slot, &result);
                    }
                }
            })
        })
        .collect();

    let outcome = tokio::select! {
        result = uploader.upload_plan(&file) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling upload");
            uploader.cancel();
            bail!("interrupted");
        }
    };

    let statistics = uploader
        .results()
        .get(Slot::Statistics)
        .and_then(|r| r.as_statistics().cloned());

    // Closing the result channels lets each watcher print its last value and exit.
    drop(uploader);
    for watcher in watchers {
        let _ = watcher.await;
    }
    outcome.context("upload failed")?;

    if let Some(statistics) = statistics {
        let path = args.out_dir.join("statistics.json");
        let json = serde_json::to_string_pretty(&statistics)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        report::print_statistics(&statistics);
    }

    Ok(())
}

fn examples(plans: Vec<String>) {
    for plan in pick_preloaded(plans, &mut rand::rng()) {
        println!("{plan}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Upload(args) => upload(args).await,
        Command::Examples { plans } => {
            examples(plans);
            Ok(())
        }
    }
}
