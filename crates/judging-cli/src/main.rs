//! Awards judging CLI
//!
//! The `awards-judge` command runs judging batches against the configured
//! store.
//!
//! ## Commands
//!
//! - `import`: Load judges, organisations, awards, entries and scores from JSON
//! - `assign`: Assign judges to submitted entries
//! - `shortlist`: Shortlist the top entries of one award
//! - `shortlist-all`: Shortlist every active award
//! - `conflicts`: List judge/entry conflicts of interest
//!
//! Every command prints its result as JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use judging_core::{AssignmentEngine, JudgingConfig, Notifier, ShortlistRanker, TracingNotifier};
use judging_mailer::SendGridMailer;
use judging_state::{AwardId, Dataset, JudgingStore, SurrealJudgingStore};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "awards-judge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Judge assignment and shortlisting for awards programs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Judging configuration file (TOML)
    #[arg(short, long, global = true, env = "AWARDS_JUDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a dataset file into the store
    Import {
        /// Path to the dataset (JSON)
        dataset: PathBuf,
    },

    /// Assign judges to submitted entries
    Assign {
        /// Only entries of this award
        #[arg(short, long)]
        award: Option<String>,

        /// Plan assignments without writing or notifying
        #[arg(long)]
        dry_run: bool,
    },

    /// Shortlist the top entries of one award
    Shortlist {
        /// Award to shortlist
        #[arg(short, long)]
        award: String,

        /// Shortlist size (default from config)
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Rank without marking or notifying
        #[arg(long)]
        dry_run: bool,
    },

    /// Shortlist every active award
    ShortlistAll {
        /// Shortlist size per award (default from config)
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
    },

    /// List judges that conflict with submitted entries
    Conflicts {
        /// Only entries of this award
        #[arg(short, long)]
        award: Option<String>,
    },
}

/// Collaborators shared by every command.
struct App {
    store: Arc<dyn JudgingStore>,
    notifier: Arc<dyn Notifier>,
    config: JudgingConfig,
}

impl App {
    fn engine(&self) -> AssignmentEngine {
        AssignmentEngine::new(self.store.clone(), self.notifier.clone(), self.config.clone())
    }

    fn ranker(&self) -> ShortlistRanker {
        ShortlistRanker::new(self.store.clone(), self.notifier.clone(), self.config.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    judging_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    let store = SurrealJudgingStore::from_env()
        .await
        .context("Failed to connect to judging database")?;

    let app = App {
        store: Arc::new(store),
        notifier: build_notifier(&config)?,
        config,
    };

    let output = match cli.command {
        Commands::Import { dataset } => cmd_import(&app, &dataset).await,
        Commands::Assign { award, dry_run } => cmd_assign(&app, award.as_deref(), dry_run).await,
        Commands::Shortlist {
            award,
            top_n,
            dry_run,
        } => cmd_shortlist(&app, &award, top_n, dry_run).await,
        Commands::ShortlistAll { top_n } => cmd_shortlist_all(&app, top_n).await,
        Commands::Conflicts { award } => cmd_conflicts(&app, award.as_deref()).await,
    }?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<JudgingConfig> {
    match path {
        Some(path) => JudgingConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(JudgingConfig::default()),
    }
}

/// SendGrid when `SENDGRID_API_KEY` is set, otherwise log-only delivery.
fn build_notifier(config: &JudgingConfig) -> Result<Arc<dyn Notifier>> {
    if std::env::var_os("SENDGRID_API_KEY").is_some() {
        let mailer = SendGridMailer::from_env(config.templates.clone())
            .context("Failed to configure SendGrid mailer")?;
        info!("delivering notifications through SendGrid");
        Ok(Arc::new(mailer))
    } else {
        Ok(Arc::new(TracingNotifier::new(config.templates.clone())))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialise command output")
}

async fn cmd_import(app: &App, path: &Path) -> Result<Value> {
    let dataset =
        Dataset::from_path(path).with_context(|| format!("Failed to read dataset {:?}", path))?;
    let summary = dataset
        .load_into(app.store.as_ref())
        .await
        .context("Failed to import dataset")?;
    to_json(&summary)
}

async fn cmd_assign(app: &App, award: Option<&str>, dry_run: bool) -> Result<Value> {
    let award = award.map(AwardId::new);
    let engine = app.engine();
    if dry_run {
        let plans = engine
            .preview(award.as_ref())
            .await
            .context("Failed to plan assignments")?;
        return Ok(json!({ "dry_run": true, "plans": to_json(&plans)? }));
    }
    let summary = engine
        .assign_judges(award.as_ref())
        .await
        .context("Assignment batch failed")?;
    to_json(&summary)
}

async fn cmd_shortlist(
    app: &App,
    award: &str,
    top_n: Option<usize>,
    dry_run: bool,
) -> Result<Value> {
    let award = AwardId::new(award);
    let ranker = app.ranker();
    let ranked = if dry_run {
        ranker.preview_shortlist(&award, top_n).await
    } else {
        ranker.generate_shortlist(&award, top_n).await
    }
    .with_context(|| format!("Failed to shortlist award {award}"))?;
    Ok(json!({
        "award_id": award,
        "dry_run": dry_run,
        "shortlist": to_json(&ranked)?,
    }))
}

async fn cmd_shortlist_all(app: &App, top_n: Option<usize>) -> Result<Value> {
    let results = app
        .ranker()
        .generate_all_shortlists(top_n)
        .await
        .context("Failed to shortlist active awards")?;
    to_json(&results)
}

async fn cmd_conflicts(app: &App, award: Option<&str>) -> Result<Value> {
    let award = award.map(AwardId::new);
    let report = app
        .engine()
        .conflict_report(award.as_ref())
        .await
        .context("Failed to build conflict report")?;
    to_json(&report)
}
