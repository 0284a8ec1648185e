use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use leadbase_adapters::{FileSource, SalaryConfidence, TextGenClient};
use leadbase_core::feed::ActivityFeed;
use leadbase_core::DedupeOutcome;
use leadbase_ingest::{import_csv, AppConfig, HookEngine, HookJobSpec, JobTracker};
use leadbase_storage::PgLeadStore;
use leadbase_web::AppState;

#[derive(Debug, Parser)]
#[command(name = "leadbase")]
#[command(about = "Lead ingestion, enrichment, and dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run migrations and start the web dashboard.
    Serve,
    /// Create or update the database schema.
    Setup,
    /// Import CSV files into the lead table.
    Upload {
        /// Local CSV files to import.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Import a single remote file by id.
        #[arg(long = "drive-file")]
        drive_file: Option<String>,
        /// Import every CSV in the configured remote folder.
        #[arg(long)]
        all: bool,
        /// File-source token; falls back to $DRIVE_TOKEN, then $DRIVE_TOKEN_FILE.
        #[arg(long = "api-key")]
        api_key: Option<String>,
    },
    /// List CSV files in the configured remote folder.
    ListFiles {
        #[arg(long = "api-key")]
        api_key: Option<String>,
    },
    /// Collapse duplicate leads sharing a profile URL.
    Dedupe,
    /// Generate outreach hooks for leads that lack one.
    Hooks {
        /// Only this lead.
        #[arg(long)]
        lead: Option<i64>,
        /// Stop after this many leads.
        #[arg(long)]
        limit: Option<i64>,
        /// Regenerate hooks that already exist.
        #[arg(long)]
        regenerate: bool,
        /// Text-generation token; falls back to $OPENAI_API_KEY, then
        /// $OPENAI_API_KEY_FILE.
        #[arg(long = "api-key")]
        api_key: Option<String>,
    },
    /// Screen leads for likely sub-$150k salaries and flag them for removal.
    Screen {
        /// Actually delete the flagged leads instead of printing them.
        #[arg(long)]
        confirm: bool,
        #[arg(long = "api-key")]
        api_key: Option<String>,
    },
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info")?;
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command {
        Commands::Serve => serve(&config).await,
        Commands::Setup => setup(&config).await,
        Commands::Upload {
            files,
            drive_file,
            all,
            api_key,
        } => upload(&config, files, drive_file, all, api_key).await,
        Commands::ListFiles { api_key } => list_files(&config, api_key).await,
        Commands::Dedupe => dedupe(&config).await,
        Commands::Hooks {
            lead,
            limit,
            regenerate,
            api_key,
        } => hooks(&config, lead, limit, regenerate, api_key).await,
        Commands::Screen { confirm, api_key } => screen(&config, confirm, api_key).await,
    }
}

async fn serve(config: &AppConfig) -> Result<()> {
    let pool = leadbase_storage::connect_pool(&config.database_url).await?;
    leadbase_storage::run_migrations(&pool).await?;

    let tracker = Arc::new(JobTracker::new());
    let feed = Arc::new(ActivityFeed::new(config.feed_capacity));

    // Hook generation is optional at serve time; without a key the dashboard
    // still works and the hook endpoint reports itself unavailable.
    let hooks = match config.textgen_key_resolver(None).resolve() {
        Ok(resolved) => {
            let client = TextGenClient::new(resolved.key, config.textgen_config())
                .context("building text-generation client")?;
            Some(HookEngine::new(
                pool.clone(),
                Arc::new(client),
                tracker.clone(),
                feed.clone(),
                config.hook_concurrency,
            ))
        }
        Err(err) => {
            tracing::warn!(%err, "hook generation disabled");
            None
        }
    };

    let state = AppState::new(pool, tracker, feed, hooks);
    leadbase_web::serve(state, config.web_port).await
}

async fn setup(config: &AppConfig) -> Result<()> {
    let pool = leadbase_storage::connect_pool(&config.database_url).await?;
    leadbase_storage::run_migrations(&pool).await?;
    println!("database schema is up to date");
    Ok(())
}

async fn upload(
    config: &AppConfig,
    files: Vec<PathBuf>,
    drive_file: Option<String>,
    all: bool,
    api_key: Option<String>,
) -> Result<()> {
    if files.is_empty() && drive_file.is_none() && !all {
        bail!("nothing to import: pass --file, --drive-file, or --all");
    }

    let pool = leadbase_storage::connect_pool(&config.database_url).await?;
    leadbase_storage::run_migrations(&pool).await?;
    let store = PgLeadStore::new(pool);

    for path in &files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let summary = import_csv(&store, &name, &bytes).await?;
        print_summary(&summary);
    }

    if drive_file.is_some() || all {
        let resolved = config.drive_key_resolver(api_key).resolve()?;
        let source = FileSource::new(resolved.key, config.file_source_config())
            .context("building file-source client")?;

        if let Some(file_id) = drive_file {
            let bytes = source.download(&file_id).await?;
            let summary = import_csv(&store, &file_id, &bytes).await?;
            print_summary(&summary);
        }

        if all {
            let listing = source.list_csv_files().await?;
            if listing.is_empty() {
                println!("no CSV files found in the configured folder");
            }
            for file in listing {
                let bytes = source.download(&file.id).await?;
                let summary = import_csv(&store, &file.name, &bytes).await?;
                print_summary(&summary);
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &leadbase_core::ImportSummary) {
    println!(
        "{}: {} inserted, {} updated, {} failed ({})",
        summary.filename,
        summary.inserted,
        summary.updated,
        summary.failed,
        summary.status().as_str()
    );
    for error in &summary.sample_errors {
        println!("  {error}");
    }
    if summary.dedupe.records_removed > 0 {
        println!(
            "  dedupe: {} groups, {} records removed",
            summary.dedupe.groups_found, summary.dedupe.records_removed
        );
    }
}

async fn list_files(config: &AppConfig, api_key: Option<String>) -> Result<()> {
    let resolved = config.drive_key_resolver(api_key).resolve()?;
    let source = FileSource::new(resolved.key, config.file_source_config())
        .context("building file-source client")?;

    let files = source.list_csv_files().await?;
    if files.is_empty() {
        println!("no CSV files found in the configured folder");
        return Ok(());
    }
    for file in files {
        let modified = file
            .modified_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let size = file
            .size_bytes
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}  {}  {} bytes  {}", file.id, modified, size, file.name);
    }
    Ok(())
}

async fn dedupe(config: &AppConfig) -> Result<()> {
    use leadbase_storage::LeadStore;

    let pool = leadbase_storage::connect_pool(&config.database_url).await?;
    let before = leadbase_storage::lead_count(&pool).await?;
    let store = PgLeadStore::new(pool);
    let outcome = store.dedupe().await?;
    let after = leadbase_storage::lead_count(store.pool()).await?;
    print!("{}", dedupe_report(before, after, &outcome));
    Ok(())
}

fn dedupe_report(before: i64, after: i64, outcome: &DedupeOutcome) -> String {
    format!(
        "leads before: {before}\nleads after: {after}\nduplicate groups: {}\nrecords removed: {}\n",
        outcome.groups_found, outcome.records_removed
    )
}

async fn hooks(
    config: &AppConfig,
    lead: Option<i64>,
    limit: Option<i64>,
    regenerate: bool,
    api_key: Option<String>,
) -> Result<()> {
    let resolved = config.textgen_key_resolver(api_key).resolve()?;
    let client = TextGenClient::new(resolved.key, config.textgen_config())
        .context("building text-generation client")?;

    let pool = leadbase_storage::connect_pool(&config.database_url).await?;
    let engine = HookEngine::new(
        pool,
        Arc::new(client),
        Arc::new(JobTracker::new()),
        Arc::new(ActivityFeed::new(config.feed_capacity)),
        config.hook_concurrency,
    );

    let summary = engine
        .run_to_completion(HookJobSpec {
            lead_id: lead,
            limit,
            regenerate,
        })
        .await?;
    println!(
        "hooks: {} leads, {} generated, {} failed",
        summary.total, summary.succeeded, summary.failed
    );
    Ok(())
}

async fn screen(config: &AppConfig, confirm: bool, api_key: Option<String>) -> Result<()> {
    let resolved = config.textgen_key_resolver(api_key).resolve()?;
    let client = TextGenClient::new(resolved.key, config.textgen_config())
        .context("building text-generation client")?;

    let pool = leadbase_storage::connect_pool(&config.database_url).await?;
    let leads = leadbase_storage::all_leads(&pool).await?;
    println!("screening {} leads", leads.len());

    let mut flagged = Vec::new();
    for lead in &leads {
        let verdict = client.screen_salary(lead).await;
        if !verdict.likely_150k_plus {
            let confidence = match verdict.confidence {
                SalaryConfidence::High => "high",
                SalaryConfidence::Medium => "medium",
                SalaryConfidence::Low => "low",
            };
            println!(
                "  flag #{} {} ({}) [{}]: {}",
                lead.id,
                lead.full_name(),
                lead.current_title.as_deref().unwrap_or("-"),
                confidence,
                verdict.reasoning
            );
            flagged.push(lead.id);
        }
    }

    if flagged.is_empty() {
        println!("no leads flagged for removal");
        return Ok(());
    }

    if confirm {
        let removed = leadbase_storage::delete_leads(&pool, &flagged).await?;
        println!("removed {removed} leads");
    } else {
        println!(
            "{} leads flagged; re-run with --confirm to delete them",
            flagged.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_report_shows_counts_before_and_after() {
        let outcome = DedupeOutcome {
            groups_found: 3,
            records_removed: 5,
        };
        let report = dedupe_report(120, 115, &outcome);
        assert_eq!(
            report,
            "leads before: 120\nleads after: 115\nduplicate groups: 3\nrecords removed: 5\n"
        );
    }
}
