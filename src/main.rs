//! # congress-sync CLI (`csync`)
//!
//! Keeps a local SQLite copy of Congress.gov bills and members current. Meant
//! to run from cron: every command prints a short summary on stdout, logs to
//! stderr, and exits non-zero when a run fails.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csync init` | Create the SQLite database and run schema migrations |
//! | `csync sync bills\|members` | Incremental list sync |
//! | `csync details bill\|member\|legislation` | Enrich a single record |
//! | `csync batch bills\|members` | Re-process selected stored records |
//! | `csync validate` | Report bills with missing data |
//! | `csync bio import <file>` | Apply biography scraper output |
//! | `csync status` | Show sync state and table counts |
//!
//! ## Examples
//!
//! ```bash
//! csync init --config ./config/csync.toml
//! csync sync bills --days 3
//! csync sync bills --congress 118 --dry-run
//! csync sync members --current-only
//! csync details bill HR1234 --congress 118
//! csync batch bills --missing actions --parallel --limit 200
//! csync batch members --missing legislation
//! csync validate --format json --output missing.json
//! ```

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use congress_sync::batch::{self, BatchOptions, BillSelector, MemberMissing, MemberSelector};
use congress_sync::config::{self, Config};
use congress_sync::details::{
    self, BillDetailProcessor, BillRef, MemberDetailProcessor, MemberLegislationProcessor,
};
use congress_sync::ingest::{self, SyncEngine, SyncKind, SyncOptions};
use congress_sync::models::BillStatus;
use congress_sync::progress::ProgressMode;
use congress_sync::validate::{self, MissingCategory, ReportFormat};
use congress_sync::{db, migrate, status, telemetry};

/// congress-sync: incremental Congress.gov sync into SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/csync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "csync",
    about = "Incremental sync of Congress.gov bills and members into SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/csync.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off`
    /// otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Debug logging for this crate (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it on an existing database is safe.
    Init,

    /// Fetch records updated since the last successful sync.
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },

    /// Fetch detail documents for one record.
    Details {
        #[command(subcommand)]
        target: DetailsTarget,
    },

    /// Re-process stored records selected by congress, status, or missing data.
    Batch {
        #[command(subcommand)]
        target: BatchTarget,
    },

    /// Report bills with missing data.
    Validate {
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,

        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Member biography data.
    Bio {
        #[command(subcommand)]
        action: BioAction,
    },

    /// Show sync state and table counts.
    Status,
}

/// Window flags shared by both list syncs.
#[derive(Args)]
struct WindowArgs {
    /// Ignore the last successful sync and fetch everything.
    #[arg(long)]
    full: bool,

    /// Only records updated on or after this date (YYYY-MM-DD).
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Only records updated on or before this date (YYYY-MM-DD).
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Days to look back from the last successful sync. Defaults to
    /// `[sync].lookback_days`.
    #[arg(long)]
    days: Option<i64>,

    /// Fetch and reconcile without writing anything.
    #[arg(long)]
    dry_run: bool,
}

impl WindowArgs {
    fn options(&self, cfg: &Config) -> SyncOptions {
        SyncOptions {
            full: self.full,
            start_date: self.start_date,
            end_date: self.end_date,
            lookback_days: self.days.unwrap_or(cfg.sync.lookback_days),
            dry_run: self.dry_run,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum SyncTarget {
    Bills {
        #[command(flatten)]
        window: WindowArgs,

        /// Only bills from this congress.
        #[arg(long)]
        congress: Option<i64>,
    },
    Members {
        #[command(flatten)]
        window: WindowArgs,

        /// Skip members whose latest term has ended.
        #[arg(long)]
        current_only: bool,
    },
}

#[derive(Subcommand)]
enum DetailsTarget {
    /// Bill detail and sub-resources, e.g. `details bill HR1234 --congress 118`.
    Bill {
        /// Bill number such as `HR1234` or `S.42`.
        bill: String,
        #[arg(long)]
        congress: i64,
    },
    /// Member detail, terms, leadership, and party history.
    Member { bioguide_id: String },
    /// Link a member's sponsored and cosponsored bills.
    Legislation {
        bioguide_id: String,
        /// Only legislation updated on or after this date.
        #[arg(long)]
        since: Option<NaiveDate>,
    },
}

/// Flags shared by both batch targets.
#[derive(Args)]
struct BatchArgs {
    /// Missing-data category, or `all`.
    #[arg(long)]
    missing: Option<String>,

    /// Items per batch. Defaults to `[sync].batch_size`.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Process at most this many items.
    #[arg(long)]
    limit: Option<i64>,

    /// Run each batch through a bounded worker pool.
    #[arg(long)]
    parallel: bool,

    /// Workers when `--parallel`. Defaults to `[sync].max_workers`.
    #[arg(long)]
    max_workers: Option<usize>,

    /// List the selected items without fetching.
    #[arg(long)]
    dry_run: bool,
}

impl BatchArgs {
    fn options(&self, cfg: &Config) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size.unwrap_or(cfg.sync.batch_size),
            parallel: self.parallel,
            max_workers: self.max_workers.unwrap_or(cfg.sync.max_workers),
        }
    }
}

#[derive(Subcommand)]
enum BatchTarget {
    Bills {
        #[command(flatten)]
        args: BatchArgs,

        #[arg(long)]
        congress: Option<i64>,

        /// Normalized status such as `in-committee`.
        #[arg(long)]
        status: Option<BillStatus>,

        /// Select every bill the validation report lists.
        #[arg(long)]
        validate: bool,
    },
    Members {
        #[command(flatten)]
        args: BatchArgs,

        /// With `--missing legislation`: only legislation updated since this date.
        #[arg(long)]
        since: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum BioAction {
    /// Apply a scraper output file (one JSON object or an array).
    Import { file: PathBuf },
}

fn bill_selector(
    congress: Option<i64>,
    status: Option<BillStatus>,
    missing: Option<&str>,
    validate: bool,
) -> Result<BillSelector> {
    if validate {
        return Ok(BillSelector::MissingAny);
    }
    if let Some(congress) = congress {
        return Ok(BillSelector::Congress(congress));
    }
    if let Some(status) = status {
        return Ok(BillSelector::Status(status));
    }
    match missing {
        Some("all") => Ok(BillSelector::MissingAny),
        Some(raw) => Ok(BillSelector::Missing(
            raw.parse::<MissingCategory>().map_err(anyhow::Error::msg)?,
        )),
        None => bail!("batch bills needs one of --congress, --status, --missing, or --validate"),
    }
}

fn member_selector(missing: Option<&str>) -> Result<MemberSelector> {
    match missing {
        None => Ok(MemberSelector::Current),
        Some("all") => Ok(MemberSelector::MissingAny),
        Some(raw) => Ok(MemberSelector::Missing(
            raw.parse::<MemberMissing>().map_err(anyhow::Error::msg)?,
        )),
    }
}

async fn run_batch_bills(
    engine: &SyncEngine,
    selector: &BillSelector,
    args: &BatchArgs,
    cfg: &Config,
) -> Result<()> {
    let work = batch::select_bills(engine.pool(), selector, args.limit).await?;
    let label = format!("bills ({:?})", selector);
    if args.dry_run {
        batch::print_work_list(&label, &work);
        println!("ok");
        return Ok(());
    }

    let processor = BillDetailProcessor::new(engine.clone());
    let stats = batch::run_tracked_batch(engine, &processor, &work, &args.options(cfg)).await?;
    batch::print_batch_stats(&label, &stats);
    println!("ok");
    Ok(())
}

async fn run_batch_members(
    engine: &SyncEngine,
    selector: MemberSelector,
    since: Option<NaiveDate>,
    args: &BatchArgs,
    cfg: &Config,
) -> Result<()> {
    let work = batch::select_members(engine.pool(), selector, args.limit).await?;
    let label = format!("members ({:?})", selector);
    if args.dry_run {
        batch::print_work_list(&label, &work);
        println!("ok");
        return Ok(());
    }

    let options = args.options(cfg);
    let stats = match selector {
        // Biographies come from the scraper; list who needs one.
        MemberSelector::Missing(MemberMissing::Biography) => {
            batch::print_work_list(&label, &work);
            println!("  run `csync bio import <file>` with scraper output for these members");
            println!("ok");
            return Ok(());
        }
        MemberSelector::Missing(MemberMissing::Legislation) => {
            let processor = MemberLegislationProcessor::new(engine.clone(), since).await?;
            batch::run_tracked_batch(engine, &processor, &work, &options).await?
        }
        _ => {
            let processor = MemberDetailProcessor::new(engine.clone());
            batch::run_tracked_batch(engine, &processor, &work, &options).await?
        }
    };
    batch::print_batch_stats(&label, &stats);
    println!("ok");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { target } => {
            let engine = SyncEngine::from_config(&cfg)
                .await?
                .with_progress(Arc::from(progress.reporter()));
            match target {
                SyncTarget::Bills { window, congress } => {
                    let options = SyncOptions {
                        congress,
                        ..window.options(&cfg)
                    };
                    ingest::run_sync(&engine, SyncKind::Bills, &options).await?;
                }
                SyncTarget::Members {
                    window,
                    current_only,
                } => {
                    let options = SyncOptions {
                        current_only,
                        ..window.options(&cfg)
                    };
                    ingest::run_sync(&engine, SyncKind::Members, &options).await?;
                }
            }
        }
        Commands::Details { target } => {
            let engine = SyncEngine::from_config(&cfg).await?;
            match target {
                DetailsTarget::Bill { bill, congress } => {
                    let key: String = bill.chars().filter(char::is_ascii_alphanumeric).collect();
                    let bill = BillRef::from_key(congress, &key.to_uppercase());
                    let outcome = BillDetailProcessor::new(engine).process_bill(&bill).await?;
                    println!("details bill {}", bill);
                    println!("  id: {}", outcome.bill_id);
                    println!("  text versions: {}", outcome.text_versions);
                    println!("  summaries: {}", outcome.summaries);
                    println!("  related bills: {}", outcome.related_bills);
                    println!("  actions: {}", outcome.counts.actions);
                    println!("  cosponsors: {}", outcome.counts.cosponsors);
                    println!("  subjects: {}", outcome.counts.subjects);
                }
                DetailsTarget::Member { bioguide_id } => {
                    let id = MemberDetailProcessor::new(engine)
                        .process_member(&bioguide_id)
                        .await?;
                    println!("details member {}", bioguide_id);
                    println!("  id: {}", id);
                }
                DetailsTarget::Legislation { bioguide_id, since } => {
                    let outcome = MemberLegislationProcessor::new(engine, since)
                        .await?
                        .process_member(&bioguide_id)
                        .await?;
                    println!("details legislation {}", bioguide_id);
                    for (label, links) in [
                        ("sponsored", outcome.sponsored),
                        ("cosponsored", outcome.cosponsored),
                    ] {
                        println!(
                            "  {}: {} fetched, {} linked, {} skipped",
                            label, links.processed, links.associated, links.skipped
                        );
                    }
                }
            }
            println!("ok");
        }
        Commands::Batch { target } => {
            let engine = SyncEngine::from_config(&cfg)
                .await?
                .with_progress(Arc::from(progress.reporter()));
            match target {
                BatchTarget::Bills {
                    args,
                    congress,
                    status,
                    validate,
                } => {
                    let selector =
                        bill_selector(congress, status, args.missing.as_deref(), validate)?;
                    run_batch_bills(&engine, &selector, &args, &cfg).await?;
                }
                BatchTarget::Members { args, since } => {
                    let selector = member_selector(args.missing.as_deref())?;
                    run_batch_members(&engine, selector, since, &args, &cfg).await?;
                }
            }
        }
        Commands::Validate { format, output } => {
            let pool = db::connect(&cfg).await?;
            validate::run_validate(&pool, format, output.as_deref()).await?;
        }
        Commands::Bio {
            action: BioAction::Import { file },
        } => {
            let engine = SyncEngine::from_config(&cfg).await?;
            let stats = details::import_biographies(&engine, &file).await?;
            println!("bio import {}", file.display());
            println!("  records: {}", stats.records);
            println!("  updated: {}", stats.updated);
            println!("  unknown members: {}", stats.missing);
            println!("  errors: {}", stats.errored);
            println!("ok");
        }
        Commands::Status => {
            let pool = db::connect(&cfg).await?;
            status::run_status(&cfg, &pool).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn bill_selector_precedence() {
        assert_eq!(
            bill_selector(Some(118), Some(BillStatus::Enacted), Some("actions"), true).unwrap(),
            BillSelector::MissingAny
        );
        assert_eq!(
            bill_selector(Some(118), Some(BillStatus::Enacted), None, false).unwrap(),
            BillSelector::Congress(118)
        );
        assert_eq!(
            bill_selector(None, Some(BillStatus::Enacted), Some("actions"), false).unwrap(),
            BillSelector::Status(BillStatus::Enacted)
        );
        assert_eq!(
            bill_selector(None, None, Some("summaries"), false).unwrap(),
            BillSelector::Missing(MissingCategory::Summary)
        );
        assert!(bill_selector(None, None, None, false).is_err());
        assert!(bill_selector(None, None, Some("biography"), false).is_err());
    }

    #[test]
    fn member_selector_defaults_to_current() {
        assert_eq!(member_selector(None).unwrap(), MemberSelector::Current);
        assert_eq!(member_selector(Some("all")).unwrap(), MemberSelector::MissingAny);
        assert_eq!(
            member_selector(Some("party-history")).unwrap(),
            MemberSelector::Missing(MemberMissing::PartyHistory)
        );
    }
}
