//! Incremental list sync.
//!
//! Coordinates one run over an upstream list endpoint: window → fetch all
//! pages → normalize → reconcile → per-record transaction. The sync-state row
//! is marked `in_progress` before the first request and finalized after the
//! last record. Per-record failures are counted and the loop continues; any
//! other error ends the run as `failed` and is returned to the caller.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::archive::Archive;
use crate::bills;
use crate::config::Config;
use crate::db;
use crate::error::SyncResult;
use crate::members;
use crate::models::SyncStats;
use crate::payload;
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::reconcile::{Reconcilable, ReconcileAction};
use crate::store::Repository;
use crate::sync_state::{self, SyncStateStore, SyncStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Bills,
    Members,
}

impl SyncKind {
    /// Sync-state row and default list path.
    pub fn endpoint(&self) -> &'static str {
        match self {
            SyncKind::Bills => sync_state::BILL_LIST,
            SyncKind::Members => sync_state::MEMBER_LIST,
        }
    }

    pub fn items_field(&self) -> &'static str {
        match self {
            SyncKind::Bills => "bills",
            SyncKind::Members => "members",
        }
    }

    fn window_params(&self) -> (&'static str, &'static str) {
        match self {
            SyncKind::Bills => ("fromDateTime", "toDateTime"),
            SyncKind::Members => ("fromUpdateDate", "toUpdateDate"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Ignore the last successful sync and fetch everything.
    pub full: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Days subtracted from the last successful sync.
    pub lookback_days: i64,
    /// Bills only: fetch `bill/{congress}`.
    pub congress: Option<i64>,
    /// Members only: drop members whose latest term has ended.
    pub current_only: bool,
    pub dry_run: bool,
}

impl SyncOptions {
    /// No congress filter and no explicit date bound.
    pub fn covers_everything(&self) -> bool {
        self.congress.is_none() && self.start_date.is_none() && self.end_date.is_none()
    }
}

/// Inclusive update-date range requested upstream. Unbounded when `from` is
/// `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl SyncWindow {
    fn query(&self, kind: SyncKind) -> Vec<(&'static str, String)> {
        let (from_key, to_key) = kind.window_params();
        let mut params = Vec::new();
        if let Some(from) = self.from {
            params.push((from_key, from.format("%Y-%m-%dT00:00:00Z").to_string()));
        }
        if let Some(to) = self.to {
            params.push((to_key, to.format("%Y-%m-%dT23:59:59Z").to_string()));
        }
        params
    }
}

/// Explicit start date wins, then `full` (unbounded), then the last
/// successful sync minus the lookback. No prior success is unbounded.
pub fn resolve_window(options: &SyncOptions, last_success: Option<DateTime<Utc>>) -> SyncWindow {
    let from = match options.start_date {
        Some(start) => Some(start),
        None if options.full => None,
        None => last_success.map(|ts| (ts - Duration::days(options.lookback_days)).date_naive()),
    };
    SyncWindow {
        from,
        to: options.end_date,
    }
}

/// Everything a sync, detail, or batch run needs. Cheap to clone.
#[derive(Clone)]
pub struct SyncEngine {
    pub client: ApiClient,
    pub repo: Repository,
    pub state: SyncStateStore,
    pub archive: Option<Archive>,
    pub progress: Arc<dyn SyncProgressReporter>,
}

impl SyncEngine {
    pub fn new(client: ApiClient, pool: sqlx::SqlitePool) -> Self {
        Self {
            client,
            repo: Repository::new(pool.clone()),
            state: SyncStateStore::new(pool),
            archive: None,
            progress: Arc::new(NoProgress),
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let client = ApiClient::new(&config.api)?;
        let mut engine = Self::new(client, pool);
        engine.archive = Archive::from_config(&config.archive);
        Ok(engine)
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.repo.pool()
    }

    pub async fn run_incremental_sync(
        &self,
        kind: SyncKind,
        options: &SyncOptions,
    ) -> SyncResult<SyncStats> {
        let endpoint = kind.endpoint();
        let started = Utc::now();

        let bounded_by_caller = options.full || options.start_date.is_some() || options.congress.is_some();
        let last_success = if bounded_by_caller {
            None
        } else {
            self.state.last_successful_sync(endpoint).await?
        };
        let window = resolve_window(options, last_success);
        // Only a run covering every congress up to now may move the window.
        let window_start = options.covers_everything().then_some(started);
        info!(
            %endpoint,
            from = ?window.from,
            to = ?window.to,
            congress = ?options.congress,
            dry_run = options.dry_run,
            "starting incremental sync"
        );

        if !options.dry_run {
            self.state.mark_in_progress(endpoint).await?;
        }

        let result = self.sync_window(kind, options, &window).await;

        if !options.dry_run {
            let finished = match &result {
                Ok(stats) => {
                    self.state
                        .mark_finished(
                            endpoint,
                            SyncStatus::from_error_count(stats.errored),
                            stats.total(),
                            None,
                            window_start,
                        )
                        .await
                }
                Err(e) => {
                    self.state
                        .mark_finished(endpoint, SyncStatus::Failed, 0, Some(&e.to_string()), window_start)
                        .await
                }
            };
            if let Err(state_err) = finished {
                warn!(%endpoint, error = %state_err, "could not record final sync status");
                if result.is_ok() {
                    return Err(state_err);
                }
            }
        }

        if let Some(archive) = &self.archive {
            archive.prune();
        }
        result
    }

    async fn sync_window(
        &self,
        kind: SyncKind,
        options: &SyncOptions,
        window: &SyncWindow,
    ) -> SyncResult<SyncStats> {
        let list_path = match (kind, options.congress) {
            (SyncKind::Bills, Some(congress)) => format!("bill/{}", congress),
            _ => kind.endpoint().to_string(),
        };
        let mut query = window.query(kind);
        query.push(("sort", "updateDate desc".to_string()));

        self.progress.report(SyncProgressEvent::Fetching {
            endpoint: list_path.clone(),
        });
        let items = self
            .client
            .fetch_all_pages(&list_path, &query, Some(kind.items_field()))
            .await?;
        info!(endpoint = %list_path, fetched = items.len(), "fetched list");

        let mut doc = serde_json::Map::new();
        doc.insert(kind.items_field().to_string(), Value::Array(items));
        doc.insert("fetchDate".to_string(), Value::String(Utc::now().to_rfc3339()));
        let doc = Value::Object(doc);
        if let Some(archive) = &self.archive {
            archive.record(kind.items_field(), &doc);
        }
        let items = doc[kind.items_field()].as_array().map(Vec::as_slice).unwrap_or(&[]);

        let total = items.len() as u64;
        let mut stats = SyncStats::default();
        for (i, raw) in items.iter().enumerate() {
            let outcome = match kind {
                SyncKind::Bills => self.sync_bill_item(raw, options.dry_run, &mut stats).await,
                SyncKind::Members => self.sync_member_item(raw, options, &mut stats).await,
            };
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_per_record() => {
                    stats.errored += 1;
                    warn!(key = %record_key(kind, raw), error = %e, "record failed; continuing");
                }
                Err(e) => return Err(e),
            }
            self.progress.tick(&list_path, i as u64 + 1, total);
        }

        info!(
            endpoint = %list_path,
            inserted = stats.inserted,
            updated = stats.updated,
            skipped = stats.skipped,
            errored = stats.errored,
            historical = stats.historical,
            "sync finished"
        );
        Ok(stats)
    }

    async fn sync_bill_item(&self, raw: &Value, dry_run: bool, stats: &mut SyncStats) -> SyncResult<()> {
        let Some(bill) = bills::normalize_bill(raw)? else {
            stats.record(ReconcileAction::Skip);
            return Ok(());
        };
        let action = self.repo.sync_bill(&bill, dry_run).await?;
        debug!(key = %bill.natural_key(), action = action.as_str(), "reconciled");
        if bill.is_historical() {
            stats.historical += 1;
        }
        stats.record(action);
        Ok(())
    }

    async fn sync_member_item(
        &self,
        raw: &Value,
        options: &SyncOptions,
        stats: &mut SyncStats,
    ) -> SyncResult<()> {
        let Some(member) = members::normalize_member(raw)? else {
            stats.record(ReconcileAction::Skip);
            return Ok(());
        };
        if options.current_only && !member.current_member {
            return Ok(());
        }
        let action = self.repo.sync_member(&member, options.dry_run).await?;
        debug!(key = %member.natural_key(), action = action.as_str(), "reconciled");
        stats.record(action);
        Ok(())
    }
}

fn record_key(kind: SyncKind, raw: &Value) -> String {
    match kind {
        SyncKind::Bills => {
            let bill = bills::BillPayload::from_raw(raw).resolve().unwrap_or(raw);
            format!(
                "{}/{}{}",
                payload::string(bill, "congress").unwrap_or_else(|| "?".into()),
                payload::string(bill, "type").unwrap_or_default(),
                payload::string(bill, "number").unwrap_or_default()
            )
        }
        SyncKind::Members => {
            payload::string(raw, "bioguideId").unwrap_or_else(|| "unknown".into())
        }
    }
}

/// CLI entry: run one sync and print the summary.
pub async fn run_sync(engine: &SyncEngine, kind: SyncKind, options: &SyncOptions) -> Result<()> {
    let stats = engine
        .run_incremental_sync(kind, options)
        .await
        .with_context(|| format!("sync {} failed", kind.endpoint()))?;

    if options.dry_run {
        println!("sync {} (dry-run)", kind.endpoint());
    } else {
        println!("sync {}", kind.endpoint());
    }
    print_stats(&stats);
    println!("ok");
    Ok(())
}

pub fn print_stats(stats: &SyncStats) {
    println!("  inserted: {}", stats.inserted);
    println!("  updated: {}", stats.updated);
    println!("  skipped: {}", stats.skipped);
    println!("  errors: {}", stats.errored);
    println!("  historical: {}", stats.historical);
}
