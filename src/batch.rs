//! Batch re-processing of stored records.
//!
//! Selectors turn the store into a work list; [`run_batch`] feeds it to a
//! [`DetailProcessor`] in fixed-size batches. A batch runs sequentially or,
//! with `parallel`, through `buffer_unordered(max_workers)`. Failures are
//! counted per item and never stop the run. Stats are summed, so the totals
//! do not depend on completion order.

use futures::stream::{self, StreamExt};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{info, warn};

use crate::details::{BillRef, DetailProcessor};
use crate::error::SyncResult;
use crate::ingest::SyncEngine;
use crate::models::{BatchStats, BillStatus};
use crate::progress::SyncProgressReporter;
use crate::sync_state::SyncStatus;
use crate::validate::{self, MissingCategory};

/// Which stored bills to re-process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillSelector {
    Congress(i64),
    Status(BillStatus),
    Missing(MissingCategory),
    /// Missing anything [`validate::validation_report`] checks.
    MissingAny,
}

/// Member data a batch can look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberMissing {
    Details,
    PartyHistory,
    Leadership,
    Biography,
    Legislation,
}

impl MemberMissing {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberMissing::Details => "details",
            MemberMissing::PartyHistory => "party_history",
            MemberMissing::Leadership => "leadership",
            MemberMissing::Biography => "biography",
            MemberMissing::Legislation => "legislation",
        }
    }

    fn condition(&self) -> &'static str {
        match self {
            MemberMissing::Details => "(m.direct_order_name IS NULL OR m.birth_year IS NULL)",
            MemberMissing::PartyHistory => {
                "NOT EXISTS (SELECT 1 FROM member_party_history p WHERE p.member_id = m.id)"
            }
            MemberMissing::Leadership => {
                "m.current_member = 1
                 AND NOT EXISTS (SELECT 1 FROM member_leadership l WHERE l.member_id = m.id)"
            }
            MemberMissing::Biography => "(m.profile_text IS NULL OR m.bio_directory IS NULL)",
            MemberMissing::Legislation => {
                "m.current_member = 1
                 AND NOT EXISTS (SELECT 1 FROM sponsored_legislation s WHERE s.member_id = m.id)"
            }
        }
    }
}

impl FromStr for MemberMissing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "details" => Ok(MemberMissing::Details),
            "party_history" => Ok(MemberMissing::PartyHistory),
            "leadership" => Ok(MemberMissing::Leadership),
            "biography" | "bio" => Ok(MemberMissing::Biography),
            "legislation" => Ok(MemberMissing::Legislation),
            _ => Err(format!("unknown member data category: '{}'", s)),
        }
    }
}

/// Which stored members to re-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSelector {
    /// Current members, least recently refreshed first.
    Current,
    Missing(MemberMissing),
    /// Missing details, party history, or leadership.
    MissingAny,
}

pub async fn select_bills(
    pool: &SqlitePool,
    selector: &BillSelector,
    limit: Option<i64>,
) -> SyncResult<Vec<BillRef>> {
    let rows: Vec<(String, i64)> = match selector {
        BillSelector::Congress(congress) => {
            sqlx::query("SELECT bill_number, congress FROM bills WHERE congress = ? ORDER BY bill_number LIMIT ?")
                .bind(congress)
                .bind(limit.unwrap_or(-1))
                .fetch_all(pool)
                .await?
                .iter()
                .map(|r| (r.get("bill_number"), r.get("congress")))
                .collect()
        }
        BillSelector::Status(status) => sqlx::query(
            "SELECT bill_number, congress FROM bills WHERE normalized_status = ? ORDER BY introduced_date DESC LIMIT ?",
        )
        .bind(status.as_str())
        .bind(limit.unwrap_or(-1))
        .fetch_all(pool)
        .await?
        .iter()
        .map(|r| (r.get("bill_number"), r.get("congress")))
        .collect(),
        BillSelector::Missing(category) => validate::find_missing(pool, *category, limit)
            .await?
            .into_iter()
            .map(|m| (m.bill_number, m.congress))
            .collect(),
        BillSelector::MissingAny => {
            let report = validate::validation_report(pool).await?;
            let mut seen = HashSet::new();
            let mut rows: Vec<(String, i64)> = report
                .categories
                .into_iter()
                .flat_map(|c| c.bills)
                .map(|m| (m.bill_number, m.congress))
                .filter(|key| seen.insert(key.clone()))
                .collect();
            if let Some(limit) = limit {
                rows.truncate(limit.max(0) as usize);
            }
            rows
        }
    };

    Ok(rows
        .into_iter()
        .map(|(bill_number, congress)| BillRef::from_key(congress, &bill_number))
        .collect())
}

pub async fn select_members(
    pool: &SqlitePool,
    selector: MemberSelector,
    limit: Option<i64>,
) -> SyncResult<Vec<String>> {
    let condition = match selector {
        MemberSelector::Current => "m.current_member = 1".to_string(),
        MemberSelector::Missing(missing) => missing.condition().to_string(),
        MemberSelector::MissingAny => format!(
            "({} OR {} OR ({}))",
            MemberMissing::Details.condition(),
            MemberMissing::PartyHistory.condition(),
            MemberMissing::Leadership.condition()
        ),
    };
    let sql = format!(
        "SELECT m.bioguide_id FROM members m WHERE {} ORDER BY m.last_updated ASC, m.bioguide_id LIMIT ?",
        condition
    );
    let ids: Vec<String> = sqlx::query_scalar(&sql)
        .bind(limit.unwrap_or(-1))
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub parallel: bool,
    pub max_workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            parallel: false,
            max_workers: 4,
        }
    }
}

fn outcome<I: std::fmt::Display>(item: &I, result: SyncResult<()>) -> BatchStats {
    match result {
        Ok(()) => BatchStats {
            processed: 1,
            success: 1,
            ..Default::default()
        },
        Err(e) => {
            warn!(item = %item, error = %e, "item failed");
            BatchStats {
                processed: 1,
                failed: 1,
                ..Default::default()
            }
        }
    }
}

/// Process `items` in batches of `batch_size`. Never fails; item errors are
/// logged and counted.
pub async fn run_batch<P: DetailProcessor>(
    processor: &P,
    items: &[P::Item],
    options: &BatchOptions,
    progress: &dyn SyncProgressReporter,
) -> BatchStats {
    let batch_size = options.batch_size.max(1);
    let batches = items.len().div_ceil(batch_size);
    let mut stats = BatchStats {
        total: items.len() as u64,
        ..Default::default()
    };

    for (index, batch) in items.chunks(batch_size).enumerate() {
        info!(
            batch = index + 1,
            batches,
            size = batch.len(),
            parallel = options.parallel,
            "processing batch"
        );

        let batch_stats = if options.parallel && batch.len() > 1 {
            let workers = options.max_workers.clamp(1, batch.len());
            stream::iter(batch)
                .map(move |item| async move { outcome(item, processor.process(item).await) })
                .buffer_unordered(workers)
                .fold(BatchStats::default(), |mut acc, one| async move {
                    acc += one;
                    acc
                })
                .await
        } else {
            let mut acc = BatchStats::default();
            for item in batch {
                acc += outcome(item, processor.process(item).await);
            }
            acc
        };

        stats += batch_stats;
        progress.tick(processor.endpoint(), stats.processed, stats.total);
        info!(
            processed = stats.processed,
            total = stats.total,
            failed = stats.failed,
            "batch complete"
        );
    }

    stats
}

/// [`run_batch`] bracketed by sync-state updates on the processor's
/// endpoint row.
pub async fn run_tracked_batch<P: DetailProcessor>(
    engine: &SyncEngine,
    processor: &P,
    items: &[P::Item],
    options: &BatchOptions,
) -> SyncResult<BatchStats> {
    let endpoint = processor.endpoint();
    let started = chrono::Utc::now();
    engine.state.mark_in_progress(endpoint).await?;

    let stats = run_batch(processor, items, options, engine.progress.as_ref()).await;

    let status = if stats.total > 0 && stats.success == 0 {
        SyncStatus::Failed
    } else {
        SyncStatus::from_error_count(stats.failed)
    };
    let error = (status == SyncStatus::Failed).then(|| format!("all {} items failed", stats.total));
    engine
        .state
        .mark_finished(endpoint, status, stats.success, error.as_deref(), Some(started))
        .await?;
    Ok(stats)
}

pub fn print_batch_stats(label: &str, stats: &BatchStats) {
    println!("batch {}", label);
    println!("  total: {}", stats.total);
    println!("  processed: {}", stats.processed);
    println!("  success: {}", stats.success);
    println!("  failed: {}", stats.failed);
}

/// Dry-run listing of a work list.
pub fn print_work_list<I: std::fmt::Display>(label: &str, items: &[I]) {
    println!("batch {} (dry-run)", label);
    println!("  selected: {}", items.len());
    for item in items {
        println!("  {}", item);
    }
}
