//! Sync status overview.
//!
//! `csync status` prints table counts and one line per sync-state row, so an
//! operator can see at a glance whether the last cron runs succeeded.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::models::BillStatus;
use crate::sync_state::SyncStateStore;

const COUNTED_TABLES: [&str; 7] = [
    "bills",
    "bill_actions",
    "bill_cosponsors",
    "bill_subjects",
    "members",
    "sponsored_legislation",
    "cosponsored_legislation",
];

pub async fn table_counts(pool: &SqlitePool) -> Result<Vec<(&'static str, i64)>> {
    let mut counts = Vec::with_capacity(COUNTED_TABLES.len());
    for table in COUNTED_TABLES {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;
        counts.push((table, n));
    }
    Ok(counts)
}

/// Bill counts per normalized stage, furthest along first. Unparseable
/// stored values are ignored.
pub async fn stage_counts(pool: &SqlitePool) -> Result<Vec<(BillStatus, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT normalized_status, COUNT(*) FROM bills WHERE normalized_status IS NOT NULL GROUP BY normalized_status",
    )
    .fetch_all(pool)
    .await?;
    let mut counts: Vec<(BillStatus, i64)> = rows
        .into_iter()
        .filter_map(|(raw, n)| raw.parse::<BillStatus>().ok().map(|status| (status, n)))
        .collect();
    counts.sort_by(|(a, _), (b, _)| b.rank().cmp(&a.rank()).then(a.as_str().cmp(b.as_str())));
    Ok(counts)
}

pub async fn run_status(config: &Config, pool: &SqlitePool) -> Result<()> {
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("congress-sync status");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    for (table, n) in table_counts(pool).await? {
        println!("  {:<24} {:>8}", table, n);
    }

    let stages = stage_counts(pool).await?;
    if !stages.is_empty() {
        println!();
        println!("  Bills by stage");
        for (status, n) in &stages {
            println!("    {:<22} {:>8}", status.as_str(), n);
        }
    }

    let states = SyncStateStore::new(pool.clone()).list().await?;
    println!();
    if states.is_empty() {
        println!("  No syncs recorded yet.");
    } else {
        println!(
            "  {:<22} {:<22} {:>8}   {:<14} {}",
            "ENDPOINT", "STATUS", "RECORDS", "LAST SUCCESS", "UPDATED"
        );
        println!("  {}", "-".repeat(84));
        for s in &states {
            let last_success = s
                .last_sync_timestamp
                .map(format_ts_relative)
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<22} {:<22} {:>8}   {:<14} {}",
                s.endpoint,
                s.status,
                s.last_successful_offset,
                last_success,
                format_ts_relative(s.updated_at)
            );
            if let Some(err) = &s.last_error {
                println!("  {:<22} error: {}", "", err);
            }
        }
    }
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" within a month, an absolute date beyond.
fn format_ts_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
