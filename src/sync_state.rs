//! Per-endpoint sync status (`api_sync_status`).
//!
//! A run records `in_progress` before it fetches anything and one of
//! `success`, `completed_with_errors`, or `failed` after its last record. The
//! `last_sync_timestamp` column only advances on `success`, to the moment the
//! successful run started, so a crashed or failed run never moves the window
//! forward.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use crate::error::{SyncError, SyncResult};

pub const BILL_LIST: &str = "bill";
pub const MEMBER_LIST: &str = "member";
pub const BILL_DETAIL: &str = "bill/detail";
pub const MEMBER_DETAIL: &str = "member/detail";
pub const MEMBER_LEGISLATION: &str = "member/legislation";
pub const MEMBER_BIO: &str = "member/bio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    InProgress,
    Success,
    CompletedWithErrors,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Success => "success",
            SyncStatus::CompletedWithErrors => "completed_with_errors",
            SyncStatus::Failed => "failed",
        }
    }

    /// Terminal status for a run that finished its loop.
    pub fn from_error_count(errors: u64) -> Self {
        if errors == 0 {
            SyncStatus::Success
        } else {
            SyncStatus::CompletedWithErrors
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SyncStatus::InProgress),
            "success" => Ok(SyncStatus::Success),
            "completed_with_errors" => Ok(SyncStatus::CompletedWithErrors),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(SyncError::Fatal(format!("unknown sync status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncEndpointState {
    pub endpoint: String,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_successful_offset: i64,
    pub status: SyncStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SyncStateStore {
    pool: SqlitePool,
}

impl SyncStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record the start of a run. Leaves the last successful timestamp alone.
    pub async fn mark_in_progress(&self, endpoint: &str) -> SyncResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO api_sync_status (endpoint, last_sync_timestamp, last_successful_offset, status, last_error, updated_at)
            VALUES (?, NULL, 0, ?, NULL, ?)
            ON CONFLICT(endpoint) DO UPDATE SET
                status = excluded.status,
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(endpoint)
        .bind(SyncStatus::InProgress.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the end of a run. `window_start` becomes the last successful
    /// sync timestamp when `status` is `success`; `None` records the status
    /// and leaves the timestamp where it was.
    pub async fn mark_finished(
        &self,
        endpoint: &str,
        status: SyncStatus,
        processed: u64,
        error: Option<&str>,
        window_start: Option<DateTime<Utc>>,
    ) -> SyncResult<()> {
        let now = Utc::now().to_rfc3339();
        let success_ts = window_start
            .filter(|_| status == SyncStatus::Success)
            .map(|ts| ts.to_rfc3339());
        sqlx::query(
            r#"
            INSERT INTO api_sync_status (endpoint, last_sync_timestamp, last_successful_offset, status, last_error, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(endpoint) DO UPDATE SET
                last_sync_timestamp = COALESCE(excluded.last_sync_timestamp, api_sync_status.last_sync_timestamp),
                last_successful_offset = excluded.last_successful_offset,
                status = excluded.status,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(endpoint)
        .bind(success_ts)
        .bind(processed as i64)
        .bind(status.as_str())
        .bind(error)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, endpoint: &str) -> SyncResult<Option<SyncEndpointState>> {
        let row = sqlx::query(
            "SELECT endpoint, last_sync_timestamp, last_successful_offset, status, last_error, updated_at FROM api_sync_status WHERE endpoint = ?",
        )
        .bind(endpoint)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| state_from_row(&r)).transpose()
    }

    /// Start time of the most recent successful run, if any.
    pub async fn last_successful_sync(&self, endpoint: &str) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self
            .get(endpoint)
            .await?
            .and_then(|state| state.last_sync_timestamp))
    }

    pub async fn list(&self) -> SyncResult<Vec<SyncEndpointState>> {
        let rows = sqlx::query(
            "SELECT endpoint, last_sync_timestamp, last_successful_offset, status, last_error, updated_at FROM api_sync_status ORDER BY endpoint",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(state_from_row).collect()
    }
}

fn state_from_row(row: &sqlx::sqlite::SqliteRow) -> SyncResult<SyncEndpointState> {
    let status: String = row.get("status");
    let last_sync: Option<String> = row.get("last_sync_timestamp");
    let updated_at: String = row.get("updated_at");
    Ok(SyncEndpointState {
        endpoint: row.get("endpoint"),
        last_sync_timestamp: last_sync.as_deref().and_then(parse_utc),
        last_successful_offset: row.get("last_successful_offset"),
        status: status.parse()?,
        last_error: row.get("last_error"),
        updated_at: parse_utc(&updated_at).unwrap_or_else(Utc::now),
    })
}

fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SyncStateStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SyncStateStore::new(pool)
    }

    #[tokio::test]
    async fn one_row_per_endpoint_through_a_run() {
        let store = store().await;
        let started = Utc::now() - Duration::minutes(5);

        store.mark_in_progress(BILL_LIST).await.unwrap();
        let state = store.get(BILL_LIST).await.unwrap().unwrap();
        assert_eq!(state.status, SyncStatus::InProgress);
        assert_eq!(state.last_sync_timestamp, None);

        store
            .mark_finished(BILL_LIST, SyncStatus::Success, 12, None, Some(started))
            .await
            .unwrap();
        let state = store.get(BILL_LIST).await.unwrap().unwrap();
        assert_eq!(state.status, SyncStatus::Success);
        assert_eq!(state.last_successful_offset, 12);
        assert_eq!(
            state.last_sync_timestamp.map(|t| t.timestamp()),
            Some(started.timestamp())
        );
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_keeps_previous_success_timestamp() {
        let store = store().await;
        let first = Utc::now() - Duration::days(2);
        store
            .mark_finished(MEMBER_LIST, SyncStatus::Success, 3, None, Some(first))
            .await
            .unwrap();

        store.mark_in_progress(MEMBER_LIST).await.unwrap();
        store
            .mark_finished(MEMBER_LIST, SyncStatus::Failed, 0, Some("boom"), Some(Utc::now()))
            .await
            .unwrap();

        let state = store.get(MEMBER_LIST).await.unwrap().unwrap();
        assert_eq!(state.status, SyncStatus::Failed);
        assert_eq!(state.last_error.as_deref(), Some("boom"));
        assert_eq!(
            store
                .last_successful_sync(MEMBER_LIST)
                .await
                .unwrap()
                .map(|t| t.timestamp()),
            Some(first.timestamp())
        );
    }

    #[tokio::test]
    async fn success_without_window_start_keeps_timestamp() {
        let store = store().await;
        store
            .mark_finished(BILL_LIST, SyncStatus::Success, 5, None, None)
            .await
            .unwrap();
        let state = store.get(BILL_LIST).await.unwrap().unwrap();
        assert_eq!(state.status, SyncStatus::Success);
        assert_eq!(state.last_sync_timestamp, None);

        let first = Utc::now() - Duration::days(1);
        store
            .mark_finished(BILL_LIST, SyncStatus::Success, 5, None, Some(first))
            .await
            .unwrap();
        store
            .mark_finished(BILL_LIST, SyncStatus::Success, 9, None, None)
            .await
            .unwrap();
        let state = store.get(BILL_LIST).await.unwrap().unwrap();
        assert_eq!(state.last_successful_offset, 9);
        assert_eq!(
            state.last_sync_timestamp.map(|t| t.timestamp()),
            Some(first.timestamp())
        );
    }

    #[test]
    fn terminal_status_from_errors() {
        assert_eq!(SyncStatus::from_error_count(0), SyncStatus::Success);
        assert_eq!(
            SyncStatus::from_error_count(2),
            SyncStatus::CompletedWithErrors
        );
        assert_eq!(
            "completed_with_errors".parse::<SyncStatus>().unwrap(),
            SyncStatus::CompletedWithErrors
        );
    }
}
