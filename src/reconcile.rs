//! Insert / update / skip decisions.
//!
//! A stored row remembers the upstream `updateDate` it was written from.
//! An incoming record is written only when its own `updateDate` is strictly
//! newer, so replaying a batch produces no writes. Timestamps compare as
//! naive civil time: any UTC offset is dropped, not applied.
//!
//! When either side lacks a parseable timestamp the decision is `Update`.
//! That is not an error; it is logged at debug level.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::models::{CanonicalBill, CanonicalMember, SyncStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Insert,
    Update,
    Skip,
}

impl ReconcileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileAction::Insert => "insert",
            ReconcileAction::Update => "update",
            ReconcileAction::Skip => "skip",
        }
    }

    pub fn writes(&self) -> bool {
        !matches!(self, ReconcileAction::Skip)
    }
}

/// The part of a stored row the reconciler looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRow {
    pub id: i64,
    pub update_date: Option<String>,
}

/// A normalized record carrying an upstream update timestamp.
pub trait Reconcilable {
    fn natural_key(&self) -> String;
    fn update_timestamp(&self) -> Option<&str>;
}

impl Reconcilable for CanonicalBill {
    fn natural_key(&self) -> String {
        format!("{}/{}", self.congress, self.bill_number)
    }

    fn update_timestamp(&self) -> Option<&str> {
        self.update_date.as_deref()
    }
}

impl Reconcilable for CanonicalMember {
    fn natural_key(&self) -> String {
        self.bioguide_id.clone()
    }

    fn update_timestamp(&self) -> Option<&str> {
        self.update_date.as_deref()
    }
}

pub fn reconcile<R: Reconcilable>(existing: Option<&ExistingRow>, incoming: &R) -> ReconcileAction {
    let Some(existing) = existing else {
        return ReconcileAction::Insert;
    };

    let stored = existing.update_date.as_deref().and_then(parse_timestamp);
    let fresh = incoming.update_timestamp().and_then(parse_timestamp);

    match (stored, fresh) {
        (Some(stored), Some(fresh)) if stored >= fresh => ReconcileAction::Skip,
        (Some(_), Some(_)) => ReconcileAction::Update,
        _ => {
            debug!(
                key = %incoming.natural_key(),
                stored = ?existing.update_date,
                incoming = ?incoming.update_timestamp(),
                "no comparable update timestamp; updating"
            );
            ReconcileAction::Update
        }
    }
}

/// Parse an upstream timestamp into naive civil time. Accepts RFC 3339 with
/// any offset, offset-less date-times, and bare dates (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl SyncStats {
    pub fn record(&mut self, action: ReconcileAction) {
        match action {
            ReconcileAction::Insert => self.inserted += 1,
            ReconcileAction::Update => self.updated += 1,
            ReconcileAction::Skip => self.skipped += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(update: Option<&str>) -> CanonicalBill {
        CanonicalBill {
            congress: 117,
            bill_number: "HR1".into(),
            update_date: update.map(str::to_string),
            ..Default::default()
        }
    }

    fn row(update: Option<&str>) -> ExistingRow {
        ExistingRow {
            id: 1,
            update_date: update.map(str::to_string),
        }
    }

    #[test]
    fn new_record_inserts() {
        assert_eq!(
            reconcile(None, &bill(Some("2021-01-01T00:00:00Z"))),
            ReconcileAction::Insert
        );
        assert_eq!(reconcile(None, &bill(None)), ReconcileAction::Insert);
    }

    #[test]
    fn newer_upstream_updates() {
        let existing = row(Some("2021-01-01T00:00:00Z"));
        assert_eq!(
            reconcile(Some(&existing), &bill(Some("2021-02-01T00:00:00Z"))),
            ReconcileAction::Update
        );
    }

    #[test]
    fn same_or_older_upstream_skips() {
        let existing = row(Some("2021-01-01T00:00:00Z"));
        assert_eq!(
            reconcile(Some(&existing), &bill(Some("2021-01-01T00:00:00Z"))),
            ReconcileAction::Skip
        );
        assert_eq!(
            reconcile(Some(&existing), &bill(Some("2020-12-31T23:59:59Z"))),
            ReconcileAction::Skip
        );
    }

    #[test]
    fn offsets_are_stripped_not_applied() {
        // 05:00+05:00 is 00:00Z, but compares as civil 05:00
        let existing = row(Some("2021-01-01T05:00:00+05:00"));
        assert_eq!(
            reconcile(Some(&existing), &bill(Some("2021-01-01T03:00:00Z"))),
            ReconcileAction::Skip
        );
    }

    #[test]
    fn missing_or_garbled_timestamps_update() {
        assert_eq!(
            reconcile(Some(&row(None)), &bill(Some("2021-01-01T00:00:00Z"))),
            ReconcileAction::Update
        );
        assert_eq!(
            reconcile(Some(&row(Some("2021-01-01"))), &bill(None)),
            ReconcileAction::Update
        );
        assert_eq!(
            reconcile(Some(&row(Some("yesterday"))), &bill(Some("2021-01-01"))),
            ReconcileAction::Update
        );
    }

    #[test]
    fn timestamp_formats() {
        let midnight = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2021-01-01"), Some(midnight));
        assert_eq!(parse_timestamp("2021-01-01T00:00:00Z"), Some(midnight));
        assert_eq!(parse_timestamp("2021-01-01 00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2021-01-01T00:00:00.000"), Some(midnight));
        assert_eq!(parse_timestamp("01/01/2021"), None);
    }

    #[test]
    fn stats_tally() {
        let mut stats = SyncStats::default();
        for action in [
            ReconcileAction::Insert,
            ReconcileAction::Skip,
            ReconcileAction::Skip,
            ReconcileAction::Update,
        ] {
            stats.record(action);
        }
        assert_eq!((stats.inserted, stats.updated, stats.skipped), (1, 1, 2));
    }
}
