//! Detail enrichment.
//!
//! A list sync stores the core of each record. The processors here fetch the
//! per-record documents and fill in the rest:
//!
//! | Processor | Fetches | Writes |
//! |-----------|---------|--------|
//! | [`BillDetailProcessor`] | bill detail + text versions, summaries, actions, cosponsors, subjects, related bills | bill row, tag, relationship tables |
//! | [`MemberDetailProcessor`] | member detail | member row, terms, leadership, party history |
//! | [`MemberLegislationProcessor`] | sponsored / cosponsored legislation | `sponsored_legislation`, `cosponsored_legislation`, `bill_cosponsors` |
//!
//! A failed sub-resource fetch is logged and skipped: the bill is still
//! written with whatever was fetched, and the empty collection leaves stored
//! data in place. Every processor implements [`DetailProcessor`] so the
//! batch runner can drive any of them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bills::{self, BillPayload};
use crate::error::{SyncError, SyncResult};
use crate::ingest::SyncEngine;
use crate::members;
use crate::models::{BioRecord, CanonicalBill};
use crate::payload;
use crate::store::{BillIndex, DetailCounts};
use crate::sync_state::{self, SyncStatus};

/// One unit of enrichment work, driven by [`crate::batch::run_batch`].
#[async_trait]
pub trait DetailProcessor: Send + Sync {
    type Item: fmt::Display + Send + Sync;

    /// Sync-state row recording batch runs of this processor.
    fn endpoint(&self) -> &'static str;

    async fn process(&self, item: &Self::Item) -> SyncResult<()>;
}

/// `(congress, type, number)` of a stored bill.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BillRef {
    pub congress: i64,
    pub bill_type: String,
    pub number: String,
}

impl BillRef {
    /// From a stored `bill_number` such as `HR1234`.
    pub fn from_key(congress: i64, bill_number: &str) -> Self {
        let (bill_type, number) = bills::parse_bill_number(bill_number);
        Self {
            congress,
            bill_type,
            number,
        }
    }

    pub fn path(&self) -> String {
        format!("bill/{}/{}/{}", self.congress, self.bill_type, self.number)
    }
}

impl fmt::Display for BillRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.congress,
            bills::bill_key(&self.bill_type, &self.number)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillDetailOutcome {
    pub bill_id: i64,
    pub counts: DetailCounts,
    pub text_versions: usize,
    pub summaries: usize,
    pub related_bills: usize,
}

#[derive(Clone)]
pub struct BillDetailProcessor {
    engine: SyncEngine,
}

impl BillDetailProcessor {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }

    pub async fn process_bill(&self, bill: &BillRef) -> SyncResult<BillDetailOutcome> {
        let path = bill.path();
        let doc = self.engine.client.fetch(&path, &[]).await?;
        self.archive(&path, "details", &doc);

        let mut canonical = bills::normalize_bill(&doc)?
            .ok_or_else(|| SyncError::malformed(bill.to_string(), "empty bill revision list"))?;
        let entry = BillPayload::from_raw(&doc).resolve().unwrap_or(&doc);

        self.enrich(&path, entry, &mut canonical).await;

        let (bill_id, counts) = self.engine.repo.store_bill_detail(&canonical).await?;
        info!(
            bill = %bill,
            actions = counts.actions,
            cosponsors = counts.cosponsors,
            subjects = counts.subjects,
            text_versions = canonical.text_versions.len(),
            "bill details stored"
        );
        Ok(BillDetailOutcome {
            bill_id,
            counts,
            text_versions: canonical.text_versions.len(),
            summaries: canonical.summaries.len(),
            related_bills: canonical.related_bills.len(),
        })
    }

    async fn enrich(&self, path: &str, entry: &Value, bill: &mut CanonicalBill) {
        if let Some(doc) = self.sub_list(path, entry, "textVersions").await {
            bill.text_versions = bills::process_text_versions(
                bills::parse_text_versions(&doc),
                bill.introduced_date.as_deref(),
            );
        }
        if let Some(doc) = self.sub_list(path, entry, "summaries").await {
            bill.summaries = bills::parse_summaries(&doc);
        }
        if let Some(doc) = self.sub_list(path, entry, "actions").await {
            bill.actions = bills::parse_actions(&doc);
        }
        if let Some(doc) = self.sub_list(path, entry, "cosponsors").await {
            bill.cosponsors = bills::parse_cosponsors(&doc);
        }
        if let Some(url) = payload::link(entry, "subjects") {
            match self.engine.client.fetch(&url, &[]).await {
                Ok(doc) => {
                    self.archive(path, "subjects", &doc);
                    bill.subjects = bills::parse_subjects(&doc);
                }
                Err(e) => warn!(bill = %path, error = %e, "could not fetch subjects; skipping"),
            }
        }
        if bill.related_bills.is_empty() {
            if let Some(doc) = self.sub_list(path, entry, "relatedBills").await {
                bill.related_bills = bills::parse_related_bills(doc.get("relatedBills"));
            }
        }
    }

    /// Fetch every page of a linked sub-resource as `{field: [...]}`.
    async fn sub_list(&self, path: &str, entry: &Value, field: &str) -> Option<Value> {
        let url = payload::link(entry, field)?;
        match self.engine.client.fetch_all_pages(&url, &[], Some(field)).await {
            Ok(items) => {
                let mut doc = serde_json::Map::new();
                doc.insert(field.to_string(), Value::Array(items));
                let doc = Value::Object(doc);
                self.archive(path, field, &doc);
                Some(doc)
            }
            Err(e) => {
                warn!(bill = %path, resource = field, error = %e, "could not fetch sub-resource; skipping");
                None
            }
        }
    }

    fn archive(&self, path: &str, part: &str, doc: &Value) {
        if let Some(archive) = &self.engine.archive {
            archive.record(&format!("{}_{}", path, part), doc);
        }
    }
}

#[async_trait]
impl DetailProcessor for BillDetailProcessor {
    type Item = BillRef;

    fn endpoint(&self) -> &'static str {
        sync_state::BILL_DETAIL
    }

    async fn process(&self, item: &BillRef) -> SyncResult<()> {
        self.process_bill(item).await.map(|_| ())
    }
}

#[derive(Clone)]
pub struct MemberDetailProcessor {
    engine: SyncEngine,
}

impl MemberDetailProcessor {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }

    /// Returns the stored member id.
    pub async fn process_member(&self, bioguide_id: &str) -> SyncResult<i64> {
        let path = format!("member/{}", bioguide_id);
        let doc = self.engine.client.fetch(&path, &[]).await?;
        if let Some(archive) = &self.engine.archive {
            archive.record(&path, &doc);
        }

        let member = members::normalize_member(&doc)?
            .ok_or_else(|| SyncError::malformed(bioguide_id, "detail payload has no bioguideId"))?;
        let member_id = self.engine.repo.store_member_detail(&member).await?;
        info!(
            bioguide_id,
            terms = member.terms.len(),
            leadership = member.leadership.len(),
            party_history = member.party_history.len(),
            "member details stored"
        );
        Ok(member_id)
    }
}

#[async_trait]
impl DetailProcessor for MemberDetailProcessor {
    type Item = String;

    fn endpoint(&self) -> &'static str {
        sync_state::MEMBER_DETAIL
    }

    async fn process(&self, item: &String) -> SyncResult<()> {
        self.process_member(item).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub processed: u64,
    pub associated: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegislationOutcome {
    pub sponsored: LinkStats,
    pub cosponsored: LinkStats,
}

/// Links members to bills already in the store. Bills the store does not
/// know are skipped, not fetched.
#[derive(Clone)]
pub struct MemberLegislationProcessor {
    engine: SyncEngine,
    bills: Arc<BillIndex>,
    since: Option<NaiveDate>,
}

impl MemberLegislationProcessor {
    /// Loads the existing-bills index once; it is not refreshed during the run.
    pub async fn new(engine: SyncEngine, since: Option<NaiveDate>) -> SyncResult<Self> {
        let bills = Arc::new(engine.repo.bill_index().await?);
        debug!(bills = bills.len(), "loaded existing-bills index");
        Ok(Self {
            engine,
            bills,
            since,
        })
    }

    pub async fn process_member(&self, bioguide_id: &str) -> SyncResult<LegislationOutcome> {
        let member = self
            .engine
            .repo
            .member_ref(bioguide_id)
            .await?
            .ok_or_else(|| SyncError::malformed(bioguide_id, "member not in database"))?;

        let mut query = Vec::new();
        if let Some(since) = self.since {
            query.push(("fromDateTime", since.format("%Y-%m-%dT00:00:00Z").to_string()));
        }

        let sponsored_path = format!("member/{}/sponsored-legislation", bioguide_id);
        let sponsored = self
            .engine
            .client
            .fetch_all_pages(&sponsored_path, &query, Some("sponsoredLegislation"))
            .await?;
        let mut outcome = LegislationOutcome::default();
        let mut links = Vec::new();
        for item in &sponsored {
            outcome.sponsored.processed += 1;
            if item.get("amendmentNumber").is_some() {
                continue;
            }
            match self.lookup(item) {
                Some(bill_id) => {
                    links.push((bill_id, payload::string(item, "introducedDate")));
                    outcome.sponsored.associated += 1;
                }
                None => outcome.sponsored.skipped += 1,
            }
        }
        self.archive(&sponsored_path, &sponsored);
        self.engine.repo.link_sponsored(&member, &links).await?;

        let cosponsored_path = format!("member/{}/cosponsored-legislation", bioguide_id);
        let cosponsored = self
            .engine
            .client
            .fetch_all_pages(&cosponsored_path, &query, Some("cosponsoredLegislation"))
            .await?;
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut links = Vec::new();
        for item in &cosponsored {
            outcome.cosponsored.processed += 1;
            if item.get("amendmentNumber").is_some() {
                continue;
            }
            match self.lookup(item) {
                Some(bill_id) => {
                    let date = payload::string(item, "cosponsorDate").unwrap_or_else(|| today.clone());
                    links.push((bill_id, date));
                    outcome.cosponsored.associated += 1;
                }
                None => outcome.cosponsored.skipped += 1,
            }
        }
        self.archive(&cosponsored_path, &cosponsored);
        self.engine.repo.link_cosponsored(&member, &links).await?;

        info!(
            bioguide_id,
            sponsored = outcome.sponsored.associated,
            cosponsored = outcome.cosponsored.associated,
            skipped = outcome.sponsored.skipped + outcome.cosponsored.skipped,
            "legislation linked"
        );
        Ok(outcome)
    }

    fn lookup(&self, item: &Value) -> Option<i64> {
        let congress = payload::int(item, "congress")?;
        let bill_type = payload::string(item, "type")?;
        let number = payload::string(item, "number")?;
        let key = (congress, bills::bill_key(&bill_type, &number));
        let found = self.bills.get(&key).copied();
        if found.is_none() {
            debug!(congress, bill = %key.1, "bill not in database; skipping");
        }
        found
    }

    fn archive(&self, path: &str, items: &[Value]) {
        if let Some(archive) = &self.engine.archive {
            archive.record(path, &json!(items));
        }
    }
}

#[async_trait]
impl DetailProcessor for MemberLegislationProcessor {
    type Item = String;

    fn endpoint(&self) -> &'static str {
        sync_state::MEMBER_LEGISLATION
    }

    async fn process(&self, item: &String) -> SyncResult<()> {
        self.process_member(item).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BioImportStats {
    pub records: u64,
    pub updated: u64,
    pub missing: u64,
    pub errored: u64,
}

/// Parse scraper output: one record object or an array of them.
pub fn parse_bio_records(content: &str) -> Result<Vec<BioRecord>> {
    let doc: Value = serde_json::from_str(content).context("bio file is not valid JSON")?;
    let records = match doc {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<BioRecord>, _>>()?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(records)
}

/// Apply a scraper output file to stored members and record the run on the
/// biography sync-state row.
pub async fn import_biographies(engine: &SyncEngine, path: &Path) -> Result<BioImportStats> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bio file: {}", path.display()))?;
    let records = parse_bio_records(&content)?;
    let started = Utc::now();
    engine.state.mark_in_progress(sync_state::MEMBER_BIO).await?;

    let mut stats = BioImportStats::default();
    let mut last_error = None;
    for bio in &records {
        stats.records += 1;
        match engine.repo.apply_biography(bio).await {
            Ok(true) => stats.updated += 1,
            Ok(false) => {
                stats.missing += 1;
                warn!(bioguide_id = %bio.bioguide_id, "biography for unknown member; skipping");
            }
            Err(e) if e.is_per_record() => {
                stats.errored += 1;
                warn!(bioguide_id = %bio.bioguide_id, error = %e, "could not store biography; continuing");
                last_error = Some(e.to_string());
            }
            Err(e) => {
                engine
                    .state
                    .mark_finished(sync_state::MEMBER_BIO, SyncStatus::Failed, stats.updated, Some(&e.to_string()), None)
                    .await?;
                return Err(e.into());
            }
        }
    }

    let status = SyncStatus::from_error_count(stats.missing + stats.errored);
    engine
        .state
        .mark_finished(
            sync_state::MEMBER_BIO,
            status,
            stats.updated,
            last_error.as_deref(),
            Some(started),
        )
        .await?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::config::ApiConfig;
    use crate::models::CanonicalMember;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn bill_ref_from_stored_key() {
        let bill = BillRef::from_key(118, "HJRES7");
        assert_eq!(bill.bill_type, "hjres");
        assert_eq!(bill.number, "7");
        assert_eq!(bill.path(), "bill/118/hjres/7");
        assert_eq!(bill.to_string(), "118/HJRES7");
    }

    #[test]
    fn bio_file_accepts_object_or_array() {
        let one = parse_bio_records(
            r#"{"bioguideId": "P000197", "profileText": "x", "bioDirectory": "y", "fetchDate": "2024-01-01"}"#,
        )
        .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].profile_text.as_deref(), Some("x"));

        let many = parse_bio_records(r#"[{"bioguideId": "A"}, {"bioguideId": "B"}]"#).unwrap();
        assert_eq!(
            many.iter().map(|b| b.bioguide_id.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );

        assert!(parse_bio_records("not json").is_err());
        assert!(parse_bio_records(r#"{"profileText": "no id"}"#).is_err());
    }

    #[tokio::test]
    async fn bio_import_continues_past_a_failed_write() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        let client = ApiClient::with_api_key(&ApiConfig::default(), Some("k".into())).unwrap();
        let engine = SyncEngine::new(client, pool);

        for id in ["A000001", "B000002", "C000003"] {
            let member = CanonicalMember {
                bioguide_id: id.into(),
                ..Default::default()
            };
            engine.repo.store_member_detail(&member).await.unwrap();
        }
        sqlx::query(
            "CREATE TRIGGER reject_b BEFORE UPDATE ON members WHEN NEW.bioguide_id = 'B000002' BEGIN SELECT RAISE(ABORT, 'row locked'); END",
        )
        .execute(engine.pool())
        .await
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bio.json");
        std::fs::write(
            &file,
            r#"[{"bioguideId": "A000001", "profileText": "a"},
                {"bioguideId": "B000002", "profileText": "b"},
                {"bioguideId": "C000003", "profileText": "c"}]"#,
        )
        .unwrap();

        let stats = import_biographies(&engine, &file).await.unwrap();
        assert_eq!(
            stats,
            BioImportStats {
                records: 3,
                updated: 2,
                missing: 0,
                errored: 1
            }
        );

        let profiles: Vec<Option<String>> =
            sqlx::query_scalar("SELECT profile_text FROM members ORDER BY bioguide_id")
                .fetch_all(engine.pool())
                .await
                .unwrap();
        assert_eq!(profiles, vec![Some("a".into()), None, Some("c".into())]);

        let state = engine.state.get(sync_state::MEMBER_BIO).await.unwrap().unwrap();
        assert_eq!(state.status, SyncStatus::CompletedWithErrors);
        assert!(state.last_error.unwrap().contains("row locked"));
    }
}
