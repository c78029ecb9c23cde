//! Repository over the SQLite store.
//!
//! Write helpers take the transaction handle explicitly as
//! `&mut SqliteConnection`; [`Repository`] methods open one transaction per
//! record and pass it down, so a record's multi-table update commits or rolls
//! back as a unit. Every statement is an upsert or insert-or-ignore guarded by
//! a unique constraint, which is what lets parallel batch workers share the
//! pool without an application lock.

use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::bills::normalize_tag_name;
use crate::error::SyncResult;
use crate::models::{
    BillCosponsor, BioRecord, CanonicalBill, CanonicalMember,
};
use crate::reconcile::{reconcile, ExistingRow, ReconcileAction};

/// `(congress, BILL_NUMBER)` → `bills.id`, built once per enrichment run.
pub type BillIndex = HashMap<(i64, String), i64>;

/// Member columns needed to write a cosponsor row on their behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub id: i64,
    pub bioguide_id: String,
    pub full_name: Option<String>,
    pub party_code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailCounts {
    pub actions: u64,
    pub cosponsors: u64,
    pub subjects: u64,
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reconcile a list-sync bill against storage and write it when newer.
    /// In dry-run mode the decision is returned and nothing is written.
    pub async fn sync_bill(&self, bill: &CanonicalBill, dry_run: bool) -> SyncResult<ReconcileAction> {
        let mut tx = self.pool.begin().await?;
        let existing = find_bill(&mut tx, bill.congress, &bill.bill_number).await?;
        let action = reconcile(existing.as_ref(), bill);
        if action.writes() && !dry_run {
            let bill_id = upsert_bill(&mut tx, bill).await?;
            if let Some(area) = &bill.policy_area {
                link_policy_area(&mut tx, bill_id, area).await?;
            }
            tx.commit().await?;
        }
        Ok(action)
    }

    /// Write a fully enriched bill: core row, tag, and every relationship.
    pub async fn store_bill_detail(&self, bill: &CanonicalBill) -> SyncResult<(i64, DetailCounts)> {
        let mut tx = self.pool.begin().await?;
        let bill_id = upsert_bill(&mut tx, bill).await?;
        if let Some(area) = &bill.policy_area {
            link_policy_area(&mut tx, bill_id, area).await?;
        }
        let counts = apply_bill_detail(&mut tx, bill_id, bill).await?;
        tx.commit().await?;
        Ok((bill_id, counts))
    }

    pub async fn sync_member(&self, member: &CanonicalMember, dry_run: bool) -> SyncResult<ReconcileAction> {
        let mut tx = self.pool.begin().await?;
        let existing = find_member(&mut tx, &member.bioguide_id).await?;
        let action = reconcile(existing.as_ref(), member);
        if action.writes() && !dry_run {
            let member_id = upsert_member(&mut tx, member).await?;
            upsert_member_history(&mut tx, member_id, member).await?;
            tx.commit().await?;
        }
        Ok(action)
    }

    pub async fn store_member_detail(&self, member: &CanonicalMember) -> SyncResult<i64> {
        let mut tx = self.pool.begin().await?;
        let member_id = upsert_member(&mut tx, member).await?;
        upsert_member_history(&mut tx, member_id, member).await?;
        tx.commit().await?;
        Ok(member_id)
    }

    /// Returns false when the member is not stored.
    pub async fn apply_biography(&self, bio: &BioRecord) -> SyncResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE members SET
                profile_text = ?,
                bio_directory = ?,
                bio_update_date = ?,
                last_updated = ?
            WHERE bioguide_id = ?
            "#,
        )
        .bind(&bio.profile_text)
        .bind(&bio.bio_directory)
        .bind(&bio.fetch_date)
        .bind(Utc::now().to_rfc3339())
        .bind(&bio.bioguide_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn member_ref(&self, bioguide_id: &str) -> SyncResult<Option<MemberRef>> {
        let row = sqlx::query(
            "SELECT id, bioguide_id, full_name, party_code, state FROM members WHERE bioguide_id = ?",
        )
        .bind(bioguide_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| MemberRef {
            id: r.get("id"),
            bioguide_id: r.get("bioguide_id"),
            full_name: r.get("full_name"),
            party_code: r.get("party_code"),
            state: r.get("state"),
        }))
    }

    pub async fn bill_index(&self) -> SyncResult<BillIndex> {
        let rows = sqlx::query("SELECT id, congress, bill_number FROM bills")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| ((r.get("congress"), r.get("bill_number")), r.get("id")))
            .collect())
    }

    /// Link a member's sponsored bills. Returns the number of new links.
    pub async fn link_sponsored(
        &self,
        member: &MemberRef,
        links: &[(i64, Option<String>)],
    ) -> SyncResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;
        for (bill_id, introduced_date) in links {
            added += sqlx::query(
                "INSERT INTO sponsored_legislation (member_id, bill_id, introduced_date) VALUES (?, ?, ?) ON CONFLICT(member_id, bill_id) DO NOTHING",
            )
            .bind(member.id)
            .bind(bill_id)
            .bind(introduced_date)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(added)
    }

    /// Link a member's cosponsored bills and mirror them into
    /// `bill_cosponsors`. Returns the number of new links.
    pub async fn link_cosponsored(
        &self,
        member: &MemberRef,
        links: &[(i64, String)],
    ) -> SyncResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;
        for (bill_id, cosponsored_date) in links {
            added += sqlx::query(
                "INSERT INTO cosponsored_legislation (member_id, bill_id, cosponsored_date) VALUES (?, ?, ?) ON CONFLICT(member_id, bill_id) DO NOTHING",
            )
            .bind(member.id)
            .bind(bill_id)
            .bind(cosponsored_date)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            let cosponsor = BillCosponsor {
                bioguide_id: member.bioguide_id.clone(),
                full_name: member.full_name.clone(),
                party: member.party_code.clone(),
                state: member.state.clone(),
                sponsorship_date: Some(cosponsored_date.clone()),
            };
            upsert_cosponsor(&mut tx, *bill_id, &cosponsor).await?;
        }
        tx.commit().await?;
        Ok(added)
    }
}

pub async fn find_bill(
    conn: &mut SqliteConnection,
    congress: i64,
    bill_number: &str,
) -> SyncResult<Option<ExistingRow>> {
    let row = sqlx::query("SELECT id, update_date FROM bills WHERE congress = ? AND bill_number = ?")
        .bind(congress)
        .bind(bill_number)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| ExistingRow {
        id: r.get("id"),
        update_date: r.get("update_date"),
    }))
}

/// Upsert the core bill row. Absent incoming fields keep stored values, so a
/// sparse list item never erases detail-only columns.
pub async fn upsert_bill(conn: &mut SqliteConnection, bill: &CanonicalBill) -> SyncResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO bills (
            congress, bill_number, bill_type, bill_title, official_title, short_title,
            sponsor_id, introduced_date, status, normalized_status, latest_action_date,
            policy_area, api_url, bill_url, update_date, last_updated
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(congress, bill_number) DO UPDATE SET
            bill_type = excluded.bill_type,
            bill_title = COALESCE(excluded.bill_title, bills.bill_title),
            official_title = COALESCE(excluded.official_title, bills.official_title),
            short_title = COALESCE(excluded.short_title, bills.short_title),
            sponsor_id = COALESCE(excluded.sponsor_id, bills.sponsor_id),
            introduced_date = COALESCE(excluded.introduced_date, bills.introduced_date),
            normalized_status = CASE WHEN excluded.status IS NULL THEN bills.normalized_status ELSE excluded.normalized_status END,
            status = COALESCE(excluded.status, bills.status),
            latest_action_date = COALESCE(excluded.latest_action_date, bills.latest_action_date),
            policy_area = COALESCE(excluded.policy_area, bills.policy_area),
            api_url = COALESCE(excluded.api_url, bills.api_url),
            bill_url = excluded.bill_url,
            update_date = COALESCE(excluded.update_date, bills.update_date),
            last_updated = excluded.last_updated
        RETURNING id
        "#,
    )
    .bind(bill.congress)
    .bind(&bill.bill_number)
    .bind(&bill.bill_type)
    .bind(&bill.title)
    .bind(&bill.official_title)
    .bind(&bill.short_title)
    .bind(&bill.sponsor_id)
    .bind(&bill.introduced_date)
    .bind(&bill.status)
    .bind(bill.normalized_status.map(|s| s.as_str()))
    .bind(&bill.latest_action_date)
    .bind(&bill.policy_area)
    .bind(&bill.api_url)
    .bind(bill.public_url())
    .bind(&bill.update_date)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Attach the bill's policy area as a `Policy Area` tag.
pub async fn link_policy_area(
    conn: &mut SqliteConnection,
    bill_id: i64,
    policy_area: &str,
) -> SyncResult<()> {
    let tag_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO tags (type_id, name, normalized_name, description)
        SELECT id, ?, ?, ? FROM tag_types WHERE name = 'Policy Area'
        ON CONFLICT(type_id, normalized_name) DO UPDATE SET name = excluded.name
        RETURNING id
        "#,
    )
    .bind(policy_area)
    .bind(normalize_tag_name(policy_area))
    .bind(format!("Bills related to {}", policy_area))
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO bill_tags (bill_id, tag_id) VALUES (?, ?) ON CONFLICT(bill_id, tag_id) DO NOTHING")
        .bind(bill_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Write the enrichment collections. Empty collections leave stored data
/// untouched, since a failed sub-resource fetch also yields an empty list.
pub async fn apply_bill_detail(
    conn: &mut SqliteConnection,
    bill_id: i64,
    bill: &CanonicalBill,
) -> SyncResult<DetailCounts> {
    let as_json = |empty: bool, json: SyncResult<String>| -> SyncResult<Option<String>> {
        if empty {
            Ok(None)
        } else {
            json.map(Some)
        }
    };
    let text_versions = as_json(
        bill.text_versions.is_empty(),
        serde_json::to_string(&bill.text_versions).map_err(Into::into),
    )?;
    let summaries = as_json(
        bill.summaries.is_empty(),
        serde_json::to_string(&bill.summaries).map_err(Into::into),
    )?;
    let related = as_json(
        bill.related_bills.is_empty(),
        serde_json::to_string(&bill.related_bills).map_err(Into::into),
    )?;

    sqlx::query(
        r#"
        UPDATE bills SET
            text_versions = COALESCE(?, text_versions),
            summaries = COALESCE(?, summaries),
            related_bills = COALESCE(?, related_bills)
        WHERE id = ?
        "#,
    )
    .bind(text_versions)
    .bind(summaries)
    .bind(related)
    .bind(bill_id)
    .execute(&mut *conn)
    .await?;

    let mut counts = DetailCounts::default();

    for action in &bill.actions {
        sqlx::query(
            r#"
            INSERT INTO bill_actions (bill_id, action_date, action_text, action_type, action_time)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(bill_id, action_date, action_text) DO UPDATE SET
                action_type = excluded.action_type,
                action_time = excluded.action_time
            "#,
        )
        .bind(bill_id)
        .bind(&action.action_date)
        .bind(&action.text)
        .bind(&action.action_type)
        .bind(&action.action_time)
        .execute(&mut *conn)
        .await?;
        counts.actions += 1;
    }

    for cosponsor in &bill.cosponsors {
        upsert_cosponsor(conn, bill_id, cosponsor).await?;
        counts.cosponsors += 1;
    }

    for subject in &bill.subjects {
        sqlx::query(
            "INSERT INTO bill_subjects (bill_id, subject_name) VALUES (?, ?) ON CONFLICT(bill_id, subject_name) DO NOTHING",
        )
        .bind(bill_id)
        .bind(subject)
        .execute(&mut *conn)
        .await?;
        counts.subjects += 1;
    }

    Ok(counts)
}

pub async fn upsert_cosponsor(
    conn: &mut SqliteConnection,
    bill_id: i64,
    cosponsor: &BillCosponsor,
) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO bill_cosponsors (bill_id, cosponsor_id, cosponsor_name, cosponsor_party, cosponsor_state, cosponsor_date)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(bill_id, cosponsor_id) DO UPDATE SET
            cosponsor_name = COALESCE(excluded.cosponsor_name, bill_cosponsors.cosponsor_name),
            cosponsor_party = COALESCE(excluded.cosponsor_party, bill_cosponsors.cosponsor_party),
            cosponsor_state = COALESCE(excluded.cosponsor_state, bill_cosponsors.cosponsor_state),
            cosponsor_date = COALESCE(excluded.cosponsor_date, bill_cosponsors.cosponsor_date)
        "#,
    )
    .bind(bill_id)
    .bind(&cosponsor.bioguide_id)
    .bind(&cosponsor.full_name)
    .bind(&cosponsor.party)
    .bind(&cosponsor.state)
    .bind(&cosponsor.sponsorship_date)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_member(
    conn: &mut SqliteConnection,
    bioguide_id: &str,
) -> SyncResult<Option<ExistingRow>> {
    let row = sqlx::query("SELECT id, update_date FROM members WHERE bioguide_id = ?")
        .bind(bioguide_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| ExistingRow {
        id: r.get("id"),
        update_date: r.get("update_date"),
    }))
}

pub async fn upsert_member(conn: &mut SqliteConnection, member: &CanonicalMember) -> SyncResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO members (
            bioguide_id, first_name, middle_name, last_name, full_name, direct_order_name,
            honorific_name, inverted_order_name, state, district, party, party_code, chamber,
            photo_url, current_member, birth_year, death_year, office_address, phone, url,
            update_date, last_updated
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(bioguide_id) DO UPDATE SET
            first_name = COALESCE(excluded.first_name, members.first_name),
            middle_name = COALESCE(excluded.middle_name, members.middle_name),
            last_name = COALESCE(excluded.last_name, members.last_name),
            full_name = COALESCE(excluded.full_name, members.full_name),
            direct_order_name = COALESCE(excluded.direct_order_name, members.direct_order_name),
            honorific_name = COALESCE(excluded.honorific_name, members.honorific_name),
            inverted_order_name = COALESCE(excluded.inverted_order_name, members.inverted_order_name),
            state = COALESCE(excluded.state, members.state),
            district = COALESCE(excluded.district, members.district),
            party = COALESCE(excluded.party, members.party),
            party_code = COALESCE(excluded.party_code, members.party_code),
            chamber = COALESCE(excluded.chamber, members.chamber),
            photo_url = COALESCE(excluded.photo_url, members.photo_url),
            current_member = excluded.current_member,
            birth_year = COALESCE(excluded.birth_year, members.birth_year),
            death_year = COALESCE(excluded.death_year, members.death_year),
            office_address = COALESCE(excluded.office_address, members.office_address),
            phone = COALESCE(excluded.phone, members.phone),
            url = COALESCE(excluded.url, members.url),
            update_date = COALESCE(excluded.update_date, members.update_date),
            last_updated = excluded.last_updated
        RETURNING id
        "#,
    )
    .bind(&member.bioguide_id)
    .bind(&member.first_name)
    .bind(&member.middle_name)
    .bind(&member.last_name)
    .bind(&member.full_name)
    .bind(&member.direct_order_name)
    .bind(&member.honorific_name)
    .bind(&member.inverted_order_name)
    .bind(&member.state)
    .bind(member.district)
    .bind(&member.party_name)
    .bind(&member.party_code)
    .bind(&member.chamber)
    .bind(&member.photo_url)
    .bind(member.current_member)
    .bind(member.birth_year)
    .bind(member.death_year)
    .bind(&member.contact.office_address)
    .bind(&member.contact.phone)
    .bind(&member.contact.url)
    .bind(&member.update_date)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Terms, leadership, and party history. Each upserts on its natural key so a
/// later fetch corrects an earlier one instead of duplicating it.
pub async fn upsert_member_history(
    conn: &mut SqliteConnection,
    member_id: i64,
    member: &CanonicalMember,
) -> SyncResult<()> {
    for term in &member.terms {
        let Some(congress) = term.congress else {
            continue;
        };
        sqlx::query(
            r#"
            INSERT INTO member_terms (member_id, congress, chamber, party, state, district, start_year, end_year)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(member_id, congress, chamber) DO UPDATE SET
                party = COALESCE(excluded.party, member_terms.party),
                state = COALESCE(excluded.state, member_terms.state),
                district = COALESCE(excluded.district, member_terms.district),
                start_year = COALESCE(excluded.start_year, member_terms.start_year),
                end_year = excluded.end_year
            "#,
        )
        .bind(member_id)
        .bind(congress)
        .bind(&term.chamber)
        .bind(&term.party)
        .bind(&term.state)
        .bind(term.district)
        .bind(term.start_year)
        .bind(term.end_year)
        .execute(&mut *conn)
        .await?;
    }

    for leadership in &member.leadership {
        sqlx::query(
            r#"
            INSERT INTO member_leadership (member_id, congress, leadership_type)
            VALUES (?, ?, ?)
            ON CONFLICT(member_id, congress) DO UPDATE SET leadership_type = excluded.leadership_type
            "#,
        )
        .bind(member_id)
        .bind(leadership.congress)
        .bind(&leadership.leadership_type)
        .execute(&mut *conn)
        .await?;
    }

    for party in &member.party_history {
        sqlx::query(
            r#"
            INSERT INTO member_party_history (member_id, start_year, party_name, party_code)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(member_id, start_year) DO UPDATE SET
                party_name = excluded.party_name,
                party_code = excluded.party_code
            "#,
        )
        .bind(member_id)
        .bind(party.start_year)
        .bind(&party.party_name)
        .bind(&party.party_code)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
