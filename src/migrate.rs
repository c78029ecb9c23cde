use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and seed row. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create bills table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bills (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            congress INTEGER NOT NULL,
            bill_number TEXT NOT NULL,
            bill_type TEXT NOT NULL,
            bill_title TEXT,
            official_title TEXT,
            short_title TEXT,
            sponsor_id TEXT,
            introduced_date TEXT,
            status TEXT,
            normalized_status TEXT,
            latest_action_date TEXT,
            policy_area TEXT,
            summaries TEXT,
            text_versions TEXT,
            related_bills TEXT,
            api_url TEXT,
            bill_url TEXT,
            update_date TEXT,
            last_updated TEXT NOT NULL,
            UNIQUE(congress, bill_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bill_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bill_id INTEGER NOT NULL,
            action_date TEXT NOT NULL,
            action_text TEXT NOT NULL,
            action_type TEXT,
            action_time TEXT,
            UNIQUE(bill_id, action_date, action_text),
            FOREIGN KEY (bill_id) REFERENCES bills(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bill_cosponsors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bill_id INTEGER NOT NULL,
            cosponsor_id TEXT NOT NULL,
            cosponsor_name TEXT,
            cosponsor_party TEXT,
            cosponsor_state TEXT,
            cosponsor_date TEXT,
            UNIQUE(bill_id, cosponsor_id),
            FOREIGN KEY (bill_id) REFERENCES bills(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bill_subjects (
            bill_id INTEGER NOT NULL,
            subject_name TEXT NOT NULL,
            UNIQUE(bill_id, subject_name),
            FOREIGN KEY (bill_id) REFERENCES bills(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tag hierarchy: policy areas are one tag type
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tag_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            description TEXT,
            UNIQUE(type_id, normalized_name),
            FOREIGN KEY (type_id) REFERENCES tag_types(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bill_tags (
            bill_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            UNIQUE(bill_id, tag_id),
            FOREIGN KEY (bill_id) REFERENCES bills(id),
            FOREIGN KEY (tag_id) REFERENCES tags(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO tag_types (name, description) VALUES ('Policy Area', 'Primary policy area assigned by Congress.gov') ON CONFLICT(name) DO NOTHING",
    )
    .execute(pool)
    .await?;

    // Create members table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bioguide_id TEXT NOT NULL UNIQUE,
            first_name TEXT,
            middle_name TEXT,
            last_name TEXT,
            full_name TEXT,
            direct_order_name TEXT,
            honorific_name TEXT,
            inverted_order_name TEXT,
            state TEXT,
            district INTEGER,
            party TEXT,
            party_code TEXT,
            chamber TEXT,
            photo_url TEXT,
            current_member INTEGER NOT NULL DEFAULT 0,
            birth_year INTEGER,
            death_year INTEGER,
            office_address TEXT,
            phone TEXT,
            url TEXT,
            profile_text TEXT,
            bio_directory TEXT,
            bio_update_date TEXT,
            update_date TEXT,
            last_updated TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member_terms (
            member_id INTEGER NOT NULL,
            congress INTEGER NOT NULL,
            chamber TEXT NOT NULL,
            party TEXT,
            state TEXT,
            district INTEGER,
            start_year INTEGER,
            end_year INTEGER,
            UNIQUE(member_id, congress, chamber),
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member_leadership (
            member_id INTEGER NOT NULL,
            congress INTEGER NOT NULL,
            leadership_type TEXT NOT NULL,
            UNIQUE(member_id, congress),
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member_party_history (
            member_id INTEGER NOT NULL,
            start_year INTEGER NOT NULL,
            party_name TEXT NOT NULL,
            party_code TEXT,
            UNIQUE(member_id, start_year),
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sponsored_legislation (
            member_id INTEGER NOT NULL,
            bill_id INTEGER NOT NULL,
            introduced_date TEXT,
            UNIQUE(member_id, bill_id),
            FOREIGN KEY (member_id) REFERENCES members(id),
            FOREIGN KEY (bill_id) REFERENCES bills(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cosponsored_legislation (
            member_id INTEGER NOT NULL,
            bill_id INTEGER NOT NULL,
            cosponsored_date TEXT,
            UNIQUE(member_id, bill_id),
            FOREIGN KEY (member_id) REFERENCES members(id),
            FOREIGN KEY (bill_id) REFERENCES bills(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create sync status table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_sync_status (
            endpoint TEXT PRIMARY KEY,
            last_sync_timestamp TEXT,
            last_successful_offset INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            last_error TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bills_status ON bills(normalized_status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bills_sponsor ON bills(sponsor_id)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply(&pool).await.unwrap();
        apply(&pool).await.unwrap();

        let tag_types: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tag_types")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(tag_types, 1);
    }
}
