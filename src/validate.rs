//! Missing-data detection for stored bills.
//!
//! Bills from historical congresses (6–42) never had summaries, policy areas,
//! subjects, or cosponsors recorded upstream, so those four checks exclude
//! them. Text-version and action checks include every bill. The cosponsor
//! check only considers bills with a sponsor.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use crate::bills::HISTORICAL_CONGRESSES;
use crate::error::SyncResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCategory {
    TextVersions,
    Summary,
    PolicyArea,
    Actions,
    Subjects,
    Cosponsors,
}

impl MissingCategory {
    pub const ALL: [MissingCategory; 6] = [
        MissingCategory::TextVersions,
        MissingCategory::Summary,
        MissingCategory::PolicyArea,
        MissingCategory::Actions,
        MissingCategory::Subjects,
        MissingCategory::Cosponsors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MissingCategory::TextVersions => "text_versions",
            MissingCategory::Summary => "summary",
            MissingCategory::PolicyArea => "policy_area",
            MissingCategory::Actions => "actions",
            MissingCategory::Subjects => "subjects",
            MissingCategory::Cosponsors => "cosponsors",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MissingCategory::TextVersions => "Missing Text Versions",
            MissingCategory::Summary => "Missing Summaries",
            MissingCategory::PolicyArea => "Missing Policy Area Tags",
            MissingCategory::Actions => "Missing Actions",
            MissingCategory::Subjects => "Missing Subjects",
            MissingCategory::Cosponsors => "Missing Cosponsors",
        }
    }

    pub fn excludes_historical(&self) -> bool {
        !matches!(self, MissingCategory::TextVersions | MissingCategory::Actions)
    }

    fn condition(&self) -> &'static str {
        match self {
            MissingCategory::TextVersions => "(b.text_versions IS NULL OR b.text_versions = '[]')",
            MissingCategory::Summary => "(b.summaries IS NULL OR b.summaries = '[]')",
            MissingCategory::PolicyArea => {
                "NOT EXISTS (
                    SELECT 1 FROM bill_tags bt
                    JOIN tags t ON t.id = bt.tag_id
                    JOIN tag_types tt ON tt.id = t.type_id
                    WHERE bt.bill_id = b.id AND tt.name = 'Policy Area'
                )"
            }
            MissingCategory::Actions => {
                "NOT EXISTS (SELECT 1 FROM bill_actions ba WHERE ba.bill_id = b.id)"
            }
            MissingCategory::Subjects => {
                "NOT EXISTS (SELECT 1 FROM bill_subjects bs WHERE bs.bill_id = b.id)"
            }
            MissingCategory::Cosponsors => {
                "b.sponsor_id IS NOT NULL
                 AND NOT EXISTS (SELECT 1 FROM bill_cosponsors bc WHERE bc.bill_id = b.id)"
            }
        }
    }
}

impl FromStr for MissingCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        match wanted.as_str() {
            "summaries" => return Ok(MissingCategory::Summary),
            "text" => return Ok(MissingCategory::TextVersions),
            _ => {}
        }
        MissingCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown bill data category: '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingBill {
    pub bill_number: String,
    pub congress: i64,
}

/// Bills lacking `category`, newest congress first.
pub async fn find_missing(
    pool: &SqlitePool,
    category: MissingCategory,
    limit: Option<i64>,
) -> SyncResult<Vec<MissingBill>> {
    let historical = if category.excludes_historical() {
        format!(
            " AND b.congress NOT BETWEEN {} AND {}",
            HISTORICAL_CONGRESSES.start(),
            HISTORICAL_CONGRESSES.end()
        )
    } else {
        String::new()
    };
    let sql = format!(
        "SELECT b.bill_number, b.congress FROM bills b WHERE {}{} ORDER BY b.congress DESC, b.bill_number LIMIT ?",
        category.condition(),
        historical
    );

    let rows = sqlx::query(&sql)
        .bind(limit.unwrap_or(-1))
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|r| MissingBill {
            bill_number: r.get("bill_number"),
            congress: r.get("congress"),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub category: MissingCategory,
    pub bills: Vec<MissingBill>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub generated_at: String,
    pub categories: Vec<CategoryReport>,
}

impl ValidationReport {
    pub fn get(&self, category: MissingCategory) -> &[MissingBill] {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.bills.as_slice())
            .unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.categories.iter().map(|c| c.bills.len()).sum()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Bill Validation Results");
        let _ = writeln!(out, "Generated: {}", self.generated_at);
        for report in &self.categories {
            let _ = writeln!(out);
            let _ = writeln!(out, "{} ({}):", report.category.title(), report.bills.len());
            for bill in &report.bills {
                let _ = writeln!(out, "  {} (Congress: {})", bill.bill_number, bill.congress);
            }
        }
        out
    }
}

pub async fn validation_report(pool: &SqlitePool) -> SyncResult<ValidationReport> {
    let mut categories = Vec::with_capacity(MissingCategory::ALL.len());
    for category in MissingCategory::ALL {
        categories.push(CategoryReport {
            category,
            bills: find_missing(pool, category, None).await?,
        });
    }
    Ok(ValidationReport {
        generated_at: Utc::now().to_rfc3339(),
        categories,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

/// CLI entry: build the report and write it to `output` or stdout.
pub async fn run_validate(pool: &SqlitePool, format: ReportFormat, output: Option<&Path>) -> Result<()> {
    let report = validation_report(pool).await?;
    let rendered = match format {
        ReportFormat::Text => report.to_text(),
        ReportFormat::Json => serde_json::to_string_pretty(&report)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("validate");
            for c in &report.categories {
                println!("  {}: {}", c.category.as_str(), c.bills.len());
            }
            println!("  written: {}", path.display());
            println!("ok");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_parse() {
        assert_eq!("summary".parse::<MissingCategory>(), Ok(MissingCategory::Summary));
        assert_eq!("summaries".parse::<MissingCategory>(), Ok(MissingCategory::Summary));
        assert_eq!("text-versions".parse::<MissingCategory>(), Ok(MissingCategory::TextVersions));
        assert_eq!("policy_area".parse::<MissingCategory>(), Ok(MissingCategory::PolicyArea));
        assert!("biography".parse::<MissingCategory>().is_err());
    }

    #[test]
    fn historical_exclusions() {
        let excluded: Vec<_> = MissingCategory::ALL
            .iter()
            .filter(|c| c.excludes_historical())
            .map(|c| c.as_str())
            .collect();
        assert_eq!(excluded, vec!["summary", "policy_area", "subjects", "cosponsors"]);
    }

    #[test]
    fn text_report_lists_bills() {
        let report = ValidationReport {
            generated_at: "2024-01-01T00:00:00Z".into(),
            categories: vec![CategoryReport {
                category: MissingCategory::Actions,
                bills: vec![MissingBill {
                    bill_number: "HR1".into(),
                    congress: 118,
                }],
            }],
        };
        let text = report.to_text();
        assert!(text.contains("Missing Actions (1):"));
        assert!(text.contains("  HR1 (Congress: 118)"));
        assert_eq!(report.total(), 1);
        assert_eq!(report.get(MissingCategory::Summary), &[] as &[MissingBill]);
    }
}
