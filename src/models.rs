//! Canonical record types shared by the normalizers, the repository, and the
//! orchestrators.
//!
//! Everything upstream of [`crate::bills`] / [`crate::members`] is raw
//! `serde_json::Value`; everything downstream sees only these shapes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

/// Legislative stage derived from free-text latest action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillStatus {
    Introduced,
    InCommittee,
    Reported,
    PassedHouse,
    PassedSenate,
    ResolvingDifferences,
    ToPresident,
    Enacted,
    BecameLaw,
    Failed,
}

impl BillStatus {
    pub const ALL: [BillStatus; 10] = [
        BillStatus::Introduced,
        BillStatus::InCommittee,
        BillStatus::Reported,
        BillStatus::PassedHouse,
        BillStatus::PassedSenate,
        BillStatus::ResolvingDifferences,
        BillStatus::ToPresident,
        BillStatus::Enacted,
        BillStatus::BecameLaw,
        BillStatus::Failed,
    ];

    /// Display and storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Introduced => "Introduced",
            BillStatus::InCommittee => "In Committee",
            BillStatus::Reported => "Reported",
            BillStatus::PassedHouse => "Passed House",
            BillStatus::PassedSenate => "Passed Senate",
            BillStatus::ResolvingDifferences => "Resolving Differences",
            BillStatus::ToPresident => "To President",
            BillStatus::Enacted => "Enacted",
            BillStatus::BecameLaw => "Became Law",
            BillStatus::Failed => "Failed",
        }
    }

    /// Position in the progress hierarchy; higher is further along.
    pub fn rank(&self) -> u8 {
        match self {
            BillStatus::Failed => 0,
            BillStatus::Introduced => 10,
            BillStatus::InCommittee => 20,
            BillStatus::Reported => 30,
            BillStatus::PassedHouse | BillStatus::PassedSenate => 40,
            BillStatus::ResolvingDifferences => 50,
            BillStatus::ToPresident => 55,
            BillStatus::Enacted => 60,
            BillStatus::BecameLaw => 70,
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillStatus {
    type Err = String;

    /// Accepts the display form case-insensitively, with `_` or `-` for spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', '-'], " ");
        BillStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().to_lowercase() == wanted)
            .ok_or_else(|| format!("unknown bill status: '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextVersion {
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub version_type: String,
    pub formats: Vec<TextFormat>,
    #[serde(default)]
    pub is_initial_version: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSummary {
    pub version_code: Option<String>,
    pub action_date: Option<String>,
    pub action_desc: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillAction {
    pub action_date: String,
    pub text: String,
    pub action_type: Option<String>,
    pub action_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillCosponsor {
    pub bioguide_id: String,
    pub full_name: Option<String>,
    pub party: Option<String>,
    pub state: Option<String>,
    pub sponsorship_date: Option<String>,
}

/// A bill as stored. List syncs fill the core fields; detail enrichment
/// fills the collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalBill {
    pub congress: i64,
    /// Lower-case type code, e.g. `hr`, `sjres`.
    pub bill_type: String,
    /// Numeric suffix as received.
    pub number: String,
    /// Natural key within a congress: `HR1234`.
    pub bill_number: String,
    pub title: Option<String>,
    pub official_title: Option<String>,
    pub short_title: Option<String>,
    pub sponsor_id: Option<String>,
    pub introduced_date: Option<String>,
    pub status: Option<String>,
    pub normalized_status: Option<BillStatus>,
    pub latest_action_date: Option<String>,
    pub policy_area: Option<String>,
    pub update_date: Option<String>,
    pub api_url: Option<String>,
    pub text_versions: Vec<TextVersion>,
    pub summaries: Vec<BillSummary>,
    pub related_bills: Vec<String>,
    pub subjects: Vec<String>,
    pub cosponsors: Vec<BillCosponsor>,
    pub actions: Vec<BillAction>,
}

impl CanonicalBill {
    pub fn is_historical(&self) -> bool {
        crate::bills::is_historical_bill(self.congress)
    }

    /// Public congress.gov page for this bill.
    pub fn public_url(&self) -> String {
        format!(
            "https://www.congress.gov/bill/{}-congress/{}/{}",
            ordinal(self.congress),
            self.bill_type,
            self.number
        )
    }
}

/// `1st`, `2nd`, `3rd`, `11th`, `112th`, `118th`.
fn ordinal(n: i64) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub congress: Option<i64>,
    pub chamber: String,
    pub party: Option<String>,
    pub state: Option<String>,
    pub district: Option<i64>,
    pub start_year: Option<i64>,
    pub end_year: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leadership {
    pub congress: i64,
    pub leadership_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyAffiliation {
    pub party_name: String,
    pub party_code: Option<String>,
    pub start_year: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    pub office_address: Option<String>,
    pub phone: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalMember {
    pub bioguide_id: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub direct_order_name: Option<String>,
    pub honorific_name: Option<String>,
    pub inverted_order_name: Option<String>,
    pub state: Option<String>,
    pub district: Option<i64>,
    pub party_name: Option<String>,
    pub party_code: Option<String>,
    pub chamber: Option<String>,
    pub photo_url: Option<String>,
    pub current_member: bool,
    pub birth_year: Option<i64>,
    pub death_year: Option<i64>,
    pub contact: Contact,
    pub terms: Vec<Term>,
    pub leadership: Vec<Leadership>,
    pub party_history: Vec<PartyAffiliation>,
    pub update_date: Option<String>,
}

/// Output of the external biography scraper.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BioRecord {
    pub bioguide_id: String,
    pub profile_text: Option<String>,
    pub bio_directory: Option<String>,
    pub fetch_date: Option<String>,
}

/// Per-run counters for list syncs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errored: u64,
    pub historical: u64,
}

impl SyncStats {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.skipped + self.errored
    }
}

/// Per-run counters for detail and batch work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
}

impl AddAssign for BatchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.processed += rhs.processed;
        self.success += rhs.success;
        self.failed += rhs.failed;
    }
}
