//! Bill normalization.
//!
//! Turns raw Congress.gov bill payloads (list items, detail documents, and
//! their sub-resources) into [`CanonicalBill`] pieces. All functions here are
//! pure; fetching and persistence live in [`crate::ingest`] and
//! [`crate::details`].
//!
//! # Payload shapes
//!
//! A bill entry arrives either as one object or, for some historical bills,
//! as an array of revisions under the same `bill` key. [`BillPayload`]
//! resolves that once so nothing downstream sees the ambiguity.

use serde_json::Value;
use std::ops::RangeInclusive;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::models::{
    BillAction, BillCosponsor, BillStatus, BillSummary, CanonicalBill, TextFormat, TextVersion,
};
use crate::payload;

/// Congresses 6 through 42 (1799–1873). Upstream coverage for these lacks
/// sponsors, cosponsors, summaries, subjects, and policy areas.
pub const HISTORICAL_CONGRESSES: RangeInclusive<i64> = 6..=42;

pub fn is_historical_bill(congress: i64) -> bool {
    HISTORICAL_CONGRESSES.contains(&congress)
}

/// `("HR", "1234")` → `"hr1234"`.
pub fn compose_bill_number(bill_type: &str, number: &str) -> String {
    format!("{}{}", bill_type.to_lowercase(), number)
}

/// Natural key stored in `bills.bill_number`: `"HR1234"`.
pub fn bill_key(bill_type: &str, number: &str) -> String {
    compose_bill_number(bill_type, number).to_uppercase()
}

/// Split a stored bill number at its first digit: `"SJRES33"` → `("sjres", "33")`.
/// Without a digit the whole string is the type.
pub fn parse_bill_number(bill_number: &str) -> (String, String) {
    match bill_number.find(|c: char| c.is_ascii_digit()) {
        Some(idx) => (
            bill_number[..idx].to_lowercase(),
            bill_number[idx..].to_string(),
        ),
        None => (bill_number.to_lowercase(), String::new()),
    }
}

/// Map free-text latest action to a legislative stage. Rules are checked in
/// order; the first match wins.
pub fn normalize_status(action_text: &str) -> Option<BillStatus> {
    let text = action_text.to_lowercase();
    let has = |phrase: &str| text.contains(phrase);
    let passed_in = || {
        if has("house") {
            Some(BillStatus::PassedHouse)
        } else if has("senate") {
            Some(BillStatus::PassedSenate)
        } else {
            None
        }
    };

    if has("became public law") || has("became law") {
        return Some(BillStatus::BecameLaw);
    }
    if has("enacted") || has("approved by president") {
        return Some(BillStatus::Enacted);
    }
    if has("passed") {
        if let Some(status) = passed_in() {
            return Some(status);
        }
    }
    if has("placed on") && has("calendar") && (has("senate") || has("union calendar")) {
        return Some(BillStatus::Reported);
    }
    if has("reported") || has("ordered to be reported") {
        return Some(BillStatus::Reported);
    }
    if has("referred to") || has("committee") || has("held at the desk") {
        return Some(BillStatus::InCommittee);
    }
    if has("introduced") || has("introduction") {
        return Some(BillStatus::Introduced);
    }
    if has("motion to reconsider laid on the table agreed to") {
        if let Some(status) = passed_in() {
            return Some(status);
        }
    }

    None
}

/// A bill entry as it arrives under the `bill` key.
#[derive(Debug, Clone, Copy)]
pub enum BillPayload<'a> {
    Single(&'a Value),
    Revisions(&'a [Value]),
}

impl<'a> BillPayload<'a> {
    /// Accepts `{"bill": {...}}`, `{"bill": [...]}`, or a bare bill object.
    pub fn from_raw(raw: &'a Value) -> Self {
        match raw.get("bill") {
            Some(Value::Array(revisions)) => BillPayload::Revisions(revisions),
            Some(bill @ Value::Object(_)) => BillPayload::Single(bill),
            _ => BillPayload::Single(raw),
        }
    }

    /// The single object to normalize, or `None` for an empty revision list.
    pub fn resolve(self) -> Option<&'a Value> {
        match self {
            BillPayload::Single(bill) => Some(bill),
            BillPayload::Revisions(revisions) => {
                if revisions.len() > 1 {
                    debug!(
                        revisions = revisions.len(),
                        "multiple bill entries; using the most recently updated"
                    );
                }
                latest_revision(revisions)
            }
        }
    }
}

/// Entry with the greatest `updateDate` string. ISO-8601 sorts lexically.
pub fn latest_revision(revisions: &[Value]) -> Option<&Value> {
    revisions.iter().max_by(|a, b| {
        let a = a.get("updateDate").and_then(Value::as_str).unwrap_or("");
        let b = b.get("updateDate").and_then(Value::as_str).unwrap_or("");
        a.cmp(b)
    })
}

/// Normalize a list item or detail document. `Ok(None)` means an empty
/// revision list and is counted as skipped.
pub fn normalize_bill(raw: &Value) -> SyncResult<Option<CanonicalBill>> {
    let Some(bill) = BillPayload::from_raw(raw).resolve() else {
        return Ok(None);
    };

    let key_hint = || {
        format!(
            "{}{}",
            payload::string(bill, "type").unwrap_or_default(),
            payload::string(bill, "number").unwrap_or_default()
        )
    };

    let bill_type = payload::string(bill, "type")
        .ok_or_else(|| SyncError::malformed(key_hint(), "missing bill type"))?;
    let number = payload::string(bill, "number")
        .ok_or_else(|| SyncError::malformed(key_hint(), "missing bill number"))?;
    let congress = payload::int(bill, "congress")
        .ok_or_else(|| SyncError::malformed(key_hint(), "missing congress"))?;

    let status = payload::path_string(bill, &["latestAction", "text"]);
    let normalized_status = status.as_deref().and_then(normalize_status);

    let sponsor_id = payload::items(bill.get("sponsors"))
        .first()
        .and_then(|s| payload::string(s, "bioguideId"));

    let titles = payload::items(bill.get("titles"));
    let official_title = titles.first().and_then(|t| payload::string(t, "title"));
    let short_title = titles.get(1).and_then(|t| payload::string(t, "title"));

    Ok(Some(CanonicalBill {
        congress,
        bill_number: bill_key(&bill_type, &number),
        bill_type: bill_type.to_lowercase(),
        number,
        title: payload::string(bill, "title"),
        official_title,
        short_title,
        sponsor_id,
        introduced_date: payload::string(bill, "introducedDate"),
        status,
        normalized_status,
        latest_action_date: payload::path_string(bill, &["latestAction", "actionDate"]),
        policy_area: payload::path_string(bill, &["policyArea", "name"]),
        update_date: payload::string(bill, "updateDate"),
        api_url: payload::string(bill, "url"),
        related_bills: parse_related_bills(bill.get("relatedBills")),
        ..Default::default()
    }))
}

/// Ranking used to break ties between text versions on the same date.
pub fn version_importance(version_type: &str) -> u32 {
    match version_type {
        "Public Law" => 1,
        "Enrolled Bill" => 2,
        t if t.starts_with("Engrossed") => 3,
        t if t.starts_with("Placed on Calendar") => 4,
        _ => 999,
    }
}

pub fn format_display_name(format_type: &str) -> String {
    match format_type {
        "Formatted Text" => "HTML".to_string(),
        "Formatted XML" => "XML".to_string(),
        "PDF" => "PDF".to_string(),
        other => other.to_string(),
    }
}

/// Parse the `textVersions` array of a text-versions document.
pub fn parse_text_versions(doc: &Value) -> Vec<TextVersion> {
    payload::items(doc.get("textVersions"))
        .into_iter()
        .map(|v| TextVersion {
            date: payload::string(v, "date"),
            version_type: payload::string(v, "type").unwrap_or_else(|| "Unknown".to_string()),
            formats: payload::items(v.get("formats"))
                .into_iter()
                .map(|f| TextFormat {
                    format_type: format_display_name(
                        &payload::string(f, "type").unwrap_or_default(),
                    ),
                    url: payload::string(f, "url"),
                })
                .collect(),
            is_initial_version: false,
        })
        .collect()
}

/// Fill undated versions from the introduced date, then order most recent
/// first with the most authoritative version winning ties.
pub fn process_text_versions(
    mut versions: Vec<TextVersion>,
    introduced_date: Option<&str>,
) -> Vec<TextVersion> {
    for version in versions.iter_mut().filter(|v| v.date.is_none()) {
        version.date = introduced_date.map(str::to_string);
        version.is_initial_version = true;
    }

    versions.sort_by(|a, b| {
        calendar_day(b)
            .cmp(&calendar_day(a))
            .then_with(|| version_importance(&a.version_type).cmp(&version_importance(&b.version_type)))
    });
    versions
}

fn calendar_day(version: &TextVersion) -> Option<&str> {
    version.date.as_deref().map(|d| d.get(..10).unwrap_or(d))
}

pub fn parse_summaries(doc: &Value) -> Vec<BillSummary> {
    payload::items(doc.get("summaries"))
        .into_iter()
        .map(|s| BillSummary {
            version_code: payload::string(s, "versionCode"),
            action_date: payload::string(s, "actionDate"),
            action_desc: payload::string(s, "actionDesc"),
            text: payload::string(s, "text"),
        })
        .collect()
}

/// Actions without a date or text cannot be keyed and are dropped.
pub fn parse_actions(doc: &Value) -> Vec<BillAction> {
    payload::items(doc.get("actions"))
        .into_iter()
        .filter_map(|a| {
            Some(BillAction {
                action_date: payload::string(a, "actionDate")?,
                text: payload::string(a, "text")?,
                action_type: payload::string(a, "type"),
                action_time: payload::string(a, "actionTime"),
            })
        })
        .collect()
}

pub fn parse_cosponsors(doc: &Value) -> Vec<BillCosponsor> {
    payload::items(doc.get("cosponsors"))
        .into_iter()
        .filter_map(|c| {
            Some(BillCosponsor {
                bioguide_id: payload::string(c, "bioguideId")?,
                full_name: payload::string(c, "fullName"),
                party: payload::string(c, "party"),
                state: payload::string(c, "state"),
                sponsorship_date: payload::string(c, "sponsorshipDate"),
            })
        })
        .collect()
}

/// Legislative subject names from a subjects document.
pub fn parse_subjects(doc: &Value) -> Vec<String> {
    let subjects = doc.get("subjects");
    let list = subjects
        .and_then(|s| s.get("legislativeSubjects"))
        .or(subjects);
    payload::items(list)
        .into_iter()
        .filter_map(|s| payload::string(s, "name"))
        .collect()
}

/// Related bill keys from an inline `relatedBills` collection.
pub fn parse_related_bills(related: Option<&Value>) -> Vec<String> {
    payload::items(related)
        .into_iter()
        .filter_map(|rb| {
            let bill_type = payload::string(rb, "type")?;
            let number = payload::string(rb, "number")?;
            Some(bill_key(&bill_type, &number))
        })
        .collect()
}

/// Tag key for a policy area: `"Armed Forces & National Security"` →
/// `"armed_forces_and_national_security"`.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace('&', "and")
        .replace([' ', ',', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_rules_follow_precedence() {
        let cases = [
            ("Became Public Law No: 117-58.", Some(BillStatus::BecameLaw)),
            ("Signed by President. Became law.", Some(BillStatus::BecameLaw)),
            ("Approved by President.", Some(BillStatus::Enacted)),
            (
                "Passed/agreed to in House: On passage Passed by recorded vote",
                Some(BillStatus::PassedHouse),
            ),
            (
                "Passed Senate with an amendment by Unanimous Consent.",
                Some(BillStatus::PassedSenate),
            ),
            (
                "Placed on Senate Legislative Calendar under General Orders.",
                Some(BillStatus::Reported),
            ),
            (
                "Placed on the Union Calendar, Calendar No. 12.",
                Some(BillStatus::Reported),
            ),
            (
                "Ordered to be Reported by Voice Vote.",
                Some(BillStatus::Reported),
            ),
            (
                "Referred to the House Committee on Ways and Means.",
                Some(BillStatus::InCommittee),
            ),
            ("Held at the desk.", Some(BillStatus::InCommittee)),
            ("Introduced in House", Some(BillStatus::Introduced)),
            (
                "Motion to reconsider laid on the table Agreed to without objection in the House.",
                Some(BillStatus::PassedHouse),
            ),
            ("Presented to President.", None),
            ("Vetoed by President.", None),
            ("Conference report filed.", None),
            ("Failed of passage in the House by Yea-Nay Vote.", None),
            ("Star Print ordered on the bill.", None),
            ("", None),
        ];
        for (text, expected) in cases {
            assert_eq!(normalize_status(text), expected, "{}", text);
            assert_eq!(normalize_status(text), normalize_status(text));
        }
    }

    #[test]
    fn passed_without_chamber_falls_through() {
        // "passed" alone does not decide; the committee rule claims it
        assert_eq!(
            normalize_status("Passed over; referred to committee"),
            Some(BillStatus::InCommittee)
        );
    }

    #[test]
    fn bill_number_round_trip() {
        for n in ["HR1234", "SJRES33", "S42", "hconres7", "HRES1"] {
            let (t, num) = parse_bill_number(n);
            assert_eq!(compose_bill_number(&t, &num), n.to_lowercase());
        }
        assert_eq!(
            parse_bill_number("SJRES33"),
            ("sjres".to_string(), "33".to_string())
        );
        assert_eq!(parse_bill_number("HR"), ("hr".to_string(), String::new()));
        assert_eq!(bill_key("hr", "1"), "HR1");
    }

    #[test]
    fn historical_range_is_inclusive() {
        assert!(!is_historical_bill(5));
        assert!(is_historical_bill(6));
        assert!(is_historical_bill(42));
        assert!(!is_historical_bill(43));
    }

    #[test]
    fn revisions_pick_latest_update() {
        let raw = json!({"bill": [
            {"congress": 10, "type": "HR", "number": "5", "title": "old", "updateDate": "2019-01-01T00:00:00Z"},
            {"congress": 10, "type": "HR", "number": "5", "title": "new", "updateDate": "2022-03-01T00:00:00Z"},
            {"congress": 10, "type": "HR", "number": "5", "title": "mid", "updateDate": "2020-06-01T00:00:00Z"}
        ]});
        let bill = normalize_bill(&raw).unwrap().unwrap();
        assert_eq!(bill.title.as_deref(), Some("new"));
        assert_eq!(bill.bill_number, "HR5");
        assert!(bill.is_historical());
    }

    #[test]
    fn empty_revision_list_is_skipped_not_failed() {
        assert_eq!(normalize_bill(&json!({"bill": []})).unwrap(), None);
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = normalize_bill(&json!({"congress": 118, "number": "7"})).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord { .. }));
    }

    #[test]
    fn list_item_normalizes() {
        let raw = json!({
            "congress": 118,
            "type": "HR",
            "number": "1234",
            "title": "A bill",
            "updateDate": "2024-01-02T10:00:00Z",
            "latestAction": {"actionDate": "2024-01-01", "text": "Referred to the Committee on Rules."},
            "url": "https://api.congress.gov/v3/bill/118/hr/1234?format=json"
        });
        let bill = normalize_bill(&raw).unwrap().unwrap();
        assert_eq!(bill.bill_type, "hr");
        assert_eq!(bill.bill_number, "HR1234");
        assert_eq!(bill.normalized_status, Some(BillStatus::InCommittee));
        assert_eq!(bill.latest_action_date.as_deref(), Some("2024-01-01"));
        assert_eq!(bill.sponsor_id, None);
    }

    #[test]
    fn detail_document_reads_sponsor_titles_and_policy_area() {
        let raw = json!({"bill": {
            "congress": "117",
            "type": "S",
            "number": 42,
            "sponsors": [{"bioguideId": "S000001"}],
            "policyArea": {"name": "Health"},
            "titles": {"item": [{"title": "Official"}, {"title": "Short"}]},
            "relatedBills": [{"type": "HR", "number": 9}]
        }});
        let bill = normalize_bill(&raw).unwrap().unwrap();
        assert_eq!(bill.congress, 117);
        assert_eq!(bill.bill_number, "S42");
        assert_eq!(bill.sponsor_id.as_deref(), Some("S000001"));
        assert_eq!(bill.policy_area.as_deref(), Some("Health"));
        assert_eq!(bill.official_title.as_deref(), Some("Official"));
        assert_eq!(bill.short_title.as_deref(), Some("Short"));
        assert_eq!(bill.related_bills, vec!["HR9".to_string()]);
    }

    #[test]
    fn text_versions_fill_and_order() {
        let doc = json!({"textVersions": [
            {"date": "2020-01-01", "type": "Introduced in House", "formats": [{"type": "PDF", "url": "a.pdf"}]},
            {"date": "2020-06-01", "type": "Public Law", "formats": [{"type": "Formatted Text", "url": "b.htm"}]},
            {"date": null, "type": "Engrossed in House", "formats": [{"type": "Formatted XML", "url": "c.xml"}]}
        ]});
        let versions = process_text_versions(parse_text_versions(&doc), Some("2020-01-01"));

        let order: Vec<&str> = versions.iter().map(|v| v.version_type.as_str()).collect();
        assert_eq!(
            order,
            vec!["Public Law", "Engrossed in House", "Introduced in House"]
        );
        assert_eq!(versions[1].date.as_deref(), Some("2020-01-01"));
        assert!(versions[1].is_initial_version);
        assert!(!versions[2].is_initial_version);
        assert_eq!(versions[0].formats[0].format_type, "HTML");
        assert_eq!(versions[1].formats[0].format_type, "XML");
        assert_eq!(versions[2].formats[0].format_type, "PDF");
    }

    #[test]
    fn importance_table() {
        assert_eq!(version_importance("Public Law"), 1);
        assert_eq!(version_importance("Enrolled Bill"), 2);
        assert_eq!(version_importance("Engrossed in Senate"), 3);
        assert_eq!(version_importance("Placed on Calendar House"), 4);
        assert_eq!(version_importance("Introduced in Senate"), 999);
        assert_eq!(format_display_name("Generated HTML"), "Generated HTML");
    }

    #[test]
    fn sub_resources_parse() {
        let actions = parse_actions(&json!({"actions": [
            {"actionDate": "2021-02-01", "text": "Introduced", "type": "IntroReferral"},
            {"text": "no date"}
        ]}));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type.as_deref(), Some("IntroReferral"));

        let cosponsors = parse_cosponsors(&json!({"cosponsors": [
            {"bioguideId": "A000001", "fullName": "Rep. A", "party": "D", "state": "CA", "sponsorshipDate": "2021-02-02"},
            {"fullName": "no id"}
        ]}));
        assert_eq!(cosponsors.len(), 1);

        let subjects = parse_subjects(&json!({"subjects": {"legislativeSubjects": [
            {"name": "Taxation"}, {"name": "Income tax credits"}
        ]}}));
        assert_eq!(subjects, vec!["Taxation", "Income tax credits"]);

        let summaries = parse_summaries(&json!({"summaries": [
            {"versionCode": "00", "actionDate": "2021-02-01", "actionDesc": "Introduced in House", "text": "<p>Summary</p>"}
        ]}));
        assert_eq!(summaries[0].version_code.as_deref(), Some("00"));
    }

    #[test]
    fn tag_names_normalize() {
        assert_eq!(
            normalize_tag_name("Armed Forces & National Security"),
            "armed_forces_and_national_security"
        );
        assert_eq!(
            normalize_tag_name("Science, Technology, Communications"),
            "science__technology__communications"
        );
        assert_eq!(normalize_tag_name("Self-Governance"), "self_governance");
    }
}
