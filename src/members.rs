//! Member normalization and the small lookup tables that go with it.

use chrono::{Datelike, Utc};
use serde_json::Value;

use crate::error::SyncResult;
use crate::models::{CanonicalMember, Contact, Leadership, PartyAffiliation, Term};
use crate::payload;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberName {
    pub last: String,
    pub first: String,
    pub middle: String,
}

/// Split `"Last, First Middle"` on the first comma.
pub fn parse_member_name(name: &str) -> MemberName {
    match name.split_once(',') {
        Some((last, rest)) => {
            let rest = rest.trim();
            let (first, middle) = rest.split_once(' ').unwrap_or((rest, ""));
            MemberName {
                last: last.trim().to_string(),
                first: first.trim().to_string(),
                middle: middle.trim().to_string(),
            }
        }
        None => MemberName {
            last: name.trim().to_string(),
            ..Default::default()
        },
    }
}

pub fn format_full_name(first: &str, middle: &str, last: &str) -> String {
    [first, middle, last]
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

const PARTIES: &[(&str, &str, &str)] = &[
    ("republican", "Republican", "R"),
    ("r", "Republican", "R"),
    ("gop", "Republican", "R"),
    ("democrat", "Democrat", "D"),
    ("democratic", "Democrat", "D"),
    ("d", "Democrat", "D"),
    ("independent", "Independent", "I"),
    ("i", "Independent", "I"),
    ("libertarian", "Libertarian", "L"),
    ("l", "Libertarian", "L"),
    ("green", "Green", "G"),
    ("g", "Green", "G"),
];

/// Standard `(name, code)` for a party label.
pub fn parse_party(party: &str) -> (String, String) {
    let wanted = party.trim().to_lowercase();
    if wanted.is_empty() {
        return (String::new(), String::new());
    }

    let hit = PARTIES
        .iter()
        .find(|(key, _, _)| *key == wanted)
        // single-letter keys would match nearly anything as substrings
        .or_else(|| {
            PARTIES
                .iter()
                .find(|(key, _, _)| key.len() > 1 && wanted.contains(key))
        });

    match hit {
        Some((_, name, code)) => (name.to_string(), code.to_string()),
        None => {
            let code = party
                .trim()
                .chars()
                .next()
                .map(|c| c.to_uppercase().to_string())
                .unwrap_or_default();
            (party.trim().to_string(), code)
        }
    }
}

const STATES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
    ("district of columbia", "DC"),
    ("american samoa", "AS"),
    ("guam", "GU"),
    ("northern mariana islands", "MP"),
    ("puerto rico", "PR"),
    ("virgin islands", "VI"),
];

/// Two-letter code for a state name or code; unknown names pass through.
pub fn normalize_state_code(state: &str) -> String {
    let trimmed = state.trim();
    if trimmed.len() == 2 {
        return trimmed.to_uppercase();
    }
    let wanted = trimmed.to_lowercase();
    STATES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Congress seated in a term's start year.
pub fn congress_for_year(year: i64) -> i64 {
    (year - 1789) / 2 + 1
}

const LEADERSHIP_TITLES: &[(&str, &str)] = &[
    ("speaker", "Speaker of the House"),
    ("majority leader", "Majority Leader"),
    ("minority leader", "Minority Leader"),
    ("majority whip", "Majority Whip"),
    ("minority whip", "Minority Whip"),
    ("president pro tempore", "President Pro Tempore"),
    ("conference chair", "Conference Chair"),
    ("policy committee chair", "Policy Committee Chair"),
];

/// Canonical title for an upstream leadership type; unknown types pass
/// through trimmed.
pub fn leadership_title(position: &str) -> String {
    let wanted = position.trim().to_lowercase();
    LEADERSHIP_TITLES
        .iter()
        .find(|(key, _)| *key == wanted)
        .or_else(|| LEADERSHIP_TITLES.iter().find(|(key, _)| wanted.contains(key)))
        .map(|(_, title)| title.to_string())
        .unwrap_or_else(|| position.trim().to_string())
}

/// `"House of Representatives"` → `"House"`.
pub fn normalize_chamber(chamber: &str) -> String {
    let lower = chamber.to_lowercase();
    if lower.contains("house") {
        "House".to_string()
    } else if lower.contains("senate") {
        "Senate".to_string()
    } else {
        chamber.trim().to_string()
    }
}

pub fn normalize_member(raw: &Value) -> SyncResult<Option<CanonicalMember>> {
    Ok(normalize_member_at(raw, Utc::now().year() as i64))
}

/// Normalize a member list item or detail document (`{"member": {...}}`).
/// Records without a bioguide id yield `None`.
pub fn normalize_member_at(raw: &Value, current_year: i64) -> Option<CanonicalMember> {
    let member = raw.get("member").filter(|m| m.is_object()).unwrap_or(raw);
    let bioguide_id = payload::string(member, "bioguideId")?;

    let parsed = payload::string(member, "name")
        .map(|n| parse_member_name(&n))
        .unwrap_or_default();
    let pick = |key: &str, fallback: &str| {
        payload::string(member, key).or_else(|| non_empty(fallback))
    };
    let first_name = pick("firstName", &parsed.first);
    let middle_name = pick("middleName", &parsed.middle);
    let last_name = pick("lastName", &parsed.last);
    let direct_order_name = payload::string(member, "directOrderName");
    let full_name = direct_order_name.clone().or_else(|| {
        non_empty(&format_full_name(
            first_name.as_deref().unwrap_or(""),
            middle_name.as_deref().unwrap_or(""),
            last_name.as_deref().unwrap_or(""),
        ))
    });

    let terms = parse_terms(member);
    let latest_term = latest_term(&terms);

    let party_history = parse_party_history(member);
    let party_label = payload::string(member, "partyName").or_else(|| {
        party_history
            .iter()
            .max_by_key(|p| p.start_year)
            .map(|p| p.party_name.clone())
    });
    let (party_name, party_code) = match party_label {
        Some(label) => {
            let (name, code) = parse_party(&label);
            (non_empty(&name), non_empty(&code))
        }
        None => (None, None),
    };

    let current_member = match latest_term {
        Some(term) => term.end_year.map_or(true, |end| end >= current_year),
        None => member
            .get("currentMember")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    let state = payload::string(member, "state")
        .or_else(|| latest_term.and_then(|t| t.state.clone()))
        .map(|s| normalize_state_code(&s));
    let district = payload::int(member, "district").or_else(|| latest_term.and_then(|t| t.district));
    let chamber = latest_term.map(|t| t.chamber.clone());

    Some(CanonicalMember {
        bioguide_id,
        first_name,
        middle_name,
        last_name,
        full_name,
        direct_order_name,
        honorific_name: payload::string(member, "honorificName"),
        inverted_order_name: payload::string(member, "invertedOrderName"),
        state,
        district,
        party_name,
        party_code,
        chamber,
        photo_url: payload::path_string(member, &["depiction", "imageUrl"]),
        current_member,
        birth_year: payload::int(member, "birthYear"),
        death_year: payload::int(member, "deathYear"),
        contact: parse_contact(member),
        leadership: parse_leadership(member),
        terms,
        party_history,
        update_date: payload::string(member, "updateDate"),
    })
}

/// Most recent term by start year; the later entry wins ties.
fn latest_term(terms: &[Term]) -> Option<&Term> {
    terms.iter().max_by_key(|t| t.start_year.unwrap_or(i64::MIN))
}

fn parse_terms(member: &Value) -> Vec<Term> {
    payload::items(member.get("terms"))
        .into_iter()
        .filter_map(|t| {
            let chamber = normalize_chamber(&payload::string(t, "chamber")?);
            let start_year = payload::int(t, "startYear");
            Some(Term {
                congress: payload::int(t, "congress").or_else(|| start_year.map(congress_for_year)),
                chamber,
                party: payload::string(t, "partyName"),
                state: payload::string(t, "stateCode").or_else(|| payload::string(t, "stateName")),
                district: payload::int(t, "district"),
                start_year,
                end_year: payload::int(t, "endYear"),
            })
        })
        .collect()
}

fn parse_leadership(member: &Value) -> Vec<Leadership> {
    payload::items(member.get("leadership"))
        .into_iter()
        .filter_map(|l| {
            Some(Leadership {
                congress: payload::int(l, "congress")?,
                leadership_type: leadership_title(&payload::string(l, "type")?),
            })
        })
        .collect()
}

fn parse_party_history(member: &Value) -> Vec<PartyAffiliation> {
    payload::items(member.get("partyHistory"))
        .into_iter()
        .filter_map(|p| {
            Some(PartyAffiliation {
                party_name: payload::string(p, "partyName")?,
                party_code: payload::string(p, "partyAbbreviation")
                    .or_else(|| payload::string(p, "partyCode")),
                start_year: payload::int(p, "startYear")?,
            })
        })
        .collect()
}

fn parse_contact(member: &Value) -> Contact {
    let info = member
        .get("addressInformation")
        .or_else(|| member.get("contactInformation"));
    let field = |keys: &[&str]| {
        info.and_then(|i| keys.iter().find_map(|k| payload::string(i, k)))
    };
    Contact {
        office_address: field(&["officeAddress", "address"]),
        phone: field(&["phoneNumber", "phone"]),
        url: payload::string(member, "officialWebsiteUrl").or_else(|| field(&["url"])),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
