//! Null-safe projections of upstream records.
//!
//! Upstream payloads vary in envelope shape and field naming. Every
//! normalizer here is total: a missing, null, empty or mistyped field falls
//! back to a defined default, never to an absent value.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Cap on the number of users kept in the top-users ranking.
pub const TOP_USERS_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: u64,
    pub active_users: u64,
    pub new_users: u64,
    pub retention_rate: f64,
    pub average_rating: f64,
}

impl UserStats {
    pub fn from_body(body: &Value) -> Self {
        let overview = overview(body, &["stats", "data"]);
        Self {
            total_users: count(overview, &["totalUsers"]),
            active_users: count(overview, &["activeUsers"]),
            new_users: count(overview, &["newUsers"]),
            retention_rate: number(overview, &["retentionRate"]).unwrap_or(0.0),
            average_rating: number(overview, &["averageRating"]).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GigStats {
    pub total_gigs: u64,
    pub active_gigs: u64,
    pub completed_gigs: u64,
    pub disputed_gigs: u64,
    pub total_value: String,
    pub average_rating: f64,
}

impl GigStats {
    pub fn from_body(body: &Value) -> Self {
        let overview = overview(body, &["data", "stats"]);
        Self {
            total_gigs: count(overview, &["totalGigs"]),
            active_gigs: count(overview, &["activeGigs"]),
            completed_gigs: count(overview, &["completedGigs"]),
            disputed_gigs: count(overview, &["disputedGigs"]),
            total_value: text(overview, &["totalValue"]).unwrap_or_else(zero_text),
            average_rating: number(overview, &["averageRating"]).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBounty {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub organization: String,
    pub value: String,
    /// Upstream status verbatim (`Open`, `MINED`, `Winner`, ...).
    pub status: String,
    pub due_date: String,
    pub created_at: String,
}

impl NormalizedBounty {
    pub fn from_raw(raw: &Value, now: DateTime<Utc>) -> Self {
        Self {
            id: text(raw, &["id"]).unwrap_or_default(),
            title: text(raw, &["title"]).unwrap_or_default(),
            description: text(raw, &["description"]).unwrap_or_default(),
            category: name_of(raw.get("category")),
            organization: name_of(raw.get("organization")),
            value: text(raw, &["value", "price"]).unwrap_or_else(zero_text),
            status: text(raw, &["status"]).unwrap_or_else(|| "active".to_string()),
            due_date: text(raw, &["dueDate", "deadline"]).unwrap_or_else(|| iso(now)),
            created_at: text(raw, &["createdAt", "created_at"]).unwrap_or_else(|| iso(now)),
        }
    }

    pub fn list_from_body(body: &Value, now: DateTime<Utc>) -> Vec<Self> {
        listing(body).iter().map(|raw| Self::from_raw(raw, now)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedCategory {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bounty_count: u64,
}

impl NormalizedCategory {
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            id: text(raw, &["id"]).unwrap_or_default(),
            name: text(raw, &["name"]).unwrap_or_default(),
            description: text(raw, &["description"]).unwrap_or_default(),
            bounty_count: count(raw, &["bountyCount", "count"]),
        }
    }

    pub fn list_from_body(body: &Value) -> Vec<Self> {
        listing(body).iter().map(Self::from_raw).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedOrganization {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bounty_count: u64,
    pub total_value: String,
}

impl NormalizedOrganization {
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            id: text(raw, &["id"]).unwrap_or_default(),
            name: text(raw, &["name"]).unwrap_or_default(),
            description: text(raw, &["description"]).unwrap_or_default(),
            bounty_count: count(raw, &["bountyCount", "count"]),
            total_value: text(raw, &["totalValue", "total_value"]).unwrap_or_else(zero_text),
        }
    }

    pub fn list_from_body(body: &Value) -> Vec<Self> {
        listing(body).iter().map(Self::from_raw).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedUser {
    pub id: String,
    pub username: String,
    pub stx_address: String,
    pub category: String,
    pub contribution_count: u64,
    pub rating: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl NormalizedUser {
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            id: text(raw, &["id"]).unwrap_or_default(),
            username: text(raw, &["username", "name"]).unwrap_or_default(),
            stx_address: text(raw, &["stxAddress", "stx_address"]).unwrap_or_default(),
            category: name_of(raw.get("category")),
            contribution_count: count(raw, &["contributionCount", "contribution_count"]),
            rating: number(raw, &["rating"]).unwrap_or(0.0),
            avatar: text(raw, &["avatar"]),
        }
    }

    /// Users ranked by contribution count, highest first, capped at [`TOP_USERS_LIMIT`].
    pub fn top_from_body(body: &Value) -> Vec<Self> {
        let mut users: Vec<Self> = listing(body).iter().map(Self::from_raw).collect();
        users.sort_by(|a, b| b.contribution_count.cmp(&a.contribution_count));
        users.truncate(TOP_USERS_LIMIT);
        users
    }
}

/// Items of a listing body: the `data` array, a bare array, or nothing.
fn listing(body: &Value) -> &[Value] {
    body.get("data")
        .and_then(Value::as_array)
        .or_else(|| body.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// First `<key>.overview` object found, then a top-level `overview`, then the body itself.
fn overview<'a>(body: &'a Value, envelopes: &[&str]) -> &'a Value {
    envelopes
        .iter()
        .filter_map(|key| body.get(*key))
        .chain(std::iter::once(body))
        .filter_map(|v| v.get("overview"))
        .find(|v| v.is_object())
        .unwrap_or(body)
}

/// First non-empty textual value among `keys`; numbers are rendered as text.
fn text(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| raw.get(*k)).find_map(as_text)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// First non-zero finite number among `keys`; numeric strings are accepted.
fn number(raw: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| raw.get(*k)).find_map(as_number)
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|x| x.is_finite() && *x != 0.0)
}

fn count(raw: &Value, keys: &[&str]) -> u64 {
    number(raw, keys)
        .filter(|x| *x > 0.0)
        .map(|x| x.round() as u64)
        .unwrap_or(0)
}

/// A related entity given either as `{ "name": ... }` or as a bare name.
fn name_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::Object(map)) => map.get("name").and_then(as_text).unwrap_or_default(),
        Some(other) => as_text(other).unwrap_or_default(),
        None => String::new(),
    }
}

fn zero_text() -> String {
    "0".to_string()
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
