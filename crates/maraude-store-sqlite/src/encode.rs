//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order in SQL matches chronological order. Closed enums are
//! stored by their strum names; lists and nested structures as compact JSON.
//! UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use maraude_core::{geo::GeoPoint, member::Member};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn encode_opt_dt(dt: Option<DateTime<Utc>>) -> Option<String> { dt.map(encode_dt) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Closed enums ─────────────────────────────────────────────────────────────

pub fn encode_enum(e: impl AsRef<str>) -> String { e.as_ref().to_owned() }

pub fn decode_enum<E: FromStr>(column: &'static str, s: &str) -> Result<E> {
  s.parse().map_err(|_| Error::Decode { column, value: s.to_owned() })
}

// ─── JSON columns ─────────────────────────────────────────────────────────────

pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: DeserializeOwned>(s: &str) -> Result<T> { Ok(serde_json::from_str(s)?) }

pub fn decode_opt_json<T: DeserializeOwned>(s: Option<String>) -> Result<Option<T>> {
  s.as_deref().map(decode_json).transpose()
}

// ─── Geo ──────────────────────────────────────────────────────────────────────

pub fn split_point(p: Option<GeoPoint>) -> (Option<f64>, Option<f64>) {
  (p.map(|p| p.lat), p.map(|p| p.lng))
}

pub fn join_point(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
  Some(GeoPoint { lat: lat?, lng: lng? })
}

// ─── Member ───────────────────────────────────────────────────────────────────

pub fn split_member(m: Option<Member>) -> (Option<&'static str>, Option<String>) {
  (m.map(|m| m.kind_str()), m.map(|m| encode_uuid(m.id())))
}

pub fn join_member(kind: Option<String>, id: Option<String>) -> Result<Option<Member>> {
  match (kind, id) {
    (Some(kind), Some(id)) => decode_member(&kind, &id).map(Some),
    _ => Ok(None),
  }
}

pub fn decode_member(kind: &str, id: &str) -> Result<Member> {
  Member::from_parts(kind, decode_uuid(id)?).ok_or_else(|| Error::Decode {
    column: "member_kind",
    value:  kind.to_owned(),
  })
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use maraude_core::session::SessionStatus;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let later = base + Duration::microseconds(1500);
    assert!(encode_dt(base) < encode_dt(later));
    assert_eq!(encode_dt(base).len(), encode_dt(later).len());
    assert_eq!(decode_dt(&encode_dt(later)).unwrap(), later);
  }

  #[test]
  fn enums_use_screaming_names() {
    assert_eq!(encode_enum(SessionStatus::InProgress), "IN_PROGRESS");
    let s: SessionStatus = decode_enum("status", "CANCELED").unwrap();
    assert_eq!(s, SessionStatus::Canceled);
    assert!(decode_enum::<SessionStatus>("status", "DONE").is_err());
  }

  #[test]
  fn half_point_is_none() {
    assert!(join_point(Some(1.0), None).is_none());
    assert_eq!(join_point(Some(1.0), Some(2.0)), Some(GeoPoint { lat: 1.0, lng: 2.0 }));
  }
}
