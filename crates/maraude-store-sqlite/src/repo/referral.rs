//! `referrals` and `structures` tables.
//!
//! Referrals are returned with their *stored* status; resolving the
//! effective status is the caller's job.

use chrono::{DateTime, Utc};
use maraude_core::{
  geo::BoundingBox,
  referral::{Referral, ReferralStatus, ReferralStructure, StructureRef, StructureType},
  store::{Page, ReferralQuery},
};
use rusqlite::{Connection, OptionalExtension as _, Row, params};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    decode_dt, decode_enum, decode_opt_dt, decode_opt_uuid, decode_uuid, encode_dt, encode_enum,
    encode_opt_dt, encode_uuid, join_point, split_point,
  },
};

// ─── Structures ──────────────────────────────────────────────────────────────

const STRUCTURE_COLUMNS: &str = "id, name, structure_type, address, phone, email, lat, lng";

struct RawStructure {
  id:             String,
  name:           String,
  structure_type: String,
  address:        Option<String>,
  phone:          Option<String>,
  email:          Option<String>,
  lat:            Option<f64>,
  lng:            Option<f64>,
}

impl RawStructure {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      name:           row.get(1)?,
      structure_type: row.get(2)?,
      address:        row.get(3)?,
      phone:          row.get(4)?,
      email:          row.get(5)?,
      lat:            row.get(6)?,
      lng:            row.get(7)?,
    })
  }

  fn into_structure(self) -> Result<ReferralStructure> {
    Ok(ReferralStructure {
      id:             decode_uuid(&self.id)?,
      name:           self.name,
      structure_type: decode_enum("structure_type", &self.structure_type)?,
      address:        self.address,
      phone:          self.phone,
      email:          self.email,
      location:       join_point(self.lat, self.lng),
    })
  }
}

pub fn insert_structure(conn: &Connection, s: &ReferralStructure) -> Result<()> {
  let (lat, lng) = split_point(s.location);
  conn.execute(
    &format!("INSERT INTO structures ({STRUCTURE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
    params![
      encode_uuid(s.id),
      s.name,
      encode_enum(s.structure_type),
      s.address,
      s.phone,
      s.email,
      lat,
      lng,
    ],
  )?;
  Ok(())
}

pub fn structure_exists(conn: &Connection, id: Uuid) -> Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM structures WHERE id = ?1", params![encode_uuid(id)], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

pub fn list_structures(
  conn: &Connection,
  structure_type: Option<StructureType>,
) -> Result<Vec<ReferralStructure>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {STRUCTURE_COLUMNS} FROM structures
     WHERE ?1 IS NULL OR structure_type = ?1 ORDER BY name"
  ))?;
  let raws = stmt
    .query_map(params![structure_type.map(encode_enum)], RawStructure::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawStructure::into_structure).collect()
}

pub fn structures_within(conn: &Connection, bbox: &BoundingBox) -> Result<Vec<ReferralStructure>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {STRUCTURE_COLUMNS} FROM structures
     WHERE lat IS NOT NULL AND lng IS NOT NULL AND lat BETWEEN ?1 AND ?2"
  ))?;
  let raws = stmt
    .query_map(params![bbox.min_lat, bbox.max_lat], RawStructure::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let mut found = raws
    .into_iter()
    .map(RawStructure::into_structure)
    .collect::<Result<Vec<_>>>()?;
  found.retain(|s| s.location.is_some_and(|p| bbox.contains(&p)));
  Ok(found)
}

// ─── Referrals ───────────────────────────────────────────────────────────────

const COLUMNS: &str = "id, beneficiary_id, structure_id, structure_name, encounter_id,
  reason, appointment_date, status, follow_up_notes, follow_up_date, created_at,
  updated_at";

struct RawReferral {
  id:               String,
  beneficiary_id:   String,
  structure_id:     Option<String>,
  structure_name:   Option<String>,
  encounter_id:     Option<String>,
  reason:           Option<String>,
  appointment_date: Option<String>,
  status:           String,
  follow_up_notes:  Option<String>,
  follow_up_date:   Option<String>,
  created_at:       String,
  updated_at:       String,
}

impl RawReferral {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      beneficiary_id:   row.get(1)?,
      structure_id:     row.get(2)?,
      structure_name:   row.get(3)?,
      encounter_id:     row.get(4)?,
      reason:           row.get(5)?,
      appointment_date: row.get(6)?,
      status:           row.get(7)?,
      follow_up_notes:  row.get(8)?,
      follow_up_date:   row.get(9)?,
      created_at:       row.get(10)?,
      updated_at:       row.get(11)?,
    })
  }

  fn into_referral(self) -> Result<Referral> {
    let structure = match (self.structure_id, self.structure_name) {
      (Some(id), _) => StructureRef::Listed(decode_uuid(&id)?),
      (None, Some(name)) => StructureRef::Unlisted(name),
      (None, None) => {
        return Err(Error::Decode { column: "structure_id", value: self.id });
      }
    };
    Ok(Referral {
      id: decode_uuid(&self.id)?,
      beneficiary_id: decode_uuid(&self.beneficiary_id)?,
      structure,
      encounter_id: decode_opt_uuid(self.encounter_id)?,
      reason: self.reason,
      appointment_date: decode_opt_dt(self.appointment_date)?,
      status: decode_enum("status", &self.status)?,
      follow_up_notes: self.follow_up_notes,
      follow_up_date: decode_opt_dt(self.follow_up_date)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

fn query(conn: &Connection, sql_tail: &str, arg: Option<String>) -> Result<Vec<Referral>> {
  let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM referrals {sql_tail}"))?;
  let raws = stmt
    .query_map(params![arg], RawReferral::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawReferral::into_referral).collect()
}

pub fn load(conn: &Connection, id: Uuid) -> Result<Option<Referral>> {
  Ok(query(conn, "WHERE id = ?1", Some(encode_uuid(id)))?.into_iter().next())
}

/// Insert a referral, or overwrite the mutable columns of an existing one.
pub fn save(conn: &Connection, r: &Referral) -> Result<()> {
  let (structure_id, structure_name) = match &r.structure {
    StructureRef::Listed(id) => (Some(encode_uuid(*id)), None),
    StructureRef::Unlisted(name) => (None, Some(name.clone())),
  };
  conn.execute(
    &format!(
      "INSERT INTO referrals ({COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
       ON CONFLICT(id) DO UPDATE SET
         status = excluded.status,
         follow_up_notes = excluded.follow_up_notes,
         follow_up_date = excluded.follow_up_date,
         updated_at = excluded.updated_at"
    ),
    params![
      encode_uuid(r.id),
      encode_uuid(r.beneficiary_id),
      structure_id,
      structure_name,
      r.encounter_id.map(encode_uuid),
      r.reason,
      encode_opt_dt(r.appointment_date),
      encode_enum(r.status),
      r.follow_up_notes,
      encode_opt_dt(r.follow_up_date),
      encode_dt(r.created_at),
      encode_dt(r.updated_at),
    ],
  )?;
  Ok(())
}

/// All referrals, or those of one beneficiary, newest first.
pub fn list(conn: &Connection, beneficiary_id: Option<Uuid>) -> Result<Vec<Referral>> {
  query(
    conn,
    "WHERE ?1 IS NULL OR beneficiary_id = ?1 ORDER BY created_at DESC, id",
    beneficiary_id.map(encode_uuid),
  )
}

/// Referrals whose follow-up date is due by `as_of`, earliest first.
/// Referrals whose *effective* status as of `now` matches `query.status`.
///
/// An open referral (`PROPOSED`/`ACCEPTED`) with a past appointment counts
/// as `EXPIRED` here, mirroring `effective_status`.
pub fn page(conn: &Connection, query: &ReferralQuery, now: DateTime<Utc>) -> Result<Page<Referral>> {
  let page = query.page.clamped();
  let beneficiary = query.beneficiary_id.map(encode_uuid);
  let status = query.status.map(encode_enum);
  let now = encode_dt(now);
  let proposed = encode_enum(ReferralStatus::Proposed);
  let accepted = encode_enum(ReferralStatus::Accepted);
  let expired = encode_enum(ReferralStatus::Expired);
  let filter = "(?1 IS NULL OR beneficiary_id = ?1)
    AND (?2 IS NULL
      OR (?2 = ?6 AND (status = ?6 OR (status IN (?4, ?5) AND appointment_date < ?3)))
      OR (?2 <> ?6 AND status = ?2
        AND (status NOT IN (?4, ?5) OR appointment_date IS NULL OR appointment_date >= ?3)))";

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM referrals WHERE {filter}"),
    params![beneficiary, status, now, proposed, accepted, expired],
    |row| row.get(0),
  )?;

  let mut stmt = conn.prepare(&format!(
    "SELECT {COLUMNS} FROM referrals WHERE {filter}
     ORDER BY created_at DESC, id LIMIT ?7 OFFSET ?8"
  ))?;
  let raws = stmt
    .query_map(
      params![
        beneficiary,
        status,
        now,
        proposed,
        accepted,
        expired,
        i64::from(page.limit),
        page.offset() as i64
      ],
      RawReferral::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Page {
    items: raws.into_iter().map(RawReferral::into_referral).collect::<Result<_>>()?,
    total: total as u64,
    page:  page.page,
    limit: page.limit,
  })
}

pub fn follow_up_due(conn: &Connection, as_of: DateTime<Utc>) -> Result<Vec<Referral>> {
  query(
    conn,
    "WHERE follow_up_date IS NOT NULL AND follow_up_date <= ?1 ORDER BY follow_up_date, id",
    Some(encode_dt(as_of)),
  )
}
