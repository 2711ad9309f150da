//! `encounters` and `encounter_codes` tables.

use maraude_core::{encounter::Encounter, taxonomy::TaxonomyKind};
use rusqlite::{Connection, OptionalExtension as _, Row, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    decode_dt, decode_enum, decode_opt_uuid, decode_uuid, encode_dt, encode_enum, encode_uuid,
    join_member, join_point, split_member, split_point,
  },
};

const COLUMNS: &str = "id, session_id, beneficiary_id, encounter_type, notes,
  recorded_by_kind, recorded_by_id, lat, lng, created_at, updated_at";

struct RawEncounter {
  id:               String,
  session_id:       String,
  beneficiary_id:   Option<String>,
  encounter_type:   String,
  notes:            Option<String>,
  recorded_by_kind: Option<String>,
  recorded_by_id:   Option<String>,
  lat:              Option<f64>,
  lng:              Option<f64>,
  created_at:       String,
  updated_at:       String,
}

impl RawEncounter {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      session_id:       row.get(1)?,
      beneficiary_id:   row.get(2)?,
      encounter_type:   row.get(3)?,
      notes:            row.get(4)?,
      recorded_by_kind: row.get(5)?,
      recorded_by_id:   row.get(6)?,
      lat:              row.get(7)?,
      lng:              row.get(8)?,
      created_at:       row.get(9)?,
      updated_at:       row.get(10)?,
    })
  }

  /// Decode the row and attach its taxonomy codes.
  fn into_encounter(self, conn: &Connection) -> Result<Encounter> {
    let id = decode_uuid(&self.id)?;
    Ok(Encounter {
      id,
      session_id:     decode_uuid(&self.session_id)?,
      beneficiary_id: decode_opt_uuid(self.beneficiary_id)?,
      encounter_type: decode_enum("encounter_type", &self.encounter_type)?,
      notes:          self.notes,
      need_codes:     codes(conn, id, TaxonomyKind::Need)?,
      action_codes:   codes(conn, id, TaxonomyKind::Action)?,
      recorded_by:    join_member(self.recorded_by_kind, self.recorded_by_id)?,
      location:       join_point(self.lat, self.lng),
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

fn codes(conn: &Connection, encounter_id: Uuid, kind: TaxonomyKind) -> Result<Vec<String>> {
  let mut stmt = conn.prepare(
    "SELECT code FROM encounter_codes
     WHERE encounter_id = ?1 AND kind = ?2 ORDER BY position",
  )?;
  let codes = stmt
    .query_map(params![encode_uuid(encounter_id), encode_enum(kind)], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(codes)
}

fn write_codes(conn: &Connection, e: &Encounter) -> Result<()> {
  let id = encode_uuid(e.id);
  conn.execute("DELETE FROM encounter_codes WHERE encounter_id = ?1", params![id])?;
  let mut stmt = conn.prepare(
    "INSERT INTO encounter_codes (encounter_id, kind, code, position) VALUES (?1, ?2, ?3, ?4)",
  )?;
  for (kind, list) in [(TaxonomyKind::Need, &e.need_codes), (TaxonomyKind::Action, &e.action_codes)] {
    for (position, code) in list.iter().enumerate() {
      stmt.execute(params![id, encode_enum(kind), code, position as i64])?;
    }
  }
  Ok(())
}

fn query(conn: &Connection, filter: &str, arg: String) -> Result<Vec<Encounter>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {COLUMNS} FROM encounters WHERE {filter} ORDER BY created_at, id"
  ))?;
  let raws = stmt
    .query_map(params![arg], RawEncounter::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(|r| r.into_encounter(conn)).collect()
}

pub fn load(conn: &Connection, id: Uuid) -> Result<Option<Encounter>> {
  conn
    .query_row(
      &format!("SELECT {COLUMNS} FROM encounters WHERE id = ?1"),
      params![encode_uuid(id)],
      RawEncounter::from_row,
    )
    .optional()?
    .map(|r| r.into_encounter(conn))
    .transpose()
}

pub fn insert(conn: &Connection, e: &Encounter) -> Result<()> {
  let (lat, lng) = split_point(e.location);
  let (recorder_kind, recorder_id) = split_member(e.recorded_by);
  conn.execute(
    &format!("INSERT INTO encounters ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
    params![
      encode_uuid(e.id),
      encode_uuid(e.session_id),
      e.beneficiary_id.map(encode_uuid),
      encode_enum(e.encounter_type),
      e.notes,
      recorder_kind,
      recorder_id,
      lat,
      lng,
      encode_dt(e.created_at),
      encode_dt(e.updated_at),
    ],
  )?;
  write_codes(conn, e)
}

/// Persist a corrective edit: mutable columns and the full code sets.
pub fn update(conn: &Connection, e: &Encounter) -> Result<()> {
  conn.execute(
    "UPDATE encounters SET encounter_type = ?2, notes = ?3, updated_at = ?4 WHERE id = ?1",
    params![encode_uuid(e.id), encode_enum(e.encounter_type), e.notes, encode_dt(e.updated_at)],
  )?;
  write_codes(conn, e)
}

pub fn for_session(conn: &Connection, session_id: Uuid) -> Result<Vec<Encounter>> {
  query(conn, "session_id = ?1", encode_uuid(session_id))
}

pub fn for_beneficiary(conn: &Connection, beneficiary_id: Uuid) -> Result<Vec<Encounter>> {
  query(conn, "beneficiary_id = ?1", encode_uuid(beneficiary_id))
}

pub fn ids_for_session(conn: &Connection, session_id: Uuid) -> Result<Vec<Uuid>> {
  let mut stmt =
    conn.prepare("SELECT id FROM encounters WHERE session_id = ?1 ORDER BY created_at, id")?;
  let ids = stmt
    .query_map(params![encode_uuid(session_id)], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  ids.iter().map(|s| decode_uuid(s)).collect()
}
