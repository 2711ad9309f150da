//! `sessions` and `session_participants` tables.

use maraude_core::{
  member::Member,
  session::{OutreachSession, Participant},
  store::{Page, SessionQuery},
};
use rusqlite::{Connection, OptionalExtension as _, Row, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    decode_dt, decode_enum, decode_member, decode_opt_dt, decode_opt_json, decode_opt_uuid,
    decode_uuid, encode_dt, encode_enum, encode_json, encode_opt_dt, encode_uuid, join_member,
    split_member,
  },
  repo::encounter,
};

const COLUMNS: &str = "id, title, description, zone_id, coordinator_kind,
  coordinator_id, planned_start_at, started_at, ended_at, status, version,
  report_json, created_at";

struct RawSession {
  id:               String,
  title:            Option<String>,
  description:      Option<String>,
  zone_id:          Option<String>,
  coordinator_kind: Option<String>,
  coordinator_id:   Option<String>,
  planned_start_at: String,
  started_at:       Option<String>,
  ended_at:         Option<String>,
  status:           String,
  version:          i64,
  report_json:      Option<String>,
  created_at:       String,
}

impl RawSession {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      title:            row.get(1)?,
      description:      row.get(2)?,
      zone_id:          row.get(3)?,
      coordinator_kind: row.get(4)?,
      coordinator_id:   row.get(5)?,
      planned_start_at: row.get(6)?,
      started_at:       row.get(7)?,
      ended_at:         row.get(8)?,
      status:           row.get(9)?,
      version:          row.get(10)?,
      report_json:      row.get(11)?,
      created_at:       row.get(12)?,
    })
  }

  /// Decode the header row and attach the roster and encounter ids.
  fn into_session(self, conn: &Connection) -> Result<OutreachSession> {
    let id = decode_uuid(&self.id)?;
    Ok(OutreachSession {
      id,
      title:            self.title,
      description:      self.description,
      zone_id:          decode_opt_uuid(self.zone_id)?,
      coordinator:      join_member(self.coordinator_kind, self.coordinator_id)?,
      planned_start_at: decode_dt(&self.planned_start_at)?,
      started_at:       decode_opt_dt(self.started_at)?,
      ended_at:         decode_opt_dt(self.ended_at)?,
      status:           decode_enum("status", &self.status)?,
      version:          self.version as u64,
      participants:     participants(conn, id)?,
      encounter_ids:    encounter::ids_for_session(conn, id)?,
      report:           decode_opt_json(self.report_json)?,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

struct RawParticipant {
  member_kind:       String,
  member_id:         String,
  role:              String,
  joined_at:         String,
  availability_json: Option<String>,
}

impl RawParticipant {
  fn into_participant(self) -> Result<Participant> {
    Ok(Participant {
      member:       decode_member(&self.member_kind, &self.member_id)?,
      role:         decode_enum("role", &self.role)?,
      joined_at:    decode_dt(&self.joined_at)?,
      availability: decode_opt_json(self.availability_json)?,
    })
  }
}

fn participants(conn: &Connection, session_id: Uuid) -> Result<Vec<Participant>> {
  let mut stmt = conn.prepare(
    "SELECT member_kind, member_id, role, joined_at, availability_json
     FROM session_participants WHERE session_id = ?1
     ORDER BY joined_at, member_id",
  )?;
  let raws = stmt
    .query_map(params![encode_uuid(session_id)], |row| {
      Ok(RawParticipant {
        member_kind:       row.get(0)?,
        member_id:         row.get(1)?,
        role:              row.get(2)?,
        joined_at:         row.get(3)?,
        availability_json: row.get(4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawParticipant::into_participant).collect()
}

pub fn load(conn: &Connection, id: Uuid) -> Result<Option<OutreachSession>> {
  conn
    .query_row(
      &format!("SELECT {COLUMNS} FROM sessions WHERE id = ?1"),
      params![encode_uuid(id)],
      RawSession::from_row,
    )
    .optional()?
    .map(|r| r.into_session(conn))
    .transpose()
}

pub fn insert(conn: &Connection, s: &OutreachSession) -> Result<()> {
  let (coordinator_kind, coordinator_id) = split_member(s.coordinator);
  conn.execute(
    &format!(
      "INSERT INTO sessions ({COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ),
    params![
      encode_uuid(s.id),
      s.title,
      s.description,
      s.zone_id.map(encode_uuid),
      coordinator_kind,
      coordinator_id,
      encode_dt(s.planned_start_at),
      encode_opt_dt(s.started_at),
      encode_opt_dt(s.ended_at),
      encode_enum(s.status),
      s.version as i64,
      s.report.as_ref().map(encode_json).transpose()?,
      encode_dt(s.created_at),
    ],
  )?;
  for p in &s.participants {
    add_participant(conn, s.id, p)?;
  }
  Ok(())
}

/// Persist status, timestamps, version and cached report.
pub fn save_header(conn: &Connection, s: &OutreachSession) -> Result<()> {
  conn.execute(
    "UPDATE sessions
     SET status = ?2, started_at = ?3, ended_at = ?4, version = ?5, report_json = ?6
     WHERE id = ?1",
    params![
      encode_uuid(s.id),
      encode_enum(s.status),
      encode_opt_dt(s.started_at),
      encode_opt_dt(s.ended_at),
      s.version as i64,
      s.report.as_ref().map(encode_json).transpose()?,
    ],
  )?;
  Ok(())
}

/// Set-union insert: an existing participant row is left untouched.
pub fn add_participant(conn: &Connection, session_id: Uuid, p: &Participant) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO session_participants
       (session_id, member_kind, member_id, role, joined_at, availability_json)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      encode_uuid(session_id),
      p.member.kind_str(),
      encode_uuid(p.member.id()),
      encode_enum(p.role),
      encode_dt(p.joined_at),
      p.availability.as_ref().map(encode_json).transpose()?,
    ],
  )?;
  Ok(())
}

pub fn remove_participant(conn: &Connection, session_id: Uuid, member: &Member) -> Result<()> {
  conn.execute(
    "DELETE FROM session_participants
     WHERE session_id = ?1 AND member_kind = ?2 AND member_id = ?3",
    params![encode_uuid(session_id), member.kind_str(), encode_uuid(member.id())],
  )?;
  Ok(())
}

pub fn list(conn: &Connection, query: &SessionQuery) -> Result<Page<OutreachSession>> {
  let page = query.page.clamped();
  let status = query.status.map(encode_enum);
  let zone = query.zone_id.map(encode_uuid);
  let filter = "(?1 IS NULL OR status = ?1) AND (?2 IS NULL OR zone_id = ?2)";

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM sessions WHERE {filter}"),
    params![status, zone],
    |row| row.get(0),
  )?;

  let mut stmt = conn.prepare(&format!(
    "SELECT {COLUMNS} FROM sessions WHERE {filter}
     ORDER BY planned_start_at DESC, id LIMIT ?3 OFFSET ?4"
  ))?;
  let raws = stmt
    .query_map(
      params![status, zone, i64::from(page.limit), page.offset() as i64],
      RawSession::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Page {
    items: raws.into_iter().map(|r| r.into_session(conn)).collect::<Result<_>>()?,
    total: total as u64,
    page:  page.page,
    limit: page.limit,
  })
}
