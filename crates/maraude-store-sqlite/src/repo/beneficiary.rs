//! `beneficiaries` table.

use chrono::{DateTime, Utc};
use maraude_core::{
  beneficiary::Beneficiary,
  geo::BoundingBox,
  store::{BeneficiaryQuery, Page},
};
use rusqlite::{Connection, OptionalExtension as _, Row, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    decode_dt, decode_enum, decode_json, decode_opt_dt, decode_uuid, encode_dt, encode_enum,
    encode_json, encode_opt_dt, encode_uuid, join_point, split_point,
  },
};

const COLUMNS: &str = "id, nickname, estimated_age, gender, housing_status,
  administrative_status, usual_location, nationality, spoken_languages, tags,
  notes, gdpr_consent_status, gdpr_consent_date, photo_consent_given, lat, lng,
  created_at, updated_at, anonymized_at";

/// Raw values read directly from a `beneficiaries` row.
struct RawBeneficiary {
  id:                    String,
  nickname:              String,
  estimated_age:         Option<u8>,
  gender:                String,
  housing_status:        String,
  administrative_status: String,
  usual_location:        Option<String>,
  nationality:           Option<String>,
  spoken_languages:      String,
  tags:                  String,
  notes:                 Option<String>,
  gdpr_consent_status:   String,
  gdpr_consent_date:     Option<String>,
  photo_consent_given:   bool,
  lat:                   Option<f64>,
  lng:                   Option<f64>,
  created_at:            String,
  updated_at:            String,
  anonymized_at:         Option<String>,
}

impl RawBeneficiary {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                    row.get(0)?,
      nickname:              row.get(1)?,
      estimated_age:         row.get(2)?,
      gender:                row.get(3)?,
      housing_status:        row.get(4)?,
      administrative_status: row.get(5)?,
      usual_location:        row.get(6)?,
      nationality:           row.get(7)?,
      spoken_languages:      row.get(8)?,
      tags:                  row.get(9)?,
      notes:                 row.get(10)?,
      gdpr_consent_status:   row.get(11)?,
      gdpr_consent_date:     row.get(12)?,
      photo_consent_given:   row.get(13)?,
      lat:                   row.get(14)?,
      lng:                   row.get(15)?,
      created_at:            row.get(16)?,
      updated_at:            row.get(17)?,
      anonymized_at:         row.get(18)?,
    })
  }

  fn into_beneficiary(self) -> Result<Beneficiary> {
    Ok(Beneficiary {
      id:                    decode_uuid(&self.id)?,
      nickname:              self.nickname,
      estimated_age:         self.estimated_age,
      gender:                decode_enum("gender", &self.gender)?,
      housing_status:        decode_enum("housing_status", &self.housing_status)?,
      administrative_status: decode_enum("administrative_status", &self.administrative_status)?,
      usual_location:        self.usual_location,
      nationality:           self.nationality,
      spoken_languages:      decode_json(&self.spoken_languages)?,
      tags:                  decode_json(&self.tags)?,
      notes:                 self.notes,
      gdpr_consent_status:   decode_enum("gdpr_consent_status", &self.gdpr_consent_status)?,
      gdpr_consent_date:     decode_opt_dt(self.gdpr_consent_date)?,
      photo_consent_given:   self.photo_consent_given,
      location:              join_point(self.lat, self.lng),
      created_at:            decode_dt(&self.created_at)?,
      updated_at:            decode_dt(&self.updated_at)?,
      anonymized_at:         decode_opt_dt(self.anonymized_at)?,
    })
  }
}

fn collect(raws: Vec<RawBeneficiary>) -> Result<Vec<Beneficiary>> {
  raws.into_iter().map(RawBeneficiary::into_beneficiary).collect()
}

pub fn load(conn: &Connection, id: Uuid) -> Result<Option<Beneficiary>> {
  conn
    .query_row(
      &format!("SELECT {COLUMNS} FROM beneficiaries WHERE id = ?1"),
      params![encode_uuid(id)],
      RawBeneficiary::from_row,
    )
    .optional()?
    .map(RawBeneficiary::into_beneficiary)
    .transpose()
}

/// Insert a beneficiary, or overwrite every mutable column of an existing
/// one. `created_at` is never rewritten.
pub fn save(conn: &Connection, b: &Beneficiary) -> Result<()> {
  let (lat, lng) = split_point(b.location);
  conn.execute(
    &format!(
      "INSERT INTO beneficiaries ({COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
               ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
       ON CONFLICT(id) DO UPDATE SET
         nickname = excluded.nickname,
         estimated_age = excluded.estimated_age,
         gender = excluded.gender,
         housing_status = excluded.housing_status,
         administrative_status = excluded.administrative_status,
         usual_location = excluded.usual_location,
         nationality = excluded.nationality,
         spoken_languages = excluded.spoken_languages,
         tags = excluded.tags,
         notes = excluded.notes,
         gdpr_consent_status = excluded.gdpr_consent_status,
         gdpr_consent_date = excluded.gdpr_consent_date,
         photo_consent_given = excluded.photo_consent_given,
         lat = excluded.lat,
         lng = excluded.lng,
         updated_at = excluded.updated_at,
         anonymized_at = excluded.anonymized_at"
    ),
    params![
      encode_uuid(b.id),
      b.nickname,
      b.estimated_age,
      encode_enum(b.gender),
      encode_enum(b.housing_status),
      encode_enum(b.administrative_status),
      b.usual_location,
      b.nationality,
      encode_json(&b.spoken_languages)?,
      encode_json(&b.tags)?,
      b.notes,
      encode_enum(b.gdpr_consent_status),
      encode_opt_dt(b.gdpr_consent_date),
      b.photo_consent_given,
      lat,
      lng,
      encode_dt(b.created_at),
      encode_dt(b.updated_at),
      encode_opt_dt(b.anonymized_at),
    ],
  )?;
  Ok(())
}

pub fn list(conn: &Connection, query: &BeneficiaryQuery) -> Result<Page<Beneficiary>> {
  let page = query.page.clamped();
  let text = query.text.as_deref().map(|t| format!("%{}%", t.to_lowercase()));
  let consent = query.consent.map(encode_enum);

  let filter = "(?1 IS NULL OR lower(nickname) LIKE ?1)
                AND (?2 IS NULL OR gdpr_consent_status = ?2)";

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM beneficiaries WHERE {filter}"),
    params![text, consent],
    |row| row.get(0),
  )?;

  let mut stmt = conn.prepare(&format!(
    "SELECT {COLUMNS} FROM beneficiaries WHERE {filter}
     ORDER BY created_at DESC, id LIMIT ?3 OFFSET ?4"
  ))?;
  let raws = stmt
    .query_map(
      params![text, consent, i64::from(page.limit), page.offset() as i64],
      RawBeneficiary::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Page {
    items: collect(raws)?,
    total: total as u64,
    page:  page.page,
    limit: page.limit,
  })
}

/// Beneficiaries with a stored location inside `bbox`.
pub fn located_within(conn: &Connection, bbox: &BoundingBox) -> Result<Vec<Beneficiary>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {COLUMNS} FROM beneficiaries
     WHERE lat IS NOT NULL AND lng IS NOT NULL AND lat BETWEEN ?1 AND ?2"
  ))?;
  let raws = stmt
    .query_map(params![bbox.min_lat, bbox.max_lat], RawBeneficiary::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let mut found = collect(raws)?;
  found.retain(|b| b.location.is_some_and(|p| bbox.contains(&p)));
  Ok(found)
}

/// Non-anonymized beneficiaries registered before `cutoff` with no
/// encounter on or after it.
pub fn inactive_since(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
  let mut stmt = conn.prepare(
    "SELECT b.id FROM beneficiaries b
     WHERE b.anonymized_at IS NULL
       AND b.created_at < ?1
       AND NOT EXISTS (
         SELECT 1 FROM encounters e
         WHERE e.beneficiary_id = b.id AND e.created_at >= ?1
       )",
  )?;
  let ids = stmt
    .query_map(params![encode_dt(cutoff)], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  ids.iter().map(|s| decode_uuid(s)).collect()
}

/// Creation instants for the given ids; unknown ids are skipped.
pub fn created_at(conn: &Connection, ids: impl IntoIterator<Item = Uuid>) -> Result<Vec<(Uuid, DateTime<Utc>)>> {
  let mut stmt = conn.prepare("SELECT created_at FROM beneficiaries WHERE id = ?1")?;
  let mut out = Vec::new();
  for id in ids {
    let at: Option<String> = stmt
      .query_row(params![encode_uuid(id)], |row| row.get(0))
      .optional()?;
    if let Some(at) = at {
      out.push((id, decode_dt(&at)?));
    }
  }
  Ok(out)
}
