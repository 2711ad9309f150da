//! `zones` table.

use maraude_core::zone::OutreachZone;
use rusqlite::{Connection, OptionalExtension as _, Row, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{decode_uuid, encode_uuid, join_point, split_point},
};

const COLUMNS: &str = "id, name, color, center_lat, center_lng, radius_km";

struct RawZone {
  id:         String,
  name:       String,
  color:      Option<String>,
  center_lat: Option<f64>,
  center_lng: Option<f64>,
  radius_km:  Option<f64>,
}

impl RawZone {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      name:       row.get(1)?,
      color:      row.get(2)?,
      center_lat: row.get(3)?,
      center_lng: row.get(4)?,
      radius_km:  row.get(5)?,
    })
  }

  fn into_zone(self) -> Result<OutreachZone> {
    Ok(OutreachZone {
      id:        decode_uuid(&self.id)?,
      name:      self.name,
      color:     self.color,
      center:    join_point(self.center_lat, self.center_lng),
      radius_km: self.radius_km,
    })
  }
}

pub fn insert(conn: &Connection, z: &OutreachZone) -> Result<()> {
  let (lat, lng) = split_point(z.center);
  conn.execute(
    &format!("INSERT INTO zones ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
    params![encode_uuid(z.id), z.name, z.color, lat, lng, z.radius_km],
  )?;
  Ok(())
}

pub fn load(conn: &Connection, id: Uuid) -> Result<Option<OutreachZone>> {
  conn
    .query_row(
      &format!("SELECT {COLUMNS} FROM zones WHERE id = ?1"),
      params![encode_uuid(id)],
      RawZone::from_row,
    )
    .optional()?
    .map(RawZone::into_zone)
    .transpose()
}

pub fn list(conn: &Connection) -> Result<Vec<OutreachZone>> {
  let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM zones ORDER BY name"))?;
  let raws = stmt
    .query_map([], RawZone::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawZone::into_zone).collect()
}
