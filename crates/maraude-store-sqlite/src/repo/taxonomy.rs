//! `categories` table.

use std::collections::HashMap;

use maraude_core::taxonomy::{TaxonomyCode, TaxonomyKind};
use rusqlite::{Connection, OptionalExtension as _, Row, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{decode_dt, decode_enum, decode_opt_uuid, decode_uuid, encode_dt, encode_enum, encode_uuid},
};

const COLUMNS: &str = "id, kind, code, name, icon, color, parent_id, created_at";

/// Raw strings read directly from a `categories` row.
struct RawCategory {
  id:         String,
  kind:       String,
  code:       String,
  name:       String,
  icon:       Option<String>,
  color:      Option<String>,
  parent_id:  Option<String>,
  created_at: String,
}

impl RawCategory {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      kind:       row.get(1)?,
      code:       row.get(2)?,
      name:       row.get(3)?,
      icon:       row.get(4)?,
      color:      row.get(5)?,
      parent_id:  row.get(6)?,
      created_at: row.get(7)?,
    })
  }

  fn into_category(self) -> Result<TaxonomyCode> {
    Ok(TaxonomyCode {
      id:         decode_uuid(&self.id)?,
      kind:       decode_enum("kind", &self.kind)?,
      code:       self.code,
      name:       self.name,
      icon:       self.icon,
      color:      self.color,
      parent_id:  decode_opt_uuid(self.parent_id)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub fn list(conn: &Connection, kind: TaxonomyKind) -> Result<Vec<TaxonomyCode>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {COLUMNS} FROM categories WHERE kind = ?1 ORDER BY code"
  ))?;
  let raws = stmt
    .query_map(params![encode_enum(kind)], RawCategory::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawCategory::into_category).collect()
}

pub fn load(conn: &Connection, kind: TaxonomyKind, code: &str) -> Result<Option<TaxonomyCode>> {
  conn
    .query_row(
      &format!("SELECT {COLUMNS} FROM categories WHERE kind = ?1 AND code = ?2"),
      params![encode_enum(kind), code],
      RawCategory::from_row,
    )
    .optional()?
    .map(RawCategory::into_category)
    .transpose()
}

pub fn load_by_id(conn: &Connection, id: Uuid) -> Result<Option<TaxonomyCode>> {
  conn
    .query_row(
      &format!("SELECT {COLUMNS} FROM categories WHERE id = ?1"),
      params![encode_uuid(id)],
      RawCategory::from_row,
    )
    .optional()?
    .map(RawCategory::into_category)
    .transpose()
}

/// `child -> parent` edges for every category of `kind` that has a parent.
pub fn parent_map(conn: &Connection, kind: TaxonomyKind) -> Result<HashMap<Uuid, Uuid>> {
  let mut stmt = conn.prepare(
    "SELECT id, parent_id FROM categories WHERE kind = ?1 AND parent_id IS NOT NULL",
  )?;
  let pairs = stmt
    .query_map(params![encode_enum(kind)], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  pairs
    .into_iter()
    .map(|(child, parent)| Ok((decode_uuid(&child)?, decode_uuid(&parent)?)))
    .collect()
}

pub fn insert(conn: &Connection, c: &TaxonomyCode) -> Result<()> {
  conn.execute(
    "INSERT INTO categories (id, kind, code, name, icon, color, parent_id, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(c.id),
      encode_enum(c.kind),
      c.code,
      c.name,
      c.icon,
      c.color,
      c.parent_id.map(encode_uuid),
      encode_dt(c.created_at),
    ],
  )?;
  Ok(())
}

pub fn update(conn: &Connection, c: &TaxonomyCode) -> Result<()> {
  conn.execute(
    "UPDATE categories SET name = ?2, icon = ?3, color = ?4, parent_id = ?5 WHERE id = ?1",
    params![encode_uuid(c.id), c.name, c.icon, c.color, c.parent_id.map(encode_uuid)],
  )?;
  Ok(())
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<()> {
  conn.execute("DELETE FROM categories WHERE id = ?1", params![encode_uuid(id)])?;
  Ok(())
}

/// Whether any encounter is tagged with `code`.
pub fn is_referenced(conn: &Connection, kind: TaxonomyKind, code: &str) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM encounter_codes WHERE kind = ?1 AND code = ?2 LIMIT 1",
        params![encode_enum(kind), code],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

pub fn has_children(conn: &Connection, id: Uuid) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM categories WHERE parent_id = ?1 LIMIT 1",
        params![encode_uuid(id)],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

/// The first of `codes` that has no category of `kind`, if any.
pub fn first_unknown(conn: &Connection, kind: TaxonomyKind, codes: &[String]) -> Result<Option<String>> {
  let mut stmt = conn.prepare("SELECT 1 FROM categories WHERE kind = ?1 AND code = ?2")?;
  for code in codes {
    if !stmt.exists(params![encode_enum(kind), code])? {
      return Ok(Some(code.clone()));
    }
  }
  Ok(None)
}
