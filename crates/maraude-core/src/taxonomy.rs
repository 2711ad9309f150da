//! Need and Action categories: the controlled vocabulary encounters are
//! tagged with.
//!
//! Codes are referenced by value. Need categories may form a tree through
//! `parent_id`; action categories are flat.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// Which taxonomy a category belongs to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaxonomyKind {
  Need,
  Action,
}

/// A category in one of the two taxonomies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyCode {
  pub id:         Uuid,
  pub kind:       TaxonomyKind,
  /// Unique within `kind`; always upper-case.
  pub code:       String,
  pub name:       String,
  pub icon:       Option<String>,
  pub color:      Option<String>,
  pub parent_id:  Option<Uuid>,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::OutreachStore::create_category`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
  pub code:      String,
  pub name:      String,
  pub icon:      Option<String>,
  pub color:     Option<String>,
  pub parent_id: Option<Uuid>,
}

impl NewCategory {
  pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
    Self { code: code.into(), name: name.into(), ..Default::default() }
  }

  /// Normalise the code and check field-level constraints.
  pub fn validate(mut self, kind: TaxonomyKind) -> Result<Self> {
    self.code = normalize_code(&self.code)?;
    self.name = self.name.trim().to_owned();
    if self.name.is_empty() {
      return Err(Error::Validation("category name must not be empty".into()));
    }
    if let Some(color) = &self.color {
      validate_color(color)?;
    }
    if kind == TaxonomyKind::Action && self.parent_id.is_some() {
      return Err(Error::Validation("action categories cannot have a parent".into()));
    }
    Ok(self)
  }
}

/// Partial update of a category. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
  pub name:      Option<String>,
  pub icon:      Option<String>,
  pub color:     Option<String>,
  pub parent_id: Option<Uuid>,
}

impl CategoryPatch {
  pub fn apply(self, category: &mut TaxonomyCode) -> Result<()> {
    if let Some(name) = self.name {
      let name = name.trim();
      if name.is_empty() {
        return Err(Error::Validation("category name must not be empty".into()));
      }
      category.name = name.to_owned();
    }
    if let Some(color) = self.color {
      validate_color(&color)?;
      category.color = Some(color);
    }
    if let Some(icon) = self.icon {
      category.icon = Some(icon);
    }
    if let Some(parent) = self.parent_id {
      if category.kind == TaxonomyKind::Action {
        return Err(Error::Validation("action categories cannot have a parent".into()));
      }
      category.parent_id = Some(parent);
    }
    Ok(())
  }
}

/// Trim and upper-case a code; only `[A-Z0-9_]` survives validation.
pub fn normalize_code(raw: &str) -> Result<String> {
  let code = raw.trim().to_ascii_uppercase();
  if code.is_empty() || code.len() > 64 {
    return Err(Error::Validation(format!("invalid category code: {raw:?}")));
  }
  if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
    return Err(Error::Validation(format!("invalid category code: {raw:?}")));
  }
  Ok(code)
}

/// Normalise a list of codes, dropping duplicates but keeping first-seen
/// order.
pub fn normalize_codes(raw: &[String]) -> Result<Vec<String>> {
  let mut seen = HashSet::new();
  let mut out = Vec::with_capacity(raw.len());
  for r in raw {
    let code = normalize_code(r)?;
    if seen.insert(code.clone()) {
      out.push(code);
    }
  }
  Ok(out)
}

fn validate_color(color: &str) -> Result<()> {
  let hex = color.strip_prefix('#').unwrap_or_default();
  if !matches!(hex.len(), 3 | 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
    return Err(Error::Validation(format!("color must be #rgb or #rrggbb: {color:?}")));
  }
  Ok(())
}

/// Whether making `parent` the parent of `node` would close a loop.
///
/// Walks up from `parent` through `parent_of`; reaching `node` (or a loop
/// already present in the data) means the edit must be refused.
pub fn creates_cycle(
  node: Uuid,
  parent: Uuid,
  parent_of: impl Fn(Uuid) -> Option<Uuid>,
) -> bool {
  let mut visited = HashSet::new();
  let mut cursor = Some(parent);
  while let Some(current) = cursor {
    if current == node || !visited.insert(current) {
      return true;
    }
    cursor = parent_of(current);
  }
  false
}
