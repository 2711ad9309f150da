//! Outreach zones: optional geographic scoping for sessions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, geo::GeoPoint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachZone {
  pub id:        Uuid,
  pub name:      String,
  pub color:     Option<String>,
  pub center:    Option<GeoPoint>,
  pub radius_km: Option<f64>,
}

impl OutreachZone {
  pub fn create(input: NewZone) -> Result<Self> {
    let name = input.name.trim();
    if name.is_empty() {
      return Err(Error::Validation("zone name must not be empty".into()));
    }
    if let Some(center) = &input.center {
      center.validate()?;
    }
    if let Some(r) = input.radius_km
      && (!r.is_finite() || r <= 0.0)
    {
      return Err(Error::Validation(format!("zone radius must be positive, got {r}")));
    }
    Ok(Self {
      id:        Uuid::new_v4(),
      name:      name.to_owned(),
      color:     input.color,
      center:    input.center,
      radius_km: input.radius_km,
    })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewZone {
  pub name:      String,
  pub color:     Option<String>,
  pub center:    Option<GeoPoint>,
  pub radius_km: Option<f64>,
}
