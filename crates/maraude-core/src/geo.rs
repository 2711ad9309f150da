//! Geographic points and great-circle distance.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mean Earth radius used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius applied to "nearby" queries when the caller gives none.
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 5.0;

/// Upper bound accepted for a "nearby" radius.
pub const MAX_NEARBY_RADIUS_KM: f64 = 200.0;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub lat: f64,
  pub lng: f64,
}

impl GeoPoint {
  /// Build a point, rejecting out-of-range or non-finite coordinates.
  pub fn new(lat: f64, lng: f64) -> Result<Self> {
    let point = Self { lat, lng };
    point.validate()?;
    Ok(point)
  }

  pub fn validate(&self) -> Result<()> {
    if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
      return Err(Error::Validation(format!("latitude out of range: {}", self.lat)));
    }
    if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
      return Err(Error::Validation(format!("longitude out of range: {}", self.lng)));
    }
    Ok(())
  }

  pub fn distance_km(&self, other: &GeoPoint) -> f64 { haversine_km(*self, *other) }

  /// A lat/lng box guaranteed to contain every point within `radius_km`.
  /// Backends use it as a cheap pre-filter before the exact distance check.
  pub fn bounding_box(&self, radius_km: f64) -> BoundingBox {
    let dlat = (radius_km / EARTH_RADIUS_KM).to_degrees();
    let cos_lat = self.lat.to_radians().cos();
    let dlng = if cos_lat.abs() < 1e-9 {
      180.0
    } else {
      (dlat / cos_lat).min(180.0)
    };
    BoundingBox {
      min_lat: (self.lat - dlat).max(-90.0),
      max_lat: (self.lat + dlat).min(90.0),
      min_lng: self.lng - dlng,
      max_lng: self.lng + dlng,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub min_lat: f64,
  pub max_lat: f64,
  pub min_lng: f64,
  pub max_lng: f64,
}

impl BoundingBox {
  /// Longitude bounds may exceed ±180 near the antimeridian; points there
  /// are accepted and left to the exact distance check.
  pub fn contains(&self, p: &GeoPoint) -> bool {
    let lat_ok = p.lat >= self.min_lat && p.lat <= self.max_lat;
    let wraps = self.min_lng < -180.0 || self.max_lng > 180.0;
    lat_ok && (wraps || (p.lng >= self.min_lng && p.lng <= self.max_lng))
  }
}

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
  let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
  let dlat = lat2 - lat1;
  let dlng = (b.lng - a.lng).to_radians();

  let h = (dlat / 2.0).sin().powi(2)
    + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
  2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Resolve a caller-supplied radius, applying the default and bounds.
pub fn resolve_radius(radius_km: Option<f64>) -> Result<f64> {
  let r = radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM);
  if !r.is_finite() || r <= 0.0 || r > MAX_NEARBY_RADIUS_KM {
    return Err(Error::Validation(format!(
      "radius must be in (0, {MAX_NEARBY_RADIUS_KM}] km, got {r}"
    )));
  }
  Ok(r)
}

/// An item annotated with its distance from the query point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nearby<T> {
  #[serde(flatten)]
  pub item:        T,
  pub distance_km: f64,
}

/// Keep the items within `radius_km` of `center`, nearest first.
pub fn filter_nearby<T>(
  center: GeoPoint,
  radius_km: f64,
  items: impl IntoIterator<Item = T>,
  location: impl Fn(&T) -> Option<GeoPoint>,
) -> Vec<Nearby<T>> {
  let mut hits: Vec<Nearby<T>> = items
    .into_iter()
    .filter_map(|item| {
      let d = haversine_km(center, location(&item)?);
      (d <= radius_km).then_some(Nearby { item, distance_km: d })
    })
    .collect();
  hits.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
  hits
}

#[cfg(test)]
mod tests {
  use super::*;

  const PARIS: GeoPoint = GeoPoint { lat: 48.8566, lng: 2.3522 };
  const LYON: GeoPoint = GeoPoint { lat: 45.7640, lng: 4.8357 };

  #[test]
  fn haversine_paris_lyon() {
    let d = haversine_km(PARIS, LYON);
    assert!((d - 392.0).abs() < 3.0, "distance was {d}");
  }

  #[test]
  fn haversine_same_point_is_zero() {
    assert!(haversine_km(PARIS, PARIS).abs() < 1e-9);
  }

  #[test]
  fn out_of_range_points_rejected() {
    assert!(GeoPoint::new(91.0, 0.0).is_err());
    assert!(GeoPoint::new(0.0, -181.0).is_err());
    assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    assert!(GeoPoint::new(48.0, 2.0).is_ok());
  }

  #[test]
  fn radius_defaults_and_bounds() {
    assert_eq!(resolve_radius(None).unwrap(), DEFAULT_NEARBY_RADIUS_KM);
    assert!(resolve_radius(Some(0.0)).is_err());
    assert!(resolve_radius(Some(-1.0)).is_err());
    assert!(resolve_radius(Some(MAX_NEARBY_RADIUS_KM + 1.0)).is_err());
  }

  #[test]
  fn bounding_box_contains_points_within_radius() {
    let bbox = PARIS.bounding_box(10.0);
    let near = GeoPoint { lat: 48.90, lng: 2.40 };
    assert!(haversine_km(PARIS, near) < 10.0);
    assert!(bbox.contains(&near));
    assert!(!bbox.contains(&LYON));
  }

  #[test]
  fn filter_nearby_sorts_and_drops_missing_locations() {
    let near = GeoPoint { lat: 48.86, lng: 2.35 };
    let mid = GeoPoint { lat: 48.88, lng: 2.36 };
    let items = vec![("mid", Some(mid)), ("none", None), ("near", Some(near)), ("far", Some(LYON))];

    let hits = filter_nearby(PARIS, 5.0, items, |(_, p)| *p);
    let names: Vec<_> = hits.iter().map(|n| n.item.0).collect();
    assert_eq!(names, ["near", "mid"]);
  }
}
