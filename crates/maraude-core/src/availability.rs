//! Weekly availability grids declared by session participants.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayOfWeek {
  Monday,
  Tuesday,
  Wednesday,
  Thursday,
  Friday,
  Saturday,
  Sunday,
}

impl From<Weekday> for DayOfWeek {
  fn from(w: Weekday) -> Self {
    match w {
      Weekday::Mon => Self::Monday,
      Weekday::Tue => Self::Tuesday,
      Weekday::Wed => Self::Wednesday,
      Weekday::Thu => Self::Thursday,
      Weekday::Fri => Self::Friday,
      Weekday::Sat => Self::Saturday,
      Weekday::Sun => Self::Sunday,
    }
  }
}

/// A coarse slot within a day (UTC hours).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeSlot {
  /// 06:00–12:00
  Morning,
  /// 12:00–18:00
  Afternoon,
  /// 18:00–22:00
  Evening,
  /// 22:00–06:00, attributed to the calendar day the hour falls on.
  Night,
}

impl TimeSlot {
  pub fn for_hour(hour: u32) -> Self {
    match hour {
      6..=11 => Self::Morning,
      12..=17 => Self::Afternoon,
      18..=21 => Self::Evening,
      _ => Self::Night,
    }
  }
}

/// `day -> slots` grid. An empty grid means "no availability declared".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Availability(pub BTreeMap<DayOfWeek, BTreeSet<TimeSlot>>);

impl Availability {
  pub fn with(mut self, day: DayOfWeek, slot: TimeSlot) -> Self {
    self.add(day, slot);
    self
  }

  pub fn add(&mut self, day: DayOfWeek, slot: TimeSlot) {
    self.0.entry(day).or_default().insert(slot);
  }

  pub fn is_empty(&self) -> bool { self.0.values().all(BTreeSet::is_empty) }

  pub fn covers(&self, at: DateTime<Utc>) -> bool {
    let day = DayOfWeek::from(at.weekday());
    let slot = TimeSlot::for_hour(at.hour());
    self.0.get(&day).is_some_and(|slots| slots.contains(&slot))
  }
}
