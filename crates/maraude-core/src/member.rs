//! Identities of the people who take part in outreach sessions.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// A portal user account or a registered volunteer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Member {
  User(Uuid),
  Volunteer(Uuid),
}

impl Member {
  pub fn id(&self) -> Uuid {
    match self {
      Self::User(id) | Self::Volunteer(id) => *id,
    }
  }

  /// The discriminant string stored alongside the id.
  pub fn kind_str(&self) -> &'static str {
    match self {
      Self::User(_) => "user",
      Self::Volunteer(_) => "volunteer",
    }
  }

  pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
    match kind {
      "user" => Some(Self::User(id)),
      "volunteer" => Some(Self::Volunteer(id)),
      _ => None,
    }
  }
}

impl fmt::Display for Member {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind_str(), self.id())
  }
}

/// The part a participant plays in a session.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
  Coordinator,
  #[default]
  Volunteer,
  Medical,
  Driver,
  Trainee,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn member_serialises_as_tagged_id() {
    let id = Uuid::nil();
    let json = serde_json::to_value(Member::Volunteer(id)).unwrap();
    assert_eq!(json, serde_json::json!({ "kind": "volunteer", "id": id }));
  }

  #[test]
  fn member_from_parts_roundtrips_kind() {
    let m = Member::User(Uuid::new_v4());
    assert_eq!(Member::from_parts(m.kind_str(), m.id()), Some(m));
    assert_eq!(Member::from_parts("admin", m.id()), None);
  }
}
