//! Session reports: aggregates derived from a session's encounters.
//!
//! A report is computed when the session ends and cached with it. It is not
//! editable; recompiling from the same encounters yields the same counters.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encounter::Encounter;

/// Need code counted as one meal handed out.
pub const MEAL_CODE: &str = "REPAS";

/// Need code counted as one blanket handed out.
pub const BLANKET_CODE: &str = "COUVERTURE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachReport {
  pub session_id:           Uuid,
  pub total_encounters:     u32,
  pub new_beneficiaries:    u32,
  pub meals_distributed:    u32,
  pub blankets_distributed: u32,
  pub summary:              Option<String>,
  pub compiled_at:          DateTime<Utc>,
}

/// Compile a report.
///
/// `created_at_of` resolves a beneficiary id to its creation instant; a
/// beneficiary counts as new when that instant falls inside
/// `[window_start, window_end]`. Each beneficiary is counted once.
pub fn compile_report(
  session_id: Uuid,
  encounters: &[Encounter],
  window_start: DateTime<Utc>,
  window_end: DateTime<Utc>,
  created_at_of: impl Fn(Uuid) -> Option<DateTime<Utc>>,
  summary: Option<String>,
  now: DateTime<Utc>,
) -> OutreachReport {
  let count_need = |code: &str| {
    encounters
      .iter()
      .filter(|e| e.need_codes.iter().any(|c| c == code))
      .count() as u32
  };

  let new_beneficiaries = encounters
    .iter()
    .filter_map(|e| e.beneficiary_id)
    .collect::<HashSet<_>>()
    .into_iter()
    .filter(|id| {
      created_at_of(*id).is_some_and(|at| at >= window_start && at <= window_end)
    })
    .count() as u32;

  OutreachReport {
    session_id,
    total_encounters: encounters.len() as u32,
    new_beneficiaries,
    meals_distributed: count_need(MEAL_CODE),
    blankets_distributed: count_need(BLANKET_CODE),
    summary,
    compiled_at: now,
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use chrono::Duration;

  use super::*;
  use crate::encounter::{BeneficiaryRef, NewEncounter};

  fn encounter(session: Uuid, beneficiary: Option<Uuid>, needs: &[&str]) -> Encounter {
    NewEncounter::new(session, BeneficiaryRef::Anonymous)
      .with_needs(needs.iter().copied())
      .into_encounter(beneficiary, Utc::now())
  }

  #[test]
  fn counts_meals_blankets_and_new_beneficiaries() {
    let session = Uuid::new_v4();
    let start = Utc::now() - Duration::hours(2);
    let end = Utc::now();

    let (fresh, regular) = (Uuid::new_v4(), Uuid::new_v4());
    let created: HashMap<Uuid, DateTime<Utc>> = [
      (fresh, start + Duration::minutes(10)),
      (regular, start - Duration::days(30)),
    ]
    .into();

    let encounters = vec![
      encounter(session, Some(fresh), &[MEAL_CODE, BLANKET_CODE]),
      encounter(session, Some(fresh), &[MEAL_CODE]),
      encounter(session, Some(regular), &[MEAL_CODE, "SOIN"]),
      encounter(session, None, &["SOIN"]),
    ];

    let report = compile_report(
      session,
      &encounters,
      start,
      end,
      |id| created.get(&id).copied(),
      Some("calm night".into()),
      end,
    );

    assert_eq!(report.total_encounters, 4);
    assert_eq!(report.meals_distributed, 3);
    assert_eq!(report.blankets_distributed, 1);
    assert_eq!(report.new_beneficiaries, 1);
    assert_eq!(report.summary.as_deref(), Some("calm night"));
  }

  #[test]
  fn empty_session_reports_zeroes() {
    let now = Utc::now();
    let report = compile_report(Uuid::new_v4(), &[], now, now, |_| None, None, now);
    assert_eq!(report.total_encounters, 0);
    assert_eq!(report.meals_distributed, 0);
    assert_eq!(report.new_beneficiaries, 0);
  }
}
