//! The visit aggregate: a booking plus everything it owns.
//!
//! A [`Visit`] owns its contact, visitors, support needs, notes and legacy
//! linkage by value. Children are keyed by their natural identity (person id,
//! support type) and are persisted and deleted together with the visit.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Placeholder written by migration where the legacy record has no value.
pub const UNKNOWN: &str = "UNKNOWN";

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitType {
  Social,
  StandardSocial,
}

/// Booking status. Moves forward only: `Reserved → Booked → Cancelled`,
/// with `Cancelled` terminal.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitStatus {
  Reserved,
  Booked,
  Cancelled,
}

impl VisitStatus {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Cancelled) }

  /// Whether an update may move a visit from `self` to `next`.
  ///
  /// Cancellation is not reachable through this check; it has its own
  /// operation because it requires an outcome.
  pub fn can_become(self, next: VisitStatus) -> bool {
    match (self, next) {
      (Self::Reserved, Self::Reserved | Self::Booked) => true,
      (Self::Booked, Self::Booked) => true,
      _ => false,
    }
  }
}

/// Which capacity pool the visit consumes.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitRestriction {
  Open,
  Closed,
}

/// Reason recorded when a visit is cancelled or imported already resolved.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
  AdministrativeCancellation,
  AdministrativeError,
  BatchCancellation,
  Cancellation,
  CompletedNormally,
  EstablishmentCancelled,
  #[default]
  NotRecorded,
  NoVisitingOrder,
  PrisonerCancelled,
  PrisonerCompletedEarly,
  PrisonerRefusedToAttend,
  SupersededCancellation,
  TerminatedByStaff,
  VisitorCancelled,
  VisitorCompletedEarly,
  VisitorDeclinedEntry,
  VisitorDidNotArrive,
  VisitorFailedSecurityChecks,
  VisitOrderCancelled,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitNoteType {
  VisitorConcern,
  VisitComment,
  VisitOutcomes,
  StatusChangedReason,
}

// ─── Owned children ──────────────────────────────────────────────────────────

/// The main contact for a visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitContact {
  pub name:      String,
  pub telephone: String,
}

/// A visitor, identified by their NOMIS person id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitVisitor {
  pub nomis_person_id: i64,
}

/// A support need. `support_type` must name an entry in the support-type
/// catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitSupport {
  #[serde(rename = "type")]
  pub support_type: String,
  pub text:         Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitNote {
  #[serde(rename = "type")]
  pub note_type: VisitNoteType,
  pub text:      String,
}

/// Linkage back to the legacy system; only present on migrated visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyData {
  pub lead_person_id: i64,
}

/// An entry in the support-type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportType {
  pub code:        i64,
  pub name:        String,
  pub description: String,
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// Visit state before it has been given an identity by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVisit {
  pub prisoner_id:       String,
  pub prison_id:         String,
  pub visit_room:        String,
  pub visit_type:        VisitType,
  pub visit_status:      VisitStatus,
  pub visit_restriction: VisitRestriction,
  pub visit_start:       NaiveDateTime,
  pub visit_end:         NaiveDateTime,
  pub outcome_status:    Option<OutcomeStatus>,
  pub visit_contact:     Option<VisitContact>,
  pub visitors:          Vec<VisitVisitor>,
  pub visitor_support:   Vec<VisitSupport>,
  pub visit_notes:       Vec<VisitNote>,
  pub legacy_data:       Option<LegacyData>,
}

/// A persisted visit.
///
/// `id` is the store's surrogate key and is never serialised; `reference` is
/// derived from it once, at insert, and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
  #[serde(skip)]
  pub id:                 i64,
  pub reference:          String,
  pub prisoner_id:        String,
  pub prison_id:          String,
  pub visit_room:         String,
  pub visit_type:         VisitType,
  pub visit_status:       VisitStatus,
  pub visit_restriction:  VisitRestriction,
  #[serde(rename = "startTimestamp")]
  pub visit_start:        NaiveDateTime,
  #[serde(rename = "endTimestamp")]
  pub visit_end:          NaiveDateTime,
  pub outcome_status:     Option<OutcomeStatus>,
  pub visit_contact:      Option<VisitContact>,
  pub visitors:           Vec<VisitVisitor>,
  pub visitor_support:    Vec<VisitSupport>,
  pub visit_notes:        Vec<VisitNote>,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub legacy_data:        Option<LegacyData>,
  pub created_timestamp:  DateTime<Utc>,
  pub modified_timestamp: DateTime<Utc>,
}

impl Visit {
  /// A visit whose start has passed can no longer be changed or cancelled.
  pub fn is_expired(&self, now: NaiveDateTime) -> bool { self.visit_start < now }

  /// Replace the visitor set. Later duplicates of a person overwrite earlier
  /// ones.
  pub fn replace_visitors(&mut self, visitors: impl IntoIterator<Item = VisitVisitor>) {
    self.visitors = dedup_visitors(visitors);
  }

  /// Replace the support set. Later duplicates of a type overwrite earlier
  /// ones.
  pub fn replace_support(&mut self, support: impl IntoIterator<Item = VisitSupport>) {
    self.visitor_support = dedup_support(support);
  }

  pub fn add_note(&mut self, note_type: VisitNoteType, text: impl Into<String>) {
    self.visit_notes.push(VisitNote { note_type, text: text.into() });
  }
}

pub fn dedup_visitors(visitors: impl IntoIterator<Item = VisitVisitor>) -> Vec<VisitVisitor> {
  upsert_by_key(visitors, |v| v.nomis_person_id)
}

pub fn dedup_support(support: impl IntoIterator<Item = VisitSupport>) -> Vec<VisitSupport> {
  upsert_by_key(support, |s| s.support_type.clone())
}

/// Keep one entry per key, in first-seen order, holding the last value given.
fn upsert_by_key<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
  K: PartialEq,
  F: Fn(&T) -> K,
{
  let mut out: Vec<T> = Vec::new();
  for item in items {
    let k = key(&item);
    match out.iter_mut().find(|existing| key(existing) == k) {
      Some(slot) => *slot = item,
      None => out.push(item),
    }
  }
  out
}
