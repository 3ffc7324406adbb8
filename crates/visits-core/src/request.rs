//! Inputs to the lifecycle operations.
//!
//! These double as the JSON request bodies of the REST layer, so they carry
//! the camelCase wire names.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::visit::{
  LegacyData, OutcomeStatus, VisitContact, VisitNote, VisitRestriction, VisitStatus,
  VisitSupport, VisitType, VisitVisitor,
};

/// Body of a booking request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVisitRequest {
  pub prisoner_id:       String,
  pub prison_id:         String,
  pub visit_room:        String,
  pub visit_type:        VisitType,
  pub visit_status:      VisitStatus,
  pub visit_restriction: VisitRestriction,
  pub start_timestamp:   NaiveDateTime,
  pub end_timestamp:     NaiveDateTime,
  pub visit_contact:     Option<VisitContact>,
  #[serde(default)]
  pub visitors:          Vec<VisitVisitor>,
  #[serde(default)]
  pub visitor_support:   Vec<VisitSupport>,
  #[serde(default)]
  pub visit_notes:       Vec<VisitNote>,
}

/// Sparse update. A `None` field is left untouched.
///
/// `visit_contact` distinguishes an absent field (`None`) from an explicit
/// `null` (`Some(None)`, which removes the contact). Supplying `visitors` or
/// `visitor_support` replaces the whole collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVisitRequest {
  pub prisoner_id:       Option<String>,
  pub prison_id:         Option<String>,
  pub visit_room:        Option<String>,
  pub visit_type:        Option<VisitType>,
  pub visit_status:      Option<VisitStatus>,
  pub visit_restriction: Option<VisitRestriction>,
  pub start_timestamp:   Option<NaiveDateTime>,
  pub end_timestamp:     Option<NaiveDateTime>,
  #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
  pub visit_contact:     Option<Option<VisitContact>>,
  pub visitors:          Option<Vec<VisitVisitor>>,
  pub visitor_support:   Option<Vec<VisitSupport>>,
}

/// Slot change for an already booked visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeVisitSlotRequest {
  pub visit_restriction: Option<VisitRestriction>,
  pub start_timestamp:   Option<NaiveDateTime>,
  pub end_timestamp:     Option<NaiveDateTime>,
  pub visit_contact:     Option<VisitContact>,
  pub visitors:          Option<Vec<VisitVisitor>>,
  pub visitor_support:   Option<Vec<VisitSupport>>,
}

impl From<ChangeVisitSlotRequest> for UpdateVisitRequest {
  fn from(c: ChangeVisitSlotRequest) -> Self {
    UpdateVisitRequest {
      visit_restriction: c.visit_restriction,
      start_timestamp: c.start_timestamp,
      end_timestamp: c.end_timestamp,
      visit_contact: c.visit_contact.map(Some),
      visitors: c.visitors,
      visitor_support: c.visitor_support,
      ..Default::default()
    }
  }
}

/// Reason given for a cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRequest {
  pub outcome_status: OutcomeStatus,
  pub text:           Option<String>,
}

/// Contact as supplied by the legacy system; either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyContact {
  #[serde(default)]
  pub name:      Option<String>,
  #[serde(default)]
  pub telephone: Option<String>,
}

/// A historical visit imported from the legacy system. Status and outcome
/// are taken as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateVisitRequest {
  pub prisoner_id:       String,
  pub prison_id:         String,
  pub visit_room:        String,
  pub visit_type:        VisitType,
  pub visit_status:      VisitStatus,
  pub outcome_status:    Option<OutcomeStatus>,
  pub visit_restriction: VisitRestriction,
  pub start_timestamp:   NaiveDateTime,
  pub end_timestamp:     NaiveDateTime,
  pub visit_contact:     Option<LegacyContact>,
  #[serde(default)]
  pub visitors:          Vec<VisitVisitor>,
  #[serde(default)]
  pub visit_notes:       Vec<VisitNote>,
  pub legacy_data:       Option<LegacyData>,
}

/// Deserialise a field that was present in the input, keeping an explicit
/// `null` as `Some(None)`. Paired with `#[serde(default)]` so a missing
/// field stays `None`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  T: Deserialize<'de>,
  D: Deserializer<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}
