//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Audit timestamps are stored as RFC 3339 strings. Visit wall-clock times
//! are stored in a fixed-width ISO 8601 form so that text comparison orders
//! them correctly. Enumerations are stored by their wire names.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use visits_core::visit::{
  LegacyData, NewVisit, SupportType, Visit, VisitContact, VisitNote, VisitSupport,
  VisitVisitor,
};

use crate::{Error, Result};

const WALL_CLOCK_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f";

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDateTime ───────────────────────────────────────────────────────────

pub fn encode_wall_clock(dt: NaiveDateTime) -> String {
  dt.format(WALL_CLOCK_FORMAT).to_string()
}

pub fn decode_wall_clock(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, WALL_CLOCK_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn encode_enum(value: impl AsRef<str>) -> String { value.as_ref().to_owned() }

pub fn decode_enum<E: FromStr>(column: &'static str, s: &str) -> Result<E> {
  E::from_str(s).map_err(|_| Error::UnknownValue { column, value: s.to_owned() })
}

// ─── Write-side ──────────────────────────────────────────────────────────────

/// Column values for one aggregate, ready to move into a database closure.
pub struct EncodedVisit {
  pub prisoner_id:       String,
  pub prison_id:         String,
  pub visit_room:        String,
  pub visit_type:        String,
  pub visit_status:      String,
  pub visit_restriction: String,
  pub visit_start:       String,
  pub visit_end:         String,
  pub outcome_status:    Option<String>,
  pub contact:           Option<(String, String)>,
  pub visitors:          Vec<i64>,
  pub support:           Vec<(String, Option<String>)>,
  pub notes:             Vec<(String, String)>,
  pub lead_person_id:    Option<i64>,
}

impl EncodedVisit {
  #[allow(clippy::too_many_arguments)]
  fn build(
    prisoner_id: &str,
    prison_id: &str,
    visit_room: &str,
    visit_type: impl AsRef<str>,
    visit_status: impl AsRef<str>,
    visit_restriction: impl AsRef<str>,
    visit_start: NaiveDateTime,
    visit_end: NaiveDateTime,
    outcome_status: Option<impl AsRef<str>>,
    contact: Option<&VisitContact>,
    visitors: &[VisitVisitor],
    support: &[VisitSupport],
    notes: &[VisitNote],
    legacy: Option<&LegacyData>,
  ) -> Self {
    Self {
      prisoner_id:       prisoner_id.to_owned(),
      prison_id:         prison_id.to_owned(),
      visit_room:        visit_room.to_owned(),
      visit_type:        encode_enum(visit_type),
      visit_status:      encode_enum(visit_status),
      visit_restriction: encode_enum(visit_restriction),
      visit_start:       encode_wall_clock(visit_start),
      visit_end:         encode_wall_clock(visit_end),
      outcome_status:    outcome_status.map(encode_enum),
      contact:           contact.map(|c| (c.name.clone(), c.telephone.clone())),
      visitors:          visitors.iter().map(|v| v.nomis_person_id).collect(),
      support:           support
        .iter()
        .map(|s| (s.support_type.clone(), s.text.clone()))
        .collect(),
      notes:             notes
        .iter()
        .map(|n| (encode_enum(n.note_type), n.text.clone()))
        .collect(),
      lead_person_id:    legacy.map(|l| l.lead_person_id),
    }
  }
}

impl From<&NewVisit> for EncodedVisit {
  fn from(v: &NewVisit) -> Self {
    Self::build(
      &v.prisoner_id,
      &v.prison_id,
      &v.visit_room,
      v.visit_type,
      v.visit_status,
      v.visit_restriction,
      v.visit_start,
      v.visit_end,
      v.outcome_status,
      v.visit_contact.as_ref(),
      &v.visitors,
      &v.visitor_support,
      &v.visit_notes,
      v.legacy_data.as_ref(),
    )
  }
}

impl From<&Visit> for EncodedVisit {
  fn from(v: &Visit) -> Self {
    Self::build(
      &v.prisoner_id,
      &v.prison_id,
      &v.visit_room,
      v.visit_type,
      v.visit_status,
      v.visit_restriction,
      v.visit_start,
      v.visit_end,
      v.outcome_status,
      v.visit_contact.as_ref(),
      &v.visitors,
      &v.visitor_support,
      &v.visit_notes,
      v.legacy_data.as_ref(),
    )
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from a `visit` row and its child tables.
#[derive(Default)]
pub struct RawVisit {
  pub id:                i64,
  pub reference:         String,
  pub prisoner_id:       String,
  pub prison_id:         String,
  pub visit_room:        String,
  pub visit_type:        String,
  pub visit_status:      String,
  pub visit_restriction: String,
  pub visit_start:       String,
  pub visit_end:         String,
  pub outcome_status:    Option<String>,
  pub create_timestamp:  String,
  pub modify_timestamp:  String,
  // child tables
  pub contact:           Option<(String, String)>,
  pub visitors:          Vec<i64>,
  pub support:           Vec<(String, Option<String>)>,
  pub notes:             Vec<(String, String)>,
  pub lead_person_id:    Option<i64>,
}

impl RawVisit {
  pub fn into_visit(self) -> Result<Visit> {
    let visit_notes = self
      .notes
      .into_iter()
      .map(|(t, text)| {
        Ok(VisitNote { note_type: decode_enum("visit_notes.type", &t)?, text })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Visit {
      id:                 self.id,
      reference:          self.reference,
      prisoner_id:        self.prisoner_id,
      prison_id:          self.prison_id,
      visit_room:         self.visit_room,
      visit_type:         decode_enum("visit_type", &self.visit_type)?,
      visit_status:       decode_enum("visit_status", &self.visit_status)?,
      visit_restriction:  decode_enum("visit_restriction", &self.visit_restriction)?,
      visit_start:        decode_wall_clock(&self.visit_start)?,
      visit_end:          decode_wall_clock(&self.visit_end)?,
      outcome_status:     self
        .outcome_status
        .as_deref()
        .map(|s| decode_enum("outcome_status", s))
        .transpose()?,
      visit_contact:      self
        .contact
        .map(|(name, telephone)| VisitContact { name, telephone }),
      visitors:           self
        .visitors
        .into_iter()
        .map(|nomis_person_id| VisitVisitor { nomis_person_id })
        .collect(),
      visitor_support:    self
        .support
        .into_iter()
        .map(|(support_type, text)| VisitSupport { support_type, text })
        .collect(),
      visit_notes,
      legacy_data:        self.lead_person_id.map(|lead_person_id| LegacyData { lead_person_id }),
      created_timestamp:  decode_dt(&self.create_timestamp)?,
      modified_timestamp: decode_dt(&self.modify_timestamp)?,
    })
  }
}

/// Raw values read from a `support_type` row.
pub struct RawSupportType {
  pub code:        i64,
  pub name:        String,
  pub description: String,
}

impl From<RawSupportType> for SupportType {
  fn from(r: RawSupportType) -> Self {
    SupportType { code: r.code, name: r.name, description: r.description }
  }
}
