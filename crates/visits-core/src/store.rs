//! The `VisitStore` and `SupportTypeCatalog` traits and supporting query
//! types.
//!
//! Storage backends (e.g. `visits-store-sqlite`) implement these traits. The
//! lifecycle service and HTTP layer depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::{
  Error,
  reference::ReferenceCodec,
  visit::{NewVisit, SupportType, Visit, VisitStatus},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`VisitStore::find_all`]. Every set field must match.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitFilter {
  pub prisoner_id:     Option<String>,
  pub prison_id:       Option<String>,
  pub visit_room:      Option<String>,
  /// Inclusive lower bound on `visit_start`.
  pub start_timestamp: Option<NaiveDateTime>,
  /// Inclusive upper bound on `visit_start`.
  pub end_timestamp:   Option<NaiveDateTime>,
  pub visit_status:    Option<VisitStatus>,
  /// Restrict to visits that include this visitor.
  pub nomis_person_id: Option<i64>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Abstraction over a visit store backend.
///
/// Every mutating method is atomic: either the whole aggregate (visit row and
/// all owned children) is written, or nothing is. Backends enforce
/// uniqueness of `reference` and of the natural keys within each owned
/// collection.
pub trait VisitStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new aggregate, assign its surrogate id, and derive its
  /// reference from that id with `codec`: all in one transaction.
  fn insert<'a>(
    &'a self,
    visit: NewVisit,
    codec: &'a ReferenceCodec,
  ) -> impl Future<Output = Result<Visit, Self::Error>> + Send + 'a;

  /// Overwrite the stored aggregate identified by `visit.id` with `visit`,
  /// replacing all owned children. `reference` and `created_timestamp` are
  /// never rewritten; `modified_timestamp` is set by the store.
  ///
  /// The write only lands if the stored `modified_timestamp` still equals
  /// `visit.modified_timestamp`; otherwise the backend reports a conflict.
  fn save<'a>(
    &'a self,
    visit: &'a Visit,
  ) -> impl Future<Output = Result<Visit, Self::Error>> + Send + 'a;

  /// Load the visit with `reference`, run `mutate` on it and write the
  /// result back, all inside one transaction.
  ///
  /// The outer `Result` carries backend failures. The inner one is the
  /// domain outcome: [`Error::VisitNotFound`] if there is no such visit, or
  /// whatever `mutate` rejected with. Nothing is written unless `mutate`
  /// returns `Ok`.
  fn update_by_reference<'a, F>(
    &'a self,
    reference: &'a str,
    mutate: F,
  ) -> impl Future<Output = Result<crate::Result<Visit>, Self::Error>> + Send + 'a
  where
    F: FnOnce(&mut Visit) -> Result<(), Error> + Send + 'static;

  fn find_by_reference<'a>(
    &'a self,
    reference: &'a str,
  ) -> impl Future<Output = Result<Option<Visit>, Self::Error>> + Send + 'a;

  fn find_by_id(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Visit>, Self::Error>> + Send + '_;

  /// All visits matching `filter`, ordered by `visit_start` ascending.
  fn find_all<'a>(
    &'a self,
    filter: &'a VisitFilter,
  ) -> impl Future<Output = Result<Vec<Visit>, Self::Error>> + Send + 'a;

  /// Hard-delete a visit and its children. Returns `false` if no visit had
  /// that reference.
  fn delete<'a>(
    &'a self,
    reference: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Hard-delete every listed visit. Unknown references are skipped; the
  /// number actually deleted is returned.
  fn delete_all_by_reference_in<'a>(
    &'a self,
    references: &'a [String],
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}

/// Read-only lookup of the support types a visit may request.
pub trait SupportTypeCatalog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn find_support_type<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<SupportType>, Self::Error>> + Send + 'a;

  fn list_support_types(
    &self,
  ) -> impl Future<Output = Result<Vec<SupportType>, Self::Error>> + Send + '_;
}
