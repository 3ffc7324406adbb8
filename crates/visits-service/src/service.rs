//! [`VisitService`]: the visit lifecycle.
//!
//! Every mutation of an existing visit runs through
//! [`VisitStore::update_by_reference`]: load, transition checks and write
//! happen in one store transaction, so concurrent requests see each other's
//! committed state and a rejected request leaves nothing behind.
//!
//! Domain events are published after the store call returns. A publish
//! failure is reported to the caller but does not undo the stored change.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use visits_core::{
  Error, Result,
  event::EventPublisher,
  reference::ReferenceCodec,
  request::{
    ChangeVisitSlotRequest, CreateVisitRequest, MigrateVisitRequest, OutcomeRequest,
    UpdateVisitRequest,
  },
  store::{SupportTypeCatalog, VisitFilter, VisitStore},
  visit::{
    NewVisit, OutcomeStatus, SupportType, UNKNOWN, Visit, VisitContact, VisitNoteType,
    VisitStatus, VisitSupport, dedup_support, dedup_visitors,
  },
};

use crate::notifier::EventNotifier;

const EXPIRED_MESSAGE: &str = "trying to change / cancel an expired visit";

pub struct VisitService<S, P> {
  store:    Arc<S>,
  notifier: EventNotifier<P>,
  codec:    ReferenceCodec,
  zone:     Tz,
}

impl<S, P> Clone for VisitService<S, P> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      notifier: self.notifier.clone(),
      codec:    self.codec.clone(),
      zone:     self.zone,
    }
  }
}

impl<S, P> VisitService<S, P>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  /// Visit times are interpreted in the notifier's configured zone.
  pub fn new(store: Arc<S>, notifier: EventNotifier<P>, codec: ReferenceCodec) -> Self {
    let zone = notifier.config().zone;
    Self { store, notifier, codec, zone }
  }

  // ─── Lifecycle ─────────────────────────────────────────────────────────────

  /// Book a new visit and announce it.
  pub async fn create(&self, request: CreateVisitRequest) -> Result<Visit> {
    tracing::info!(prisoner_id = %request.prisoner_id, prison_id = %request.prison_id, "creating visit");

    if request.visit_status.is_terminal() {
      return Err(Error::validation(
        "Invalid visit status",
        format!("a visit cannot be created as {}", request.visit_status),
      ));
    }
    validate_slot(request.start_timestamp, request.end_timestamp)?;
    self.validate_support(&request.visitor_support).await?;

    let new_visit = NewVisit {
      prisoner_id:       request.prisoner_id,
      prison_id:         request.prison_id,
      visit_room:        request.visit_room,
      visit_type:        request.visit_type,
      visit_status:      request.visit_status,
      visit_restriction: request.visit_restriction,
      visit_start:       request.start_timestamp,
      visit_end:         request.end_timestamp,
      outcome_status:    None,
      visit_contact:     request.visit_contact,
      visitors:          dedup_visitors(request.visitors),
      visitor_support:   dedup_support(request.visitor_support),
      visit_notes:       request.visit_notes,
      legacy_data:       None,
    };

    let visit = self.store.insert(new_visit, &self.codec).await.map_err(Error::store)?;
    tracing::info!(reference = %visit.reference, "visit created");

    self.notifier.visit_booked(&visit).await?;
    Ok(visit)
  }

  /// Apply a sparse update. Publishes nothing.
  pub async fn update(&self, reference: &str, request: UpdateVisitRequest) -> Result<Visit> {
    tracing::info!(reference, "updating visit");

    if let Some(support) = &request.visitor_support {
      self.validate_support(support).await?;
    }
    let now = self.now();

    self
      .mutate(reference, move |visit| {
        if visit.visit_status.is_terminal() {
          return Err(Error::validation(
            "Invalid visit status",
            format!(
              "Visit with booking reference - {} is cancelled, it cannot be changed",
              visit.reference
            ),
          ));
        }
        ensure_not_expired(visit, now, "changed")?;
        apply_update(visit, request)
      })
      .await
  }

  /// Move a booked visit to a different slot and announce the change.
  pub async fn change_booked_visit(
    &self,
    reference: &str,
    request: ChangeVisitSlotRequest,
  ) -> Result<Visit> {
    tracing::info!(reference, "changing booked visit");

    let request: UpdateVisitRequest = request.into();
    if let Some(support) = &request.visitor_support {
      self.validate_support(support).await?;
    }
    let now = self.now();

    let visit = self
      .mutate(reference, move |visit| {
        ensure_not_expired(visit, now, "changed")?;
        if visit.visit_status != VisitStatus::Booked {
          return Err(Error::validation(
            "Invalid visit status",
            format!(
              "Visit with booking reference - {} is {}, only BOOKED visits can be changed",
              visit.reference, visit.visit_status
            ),
          ));
        }
        apply_update(visit, request)
      })
      .await?;

    self.notifier.visit_changed(&visit).await?;
    Ok(visit)
  }

  /// Cancel a visit, recording why, and announce it.
  ///
  /// Expiry is checked before anything else, so an expired visit is
  /// rejected whatever its status.
  pub async fn cancel(&self, reference: &str, outcome: Option<OutcomeRequest>) -> Result<Visit> {
    tracing::info!(reference, "cancelling visit");

    let now = self.now();

    let visit = self
      .mutate(reference, move |visit| {
        ensure_not_expired(visit, now, "cancelled")?;

        let Some(outcome) = outcome else {
          return Err(Error::validation(
            "Outcome status is required",
            format!(
              "Visit with booking reference - {} cannot be cancelled without an outcome",
              visit.reference
            ),
          ));
        };
        if visit.visit_status.is_terminal() {
          return Err(Error::validation(
            "Visit already cancelled",
            format!("Visit with booking reference - {} is already cancelled", visit.reference),
          ));
        }

        visit.visit_status = VisitStatus::Cancelled;
        visit.outcome_status = Some(outcome.outcome_status);
        if let Some(text) = outcome.text {
          visit.add_note(VisitNoteType::VisitOutcomes, text);
        }
        Ok(())
      })
      .await?;

    self.notifier.visit_cancelled(&visit).await?;
    Ok(visit)
  }

  /// Import a historical visit exactly as the legacy system recorded it.
  /// Returns the new booking reference.
  pub async fn migrate(&self, request: MigrateVisitRequest) -> Result<String> {
    validate_slot(request.start_timestamp, request.end_timestamp)?;

    let contact = request.visit_contact.unwrap_or_default();
    let new_visit = NewVisit {
      prisoner_id:       request.prisoner_id,
      prison_id:         request.prison_id,
      visit_room:        request.visit_room,
      visit_type:        request.visit_type,
      visit_status:      request.visit_status,
      visit_restriction: request.visit_restriction,
      visit_start:       request.start_timestamp,
      visit_end:         request.end_timestamp,
      outcome_status:    Some(request.outcome_status.unwrap_or_default()),
      visit_contact:     Some(VisitContact {
        name:      contact.name.unwrap_or_else(|| UNKNOWN.to_owned()),
        telephone: contact.telephone.unwrap_or_else(|| UNKNOWN.to_owned()),
      }),
      visitors:          dedup_visitors(request.visitors),
      visitor_support:   Vec::new(),
      visit_notes:       request.visit_notes,
      legacy_data:       request.legacy_data,
    };

    let visit = self.store.insert(new_visit, &self.codec).await.map_err(Error::store)?;

    tracing::info!(
      reference = %visit.reference,
      prisoner_id = %visit.prisoner_id,
      prison_id = %visit.prison_id,
      visit_type = %visit.visit_type,
      visit_room = %visit.visit_room,
      visit_restriction = %visit.visit_restriction,
      visit_start = %visit.visit_start,
      visit_status = %visit.visit_status,
      outcome_status = %visit.outcome_status.unwrap_or(OutcomeStatus::NotRecorded),
      "visit-scheduler-prison-visit-migrated"
    );

    Ok(visit.reference)
  }

  // ─── Queries ───────────────────────────────────────────────────────────────

  pub async fn find_by_reference(&self, reference: &str) -> Result<Visit> {
    self.load(reference).await
  }

  pub async fn search(&self, filter: &VisitFilter) -> Result<Vec<Visit>> {
    self.store.find_all(filter).await.map_err(Error::store)
  }

  pub async fn support_types(&self) -> Result<Vec<SupportType>> {
    self.store.list_support_types().await.map_err(Error::store)
  }

  // ─── Administrative deletes ────────────────────────────────────────────────

  /// Hard-delete a visit. Unknown references are logged and ignored.
  pub async fn delete(&self, reference: &str) -> Result<()> {
    if self.store.delete(reference).await.map_err(Error::store)? {
      tracing::info!(reference, "visit deleted");
    } else {
      tracing::info!(reference, "visit reference {reference} not found, nothing to delete");
    }
    Ok(())
  }

  pub async fn delete_many(&self, references: &[String]) -> Result<u64> {
    let deleted = self
      .store
      .delete_all_by_reference_in(references)
      .await
      .map_err(Error::store)?;
    tracing::info!(requested = references.len(), deleted, "visits deleted");
    Ok(deleted)
  }

  // ─── Helpers ───────────────────────────────────────────────────────────────

  async fn load(&self, reference: &str) -> Result<Visit> {
    match self.store.find_by_reference(reference).await.map_err(Error::store)? {
      Some(visit) => Ok(visit),
      None => {
        tracing::info!(reference, "visit reference {reference} not found");
        Err(Error::VisitNotFound(reference.to_owned()))
      }
    }
  }

  /// Run `f` against the stored visit inside one store transaction.
  async fn mutate<F>(&self, reference: &str, f: F) -> Result<Visit>
  where
    F: FnOnce(&mut Visit) -> Result<()> + Send + 'static,
  {
    let outcome = self.store.update_by_reference(reference, f).await.map_err(Error::store)?;
    if let Err(Error::VisitNotFound(_)) = &outcome {
      tracing::info!(reference, "visit reference {reference} not found");
    }
    outcome
  }

  /// Current wall-clock time in the configured zone.
  fn now(&self) -> NaiveDateTime { Utc::now().with_timezone(&self.zone).naive_local() }

  async fn validate_support(&self, support: &[VisitSupport]) -> Result<()> {
    for entry in support {
      let found = self
        .store
        .find_support_type(&entry.support_type)
        .await
        .map_err(Error::store)?;
      if found.is_none() {
        return Err(Error::validation(
          "Invalid support",
          format!("Invalid support {} not found", entry.support_type),
        ));
      }
    }
    Ok(())
  }
}

fn ensure_not_expired(visit: &Visit, now: NaiveDateTime, action: &str) -> Result<()> {
  if visit.is_expired(now) {
    return Err(Error::validation(
      EXPIRED_MESSAGE,
      format!(
        "Visit with booking reference - {} is in the past, it cannot be {action}",
        visit.reference
      ),
    ));
  }
  Ok(())
}

/// Apply the fields present in `request` to `visit`. Collections are
/// replaced wholesale. Support types must already have been validated.
fn apply_update(visit: &mut Visit, request: UpdateVisitRequest) -> Result<()> {
  if let Some(status) = request.visit_status {
    if !visit.visit_status.can_become(status) {
      return Err(Error::validation(
        "Invalid visit status",
        format!(
          "Visit with booking reference - {} cannot move from {} to {status}",
          visit.reference, visit.visit_status
        ),
      ));
    }
    visit.visit_status = status;
  }

  if let Some(prisoner_id) = request.prisoner_id {
    visit.prisoner_id = prisoner_id;
  }
  if let Some(prison_id) = request.prison_id {
    visit.prison_id = prison_id;
  }
  if let Some(visit_room) = request.visit_room {
    visit.visit_room = visit_room;
  }
  if let Some(visit_type) = request.visit_type {
    visit.visit_type = visit_type;
  }
  if let Some(restriction) = request.visit_restriction {
    visit.visit_restriction = restriction;
  }
  if let Some(start) = request.start_timestamp {
    visit.visit_start = start;
  }
  if let Some(end) = request.end_timestamp {
    visit.visit_end = end;
  }
  if let Some(contact) = request.visit_contact {
    visit.visit_contact = contact;
  }
  if let Some(visitors) = request.visitors {
    visit.replace_visitors(visitors);
  }
  if let Some(support) = request.visitor_support {
    visit.replace_support(support);
  }

  validate_slot(visit.visit_start, visit.visit_end)
}

fn validate_slot(start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
  if start >= end {
    return Err(Error::validation(
      "Invalid visit slot",
      format!("visit start {start} must be before visit end {end}"),
    ));
  }
  Ok(())
}
