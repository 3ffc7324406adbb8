//! Lifecycle tests against an in-memory SQLite store and recording
//! publishers.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use chrono::{Duration, NaiveDateTime, Utc};
use uuid::Uuid;
use visits_core::{
  Error,
  event::{DomainEvent, EventPublisher},
  reference::ReferenceCodec,
  request::{
    ChangeVisitSlotRequest, CreateVisitRequest, LegacyContact, MigrateVisitRequest,
    OutcomeRequest, UpdateVisitRequest,
  },
  store::VisitFilter,
  visit::{
    LegacyData, OutcomeStatus, VisitContact, VisitNoteType, VisitRestriction, VisitStatus,
    VisitSupport, VisitType, VisitVisitor,
  },
};
use visits_store_sqlite::SqliteStore;

use crate::{EventNotifier, NotifierConfig, VisitService};

// ─── Test doubles ────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingPublisher {
  sent: Mutex<Vec<(String, DomainEvent, HashMap<String, String>)>>,
}

impl RecordingPublisher {
  fn events(&self) -> Vec<DomainEvent> {
    self.sent.lock().unwrap().iter().map(|(_, e, _)| e.clone()).collect()
  }
}

impl EventPublisher for RecordingPublisher {
  type Error = std::convert::Infallible;

  async fn publish(
    &self,
    topic: &str,
    payload: String,
    attributes: HashMap<String, String>,
  ) -> Result<String, Self::Error> {
    let event: DomainEvent = serde_json::from_str(&payload).unwrap();
    self.sent.lock().unwrap().push((topic.to_owned(), event, attributes));
    Ok(Uuid::new_v4().to_string())
  }
}

struct FailingPublisher;

impl EventPublisher for FailingPublisher {
  type Error = std::io::Error;

  async fn publish(
    &self,
    _topic: &str,
    _payload: String,
    _attributes: HashMap<String, String>,
  ) -> Result<String, Self::Error> {
    Err(std::io::Error::other("topic unavailable"))
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

async fn service_with<P: EventPublisher>(
  publisher: Arc<P>,
  config: NotifierConfig,
) -> VisitService<SqliteStore, P> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  VisitService::new(
    Arc::new(store),
    EventNotifier::new(publisher, config),
    ReferenceCodec::default(),
  )
}

async fn service() -> (VisitService<SqliteStore, RecordingPublisher>, Arc<RecordingPublisher>) {
  let publisher = Arc::new(RecordingPublisher::default());
  let svc = service_with(Arc::clone(&publisher), NotifierConfig::default()).await;
  (svc, publisher)
}

fn days_from_now(days: i64) -> NaiveDateTime {
  Utc::now().naive_utc() + Duration::days(days)
}

fn create_request(status: VisitStatus, start: NaiveDateTime) -> CreateVisitRequest {
  CreateVisitRequest {
    prisoner_id:       "FF0000FF".into(),
    prison_id:         "MDI".into(),
    visit_room:        "A1".into(),
    visit_type:        VisitType::Social,
    visit_status:      status,
    visit_restriction: VisitRestriction::Open,
    start_timestamp:   start,
    end_timestamp:     start + Duration::hours(1),
    visit_contact:     Some(VisitContact { name: "John Smith".into(), telephone: "01234 567890".into() }),
    visitors:          vec![VisitVisitor { nomis_person_id: 123 }],
    visitor_support:   vec![VisitSupport { support_type: "OTHER".into(), text: Some("Some Text".into()) }],
    visit_notes:       vec![],
  }
}

fn migrate_request(status: VisitStatus, start: NaiveDateTime) -> MigrateVisitRequest {
  MigrateVisitRequest {
    prisoner_id:       "FF0000AA".into(),
    prison_id:         "MDI".into(),
    visit_room:        "A1".into(),
    visit_type:        VisitType::Social,
    visit_status:      status,
    outcome_status:    None,
    visit_restriction: VisitRestriction::Open,
    start_timestamp:   start,
    end_timestamp:     start + Duration::hours(1),
    visit_contact:     None,
    visitors:          vec![VisitVisitor { nomis_person_id: 4729510 }],
    visit_notes:       vec![],
    legacy_data:       Some(LegacyData { lead_person_id: 4729510 }),
  }
}

fn prisoner_cancelled() -> Option<OutcomeRequest> {
  Some(OutcomeRequest {
    outcome_status: OutcomeStatus::PrisonerCancelled,
    text:           Some("Prisoner got covid".into()),
  })
}

// ─── Create / read ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_read_back() {
  let (svc, publisher) = service().await;
  let request = create_request(VisitStatus::Reserved, days_from_now(30));

  let created = svc.create(request.clone()).await.unwrap();
  let fetched = svc.find_by_reference(&created.reference).await.unwrap();

  assert_eq!(fetched, created);
  assert_eq!(fetched.visit_status, VisitStatus::Reserved);
  assert_eq!(fetched.visit_restriction, VisitRestriction::Open);
  assert_eq!(fetched.visit_start, request.start_timestamp);
  assert_eq!(fetched.visit_contact, request.visit_contact);
  assert_eq!(fetched.visitors, request.visitors);
  assert_eq!(fetched.visitor_support, request.visitor_support);
  assert!(fetched.outcome_status.is_none());
  assert!(fetched.legacy_data.is_none());
  assert_eq!(ReferenceCodec::default().decode(&created.reference).unwrap(), created.id as u64);

  let events = publisher.events();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].event_type, "prison-visit.booked");
  assert_eq!(events[0].additional_information.reference, created.reference);
}

#[tokio::test]
async fn create_rejects_unknown_support_without_writing() {
  let (svc, publisher) = service().await;
  let mut request = create_request(VisitStatus::Booked, days_from_now(30));
  request.visitor_support.push(VisitSupport { support_type: "ANYTHINGWILLDO".into(), text: None });

  let err = svc.create(request).await.unwrap_err();
  match err {
    Error::Validation { detail, .. } => {
      assert_eq!(detail, "Invalid support ANYTHINGWILLDO not found")
    }
    other => panic!("unexpected error: {other:?}"),
  }
  assert!(svc.search(&VisitFilter::default()).await.unwrap().is_empty());
  assert!(publisher.events().is_empty());
}

#[tokio::test]
async fn create_rejects_inverted_slot() {
  let (svc, _) = service().await;
  let mut request = create_request(VisitStatus::Booked, days_from_now(30));
  request.end_timestamp = request.start_timestamp - Duration::minutes(1);
  assert!(matches!(svc.create(request).await, Err(Error::Validation { .. })));
}

#[tokio::test]
async fn create_rejects_cancelled_status() {
  let (svc, _) = service().await;
  let request = create_request(VisitStatus::Cancelled, days_from_now(30));
  assert!(matches!(svc.create(request).await, Err(Error::Validation { .. })));
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
  let (svc, _) = service().await;
  let err = svc.find_by_reference("xx-xx-xx-xx").await.unwrap_err();
  assert!(matches!(err, Error::VisitNotFound(r) if r == "xx-xx-xx-xx"));
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_replaces_visitors() {
  let (svc, publisher) = service().await;
  let mut request = create_request(VisitStatus::Reserved, days_from_now(30));
  request.visitors = vec![VisitVisitor { nomis_person_id: 1 }, VisitVisitor { nomis_person_id: 2 }];
  let created = svc.create(request).await.unwrap();

  let updated = svc
    .update(
      &created.reference,
      UpdateVisitRequest {
        visitors: Some(vec![VisitVisitor { nomis_person_id: 3 }]),
        ..Default::default()
      },
    )
    .await
    .unwrap();

  assert_eq!(updated.visitors, vec![VisitVisitor { nomis_person_id: 3 }]);
  // Untouched fields survive.
  assert_eq!(updated.visit_contact, created.visit_contact);
  assert_eq!(updated.visitor_support, created.visitor_support);
  assert_eq!(updated.reference, created.reference);
  // Update itself announces nothing beyond the original booking.
  assert_eq!(publisher.events().len(), 1);
}

#[tokio::test]
async fn update_clears_contact_on_explicit_null() {
  let (svc, _) = service().await;
  let created = svc.create(create_request(VisitStatus::Reserved, days_from_now(30))).await.unwrap();

  let updated = svc
    .update(
      &created.reference,
      UpdateVisitRequest { visit_contact: Some(None), ..Default::default() },
    )
    .await
    .unwrap();
  assert!(updated.visit_contact.is_none());
}

#[tokio::test]
async fn update_books_a_reserved_visit() {
  let (svc, _) = service().await;
  let created = svc.create(create_request(VisitStatus::Reserved, days_from_now(30))).await.unwrap();

  let updated = svc
    .update(
      &created.reference,
      UpdateVisitRequest { visit_status: Some(VisitStatus::Booked), ..Default::default() },
    )
    .await
    .unwrap();
  assert_eq!(updated.visit_status, VisitStatus::Booked);

  let err = svc
    .update(
      &created.reference,
      UpdateVisitRequest { visit_status: Some(VisitStatus::Reserved), ..Default::default() },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn update_cannot_cancel_or_reopen() {
  let (svc, _) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();

  let err = svc
    .update(
      &created.reference,
      UpdateVisitRequest { visit_status: Some(VisitStatus::Cancelled), ..Default::default() },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { .. }));

  svc.cancel(&created.reference, prisoner_cancelled()).await.unwrap();
  let err = svc
    .update(
      &created.reference,
      UpdateVisitRequest { visit_status: Some(VisitStatus::Booked), ..Default::default() },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { .. }));
  let still = svc.find_by_reference(&created.reference).await.unwrap();
  assert_eq!(still.visit_status, VisitStatus::Cancelled);
}

#[tokio::test]
async fn update_with_bad_support_leaves_visit_untouched() {
  let (svc, _) = service().await;
  let created = svc.create(create_request(VisitStatus::Reserved, days_from_now(30))).await.unwrap();

  let err = svc
    .update(
      &created.reference,
      UpdateVisitRequest {
        visitors: Some(vec![VisitVisitor { nomis_person_id: 999 }]),
        visitor_support: Some(vec![VisitSupport { support_type: "NOPE".into(), text: None }]),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { .. }));

  let fetched = svc.find_by_reference(&created.reference).await.unwrap();
  assert_eq!(fetched.visitors, created.visitors);
}

#[tokio::test]
async fn update_unknown_reference_is_not_found() {
  let (svc, _) = service().await;
  let err = svc.update("xx-xx-xx-xx", UpdateVisitRequest::default()).await.unwrap_err();
  assert!(matches!(err, Error::VisitNotFound(_)));
}

// ─── Change booked visit ─────────────────────────────────────────────────────

#[tokio::test]
async fn change_booked_visit_publishes_changed() {
  let (svc, publisher) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();
  let new_start = days_from_now(31);

  let changed = svc
    .change_booked_visit(
      &created.reference,
      ChangeVisitSlotRequest {
        visit_restriction: Some(VisitRestriction::Closed),
        start_timestamp: Some(new_start),
        end_timestamp: Some(new_start + Duration::hours(2)),
        ..Default::default()
      },
    )
    .await
    .unwrap();

  assert_eq!(changed.visit_restriction, VisitRestriction::Closed);
  assert_eq!(changed.visit_start, new_start);
  assert_eq!(changed.visit_status, VisitStatus::Booked);

  let events = publisher.events();
  assert_eq!(events.len(), 2);
  assert_eq!(events[1].event_type, "prison-visit.changed");
  assert_eq!(events[1].description, "Prison Visit Changed");
}

#[tokio::test]
async fn change_requires_booked_status() {
  let (svc, publisher) = service().await;
  let created = svc.create(create_request(VisitStatus::Reserved, days_from_now(30))).await.unwrap();

  let err = svc
    .change_booked_visit(&created.reference, ChangeVisitSlotRequest::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Validation { .. }));
  assert_eq!(publisher.events().len(), 1);
}

// ─── Cancel ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_records_outcome_note_and_event() {
  let (svc, publisher) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();

  let cancelled = svc.cancel(&created.reference, prisoner_cancelled()).await.unwrap();

  assert_eq!(cancelled.visit_status, VisitStatus::Cancelled);
  assert_eq!(cancelled.outcome_status, Some(OutcomeStatus::PrisonerCancelled));
  let notes: Vec<_> = cancelled
    .visit_notes
    .iter()
    .filter(|n| n.note_type == VisitNoteType::VisitOutcomes)
    .collect();
  assert_eq!(notes.len(), 1);
  assert_eq!(notes[0].text, "Prisoner got covid");

  let cancellations: Vec<_> = publisher
    .events()
    .into_iter()
    .filter(|e| e.event_type == "prison-visit.cancelled")
    .collect();
  assert_eq!(cancellations.len(), 1);
  assert_eq!(cancellations[0].additional_information.reference, created.reference);
  assert_eq!(cancellations[0].prisoner_id, "FF0000FF");
}

#[tokio::test]
async fn cancel_without_text_adds_no_note() {
  let (svc, _) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();

  let cancelled = svc
    .cancel(
      &created.reference,
      Some(OutcomeRequest { outcome_status: OutcomeStatus::VisitorCancelled, text: None }),
    )
    .await
    .unwrap();
  assert!(cancelled.visit_notes.is_empty());
}

#[tokio::test]
async fn cancel_without_outcome_is_rejected() {
  let (svc, publisher) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();

  let err = svc.cancel(&created.reference, None).await.unwrap_err();
  assert!(matches!(err, Error::Validation { .. }));
  assert!(publisher.events().iter().all(|e| e.event_type != "prison-visit.cancelled"));
  let still = svc.find_by_reference(&created.reference).await.unwrap();
  assert_eq!(still.visit_status, VisitStatus::Booked);
}

#[tokio::test]
async fn cancel_twice_is_rejected() {
  let (svc, publisher) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();

  svc.cancel(&created.reference, prisoner_cancelled()).await.unwrap();
  let err = svc.cancel(&created.reference, prisoner_cancelled()).await.unwrap_err();
  assert!(matches!(err, Error::Validation { .. }));
  assert_eq!(publisher.events().len(), 2);
}

#[tokio::test]
async fn cancel_expired_visit_is_rejected_whatever_its_status() {
  let (svc, publisher) = service().await;

  for status in [VisitStatus::Booked, VisitStatus::Cancelled] {
    let reference = svc.migrate(migrate_request(status, days_from_now(-365))).await.unwrap();

    let err = svc.cancel(&reference, prisoner_cancelled()).await.unwrap_err();
    match err {
      Error::Validation { message, detail } => {
        assert_eq!(message, "trying to change / cancel an expired visit");
        assert_eq!(
          detail,
          format!("Visit with booking reference - {reference} is in the past, it cannot be cancelled")
        );
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }
  assert!(publisher.events().is_empty());
}

#[tokio::test]
async fn cancel_unknown_reference_is_not_found() {
  let (svc, _) = service().await;
  let err = svc.cancel("xx-xx-xx-xx", prisoner_cancelled()).await.unwrap_err();
  assert!(matches!(err, Error::VisitNotFound(_)));
}

// ─── Migrate ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn migrate_defaults_missing_contact_parts_and_outcome() {
  let (svc, publisher) = service().await;
  let mut request = migrate_request(VisitStatus::Reserved, days_from_now(10));
  request.visit_contact = Some(LegacyContact { name: None, telephone: Some("1234567890".into()) });

  let reference = svc.migrate(request).await.unwrap();
  let visit = svc.find_by_reference(&reference).await.unwrap();

  let contact = visit.visit_contact.unwrap();
  assert_eq!(contact.name, "UNKNOWN");
  assert_eq!(contact.telephone, "1234567890");
  assert_eq!(visit.outcome_status, Some(OutcomeStatus::NotRecorded));
  assert_eq!(visit.legacy_data, Some(LegacyData { lead_person_id: 4729510 }));
  assert!(publisher.events().is_empty());
}

#[tokio::test]
async fn migrate_without_contact_uses_placeholders() {
  let (svc, _) = service().await;
  let reference = svc.migrate(migrate_request(VisitStatus::Booked, days_from_now(10))).await.unwrap();
  let visit = svc.find_by_reference(&reference).await.unwrap();
  assert_eq!(
    visit.visit_contact,
    Some(VisitContact { name: "UNKNOWN".into(), telephone: "UNKNOWN".into() })
  );
}

#[tokio::test]
async fn migrate_trusts_given_status_and_outcome() {
  let (svc, _) = service().await;
  let mut request = migrate_request(VisitStatus::Cancelled, days_from_now(-30));
  request.outcome_status = Some(OutcomeStatus::VisitorCancelled);

  let reference = svc.migrate(request).await.unwrap();
  let visit = svc.find_by_reference(&reference).await.unwrap();
  assert_eq!(visit.visit_status, VisitStatus::Cancelled);
  assert_eq!(visit.outcome_status, Some(OutcomeStatus::VisitorCancelled));
}

// ─── Event notifier ──────────────────────────────────────────────────────────

#[tokio::test]
async fn publish_failure_surfaces_but_keeps_state() {
  let svc = service_with(Arc::new(FailingPublisher), NotifierConfig::default()).await;

  let err = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap_err();
  match err {
    Error::PublishEvent(e) => {
      assert_eq!(e.event_type, "prison-visit.booked");
      assert_eq!(e.topic, "domainevents");
    }
    other => panic!("unexpected error: {other:?}"),
  }

  let stored = svc.search(&VisitFilter::default()).await.unwrap();
  assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn disabled_notifier_skips_publication() {
  let publisher = Arc::new(RecordingPublisher::default());
  let config = NotifierConfig { enabled: false, ..Default::default() };
  let svc = service_with(Arc::clone(&publisher), config).await;

  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();
  svc.cancel(&created.reference, prisoner_cancelled()).await.unwrap();
  assert!(publisher.events().is_empty());
}

#[tokio::test]
async fn event_envelope_shape() {
  let (svc, publisher) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();

  let sent = publisher.sent.lock().unwrap();
  let (topic, event, attributes) = &sent[0];
  assert_eq!(topic, "domainevents");
  assert_eq!(attributes.get("eventType").map(String::as_str), Some("prison-visit.booked"));
  assert_eq!(event.version, 1);
  assert_eq!(event.description, "Prison Visit Booked");
  assert_eq!(event.prisoner_id, created.prisoner_id);

  let occurred = chrono::DateTime::parse_from_rfc3339(&event.occurred_at).unwrap();
  assert_eq!(occurred.with_timezone(&Utc), created.created_timestamp);
}

#[tokio::test]
async fn occurred_at_keeps_fractional_seconds() {
  let (svc, publisher) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();
  let event = publisher.events().remove(0);

  let expected = created
    .created_timestamp
    .with_timezone(&chrono_tz::Europe::London)
    .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, false);
  assert_eq!(event.occurred_at, expected);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_cancels_succeed_once() {
  let (svc, publisher) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();

  let (a, b) = tokio::join!(
    svc.cancel(&created.reference, prisoner_cancelled()),
    svc.cancel(&created.reference, prisoner_cancelled()),
  );

  assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
  let rejected = if a.is_err() { a } else { b };
  assert!(matches!(rejected, Err(Error::Validation { .. })));

  let cancellations = publisher
    .events()
    .into_iter()
    .filter(|e| e.event_type == "prison-visit.cancelled")
    .count();
  assert_eq!(cancellations, 1);

  let stored = svc.find_by_reference(&created.reference).await.unwrap();
  let outcome_notes =
    stored.visit_notes.iter().filter(|n| n.note_type == VisitNoteType::VisitOutcomes).count();
  assert_eq!(outcome_notes, 1);
}

#[tokio::test]
async fn concurrent_update_cannot_reopen_cancelled_visit() {
  let (svc, _) = service().await;
  let created = svc.create(create_request(VisitStatus::Reserved, days_from_now(30))).await.unwrap();

  let (cancelled, _) = tokio::join!(
    svc.cancel(&created.reference, prisoner_cancelled()),
    svc.update(
      &created.reference,
      UpdateVisitRequest { visit_status: Some(VisitStatus::Booked), ..Default::default() },
    ),
  );

  assert!(cancelled.is_ok());
  let stored = svc.find_by_reference(&created.reference).await.unwrap();
  assert_eq!(stored.visit_status, VisitStatus::Cancelled);
  assert_eq!(stored.outcome_status, Some(OutcomeStatus::PrisonerCancelled));
}

// ─── Search / delete ─────────────────────────────────────────────────────────

#[tokio::test]
async fn search_orders_by_start() {
  let (svc, _) = service().await;
  svc.create(create_request(VisitStatus::Booked, days_from_now(20))).await.unwrap();
  svc.create(create_request(VisitStatus::Booked, days_from_now(10))).await.unwrap();

  let found = svc
    .search(&VisitFilter { prison_id: Some("MDI".into()), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(found.len(), 2);
  assert!(found[0].visit_start < found[1].visit_start);
}

#[tokio::test]
async fn delete_is_idempotent() {
  let (svc, _) = service().await;
  let created = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();

  svc.delete(&created.reference).await.unwrap();
  svc.delete(&created.reference).await.unwrap();
  assert!(matches!(
    svc.find_by_reference(&created.reference).await,
    Err(Error::VisitNotFound(_))
  ));
}

#[tokio::test]
async fn delete_many_counts_deleted() {
  let (svc, _) = service().await;
  let a = svc.create(create_request(VisitStatus::Booked, days_from_now(30))).await.unwrap();
  let b = svc.create(create_request(VisitStatus::Booked, days_from_now(31))).await.unwrap();

  let deleted = svc
    .delete_many(&[a.reference, b.reference, "xx-xx-xx-xx".into()])
    .await
    .unwrap();
  assert_eq!(deleted, 2);
}

#[tokio::test]
async fn support_types_are_listed() {
  let (svc, _) = service().await;
  let types = svc.support_types().await.unwrap();
  assert!(types.iter().any(|t| t.name == "WHEELCHAIR"));
}
