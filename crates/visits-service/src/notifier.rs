//! Publication of `prison-visit.*` domain events.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use visits_core::{
  Result,
  event::{AdditionalInformation, DomainEvent, EVENT_VERSION, EventPublisher, PublishEventError, VisitEventKind},
  visit::Visit,
};

pub const DEFAULT_TOPIC: &str = "domainevents";

/// Settings resolved once at startup and fixed for the notifier's lifetime.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
  /// When `false`, publication is skipped and logged.
  pub enabled: bool,
  pub topic:   String,
  /// Zone in which `occurredAt` is expressed.
  pub zone:    Tz,
}

impl Default for NotifierConfig {
  fn default() -> Self {
    Self { enabled: true, topic: DEFAULT_TOPIC.to_owned(), zone: chrono_tz::Europe::London }
  }
}

/// Builds the event envelope for a visit transition and hands it to the
/// publisher. No retries; a transport failure becomes
/// [`PublishEventError`].
pub struct EventNotifier<P> {
  publisher: Arc<P>,
  config:    NotifierConfig,
}

impl<P> Clone for EventNotifier<P> {
  fn clone(&self) -> Self {
    Self { publisher: Arc::clone(&self.publisher), config: self.config.clone() }
  }
}

impl<P: EventPublisher> EventNotifier<P> {
  pub fn new(publisher: Arc<P>, config: NotifierConfig) -> Self { Self { publisher, config } }

  pub fn config(&self) -> &NotifierConfig { &self.config }

  pub async fn visit_booked(&self, visit: &Visit) -> Result<()> {
    self.publish(VisitEventKind::Booked, visit, visit.created_timestamp).await
  }

  pub async fn visit_changed(&self, visit: &Visit) -> Result<()> {
    self.publish(VisitEventKind::Changed, visit, visit.modified_timestamp).await
  }

  pub async fn visit_cancelled(&self, visit: &Visit) -> Result<()> {
    self.publish(VisitEventKind::Cancelled, visit, visit.modified_timestamp).await
  }

  /// The envelope that would be published for `kind` on `visit`.
  pub fn envelope(
    &self,
    kind: VisitEventKind,
    visit: &Visit,
    occurred_at: DateTime<Utc>,
  ) -> DomainEvent {
    DomainEvent {
      event_type:             kind.event_type().to_owned(),
      version:                EVENT_VERSION,
      description:            kind.description().to_owned(),
      occurred_at:            occurred_at
        .with_timezone(&self.config.zone)
        .to_rfc3339_opts(SecondsFormat::AutoSi, false),
      prisoner_id:            visit.prisoner_id.clone(),
      additional_information: AdditionalInformation { reference: visit.reference.clone() },
    }
  }

  async fn publish(
    &self,
    kind: VisitEventKind,
    visit: &Visit,
    occurred_at: DateTime<Utc>,
  ) -> Result<()> {
    let event_type = kind.event_type();
    if !self.config.enabled {
      tracing::info!(event_type, reference = %visit.reference, "event publishing disabled, skipping");
      return Ok(());
    }

    let payload = serde_json::to_string(&self.envelope(kind, visit, occurred_at))?;
    let attributes = HashMap::from([("eventType".to_owned(), event_type.to_owned())]);

    let message_id = self
      .publisher
      .publish(&self.config.topic, payload, attributes)
      .await
      .map_err(|e| PublishEventError {
        event_type: event_type.to_owned(),
        topic:      self.config.topic.clone(),
        source:     Box::new(e),
      })?;

    tracing::info!(
      message_id = %message_id,
      reference = %visit.reference,
      "{event_type}-domain-event"
    );
    Ok(())
  }
}
