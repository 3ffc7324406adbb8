//! Domain-event envelope and the outbound publisher contract.

use std::{collections::HashMap, future::Future};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EVENT_VERSION: u32 = 1;

/// The transitions that are announced outside the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitEventKind {
  Booked,
  Changed,
  Cancelled,
}

impl VisitEventKind {
  pub fn event_type(self) -> &'static str {
    match self {
      Self::Booked => "prison-visit.booked",
      Self::Changed => "prison-visit.changed",
      Self::Cancelled => "prison-visit.cancelled",
    }
  }

  pub fn description(self) -> &'static str {
    match self {
      Self::Booked => "Prison Visit Booked",
      Self::Changed => "Prison Visit Changed",
      Self::Cancelled => "Prison Visit Cancelled",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalInformation {
  pub reference: String,
}

/// The JSON payload published to the domain-events topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
  pub event_type:             String,
  pub version:                u32,
  pub description:            String,
  /// ISO 8601 with the UTC offset of the configured event zone.
  pub occurred_at:            String,
  pub prisoner_id:            String,
  pub additional_information: AdditionalInformation,
}

/// Raised when the transport rejects a publication. Carries enough context
/// to identify which event was lost.
#[derive(Debug, Error)]
#[error("failed to publish event {event_type} to {topic}")]
pub struct PublishEventError {
  pub event_type: String,
  pub topic:      String,
  #[source]
  pub source:     Box<dyn std::error::Error + Send + Sync>,
}

/// Abstraction over the outbound message transport.
///
/// Publication is synchronous from the caller's point of view: the returned
/// future resolves once the transport has accepted (or refused) the message.
pub trait EventPublisher: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Publish `payload` to `topic` and return the transport's message id.
  fn publish<'a>(
    &'a self,
    topic: &'a str,
    payload: String,
    attributes: HashMap<String, String>,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;
}
