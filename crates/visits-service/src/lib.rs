//! The visit lifecycle service and the domain-event notifier.
//!
//! Both are generic over the collaborator traits in `visits-core`, so the
//! same code runs against SQLite in production and in tests.

mod notifier;
mod service;

pub use notifier::{DEFAULT_TOPIC, EventNotifier, NotifierConfig};
pub use service::VisitService;

#[cfg(test)]
mod tests;
