//! JSON REST API for visit booking.
//!
//! Exposes an axum [`Router`] backed by a [`VisitService`] over any store
//! and publisher. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = visits_api::api_router(Arc::new(service));
//! ```

pub mod error;
pub mod extract;
pub mod migrate;
pub mod support;
pub mod visits;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, patch, post, put},
};
use visits_core::{
  event::EventPublisher,
  store::{SupportTypeCatalog, VisitStore},
};
use visits_service::VisitService;

pub use error::ApiError;

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, P>(service: Arc<VisitService<S, P>>) -> Router<()>
where
  S: VisitStore + SupportTypeCatalog + 'static,
  P: EventPublisher + 'static,
{
  Router::new()
    // Visits
    .route("/visits", get(visits::search::<S, P>).post(visits::create::<S, P>))
    .route("/visits/delete", post(visits::delete_many::<S, P>))
    .route(
      "/visits/{reference}",
      get(visits::get_one::<S, P>)
        .put(visits::update::<S, P>)
        .delete(visits::delete_one::<S, P>),
    )
    .route("/visits/{reference}/change", put(visits::change::<S, P>))
    .route("/visits/{reference}/cancel", patch(visits::cancel::<S, P>))
    // Migration
    .route("/migrate-visits", post(migrate::migrate::<S, P>))
    // Support catalog
    .route("/visit-support", get(support::list::<S, P>))
    .with_state(service)
}
