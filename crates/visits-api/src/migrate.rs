//! Handler for `POST /migrate-visits`.
//!
//! Imports a historical visit from the legacy system. The response body is
//! the bare booking reference.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use visits_core::{
  event::EventPublisher,
  request::MigrateVisitRequest,
  store::{SupportTypeCatalog, VisitStore},
};
use visits_service::VisitService;

use crate::{error::ApiError, extract::ValidJson};

/// `POST /migrate-visits`: returns 201 and the new reference.
pub async fn migrate<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  ValidJson(body): ValidJson<MigrateVisitRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  let reference = service.migrate(body).await?;
  Ok((StatusCode::CREATED, reference))
}
