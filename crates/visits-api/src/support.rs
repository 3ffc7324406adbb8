//! Handler for `GET /visit-support`.

use std::sync::Arc;

use axum::{Json, extract::State};
use visits_core::{
  event::EventPublisher,
  store::{SupportTypeCatalog, VisitStore},
  visit::SupportType,
};
use visits_service::VisitService;

use crate::error::ApiError;

/// `GET /visit-support`: the support types a visit may request.
pub async fn list<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
) -> Result<Json<Vec<SupportType>>, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  Ok(Json(service.support_types().await?))
}
