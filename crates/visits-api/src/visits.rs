//! Handlers for `/visits` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/visits` | Body: [`CreateVisitRequest`]; returns 201 + visit |
//! | `GET`    | `/visits` | Optional `prisonerId`, `prisonId`, `visitRoom`, `startTimestamp`, `endTimestamp`, `visitStatus`, `nomisPersonId` |
//! | `GET`    | `/visits/{reference}` | 404 if not found |
//! | `PUT`    | `/visits/{reference}` | Sparse update |
//! | `PUT`    | `/visits/{reference}/change` | Slot change of a booked visit |
//! | `PATCH`  | `/visits/{reference}/cancel` | Body: `{"outcomeStatus":"...","text":"..."}` |
//! | `DELETE` | `/visits/{reference}` | 204, also for unknown references |
//! | `POST`   | `/visits/delete` | Body: list of references |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use visits_core::{
  event::EventPublisher,
  request::{ChangeVisitSlotRequest, CreateVisitRequest, OutcomeRequest, UpdateVisitRequest},
  store::{SupportTypeCatalog, VisitFilter, VisitStore},
  visit::{OutcomeStatus, Visit},
};
use visits_service::VisitService;

use crate::{
  error::ApiError,
  extract::{ValidJson, ValidQuery},
};

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /visits`
pub async fn create<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  ValidJson(body): ValidJson<CreateVisitRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  let visit = service.create(body).await?;
  Ok((StatusCode::CREATED, Json(visit)))
}

// ─── Read ─────────────────────────────────────────────────────────────────────

/// `GET /visits[?prisonerId=...&prisonId=...&...]`
pub async fn search<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  ValidQuery(filter): ValidQuery<VisitFilter>,
) -> Result<Json<Vec<Visit>>, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  Ok(Json(service.search(&filter).await?))
}

/// `GET /visits/{reference}`
pub async fn get_one<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  Path(reference): Path<String>,
) -> Result<Json<Visit>, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  Ok(Json(service.find_by_reference(&reference).await?))
}

// ─── Mutate ───────────────────────────────────────────────────────────────────

/// `PUT /visits/{reference}`
pub async fn update<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  Path(reference): Path<String>,
  ValidJson(body): ValidJson<UpdateVisitRequest>,
) -> Result<Json<Visit>, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  Ok(Json(service.update(&reference, body).await?))
}

/// `PUT /visits/{reference}/change`
pub async fn change<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  Path(reference): Path<String>,
  ValidJson(body): ValidJson<ChangeVisitSlotRequest>,
) -> Result<Json<Visit>, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  Ok(Json(service.change_booked_visit(&reference, body).await?))
}

/// Cancellation body. `outcomeStatus` may be left out, in which case the
/// lifecycle rejects the request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBody {
  pub outcome_status: Option<OutcomeStatus>,
  pub text:           Option<String>,
}

impl From<CancelBody> for Option<OutcomeRequest> {
  fn from(body: CancelBody) -> Self {
    body.outcome_status.map(|outcome_status| OutcomeRequest { outcome_status, text: body.text })
  }
}

/// `PATCH /visits/{reference}/cancel`
pub async fn cancel<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  Path(reference): Path<String>,
  ValidJson(body): ValidJson<CancelBody>,
) -> Result<Json<Visit>, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  Ok(Json(service.cancel(&reference, body.into()).await?))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /visits/{reference}`
pub async fn delete_one<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  Path(reference): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  service.delete(&reference).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /visits/delete` with body `["ab-cd-ef-gh", ...]`
pub async fn delete_many<S, P>(
  State(service): State<Arc<VisitService<S, P>>>,
  ValidJson(references): ValidJson<Vec<String>>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VisitStore + SupportTypeCatalog,
  P: EventPublisher,
{
  let deleted = service.delete_many(&references).await?;
  Ok(Json(json!({ "deleted": deleted })))
}
