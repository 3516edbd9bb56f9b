use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::admission::AdmissionController;
use super::domain::{ApplicationId, OfferId, UserId};
use super::store::ApplicationStore;
use super::AssignmentError;

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ApplyRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub application_id: ApplicationId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AppLimitResponse {
    pub limit: u32,
    pub active_count: u32,
    pub remaining: u32,
}

/// Router builder exposing admission and quota lookups.
pub fn assignment_router<A>(admission: Arc<AdmissionController<A>>) -> Router
where
    A: ApplicationStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/offers/:offer_id/applications",
            post(apply_handler::<A>),
        )
        .route(
            "/api/v1/users/:user_id/application-limit",
            get(app_limit_handler::<A>),
        )
        .with_state(admission)
}

pub(crate) async fn apply_handler<A>(
    State(admission): State<Arc<AdmissionController<A>>>,
    Path(offer_id): Path<Uuid>,
    axum::Json(request): axum::Json<ApplyRequest>,
) -> Response
where
    A: ApplicationStore + 'static,
{
    match admission
        .create_application(request.user_id, OfferId(offer_id))
        .await
    {
        Ok(application_id) => (
            StatusCode::CREATED,
            axum::Json(ApplyResponse { application_id }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn app_limit_handler<A>(
    State(admission): State<Arc<AdmissionController<A>>>,
    Path(user_id): Path<Uuid>,
) -> Response
where
    A: ApplicationStore + 'static,
{
    match admission.get_user_app_limit_info(UserId(user_id)).await {
        Ok(info) => {
            let payload = AppLimitResponse {
                limit: info.limit,
                active_count: info.active_count,
                remaining: info.remaining(),
            };
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

fn error_response(err: AssignmentError) -> Response {
    let status = match &err {
        AssignmentError::OfferNotFound(_)
        | AssignmentError::OfferNotExist(_)
        | AssignmentError::UserNotFound(_) => StatusCode::NOT_FOUND,
        AssignmentError::CapacityExceeded { .. }
        | AssignmentError::QuotaExceeded { .. }
        | AssignmentError::OfferClosed(_) => StatusCode::CONFLICT,
        AssignmentError::TransientStoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}
