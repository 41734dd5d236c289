use super::{ErrorBody, json_error};
use crate::otp::StepUpService;
use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// A verified state handed back to the host.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ClaimedState {
    pub state_id: String,
    pub session_id: String,
    pub auth_source: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

#[utoipa::path(
    get,
    path= "/v1/states/{state_id}",
    params(("state_id" = String, Path, description = "Handle from the resume redirect")),
    responses (
        (status = 200, description = "Verified state, removed from the store", body = ClaimedState),
        (status = 404, description = "Unknown, expired, unverified or already claimed", body = ErrorBody),
    ),
    tag= "host"
)]
// axum handler for claiming a verified state
pub async fn claim(
    service: Extension<StepUpService>,
    Path(state_id): Path<String>,
) -> impl IntoResponse {
    match service.claim(&state_id).await {
        Ok(state) => Json(ClaimedState {
            state_id,
            session_id: state.session_id,
            auth_source: state.auth_source,
            attributes: state.attributes,
        })
        .into_response(),
        Err(err) => json_error(&err),
    }
}
