use super::{ErrorBody, json_error};
use crate::otp::StepUpService;
use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    /// Number of logout handlers that ran.
    pub handlers: usize,
}

#[utoipa::path(
    post,
    path= "/v1/sessions/{session_id}/logout/{auth_source}",
    params(
        ("session_id" = String, Path, description = "Session logging out"),
        ("auth_source" = String, Path, description = "Auth source being logged out of"),
    ),
    responses (
        (status = 200, description = "Logout hooks ran", body = LogoutResponse),
        (status = 500, description = "Session store failure", body = ErrorBody),
    ),
    tag= "host"
)]
// axum handler for logout
pub async fn logout(
    service: Extension<StepUpService>,
    Path((session_id, auth_source)): Path<(String, String)>,
) -> impl IntoResponse {
    match service.logout(&session_id, &auth_source).await {
        Ok(handlers) => Json(LogoutResponse { handlers }).into_response(),
        Err(err) => json_error(&err),
    }
}
