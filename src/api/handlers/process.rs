use super::{ErrorBody, json_error};
use crate::{
    otp::{Decision, StepUpService},
    state::AuthState,
};
use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProcessRequest {
    /// Identifier of the user's session at the host.
    pub session_id: String,
    /// Identifier of the auth source the user logged in with.
    pub auth_source: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ProcessResponse {
    /// `skip`, `reuse` or `suspend`.
    pub decision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl From<Decision> for ProcessResponse {
    fn from(decision: Decision) -> Self {
        let mut response = Self {
            decision: String::new(),
            key_id: None,
            state_id: None,
            redirect_url: None,
        };
        match decision {
            Decision::Skip => response.decision = "skip".to_string(),
            Decision::Reuse { key_id } => {
                response.decision = "reuse".to_string();
                response.key_id = Some(key_id);
            }
            Decision::Suspend { state_id, redirect } => {
                response.decision = "suspend".to_string();
                response.state_id = Some(state_id);
                response.redirect_url = Some(redirect.to_string());
            }
        }
        response
    }
}

#[utoipa::path(
    post,
    path= "/v1/process",
    request_body = ProcessRequest,
    responses (
        (status = 200, description = "Whether the user has to present an OTP", body = ProcessResponse),
        (status = 422, description = "The key id attribute is missing and required", body = ErrorBody),
    ),
    tag= "host"
)]
// axum handler for the step-up decision
pub async fn process(
    service: Extension<StepUpService>,
    Json(request): Json<ProcessRequest>,
) -> impl IntoResponse {
    let mut state = AuthState::new(request.session_id, request.auth_source);
    state.attributes = request.attributes;

    match service.process(&mut state).await {
        Ok(decision) => Json(ProcessResponse::from(decision)).into_response(),
        Err(err) => json_error(&err),
    }
}
