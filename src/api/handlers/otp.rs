//! The page the browser is sent to while the flow is suspended.

use crate::{
    api::template,
    otp::{Error, StepUpService, Submission, error::MSG_UNEXPECTED},
    state::StateError,
};
use axum::{
    extract::{Extension, Form, Query},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{debug, error};
use utoipa::{IntoParams, ToSchema};

const MSG_MISSING_STATE: &str = "Missing StateId parameter.";

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct StateQuery {
    /// Handle of the suspended state. `AuthState` is accepted too.
    #[serde(rename = "StateId", alias = "AuthState")]
    pub state_id: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct OtpForm {
    #[serde(default, rename = "StateId", alias = "AuthState")]
    pub state_id: Option<String>,
    #[serde(default)]
    pub otp: Option<String>,
}

#[utoipa::path(
    get,
    path= "/module/yubikey/otp",
    params(StateQuery),
    responses (
        (status = 200, description = "OTP form", content_type = "text/html", body = String),
        (status = 400, description = "Missing, unknown or expired handle", content_type = "text/html", body = String),
    ),
    tag= "browser"
)]
// axum handler for the OTP form
pub async fn form(
    service: Extension<StepUpService>,
    Query(query): Query<StateQuery>,
) -> Response {
    let Some(state_id) = query.state_id else {
        return bad_request(MSG_MISSING_STATE);
    };

    match service.load_pending(&state_id).await {
        Ok(_) => otp_page(&service, &state_id, None),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path= "/module/yubikey/otp",
    params(StateQuery),
    request_body(content = OtpForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 303, description = "OTP verified, continue at the resume URL"),
        (status = 200, description = "OTP rejected, form shown again", content_type = "text/html", body = String),
        (status = 400, description = "Missing, unknown or expired handle", content_type = "text/html", body = String),
    ),
    tag= "browser"
)]
// axum handler for a submitted OTP
pub async fn submit(
    service: Extension<StepUpService>,
    Query(query): Query<StateQuery>,
    Form(form): Form<OtpForm>,
) -> Response {
    let Some(state_id) = query.state_id.or(form.state_id) else {
        return bad_request(MSG_MISSING_STATE);
    };

    // no OTP yet, just show the form
    let Some(otp) = form.otp else {
        return match service.load_pending(&state_id).await {
            Ok(_) => otp_page(&service, &state_id, None),
            Err(err) => error_response(&err),
        };
    };

    match service.submit(&state_id, otp.trim()).await {
        Ok(Submission::Verified { redirect, .. }) => {
            debug!("Resuming at {redirect}");
            Redirect::to(redirect.as_str()).into_response()
        }
        Ok(Submission::Rejected { message }) => otp_page(&service, &state_id, Some(message)),
        Err(err) => error_response(&err),
    }
}

/// The form posts back to the URL browsers were redirected to, so a path
/// prefix in the public URL survives.
fn otp_page(service: &StepUpService, state_id: &str, error: Option<&str>) -> Response {
    Html(template::otp_form(service.otp_url().path(), state_id, error)).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Html(template::error_page(message))).into_response()
}

fn error_response(err: &Error) -> Response {
    match err {
        Error::InvalidState(inner) if !matches!(inner, StateError::Unavailable(_)) => {
            debug!("{err}");
            bad_request(err.user_message())
        }
        _ => {
            error!("{err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(template::error_page(MSG_UNEXPECTED)),
            )
                .into_response()
        }
    }
}
