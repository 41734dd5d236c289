//! Route handlers.
//!
//! Host-facing endpoints speak JSON; the OTP page speaks HTML forms.

pub mod health;
pub mod logout;
pub mod otp;
pub mod process;
pub mod root;
pub mod states;

use crate::{otp::Error, state::StateError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

/// JSON error response for host-facing endpoints.
pub(crate) fn json_error(err: &Error) -> Response {
    let status = match err {
        Error::MissingCredential => StatusCode::UNPROCESSABLE_ENTITY,
        Error::InvalidState(StateError::Unavailable(_)) | Error::Session(_) => {
            error!("{err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Error::InvalidState(_) => StatusCode::NOT_FOUND,
        Error::MalformedOtp { .. } | Error::DeviceNotAuthorized(_) => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(ErrorBody {
            error: err.user_message().to_string(),
        }),
    )
        .into_response()
}
