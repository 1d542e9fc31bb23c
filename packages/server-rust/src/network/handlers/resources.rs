//! Calendar and contact endpoints.
//!
//! Both run behind the caller pipeline, which has already identified,
//! counted, and admitted the request. Routes are matched on the whole last
//! segment and the file suffix is checked here, since the path syntax
//! cannot express a parameter followed by a literal suffix.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tracing::{debug, warn};

use super::AppState;
use crate::render::RenderError;
use crate::service::Admitted;

const CALENDAR_SUFFIX: &str = ".ics";
const CONTACT_SUFFIX: &str = ".vcf";

/// Student id the contact endpoint refuses to serve.
const SELF_TARGET: &str = "me";

/// Errors produced by resource handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The target names a caller identity that is structurally disallowed.
    #[error("You cannot access {0}")]
    InvalidCallerTarget(String),
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidCallerTarget(_) => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::Render(RenderError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Render(err) => {
                warn!(error = %err, "resource rendering failed");
                StatusCode::BAD_GATEWAY
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// `GET /{school_id}/{student_id}.ics`
///
/// # Errors
///
/// [`ApiError::NotFound`] for any other suffix, [`ApiError::Render`] when
/// the renderer fails.
pub async fn calendar_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Admitted>,
    Path((school_id, file)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let student_id = file.strip_suffix(CALENDAR_SUFFIX).ok_or(ApiError::NotFound)?;
    debug!(caller = %caller.identity(), %school_id, student_id, "rendering calendar");

    let body = state.renderer.calendar(&school_id, student_id).await?;
    Ok(([(CONTENT_TYPE, "text/calendar; charset=utf-8")], body).into_response())
}

/// `GET /{student_id}.vcf`
///
/// # Errors
///
/// [`ApiError::InvalidCallerTarget`] for `me.vcf`, [`ApiError::NotFound`]
/// for any other suffix, [`ApiError::Render`] when the renderer fails.
pub async fn contact_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Admitted>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let student_id = file.strip_suffix(CONTACT_SUFFIX).ok_or(ApiError::NotFound)?;
    if student_id == SELF_TARGET {
        return Err(ApiError::InvalidCallerTarget(SELF_TARGET.to_string()));
    }
    debug!(caller = %caller.identity(), student_id, "rendering contact");

    let body = state.renderer.contact(student_id).await?;
    Ok(([(CONTENT_TYPE, "text/vcard; charset=utf-8")], body).into_response())
}
