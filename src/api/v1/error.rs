use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use crate::domain_model::RefreshTokenError;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, message) = if let Some(code) = err.find::<ApiErrorCode>() {
        (code.clone(), code.to_string())
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        debug!("rejected request body: {}", e);
        (ApiErrorCode::BadRequest, "Request body is not valid".to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (ApiErrorCode::BadRequest, "Query string is not valid".to_string())
    } else if err.find::<warp::reject::MissingHeader>().is_some() {
        (ApiErrorCode::Unauthorized, ApiErrorCode::Unauthorized.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            ApiErrorCode::MethodNotAllowed,
            ApiErrorCode::MethodNotAllowed.to_string(),
        )
    } else if err.is_not_found() {
        (ApiErrorCode::NotFound, "No such route".to_string())
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (ApiErrorCode::InternalError, ApiErrorCode::InternalError.to_string())
    };

    let status = code.status();
    let json = warp::reply::json(&ApiResponse::<()>::err(code, message));
    Ok(warp::reply::with_status(json, status))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Request is malformed")]
    BadRequest,
    #[error("Refresh token not found")]
    NotFound,
    #[error("Access token is not valid")]
    Unauthorized,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<SessionError> for ApiErrorCode {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::BadRequest(e) => {
                debug!("bad request: {}", e);
                ApiErrorCode::BadRequest
            }
            SessionError::NotFound => ApiErrorCode::NotFound,
            SessionError::Unauthorized(_) => ApiErrorCode::Unauthorized,
            SessionError::GenerationFailed(e) => ApiErrorCode::internal(e),
            SessionError::StorageFailed(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<RefreshTokenError> for ApiErrorCode {
    fn from(error: RefreshTokenError) -> Self {
        debug!("bad refresh token: {}", error);
        ApiErrorCode::BadRequest
    }
}
