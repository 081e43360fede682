use super::error::*;
use crate::application_port::SessionService;
use crate::domain_model::{AccessClaims, RefreshToken, TransportPair};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewSessionQuery {
    pub guid: String,
}

pub async fn new_session(
    query: NewSessionQuery,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let pair = session_service
        .new_session(&query.guid)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(TransportPair::from(
        &pair,
    ))))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Standard base64 of the raw refresh value.
    pub refresh: String,
}

pub async fn refresh_session(
    body: RefreshRequest,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let presented = RefreshToken::decode_transport(&body.refresh)
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let pair = session_service
        .refresh_session(&presented)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(TransportPair::from(
        &pair,
    ))))
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}

pub async fn revoke_session(
    body: RefreshRequest,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let presented = RefreshToken::decode_transport(&body.refresh)
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    session_service
        .revoke_session(&presented)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(RevokeResponse {
        revoked: true,
    })))
}

pub async fn verify_access(claims: AccessClaims) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(claims)))
}
