use super::error::*;
use super::handler;
use crate::application_port::SessionService;
use crate::domain_model::{AccessClaims, AccessToken};
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

/// `/api/v1` with error recovery, as served by the binary.
pub fn mount(
    session_service: Arc<dyn SessionService>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    warp::path("api")
        .and(warp::path("v1"))
        .and(routes(session_service))
        .recover(recover_error)
}

pub fn routes(
    session_service: Arc<dyn SessionService>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let new_session = warp::path("tokens")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<handler::NewSessionQuery>())
        .and(with(session_service.clone()))
        .and_then(handler::new_session);

    let refresh = warp::path!("tokens" / "refresh")
        .and(warp::post())
        .and(warp::body::json())
        .and(with(session_service.clone()))
        .and_then(handler::refresh_session);

    let revoke = warp::path!("tokens" / "revoke")
        .and(warp::post())
        .and(warp::body::json())
        .and(with(session_service.clone()))
        .and_then(handler::revoke_session);

    let verify = warp::path!("tokens" / "verify")
        .and(warp::get())
        .and(with_verification(session_service))
        .and_then(handler::verify_access);

    new_session.or(refresh).or(revoke).or(verify)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_verification(
    session_service: Arc<dyn SessionService>,
) -> impl Filter<Extract = (AccessClaims,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let session_service = session_service.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let claims = session_service
                    .verify_access(&AccessToken(token.to_string()))
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(claims)
            } else {
                Err(reject::custom(ApiErrorCode::Unauthorized))
            }
        }
    })
}
