use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use uuid::Uuid;

use crate::domain::account::User;
use super::error::ApiError;
use super::routes::AppState;

/// Header carrying the caller's user id, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The authenticated caller, resolved against the user table
#[derive(Debug, Clone)]
pub struct Identity(pub User);

impl FromRequest for Identity {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let raw = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string());

        Box::pin(async move {
            let state = state.ok_or_else(|| ApiError::internal("application state is not configured"))?;

            let raw = raw.ok_or_else(|| ApiError::unauthorized(format!("missing {} header", USER_ID_HEADER)))?;
            let user_id = Uuid::parse_str(&raw)
                .map_err(|_| ApiError::unauthorized(format!("malformed {} header", USER_ID_HEADER)))?;

            match state.store.get_user(user_id).await? {
                Some(user) => Ok(Identity(user)),
                None => Err(ApiError::unauthorized("unknown user")),
            }
        })
    }
}
