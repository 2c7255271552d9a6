use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::AppError;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

/// Rejects requests without a valid access token and stores the caller in the
/// request extensions for the `AuthUser` extractor.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => h.to_str().ok(),
        None => {
            let resp = AppError::Unauthorized("Missing Authorization header".to_string())
                .error_response();
            return Ok(req.into_response(resp));
        }
    };

    let Some(token) = header_value.and_then(|h| h.strip_prefix("Bearer ")) else {
        let resp = AppError::Unauthorized("Authorization header must start with Bearer".to_string())
            .error_response();
        return Ok(req.into_response(resp));
    };

    match AuthUser::from_token(token, &config.jwt_secret) {
        Ok(auth_user) => {
            tracing::debug!(
                user_id = auth_user.user_id,
                email = %auth_user.email,
                role = %auth_user.role,
                "Authenticated"
            );
            req.extensions_mut().insert(auth_user);
            next.call(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, path = req.path(), "Rejected token");
            Ok(req.into_response(e.error_response()))
        }
    }
}
