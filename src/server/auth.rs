//! Access gate for the API and streaming routes.
//!
//! Tokens are issued by the surrounding application; this layer only checks
//! that the request carries one of the configured tokens and then hands the
//! [`Authenticated`] capability to the handlers through request extensions.

use crate::config::AuthConfig;
use crate::delivery::Authenticated;
use crate::server::error::AppError;
use crate::server::AppContext;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    extract::cookie::CookieJar,
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeader,
};
use vodforge_core::Error;

/// Cookie carrying the access token set by the application's login flow.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Check the presented credentials against the configured tokens.
pub fn check_auth(
    auth_config: &AuthConfig,
    bearer_token: Option<&str>,
    cookie_token: Option<&str>,
) -> Result<Authenticated, Error> {
    if !auth_config.enabled {
        return Ok(Authenticated::granted());
    }

    let presented = [bearer_token, cookie_token];
    let valid = presented
        .into_iter()
        .flatten()
        .any(|token| auth_config.tokens.iter().any(|t| t == token));

    if valid {
        Ok(Authenticated::granted())
    } else {
        Err(Error::Unauthorized("authentication required".into()))
    }
}

/// Middleware that rejects unauthenticated requests with 401 and attaches
/// [`Authenticated`] to the rest.
pub async fn require_auth(
    State(ctx): State<AppContext>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let bearer_token = bearer.map(|b| b.token().to_string());
    let cookie_token = jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string());

    let auth = check_auth(
        &ctx.config.server.auth,
        bearer_token.as_deref(),
        cookie_token.as_deref(),
    )?;
    request.extensions_mut().insert(auth);

    Ok(next.run(request).await)
}
