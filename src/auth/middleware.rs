use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::services::was_password_changed_after;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::model::{Role, User};

pub const NOT_LOGGED_IN: &str = "You are not logged in. Please log in to get access";
pub const INVALID_TOKEN: &str = "Invalid or expired token. Please log in again";
pub const FORBIDDEN: &str = "You do not have permission to perform this action";

/// Roles allowed to manage other users.
pub const PRIVILEGED: &[Role] = &[Role::Owner, Role::Admin];

/// The authenticated principal, attached to the request by [`protect`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticates the bearer token and loads its principal. Every token
/// failure answers [`INVALID_TOKEN`]; the cause is only logged.
pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or_else(|| AppError::authentication(NOT_LOGGED_IN))?;

    let claims = state.tokens.verify_access_token(token).map_err(|e| {
        warn!(error = %e, "bearer token rejected");
        AppError::authentication(INVALID_TOKEN)
    })?;

    let user = state.users.find_by_id(claims.sub).await?.ok_or_else(|| {
        warn!(user_id = %claims.sub, "token for missing or inactive user");
        AppError::authentication(INVALID_TOKEN)
    })?;

    if was_password_changed_after(user.password_changed_at, claims.iat) {
        warn!(user_id = %user.id, "token predates password change");
        return Err(AppError::authentication(INVALID_TOKEN));
    }

    debug!(user_id = %user.id, role = %user.role, "request authenticated");
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Role allow-list. Must run after [`protect`].
pub async fn authorize(
    allowed: &'static [Role],
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let role = req
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(u)| u.role)
        .ok_or_else(|| AppError::authentication(NOT_LOGGED_IN))?;
    if !allowed.contains(&role) {
        warn!(role = %role, "role not allowed");
        return Err(AppError::authorization(FORBIDDEN));
    }
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::authentication(NOT_LOGGED_IN))
    }
}
