use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state, Next},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::middleware::{authorize, protect, CurrentUser, PRIVILEGED},
    error::AppError,
    state::AppState,
};

pub fn user_routes(state: AppState) -> Router<AppState> {
    let me = Router::new()
        .route("/users/me", get(get_me))
        .route_layer(from_fn_with_state(state.clone(), protect));

    // The last layer runs first: protect, then the role check.
    let admin = Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route_layer(from_fn(|req: Request, next: Next| authorize(PRIVILEGED, req, next)))
        .route_layer(from_fn_with_state(state, protect));

    me.merge(admin)
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("No user found with that ID"))
}

#[instrument(skip(current), fields(user_id = %current.0.id))]
pub async fn get_me(current: CurrentUser) -> Json<Value> {
    Json(json!({ "status": "success", "body": current.0 }))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let users = state.users.list_active().await?;
    Ok(Json(json!({
        "status": "success",
        "results": users.len(),
        "body": users,
    })))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("No user found with that ID"))?;
    Ok(Json(json!({ "status": "success", "body": user })))
}

#[instrument(skip(state, current), fields(actor_id = %current.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    if !state.users.deactivate(id).await? {
        return Err(AppError::not_found("No user found with that ID"));
    }
    info!(user_id = %id, "user deactivated");
    Ok(StatusCode::NO_CONTENT)
}
