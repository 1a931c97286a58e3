use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    model::TourPayload,
    stats::{monthly_plan, tour_stats, STATS_MIN_RATING},
};
use crate::{
    error::AppError,
    extract::{JsonBody, Params},
    query::{build, CompareOp, Condition, Filter, QueryParams, ReadQuery},
    state::AppState,
};

const NO_TOUR: &str = "No tour found with that ID";

pub fn tour_routes() -> Router<AppState> {
    Router::new()
        .route("/tours", get(list_tours).post(create_tour))
        .route("/tours/top-5", get(top_tours))
        .route("/tours/stats", get(get_tour_stats))
        .route("/tours/year/:year", get(get_monthly_plan))
        .route(
            "/tours/:id",
            get(get_tour).patch(update_tour).delete(delete_tour),
        )
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found(NO_TOUR))
}

async fn run_listing(state: &AppState, params: &QueryParams) -> Result<Json<Value>, AppError> {
    let query = build(ReadQuery::new(), params)?;
    debug!(filter = %query.filter.to_document(), skip = query.skip, limit = ?query.limit, "tour query");
    let tours = state.tours.find(&query).await?;
    Ok(Json(json!({
        "status": "success",
        "results": tours.len(),
        "body": tours,
    })))
}

#[instrument(skip(state, params))]
pub async fn list_tours(
    State(state): State<AppState>,
    Params(params): Params,
) -> Result<Json<Value>, AppError> {
    run_listing(&state, &params).await
}

/// The five best-rated tours, cheapest first among equals.
#[instrument(skip(state, params))]
pub async fn top_tours(
    State(state): State<AppState>,
    Params(mut params): Params,
) -> Result<Json<Value>, AppError> {
    params.set("limit", "5");
    params.set("sort", "-ratingsAverage,price");
    params.set("fields", "name,price,ratingsAverage,summary,difficulty");
    run_listing(&state, &params).await
}

#[instrument(skip(state, payload))]
pub async fn create_tour(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<TourPayload>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let doc = payload.into_new_document(OffsetDateTime::now_utc())?;
    let tour = state.tours.insert(doc).await?;
    info!(tour_id = ?tour.get("id"), "tour created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "body": tour })),
    ))
}

#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    let tour = state
        .tours
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(NO_TOUR))?;
    Ok(Json(json!({ "status": "success", "body": tour })))
}

#[instrument(skip(state, payload))]
pub async fn update_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<TourPayload>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    let mut tour = state
        .tours
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(NO_TOUR))?;
    payload.apply_to(&mut tour)?;
    let tour = state
        .tours
        .replace(id, tour)
        .await?
        .ok_or_else(|| AppError::not_found(NO_TOUR))?;
    info!(tour_id = %id, "tour updated");
    Ok(Json(json!({ "status": "success", "body": tour })))
}

#[instrument(skip(state))]
pub async fn delete_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    if !state.tours.delete(id).await? {
        return Err(AppError::not_found(NO_TOUR));
    }
    info!(tour_id = %id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_tour_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let rated = Filter::new().and(Condition::new(
        "ratingsAverage",
        CompareOp::Gte,
        json!(STATS_MIN_RATING),
    ));
    let docs = state.tours.scan(&rated).await?;
    let stats = tour_stats(&docs);
    Ok(Json(json!({
        "status": "success",
        "results": stats.len(),
        "body": stats,
    })))
}

#[instrument(skip(state))]
pub async fn get_monthly_plan(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> Result<Json<Value>, AppError> {
    let year: i32 = year
        .parse()
        .ok()
        .filter(|y| (1..=9999).contains(y))
        .ok_or_else(|| AppError::validation(format!("Invalid year: {year}")))?;
    let docs = state.tours.scan(&Filter::new()).await?;
    let plan = monthly_plan(&docs, year);
    Ok(Json(json!({
        "status": "success",
        "results": plan.len(),
        "body": plan,
    })))
}
