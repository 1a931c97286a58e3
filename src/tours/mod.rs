use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod memory;
pub mod model;
pub mod repo;
pub mod stats;

pub use memory::MemoryTourStore;
pub use repo::{PgTourStore, TourStore};

pub fn router() -> Router<AppState> {
    handlers::tour_routes()
}
