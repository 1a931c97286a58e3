use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod memory;
pub mod model;
pub mod repo;

pub use memory::MemoryUserStore;
pub use repo::{PgUserStore, UserStore};

pub fn router(state: AppState) -> Router<AppState> {
    handlers::user_routes(state)
}
