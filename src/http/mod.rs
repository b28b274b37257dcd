use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod extract;
mod handlers;
mod routes;
mod ws;

pub use auth::AuthUser;
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    let upload_max_bytes = state.upload_max_bytes;

    Router::new()
        .merge(routes::health())
        .merge(routes::auth())
        .merge(routes::users())
        .merge(routes::recipes())
        .merge(routes::categories())
        .merge(routes::notifications())
        .merge(routes::uploads(upload_max_bytes))
        .merge(routes::realtime())
        .with_state(state)
}
