use axum::extract::DefaultBodyLimit;
use axum::{routing::get, routing::post, routing::put, Router};

use crate::http::{handlers, ws};
use crate::AppState;

/// Room for multipart framing around the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
}

pub fn users() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(handlers::current_user))
        .route("/users/update", put(handlers::update_profile))
        .route("/users/change-password", put(handlers::change_password))
        .route("/users/:id/profile", get(handlers::get_profile))
        .route("/users/:id/recipes", get(handlers::list_user_recipes))
        .route("/users/:id/follow", put(handlers::follow_user))
        .route("/users/:id/unfollow", put(handlers::unfollow_user))
}

pub fn recipes() -> Router<AppState> {
    Router::new()
        .route(
            "/recipes",
            get(handlers::list_recipes).post(handlers::create_recipe),
        )
        .route(
            "/recipes/:id",
            get(handlers::get_recipe)
                .put(handlers::update_recipe)
                .delete(handlers::delete_recipe),
        )
        .route("/recipes/:id/like", put(handlers::toggle_like))
        .route("/recipes/:id/favorite", put(handlers::toggle_favorite))
        .route(
            "/recipes/:id/comments",
            get(handlers::list_comments).post(handlers::create_comment),
        )
        .route(
            "/comments/:id",
            put(handlers::update_comment).delete(handlers::delete_comment),
        )
}

pub fn categories() -> Router<AppState> {
    Router::new()
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route("/categories/:slug/recipes", get(handlers::list_category_recipes))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications",
            get(handlers::list_notifications)
                .put(handlers::mark_all_notifications_read)
                .delete(handlers::delete_all_notifications),
        )
        .route(
            "/notifications/:id",
            put(handlers::mark_notification_read).delete(handlers::delete_notification),
        )
}

pub fn uploads(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(handlers::upload_image))
        .layer(DefaultBodyLimit::max(max_bytes + MULTIPART_OVERHEAD_BYTES))
}

pub fn realtime() -> Router<AppState> {
    Router::new().route("/ws", get(ws::connect))
}
