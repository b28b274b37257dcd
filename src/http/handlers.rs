use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::{AuthService, IssuedSession};
use crate::app::categories::CategoryService;
use crate::app::engagement::EngagementService;
use crate::app::notifications::NotificationService;
use crate::app::recipes::{RecipeChanges, RecipeDraft, RecipeFilter, RecipeService};
use crate::app::social::SocialService;
use crate::app::uploads::{StoredImage, UploadService};
use crate::app::users::UserService;
use crate::domain::category::Category;
use crate::domain::comment::Comment;
use crate::domain::notification::Notification;
use crate::domain::recipe::{Difficulty, Instruction, LikeState, Recipe};
use crate::domain::user::{PublicProfile, User};
use crate::http::auth::{cleared_session_cookie, session_cookie};
use crate::http::extract::{JsonBody, PathParam, QueryParams};
use crate::http::{AppError, AuthUser};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_NAME_LEN: usize = 80;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_limit(limit: Option<i64>) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(30);
    if !(1..=200).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

/// `items` was fetched with `limit + 1`; the extra row only signals another page.
fn paginate<T>(
    mut items: Vec<T>,
    limit: i64,
    key: impl Fn(&T) -> (OffsetDateTime, Uuid),
) -> ListResponse<T> {
    let has_more = items.len() > limit as usize;
    items.truncate(limit as usize);
    let next_cursor = if has_more { items.last().map(key) } else { None };

    ListResponse {
        items,
        next_cursor: encode_cursor(next_cursor),
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: User,
    #[serde(flatten)]
    pub session: SessionResponse,
}

fn session_response(session: IssuedSession) -> SessionResponse {
    SessionResponse {
        token: session.token,
        expires_at: session.expires_at,
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.trim().split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::bad_request("name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::bad_request("name must be at most 80 characters"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at least 6 characters"));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_name(&payload.name)?;
    if !looks_like_email(&payload.email) {
        return Err(AppError::bad_request("email is invalid"));
    }
    validate_password(&payload.password)?;

    let service = AuthService::new(state.db.clone(), state.tokens.clone());
    let (user, session) = service
        .register(payload.name, payload.email, payload.password)
        .await?;

    let cookie = session_cookie(&session.token, state.tokens.ttl_seconds(), state.cookie_secure);
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(RegisterResponse {
            user,
            session: session_response(session),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("email and password are required"));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at most 128 characters"));
    }

    let service = AuthService::new(state.db.clone(), state.tokens.clone());
    let session = service
        .login(&payload.email, &payload.password)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let cookie = session_cookie(&session.token, state.tokens.ttl_seconds(), state.cookie_secure);
    Ok(([(header::SET_COOKIE, cookie)], Json(session_response(session))))
}

pub async fn logout(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let service = AuthService::new(state.db.clone(), state.tokens.clone());
    service.logout(&auth.session).await?;

    tracing::info!(user_id = %auth.user_id, "signed out");
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cleared_session_cookie(state.cookie_secure))],
    ))
}

pub async fn current_user(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    let service = UserService::new(state.db.clone(), state.presence.clone());
    let user = service
        .get_user(auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    Ok(Json(user))
}

pub async fn get_profile(
    PathParam(id): PathParam<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PublicProfile>, AppError> {
    let service = UserService::new(state.db.clone(), state.presence.clone());
    Ok(Json(service.get_profile(id).await?))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

pub async fn update_profile(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    if let Some(name) = payload.name.as_deref() {
        validate_name(name)?;
    }

    let service = UserService::new(state.db.clone(), state.presence.clone());
    let user = service
        .update_profile(auth.user_id, payload.name, payload.bio, payload.avatar)
        .await?;

    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    validate_password(&payload.new_password)?;

    let service = AuthService::new(state.db.clone(), state.tokens.clone());
    service
        .change_password(auth.user_id, &payload.current_password, &payload.new_password)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn follow_user(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    SocialService::new(state.db.clone())
        .follow(auth.user_id, id)
        .await?;
    current_user(auth, State(state)).await
}

pub async fn unfollow_user(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<User>, AppError> {
    SocialService::new(state.db.clone())
        .unfollow(auth.user_id, id)
        .await?;
    current_user(auth, State(state)).await
}

pub async fn list_user_recipes(
    PathParam(id): PathParam<Uuid>,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PaginationQuery>,
) -> Result<Json<ListResponse<Recipe>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let filter = RecipeFilter {
        author_id: Some(id),
        category_slug: None,
    };
    let recipes = RecipeService::new(state.db.clone())
        .list(filter, cursor, limit + 1)
        .await?;

    Ok(Json(paginate(recipes, limit, |recipe| (recipe.created_at, recipe.id))))
}

#[derive(Deserialize)]
pub struct RecipeListQuery {
    pub author: Option<Uuid>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

pub async fn list_recipes(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<RecipeListQuery>,
) -> Result<Json<ListResponse<Recipe>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let filter = RecipeFilter {
        author_id: query.author,
        category_slug: query.category,
    };
    let recipes = RecipeService::new(state.db.clone())
        .list(filter, cursor, limit + 1)
        .await?;

    Ok(Json(paginate(recipes, limit, |recipe| (recipe.created_at, recipe.id))))
}

#[derive(Deserialize)]
pub struct CreateRecipeRequest {
    pub title: String,
    pub image: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    pub servings: Option<i32>,
    pub cooking_time_minutes: Option<i32>,
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub categories: Vec<Uuid>,
}

pub async fn create_recipe(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<Recipe>), AppError> {
    let draft = RecipeDraft {
        title: payload.title,
        image: payload.image,
        ingredients: payload.ingredients,
        instructions: payload.instructions,
        servings: payload.servings,
        cooking_time_minutes: payload.cooking_time_minutes,
        difficulty: payload.difficulty,
        categories: payload.categories,
    };

    let recipe = RecipeService::new(state.db.clone())
        .create(auth.user_id, draft)
        .await?;

    Ok((StatusCode::CREATED, Json(recipe)))
}

pub async fn get_recipe(
    PathParam(key): PathParam<String>,
    State(state): State<AppState>,
) -> Result<Json<Recipe>, AppError> {
    let recipe = RecipeService::new(state.db.clone())
        .get(&key)
        .await?
        .ok_or_else(|| AppError::not_found("recipe not found"))?;

    Ok(Json(recipe))
}

/// Unknown fields, including `author_id`, are ignored.
#[derive(Deserialize)]
pub struct UpdateRecipeRequest {
    pub title: Option<String>,
    pub image: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub instructions: Option<Vec<Instruction>>,
    pub servings: Option<i32>,
    pub cooking_time_minutes: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub categories: Option<Vec<Uuid>>,
}

pub async fn update_recipe(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UpdateRecipeRequest>,
) -> Result<Json<Recipe>, AppError> {
    let changes = RecipeChanges {
        title: payload.title,
        image: payload.image,
        ingredients: payload.ingredients,
        instructions: payload.instructions,
        servings: payload.servings,
        cooking_time_minutes: payload.cooking_time_minutes,
        difficulty: payload.difficulty,
        categories: payload.categories,
    };

    let recipe = RecipeService::new(state.db.clone())
        .update(auth.user_id, id, changes)
        .await?;

    Ok(Json(recipe))
}

pub async fn delete_recipe(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    RecipeService::new(state.db.clone())
        .delete(auth.user_id, id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn engagement(state: &AppState) -> EngagementService {
    let notifier = NotificationService::new(state.db.clone(), state.presence.clone());
    EngagementService::new(state.db.clone(), notifier)
}

#[derive(Serialize)]
pub struct LikeResponse {
    pub state: LikeState,
    pub recipe: Recipe,
}

pub async fn toggle_like(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<LikeResponse>, AppError> {
    let (like_state, recipe) = engagement(&state).toggle_like(auth.user_id, id).await?;

    Ok(Json(LikeResponse {
        state: like_state,
        recipe,
    }))
}

#[derive(Serialize)]
pub struct FavoriteResponse {
    pub favorited: bool,
    pub favorites: Vec<Uuid>,
}

pub async fn toggle_favorite(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<FavoriteResponse>, AppError> {
    let (favorited, favorites) = engagement(&state)
        .toggle_favorite(auth.user_id, id)
        .await?;

    Ok(Json(FavoriteResponse {
        favorited,
        favorites,
    }))
}

pub async fn list_comments(
    PathParam(id): PathParam<Uuid>,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PaginationQuery>,
) -> Result<Json<ListResponse<Comment>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let comments = engagement(&state)
        .list_comments(id, cursor, limit + 1)
        .await?;

    Ok(Json(paginate(comments, limit, |comment| (comment.created_at, comment.id))))
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

pub async fn create_comment(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = engagement(&state)
        .create_comment(auth.user_id, id, &payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn update_comment(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CommentRequest>,
) -> Result<Json<Comment>, AppError> {
    let comment = engagement(&state)
        .update_comment(auth.user_id, id, &payload.content)
        .await?;

    Ok(Json(comment))
}

pub async fn delete_comment(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    engagement(&state).delete_comment(auth.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories = CategoryService::new(state.db.clone()).list().await?;
    Ok(Json(categories))
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub image: Option<String>,
}

pub async fn create_category(
    _auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name is required"));
    }

    let category = CategoryService::new(state.db.clone())
        .create(&payload.name, payload.image)
        .await?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_category_recipes(
    PathParam(slug): PathParam<String>,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PaginationQuery>,
) -> Result<Json<ListResponse<Recipe>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let category = CategoryService::new(state.db.clone())
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found("category not found"))?;

    let filter = RecipeFilter {
        author_id: None,
        category_slug: Some(category.slug),
    };
    let recipes = RecipeService::new(state.db.clone())
        .list(filter, cursor, limit + 1)
        .await?;

    Ok(Json(paginate(recipes, limit, |recipe| (recipe.created_at, recipe.id))))
}

fn notifications(state: &AppState) -> NotificationService {
    NotificationService::new(state.db.clone(), state.presence.clone())
}

#[derive(Serialize)]
pub struct BulkResponse {
    pub affected: u64,
}

pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PaginationQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let items = notifications(&state)
        .list(auth.user_id, cursor, limit + 1)
        .await?;

    Ok(Json(paginate(items, limit, |notification| {
        (notification.created_at, notification.id)
    })))
}

pub async fn mark_all_notifications_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<BulkResponse>, AppError> {
    let affected = notifications(&state).mark_all_read(auth.user_id).await?;
    Ok(Json(BulkResponse { affected }))
}

pub async fn delete_all_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<BulkResponse>, AppError> {
    let affected = notifications(&state).delete_all(auth.user_id).await?;
    tracing::debug!(user_id = %auth.user_id, affected, "notifications cleared");
    Ok(Json(BulkResponse { affected }))
}

pub async fn mark_notification_read(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Notification>, AppError> {
    let notification = notifications(&state).mark_read(id, auth.user_id).await?;
    Ok(Json(notification))
}

pub async fn delete_notification(
    PathParam(id): PathParam<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    notifications(&state).delete(id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_image(
    auth: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StoredImage>), AppError> {
    let too_large = || AppError::payload_too_large("image is larger than the upload limit");

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            AppError::bad_request(err.body_text())
        }
    })? {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|err| {
            if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large()
            } else {
                AppError::bad_request(err.body_text())
            }
        })?;
        if data.len() > state.upload_max_bytes {
            return Err(too_large());
        }

        let stored = UploadService::new(state.storage.clone())
            .store_image(auth.user_id, content_type.as_deref(), data.to_vec())
            .await?;
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(AppError::bad_request("multipart field `image` is required"))
}
