use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthLayer;
use crate::models::{Actor, ApprovalStatus, ImageUpload};
use crate::services::auth_service::{LoginRequest, LoginResponse, NewStaffAccount};
use crate::services::claims_service::{ClaimOutcome, ClaimRequest};
use crate::services::items_service::{BrowseFilters, BrowseResponse, ItemDetail, ItemDraft};
use crate::services::student_items_service::StudentReport;
use crate::services::vision_service::ItemSuggestion;
use crate::services::{
    ApprovalsService, AuthService, ClaimsService, ItemsService, NotificationsService,
    StudentItemsService, VisionService,
};

// Uploads carry full-resolution photos.
const UPLOAD_BODY_LIMIT: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub items: ItemsService,
    pub claims: ClaimsService,
    pub approvals: ApprovalsService,
    pub student_items: StudentItemsService,
    pub notifications: NotificationsService,
    pub vision: VisionService,
    pub auth: AuthService,
}

pub fn router(state: AppState, auth_layer: AuthLayer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .route("/", get(index))
        .route("/healthz", get(health))
        .route("/api/auth/login", post(login))
        // Public browse/detail/claim
        .route("/api/items", get(browse_items))
        .route("/api/items/:id", get(item_detail))
        .route("/api/items/:id/claim", post(claim_item))
        // Staff
        .route("/api/staff/items", post(upload_item))
        .route("/api/staff/items/:id", put(update_item))
        .route("/api/staff/items/analyze", post(analyze_images))
        .route("/api/staff/dashboard", get(dashboard))
        .route("/api/staff/notices", get(list_notices))
        .route("/api/staff/notices/:id/dismiss", post(dismiss_notice))
        .route(
            "/api/staff/student-items",
            post(ingest_student_item).get(list_student_items),
        )
        // Super user
        .route("/api/admin/queue", get(approval_queue))
        .route("/api/admin/items/:id/approve", post(approve_item))
        .route("/api/admin/items/:id/reject", post(reject_item))
        .route("/api/admin/student-items/:id/approve", post(approve_student_item))
        .route("/api/admin/student-items/:id/reject", post(reject_student_item))
        .route("/api/admin/users", post(create_staff_account))
        .route("/api/admin/users/:username/promote", post(promote_user))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .layer(auth_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": "lostfound",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded" })),
            )
        }
    }
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    state.auth.login(req).await.map(Json)
}

async fn browse_items(
    State(state): State<AppState>,
    Query(filters): Query<BrowseFilters>,
) -> AppResult<Json<BrowseResponse>> {
    state.items.list_public(filters).await.map(Json)
}

async fn item_detail(
    State(state): State<AppState>,
    actor: Option<Actor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ItemDetail>> {
    state.items.get_item(id, actor.as_ref()).await.map(Json)
}

async fn claim_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ClaimRequest>,
) -> AppResult<Json<ClaimOutcome>> {
    state.claims.claim(id, req).await.map(Json)
}

/// Multipart upload: text fields for the item plus any number of image
/// parts (`images` or `image_0`, `image_1`, ...).
async fn upload_item(
    State(state): State<AppState>,
    actor: Actor,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let (draft, images) = read_item_form(multipart).await?;
    let new_item = draft.validate()?;
    let detail = state.items.create_item(&actor, new_item, images).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn update_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<crate::models::ItemModel>> {
    let (draft, _images) = read_item_form(multipart).await?;
    state.items.update_item(&actor, id, draft).await.map(Json)
}

/// AJAX pre-fill: accepts the image fields alone and answers with a
/// best-effort suggestion; an empty form gets an empty suggestion.
async fn analyze_images(
    State(state): State<AppState>,
    _actor: Actor,
    multipart: Multipart,
) -> AppResult<Json<ItemSuggestion>> {
    let images = read_image_fields(multipart).await?;
    Ok(Json(state.vision.suggest(&images).await))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

async fn dashboard(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Vec<crate::services::items_service::DashboardEntry>>> {
    state
        .items
        .dashboard(&actor, query.page.unwrap_or(1))
        .await
        .map(Json)
}

async fn list_notices(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<Json<Vec<crate::models::NoticeView>>> {
    state.notifications.active_for(&actor).await.map(Json)
}

async fn dismiss_notice(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.notifications.dismiss(&actor, id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn ingest_student_item(
    State(state): State<AppState>,
    actor: Actor,
    Json(report): Json<StudentReport>,
) -> AppResult<impl IntoResponse> {
    let item = state.student_items.ingest(&actor, report).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize)]
struct StudentListQuery {
    status: Option<String>,
}

async fn list_student_items(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<StudentListQuery>,
) -> AppResult<Json<Vec<crate::models::StudentLostItemModel>>> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<ApprovalStatus>().map_err(|_| {
            AppError::validation("status", "Unknown approval status")
        })?),
    };
    state.student_items.list(&actor, status).await.map(Json)
}

async fn approval_queue(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<Json<Vec<crate::services::approvals_service::QueueEntry>>> {
    state.approvals.queue(&actor).await.map(Json)
}

async fn approve_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<crate::models::ItemModel>> {
    state
        .approvals
        .decide_item(&actor, id, ApprovalStatus::Approved)
        .await
        .map(Json)
}

async fn reject_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<crate::models::ItemModel>> {
    state
        .approvals
        .decide_item(&actor, id, ApprovalStatus::Rejected)
        .await
        .map(Json)
}

async fn approve_student_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<crate::models::StudentLostItemModel>> {
    state
        .approvals
        .decide_student_item(&actor, id, ApprovalStatus::Approved)
        .await
        .map(Json)
}

async fn reject_student_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<crate::models::StudentLostItemModel>> {
    state
        .approvals
        .decide_student_item(&actor, id, ApprovalStatus::Rejected)
        .await
        .map(Json)
}

async fn create_staff_account(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<NewStaffAccount>,
) -> AppResult<impl IntoResponse> {
    let created = state.auth.create_staff_account(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn promote_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(username): Path<String>,
) -> AppResult<Json<crate::models::UserProfileModel>> {
    state.auth.promote(&actor, &username).await.map(Json)
}

async fn read_item_form(mut multipart: Multipart) -> AppResult<(ItemDraft, Vec<ImageUpload>)> {
    let mut draft = ItemDraft::default();
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => draft.title = read_text(field).await?,
            "description" => draft.description = read_text(field).await?,
            "category" => draft.category = Some(read_text(field).await?),
            "location_found" => draft.location_found = read_text(field).await?,
            "date_found" => draft.date_found = Some(read_text(field).await?),
            "item_type" => draft.item_type = Some(read_text(field).await?),
            _ if is_image_field(&name) => {
                if let Some(image) = read_image(field).await? {
                    images.push(image);
                }
            }
            _ => {} // unknown fields are ignored
        }
    }

    Ok((draft, images))
}

async fn read_image_fields(mut multipart: Multipart) -> AppResult<Vec<ImageUpload>> {
    let mut images = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if is_image_field(&name) {
            if let Some(image) = read_image(field).await? {
                images.push(image);
            }
        }
    }
    Ok(images)
}

fn is_image_field(name: &str) -> bool {
    name == "images" || name.starts_with("image_")
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::InvalidInput(format!("unreadable form field: {e}")))
}

async fn read_image(
    field: axum::extract::multipart::Field<'_>,
) -> AppResult<Option<ImageUpload>> {
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "image/jpeg".to_string());
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::InvalidInput(format!("unreadable image field: {e}")))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(ImageUpload {
        bytes: bytes.to_vec(),
        content_type,
    }))
}
