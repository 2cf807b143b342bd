use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    auth,
    config::Config,
    error::ApiError,
    extract::{extract_candidates, ExtractOptions},
    models::{
        CreateResourceRequest, ImportCandidate, Note, Resource, ResourcePage, Role, Status,
        UpdatePatch, UserProfile,
    },
    resources::{self, ListFilters, SortKey},
    saves, scrape, update, users, AppState,
};

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

// ---- resource reads -------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub status: Option<String>,
    pub zipcode: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_resources(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ResourcePage>, ApiError> {
    let (page, limit) = paging(&state.config, params.page, params.limit)?;
    let filters = ListFilters {
        category: params.category.filter(|v| !v.trim().is_empty()),
        status: parse_status_param(params.status.as_deref())?,
        zipcode: params.zipcode.filter(|v| !v.trim().is_empty()),
        sort: parse_sort_param(params.sort.as_deref())?,
    };

    let conn = state.db.conn().await;
    Ok(Json(resources::list(&conn, &filters, page, limit)?))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn search_resources(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ResourcePage>, ApiError> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::validation("Search query is required"))?
        .to_string();
    let (page, limit) = paging(&state.config, params.page, params.limit)?;

    let conn = state.db.conn().await;
    Ok(Json(resources::search(&conn, &query, page, limit)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdatesParams {
    pub since: Option<String>,
}

pub async fn recent_updates(
    State(state): State<AppState>,
    Query(params): Query<UpdatesParams>,
) -> Result<Json<Vec<Resource>>, ApiError> {
    let since = params.since.as_deref().ok_or_else(|| {
        ApiError::validation("The \"since\" query parameter (ISO8601 timestamp) is required")
    })?;
    let since = DateTime::parse_from_rfc3339(since)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            ApiError::validation("Invalid timestamp format for \"since\" parameter (ISO8601 expected)")
        })?;

    let conn = state.db.conn().await;
    Ok(Json(resources::list_updated_since(&conn, since)?))
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Resource>, ApiError> {
    let conn = state.db.conn().await;
    Ok(Json(resources::get_by_id(&conn, id)?))
}

// ---- resource writes ------------------------------------------------------

pub async fn create_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateResourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;
    auth::require_role(&user, &[Role::CaseManager, Role::Admin])?;

    let resource = resources::create(&conn, &payload)?;
    info!(resource_id = resource.id, user_id = user.id, "Resource created");
    Ok((StatusCode::CREATED, Json(resource)))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub resources: Vec<ImportCandidate>,
}

pub async fn import_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;
    auth::require_role(&user, &[Role::Admin])?;

    if payload.resources.is_empty() {
        return Err(ApiError::validation(
            "Invalid request: resources must be a non-empty array",
        ));
    }

    let outcome = resources::bulk_create(&conn, &payload.resources)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn normalize_categories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;
    auth::require_role(&user, &[Role::Admin])?;

    let outcome = resources::normalize_categories(&conn)?;
    info!(renamed = outcome.renamed.len(), "Categories normalized");
    Ok(Json(outcome))
}

pub async fn update_resource(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(patch): Json<UpdatePatch>,
) -> Result<Json<Resource>, ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;
    auth::require_role(&user, &[Role::CaseManager, Role::Admin])?;

    Ok(Json(update::apply_update(&conn, id, &patch, &user)?))
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    #[serde(default)]
    pub content: String,
}

pub async fn add_resource_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<NoteRequest>,
) -> Result<(StatusCode, Json<Vec<Note>>), ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;
    auth::require_role(&user, &[Role::CaseManager, Role::Admin])?;

    let notes = update::add_note(&conn, id, &payload.content, &user)?;
    Ok((StatusCode::CREATED, Json(notes)))
}

// ---- bookmarks ------------------------------------------------------------

pub async fn save_resource(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;

    let outcome = saves::save(&conn, user.id, id)?;
    Ok(Json(json!({
        "saved": true,
        "alreadySaved": outcome.already_saved
    })))
}

pub async fn unsave_resource(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Resource>, ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;

    Ok(Json(saves::unsave(&conn, user.id, id)?))
}

pub async fn list_saved_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Resource>>, ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;

    Ok(Json(saves::list_saved(&conn, user.id)?))
}

// ---- import pipeline ------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub category: Option<String>,
    pub zipcode: Option<String>,
    /// Raw listing HTML; when present the remote fetch is skipped.
    pub html: Option<String>,
}

pub async fn run_scrape(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScrapeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    {
        let conn = state.db.conn().await;
        let user = auth::current_user(&conn, &headers, &state.config)?;
        auth::require_role(&user, &[Role::Admin])?;
    }

    let category = payload
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::validation("Category and zipcode are required"))?
        .to_string();

    let html = match payload.html {
        Some(html) if !html.trim().is_empty() => html,
        _ => {
            let zipcode = payload
                .zipcode
                .as_deref()
                .map(str::trim)
                .filter(|z| !z.is_empty())
                .ok_or_else(|| ApiError::validation("Category and zipcode are required"))?;
            scrape::fetch_search_page(&state.config, &category, zipcode).await?
        }
    };

    let candidates = extract_candidates(
        &html,
        &ExtractOptions {
            default_category: Some(category.clone()),
        },
    )?;

    let conn = state.db.conn().await;
    let outcome = resources::bulk_create(&conn, &candidates)?;
    info!(
        category = %category,
        candidates = candidates.len(),
        created = outcome.created_count,
        "Scrape import finished"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "count": candidates.len(),
            "createdCount": outcome.created_count,
            "errors": outcome.errors
        })),
    ))
}

// ---- identity -------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role: Option<Role>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth::validate_registration(&payload.username, &payload.password)?;
    let password_hash = auth::hash_password(&payload.password)?;

    let conn = state.db.conn().await;
    let user = users::create(
        &conn,
        payload.username.trim(),
        &password_hash,
        payload.full_name.as_deref(),
        payload.role.unwrap_or_default(),
    )?;

    info!(user_id = user.id, username = %user.username, "User registered");
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.db.conn().await;
    let user = users::find_by_username(&conn, payload.username.trim())?;

    let Some(user) = user else {
        return Err(ApiError::unauthorized("Invalid username or password"));
    };
    if !auth::verify_password(&user.password_hash, &payload.password) {
        return Err(ApiError::unauthorized("Invalid username or password"));
    }

    let token = auth::mint_token(&user, &state.config)?;
    Ok(Json(json!({ "token": token })))
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, ApiError> {
    let conn = state.db.conn().await;
    let user = auth::current_user(&conn, &headers, &state.config)?;
    Ok(Json(UserProfile::from(&user)))
}

// ---- shared parameter handling --------------------------------------------

fn paging(config: &Config, page: Option<u32>, limit: Option<u32>) -> Result<(u32, u32), ApiError> {
    let page = page.unwrap_or(1);
    if page < 1 {
        return Err(ApiError::validation("Page must be a positive integer"));
    }

    let limit = limit.unwrap_or(config.default_page_limit);
    if limit < 1 || limit > config.max_page_limit {
        return Err(ApiError::validation(format!(
            "Limit must be between 1 and {}",
            config.max_page_limit
        )));
    }

    Ok((page, limit))
}

fn parse_status_param(raw: Option<&str>) -> Result<Option<Status>, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => Status::parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::validation("Invalid status value")),
    }
}

fn parse_sort_param(raw: Option<&str>) -> Result<Option<SortKey>, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => SortKey::parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::validation("Invalid sort field")),
    }
}
