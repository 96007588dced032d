use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::auth::Identity;
use crate::application::experiences::{ExperienceInput, ExperienceListQuery};

use super::super::AppState;
use super::super::error::ApiError;
use super::super::models::{
    Envelope, ExperienceBodyRequest, ExperienceCreateRequest, ExperienceResponse, ListData,
    list_data,
};
use super::{
    ENTITY_CACHE_CONTROL, LIST_CACHE_CONTROL, apply_cache_headers, entity_etag,
    if_none_match_matches, not_modified,
};

#[derive(Debug, Deserialize)]
pub struct ExperiencesListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub company: Option<String>,
    pub search: Option<String>,
    pub profile_id: Option<Uuid>,
}

fn into_input(body: ExperienceBodyRequest) -> ExperienceInput {
    ExperienceInput {
        title: body.title,
        company: body.company,
        start_date: body.start_date,
        end_date: body.end_date,
        description: body.description,
    }
}

pub async fn create_experience(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ExperienceCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let experience = state
        .experiences
        .create(&identity, request.profile_id, into_input(request.body))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(ExperienceResponse::from(experience))),
    ))
}

pub async fn get_experience(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let experience = state.experiences.get(id).await?;
    let etag = entity_etag(experience.id, experience.updated_at);

    if if_none_match_matches(&headers, &etag) {
        return Ok(not_modified(&etag, ENTITY_CACHE_CONTROL));
    }

    let mut response =
        Json(Envelope::success(ExperienceResponse::from(experience))).into_response();
    apply_cache_headers(&mut response, Some(&etag), ENTITY_CACHE_CONTROL);
    Ok(response)
}

pub async fn list_experiences(
    State(state): State<AppState>,
    Query(params): Query<ExperiencesListParams>,
) -> Result<Response, ApiError> {
    let page = state
        .experiences
        .list(ExperienceListQuery {
            page: params.page,
            page_size: params.page_size,
            profile_id: params.profile_id,
            company: params.company,
            search: params.search,
        })
        .await?;

    let data: ListData<ExperienceResponse> = list_data(page);
    let mut response = Json(Envelope::success(data)).into_response();
    apply_cache_headers(&mut response, None, LIST_CACHE_CONTROL);
    Ok(response)
}

/// `GET /api/v1/profiles/{id}/experiences` — the same listing scoped to
/// one profile through the path.
pub async fn list_profile_experiences(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
    Query(params): Query<ExperiencesListParams>,
) -> Result<Response, ApiError> {
    // Surface a 404 for an unknown parent rather than an empty page.
    state.profiles.get(profile_id).await?;

    let page = state
        .experiences
        .list(ExperienceListQuery {
            page: params.page,
            page_size: params.page_size,
            profile_id: Some(profile_id),
            company: params.company,
            search: params.search,
        })
        .await?;

    let data: ListData<ExperienceResponse> = list_data(page);
    let mut response = Json(Envelope::success(data)).into_response();
    apply_cache_headers(&mut response, None, LIST_CACHE_CONTROL);
    Ok(response)
}

pub async fn update_experience(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(body): Json<ExperienceBodyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let experience = state
        .experiences
        .update(&identity, id, into_input(body))
        .await?;
    Ok(Json(Envelope::success(ExperienceResponse::from(experience))))
}

pub async fn delete_experience(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.experiences.delete(&identity, id).await?;
    Ok(Json(Envelope::ok()))
}
