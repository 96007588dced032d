use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::auth::Identity;
use crate::application::profiles::{ProfileInput, ProfileListQuery};
use crate::application::repos::{ProfileSort, ProfileSortField, SortDirection};

use super::super::AppState;
use super::super::error::ApiError;
use super::super::models::{Envelope, ListData, ProfileBodyRequest, ProfileResponse, list_data};
use super::{
    ENTITY_CACHE_CONTROL, LIST_CACHE_CONTROL, apply_cache_headers, entity_etag,
    if_none_match_matches, not_modified,
};

#[derive(Debug, Deserialize)]
pub struct ProfilesListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
    pub company: Option<String>,
    pub sort: Option<ProfileSortField>,
    pub order: Option<SortDirection>,
}

fn into_input(body: ProfileBodyRequest) -> ProfileInput {
    ProfileInput {
        headline: body.headline,
        bio: body.bio,
        avatar_url: body.avatar_url,
        social_links: body.social_links,
    }
}

pub async fn create_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<ProfileBodyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.profiles.create(&identity, into_input(body)).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(ProfileResponse::from(profile))),
    ))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let profile = state.profiles.get(id).await?;
    let etag = entity_etag(profile.id, profile.updated_at);

    if if_none_match_matches(&headers, &etag) {
        return Ok(not_modified(&etag, ENTITY_CACHE_CONTROL));
    }

    let mut response = Json(Envelope::success(ProfileResponse::from(profile))).into_response();
    apply_cache_headers(&mut response, Some(&etag), ENTITY_CACHE_CONTROL);
    Ok(response)
}

pub async fn list_profiles(
    State(state): State<AppState>,
    Query(params): Query<ProfilesListParams>,
) -> Result<Response, ApiError> {
    let sort = ProfileSort {
        field: params.sort.unwrap_or(ProfileSortField::UpdatedAt),
        direction: params.order.unwrap_or(SortDirection::Desc),
    };
    let page = state
        .profiles
        .list(ProfileListQuery {
            page: params.page,
            page_size: params.page_size,
            search: params.search,
            company: params.company,
            sort,
        })
        .await?;

    let data: ListData<ProfileResponse> = list_data(page);
    let mut response = Json(Envelope::success(data)).into_response();
    apply_cache_headers(&mut response, None, LIST_CACHE_CONTROL);
    Ok(response)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProfileBodyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .profiles
        .update(&identity, id, into_input(body))
        .await?;
    Ok(Json(Envelope::success(ProfileResponse::from(profile))))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.profiles.delete(&identity, id).await?;
    Ok(Json(Envelope::ok()))
}
