use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppState,
    geo::GeoPoint,
    matching,
    routes::user::User,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{RegisterVolunteerRequest, Volunteer};

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct SkillsQuery {
    /// 逗号分隔的技能列表
    pub skills: String,
}

#[derive(Debug, Deserialize)]
pub struct NearbyVolunteerQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub skills: Option<String>,
}

#[axum::debug_handler]
pub async fn register_volunteer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterVolunteerRequest>,
) -> impl IntoResponse {
    if req.skills.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "At least one skill is required".to_string(),
            ),
        );
    }
    if let Some(d) = req.max_distance_km {
        if d <= 0.0 || d > state.config.max_search_radius_km {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    format!(
                        "max_distance_km must be between 0 and {}",
                        state.config.max_search_radius_km
                    ),
                ),
            );
        }
    }

    // 属主必须存在，任何写入之前先确认
    match User::find_by_id(&state.pool, &claims.sub).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "User not found".to_string()),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    }

    // 一个用户只能有一份志愿者档案
    match Volunteer::find_by_user(&state.pool, &claims.sub).await {
        Ok(Some(_)) => {
            return (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::ALREADY_REGISTERED,
                    "User is already registered as a volunteer".to_string(),
                ),
            );
        }
        Ok(None) => {}
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    }

    match Volunteer::register(&state.pool, &claims.sub, &req).await {
        Ok(volunteer) => (StatusCode::CREATED, success_to_api_response(volunteer)),
        Err(e) => {
            tracing::error!("Failed to register volunteer: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn verify_volunteer(
    State(state): State<AppState>,
    Path(volunteer_id): Path<String>,
) -> impl IntoResponse {
    match Volunteer::verify(&state.pool, &volunteer_id).await {
        Ok(Some(volunteer)) => (StatusCode::OK, success_to_api_response(volunteer)),
        Ok(None) => match Volunteer::find_by_id(&state.pool, &volunteer_id).await {
            Ok(Some(existing)) => (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!(
                        "Volunteer is {}, cannot verify",
                        existing.verification_status
                    ),
                ),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "Volunteer not found".to_string()),
            ),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            ),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn reject_volunteer(
    State(state): State<AppState>,
    Path(volunteer_id): Path<String>,
) -> impl IntoResponse {
    match Volunteer::reject(&state.pool, &volunteer_id).await {
        Ok(Some(volunteer)) => (StatusCode::OK, success_to_api_response(volunteer)),
        Ok(None) => match Volunteer::find_by_id(&state.pool, &volunteer_id).await {
            Ok(Some(existing)) => (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!(
                        "Volunteer is {}, cannot reject",
                        existing.verification_status
                    ),
                ),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "Volunteer not found".to_string()),
            ),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            ),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn update_volunteer_availability(
    State(state): State<AppState>,
    Path(volunteer_id): Path<String>,
    Json(req): Json<AvailabilityRequest>,
) -> impl IntoResponse {
    match Volunteer::update_availability(&state.pool, &volunteer_id, req.is_available).await {
        Ok(Some(volunteer)) => (StatusCode::OK, success_to_api_response(volunteer)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "Volunteer not found".to_string()),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_my_volunteer_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match Volunteer::find_by_user(&state.pool, &claims.sub).await {
        Ok(Some(volunteer)) => (StatusCode::OK, success_to_api_response(volunteer)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(
                error_codes::NOT_FOUND,
                "User is not registered as a volunteer".to_string(),
            ),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_volunteers_by_skills(
    State(state): State<AppState>,
    Query(query): Query<SkillsQuery>,
) -> impl IntoResponse {
    let skills: Vec<String> = query
        .skills
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if skills.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "At least one skill is required".to_string(),
            ),
        );
    }

    match Volunteer::find_by_skills(&state.pool, &skills).await {
        Ok(volunteers) => (StatusCode::OK, success_to_api_response(volunteers)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

/// 某位置附近可接单的志愿者，出行半径以志愿者自己声明的为准
#[axum::debug_handler]
pub async fn get_volunteers_near(
    State(state): State<AppState>,
    Query(query): Query<NearbyVolunteerQuery>,
) -> impl IntoResponse {
    let center = match GeoPoint::new(query.latitude, query.longitude) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(error_codes::VALIDATION_ERROR, e.to_string()),
            );
        }
    };
    let required: Option<Vec<String>> = query.skills.as_ref().map(|s| {
        s.split(',')
            .map(|x| x.trim().to_string())
            .filter(|x| !x.is_empty())
            .collect()
    });

    match Volunteer::pool_near(&state.pool, center, state.config.max_search_radius_km).await {
        Ok(rows) => {
            let candidates: Vec<_> = rows.iter().map(|r| r.as_candidate()).collect();
            let matched = matching::match_volunteers(center, required.as_deref(), &candidates);
            (StatusCode::OK, success_to_api_response(matched))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}
