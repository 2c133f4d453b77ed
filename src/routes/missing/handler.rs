use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppState, geocode,
    geo::GeoPoint,
    notify::Category,
    routes::user::User,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{
    CONFIDENCE_LEVELS, MissingPersonCase, ReportCaseRequest, ReportSightingRequest, Sighting,
};

#[derive(Debug, Deserialize)]
pub struct NearbyCaseQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct MarkFoundRequest {
    pub found_address: Option<String>,
}

#[axum::debug_handler]
pub async fn report_case(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReportCaseRequest>,
) -> impl IntoResponse {
    if req.person_name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "Person name is required".to_string(),
            ),
        );
    }
    if let (Some(lat), Some(lon)) = (req.last_seen_latitude, req.last_seen_longitude) {
        if let Err(e) = GeoPoint::new(lat, lon) {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(error_codes::VALIDATION_ERROR, e.to_string()),
            );
        }
    }
    if let Some(r) = req.search_radius_km {
        if r <= 0.0 {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    "search_radius_km must be positive".to_string(),
                ),
            );
        }
    }

    // 报案人必须存在，任何写入之前先确认
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

    match MissingPersonCase::create(&state.pool, &claims.sub, &req).await {
        Ok(case) => (StatusCode::CREATED, success_to_api_response(case)),
        Err(e) => {
            tracing::error!("Failed to create missing person case: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            )
        }
    }
}

/// 上报目击：落库后通知案件报案人
#[axum::debug_handler]
pub async fn report_sighting(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(case_id): Path<String>,
    Json(req): Json<ReportSightingRequest>,
) -> impl IntoResponse {
    let point = match GeoPoint::new(req.latitude, req.longitude) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(error_codes::VALIDATION_ERROR, e.to_string()),
            );
        }
    };
    if let Some(level) = &req.confidence_level {
        if !CONFIDENCE_LEVELS.contains(&level.as_str()) {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::VALIDATION_ERROR,
                    format!("Unknown confidence level: {}", level),
                ),
            );
        }
    }

    let case = match MissingPersonCase::find_by_id(&state.pool, &case_id).await {
        Ok(Some(case)) => case,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(
                    error_codes::NOT_FOUND,
                    "Missing person case not found".to_string(),
                ),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };

    let address = geocode::address_for(&state.config, point).await;

    let sighting =
        match Sighting::create(&state.pool, &case_id, &claims.sub, &req, &address).await {
            Ok(sighting) => sighting,
            Err(e) => {
                tracing::error!("Failed to record sighting: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
                );
            }
        };

    // 通知报案人有新目击
    if let Ok(Some(reporter)) = User::find_by_id(&state.pool, &case.reporter_id).await {
        let _ = state
            .notifier
            .send(
                &reporter.as_recipient(),
                Category::MissingPerson,
                "New Sighting Reported",
                &format!("{} may have been sighted near {}", case.person_name, address),
                Some(&case.case_id),
            )
            .await
            .map_err(|e| tracing::error!("Failed to notify case reporter: {}", e));
    }

    (StatusCode::CREATED, success_to_api_response(sighting))
}

#[axum::debug_handler]
pub async fn get_active_cases(State(state): State<AppState>) -> impl IntoResponse {
    match MissingPersonCase::find_active(&state.pool).await {
        Ok(cases) => (StatusCode::OK, success_to_api_response(cases)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

/// 查询点附近的案件，以各案件自己的搜寻半径为准
#[axum::debug_handler]
pub async fn get_nearby_cases(
    State(state): State<AppState>,
    Query(query): Query<NearbyCaseQuery>,
) -> impl IntoResponse {
    let point = match GeoPoint::new(query.latitude, query.longitude) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(error_codes::VALIDATION_ERROR, e.to_string()),
            );
        }
    };

    match MissingPersonCase::find_active_near(&state.pool, point).await {
        Ok(cases) => (StatusCode::OK, success_to_api_response(cases)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_case_sightings(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> impl IntoResponse {
    match Sighting::find_for_case(&state.pool, &case_id).await {
        Ok(sightings) => (StatusCode::OK, success_to_api_response(sightings)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn mark_case_found(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(req): Json<MarkFoundRequest>,
) -> impl IntoResponse {
    match MissingPersonCase::mark_found(&state.pool, &case_id, req.found_address.as_deref()).await
    {
        Ok(Some(case)) => (StatusCode::OK, success_to_api_response(case)),
        Ok(None) => match MissingPersonCase::find_by_id(&state.pool, &case_id).await {
            Ok(Some(existing)) => (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!("Case is {}, cannot mark as found", existing.status),
                ),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(
                    error_codes::NOT_FOUND,
                    "Missing person case not found".to_string(),
                ),
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
pub async fn close_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> impl IntoResponse {
    match MissingPersonCase::close(&state.pool, &case_id).await {
        Ok(Some(case)) => (StatusCode::OK, success_to_api_response(case)),
        Ok(None) => match MissingPersonCase::find_by_id(&state.pool, &case_id).await {
            Ok(Some(existing)) => (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!("Case is {}, cannot close", existing.status),
                ),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(
                    error_codes::NOT_FOUND,
                    "Missing person case not found".to_string(),
                ),
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
