use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState, geocode,
    geo::GeoPoint,
    notify::Category,
    routes::contact::EmergencyContact,
    routes::user::User,
    utils::{Claims, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{
    ALERT_TYPES, Alert, CreateAlertRequest, NearbyQuery, PRIORITY_LEVELS, RespondRequest,
};

/// 创建 SOS 告警：先校验（不产生任何写入），再落库，
/// 然后地理扇出、联系人级联、主题广播，三路互不阻塞。
#[axum::debug_handler]
pub async fn create_alert(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAlertRequest>,
) -> impl IntoResponse {
    if !ALERT_TYPES.contains(&req.alert_type.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::INVALID_STATE,
                format!("Unknown alert type: {}", req.alert_type),
            ),
        );
    }

    let priority = match &req.priority_level {
        Some(p) if !PRIORITY_LEVELS.contains(&p.as_str()) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!("Unknown priority level: {}", p),
                ),
            );
        }
        Some(p) => p.clone(),
        None => "CRITICAL".to_string(),
    };

    let center = match GeoPoint::new(req.latitude, req.longitude) {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response(error_codes::VALIDATION_ERROR, e.to_string()),
            );
        }
    };

    // 属主必须存在，任何写入之前先确认
    let owner = match User::find_by_id(&state.pool, &claims.sub).await {
        Ok(Some(user)) => user,
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
    };

    // 地理编码带超时，失败降级为坐标文本，不会卡住创建流程
    let address = geocode::address_for(&state.config, center).await;

    let alert = match Alert::create(&state.pool, &claims.sub, &req, &address, &priority).await {
        Ok(alert) => alert,
        Err(e) => {
            tracing::error!("Failed to create SOS alert: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };

    // 地理扇出：通知半径内的其他用户，无人在附近不是错误
    match User::find_within_radius(&state.pool, center, state.config.sos_notify_radius_km).await {
        Ok(nearby) => {
            let recipients: Vec<_> = nearby
                .iter()
                .filter(|u| u.user_id != claims.sub)
                .map(|u| u.as_recipient())
                .collect();
            let delivered = state
                .notifier
                .fan_out(
                    &recipients,
                    Category::SosAlert,
                    "Emergency SOS Alert Nearby",
                    "An SOS alert has been raised near your location",
                    Some(&alert.alert_id),
                )
                .await;
            tracing::info!(
                "SOS alert {} fanned out to {} nearby users",
                alert.alert_id,
                delivered
            );
        }
        Err(e) => tracing::error!("Nearby user lookup failed: {}", e),
    }

    // 紧急联系人级联：基于身份而非位置，与地理扇出互相独立
    match EmergencyContact::sos_contacts_for(&state.pool, &claims.sub).await {
        Ok(contacts) => {
            let message = format!(
                "{} has raised an SOS alert near {}",
                owner.full_name, alert.location_address
            );
            state.notifier.cascade_contacts(
                contacts.iter().map(|c| c.as_cascade_contact()).collect(),
                message,
            );
        }
        Err(e) => tracing::error!("Emergency contact lookup failed: {}", e),
    }

    // SOS 实时流广播，即发即忘
    if let Ok(payload) = serde_json::to_value(&alert) {
        state.notifier.broadcast_topic("sos", payload);
    }

    (StatusCode::CREATED, success_to_api_response(alert))
}

#[axum::debug_handler]
pub async fn respond_to_alert(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RespondRequest>,
) -> impl IntoResponse {
    let responder = match User::find_by_id(&state.pool, &claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "Responder not found".to_string()),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
            );
        }
    };

    match Alert::respond(&state.pool, &req.alert_id, &claims.sub).await {
        Ok(Some(alert)) => {
            // 通知告警发起人有人响应
            if let Ok(Some(owner)) = User::find_by_id(&state.pool, &alert.user_id).await {
                let _ = state
                    .notifier
                    .send(
                        &owner.as_recipient(),
                        Category::SosAlert,
                        "SOS Response",
                        &format!("{} is responding to your SOS alert", responder.full_name),
                        Some(&alert.alert_id),
                    )
                    .await
                    .map_err(|e| tracing::error!("Failed to notify alert owner: {}", e));
            }
            (StatusCode::OK, success_to_api_response(alert))
        }
        // 没有可认领的行：区分不存在与已被认领
        Ok(None) => match Alert::find_by_id(&state.pool, &req.alert_id).await {
            Ok(Some(existing)) => {
                let msg = match existing.parsed_status() {
                    Some(s) if !s.can_respond() => {
                        format!("Alert is already {}, cannot respond", existing.status)
                    }
                    _ => "Alert cannot be responded to".to_string(),
                };
                (
                    StatusCode::CONFLICT,
                    error_to_api_response(error_codes::INVALID_STATE, msg),
                )
            }
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "SOS alert not found".to_string()),
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
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> impl IntoResponse {
    match Alert::resolve(&state.pool, &alert_id).await {
        Ok(Some(alert)) => (StatusCode::OK, success_to_api_response(alert)),
        Ok(None) => match Alert::find_by_id(&state.pool, &alert_id).await {
            Ok(Some(existing)) => (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!("Alert is {}, cannot resolve", existing.status),
                ),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "SOS alert not found".to_string()),
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
pub async fn mark_false_alarm(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> impl IntoResponse {
    match Alert::mark_false_alarm(&state.pool, &alert_id).await {
        Ok(Some(alert)) => (StatusCode::OK, success_to_api_response(alert)),
        Ok(None) => match Alert::find_by_id(&state.pool, &alert_id).await {
            Ok(Some(existing)) => (
                StatusCode::CONFLICT,
                error_to_api_response(
                    error_codes::INVALID_STATE,
                    format!("Alert is {}, cannot mark as false alarm", existing.status),
                ),
            ),
            Ok(None) => (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "SOS alert not found".to_string()),
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
pub async fn get_active_alerts(State(state): State<AppState>) -> impl IntoResponse {
    match Alert::find_active(&state.pool).await {
        Ok(alerts) => (StatusCode::OK, success_to_api_response(alerts)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_nearby_alerts(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
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
    let radius = query
        .radius_km
        .unwrap_or(state.config.sos_notify_radius_km)
        .min(state.config.max_search_radius_km);

    match Alert::find_active_within_radius(&state.pool, &state.redis, center, radius).await {
        Ok(alerts) => (StatusCode::OK, success_to_api_response(alerts)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}

#[axum::debug_handler]
pub async fn get_my_alerts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    match Alert::find_by_user(&state.pool, &claims.sub).await {
        Ok(alerts) => (StatusCode::OK, success_to_api_response(alerts)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(error_codes::INTERNAL_ERROR, e.to_string()),
        ),
    }
}
