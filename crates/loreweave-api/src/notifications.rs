use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::Redirect,
};
use loreweave_types::api::{Claims, UnreadCountResponse};
use loreweave_types::models::Notification;

use crate::convert;
use crate::error::{ApiError, path_id};
use crate::state::AppState;

pub async fn unread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = state
        .with_db(move |db| db.unread_notifications(&user_id))
        .await?;
    Ok(Json(convert::collect_valid(rows, convert::notification)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let user_id = claims.sub.to_string();
    let unread = state.with_db(move |db| db.unread_count(&user_id)).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let notification_id = path_id(&notification_id, "notification")?;
    let user_id = claims.sub.to_string();
    let row = state
        .with_db(move |db| db.mark_notification_read(&notification_id.to_string(), &user_id))
        .await?;
    Ok(Json(convert::notification(&row)?))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let user_id = claims.sub.to_string();
    let changed = state.with_db(move |db| db.mark_all_read(&user_id)).await?;
    tracing::debug!("{} marked {} notifications read", claims.username, changed);
    Ok(StatusCode::NO_CONTENT)
}

/// Mark read and send the reader to whatever the notification points at.
pub async fn view(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let notification_id = path_id(&notification_id, "notification")?;
    let user_id = claims.sub.to_string();
    let row = state
        .with_db(move |db| db.mark_notification_read(&notification_id.to_string(), &user_id))
        .await?;

    let target = row.link.unwrap_or_else(|| "/messages".to_string());
    Ok(Redirect::to(&target))
}
