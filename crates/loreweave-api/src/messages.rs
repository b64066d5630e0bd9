use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use loreweave_db::Rejection;
use loreweave_types::api::{Claims, Conversation, DirectMessage, SendMessageRequest};

use crate::convert;
use crate::error::ApiError;
use crate::state::AppState;

/// One entry per partner, most recent first.
pub async fn conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = state.with_db(move |db| db.conversations(&user_id)).await?;
    Ok(Json(convert::collect_valid(rows, convert::conversation)))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .notifier
        .send_private(&claims.sub.to_string(), req.to.trim(), &req.text)
        .await?;

    info!("{} -> direct message to {}", claims.sub, row.recipient_username);
    Ok((StatusCode::CREATED, Json(convert::direct_message(&row)?)))
}

/// The thread with one partner, oldest first. Opening it marks the
/// partner's messages read.
pub async fn thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<Json<Vec<DirectMessage>>, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = state
        .with_db(move |db| {
            if db.get_user_by_username(&username)?.is_none() {
                return Err(ApiError::from(Rejection::NotFound("user")));
            }
            db.mark_thread_read(&user_id, &username)?;
            Ok(db.message_thread(&user_id, &username)?)
        })
        .await?;

    Ok(Json(convert::collect_valid(rows, convert::direct_message)))
}
