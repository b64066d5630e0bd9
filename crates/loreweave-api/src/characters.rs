use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use loreweave_types::api::{
    CharacterDetailResponse, CharacterListResponse, Claims, CreateCharacterRequest,
};
use loreweave_types::models::Character;

use crate::convert;
use crate::error::{ApiError, path_id};
use crate::state::AppState;

/// All characters with refreshed lore points, the caller's own split out.
pub async fn list_characters(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CharacterListResponse>, ApiError> {
    let rows = state.with_db(|db| db.list_characters_refreshed()).await?;

    let me = claims.sub.to_string();
    let (mine, others): (Vec<_>, Vec<_>) = rows.into_iter().partition(|c| c.user_id == me);

    let current_user_character = match mine.first() {
        Some(row) => Some(convert::character(row)?),
        None => None,
    };

    Ok(Json(CharacterListResponse {
        current_user_character,
        other_characters: convert::collect_valid(others, convert::character),
    }))
}

pub async fn create_character(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCharacterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let row = state
        .with_db(move |db| db.create_character(&user_id, &req.name, &req.description))
        .await?;

    tracing::info!("{} created character {}", claims.username, row.name);
    let character: Character = convert::character(&row)?;
    Ok((StatusCode::CREATED, Json(character)))
}

/// Character with refreshed points and the stories its owner created or
/// wrote parts for.
pub async fn get_character(
    State(state): State<AppState>,
    Path(character_id): Path<String>,
) -> Result<Json<CharacterDetailResponse>, ApiError> {
    let character_id = path_id(&character_id, "character")?;
    let (row, created, contributed) = state
        .with_db(move |db| {
            let row = db.refresh_lore_points(&character_id.to_string())?;
            let created = db.stories_created_by_user(&row.user_id)?;
            let contributed = db.stories_contributed_by_user(&row.user_id)?;
            Ok::<_, ApiError>((row, created, contributed))
        })
        .await?;

    Ok(Json(CharacterDetailResponse {
        character: convert::character(&row)?,
        created_stories: convert::collect_valid(created, convert::story),
        contributed_stories: convert::collect_valid(contributed, convert::story),
    }))
}
