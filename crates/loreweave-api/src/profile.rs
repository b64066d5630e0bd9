use axum::{Extension, Json, extract::State};
use tracing::info;

use loreweave_db::{Database, Rejection};
use loreweave_types::api::{Claims, ProfileResponse, UpdateProfileRequest};

use crate::auth::{hash_password, validate_email, validate_password, validate_username};
use crate::convert;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = claims.sub.to_string();
    let profile = state.with_db(move |db| load_profile(db, &user_id)).await?;
    Ok(Json(profile))
}

/// Overwrite the caller's account details. A blank or absent password keeps
/// the current one.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();
    validate_username(&username)?;
    validate_email(&email)?;

    let new_password = req.password.filter(|p| !p.trim().is_empty());
    if let Some(password) = &new_password {
        validate_password(password)?;
    }
    let first_name = blank_to_none(req.first_name);
    let last_name = blank_to_none(req.last_name);

    let user_id = claims.sub.to_string();
    let profile = state
        .with_db(move |db| {
            let hash = new_password.as_deref().map(hash_password).transpose()?;
            db.update_profile(
                &user_id,
                &username,
                &email,
                first_name.as_deref(),
                last_name.as_deref(),
                hash.as_deref(),
            )?;
            load_profile(db, &user_id)
        })
        .await?;

    info!("{} updated their profile", claims.username);
    Ok(Json(profile))
}

fn load_profile(db: &Database, user_id: &str) -> Result<ProfileResponse, ApiError> {
    let user = db
        .get_user_by_id(user_id)?
        .ok_or(Rejection::NotFound("user"))?;
    let character = match db.get_character_for_user(user_id)? {
        Some(row) => Some(convert::character(&db.refresh_lore_points(&row.id)?)?),
        None => None,
    };
    let created = db.stories_created_by_user(user_id)?;
    let contributed = db.stories_contributed_by_user(user_id)?;

    Ok(ProfileResponse {
        user: convert::user(&user)?,
        character,
        created_stories: convert::collect_valid(created, convert::story),
        contributed_stories: convert::collect_valid(contributed, convert::story),
    })
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
