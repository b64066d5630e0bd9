use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use loreweave_db::Rejection;
use loreweave_db::models::NotificationKind;
use loreweave_gateway::OutgoingNotification;
use loreweave_types::api::{
    AddStoryPartRequest, Claims, CreateStoryRequest, StoryDetailResponse, StoryPartDetailResponse,
    TurnResponse,
};
use loreweave_types::events::GatewayEvent;
use loreweave_types::models::{Story, StoryPart};

use crate::convert;
use crate::error::{ApiError, path_id};
use crate::state::AppState;

/// Most recently updated first.
pub async fn list_stories(State(state): State<AppState>) -> Result<Json<Vec<Story>>, ApiError> {
    let rows = state.with_db(|db| db.list_stories()).await?;
    Ok(Json(convert::collect_valid(rows, convert::story)))
}

pub async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
) -> Result<Json<StoryDetailResponse>, ApiError> {
    let story_id = path_id(&story_id, "story")?;
    let (story, parts) = state
        .with_db(move |db| {
            let id = story_id.to_string();
            let story = db.get_story(&id)?.ok_or(Rejection::NotFound("story"))?;
            let parts = db.get_story_parts(&id)?;
            Ok::<_, ApiError>((story, parts))
        })
        .await?;

    Ok(Json(StoryDetailResponse {
        story: convert::story(&story)?,
        parts: convert::collect_valid(parts, convert::story_part),
    }))
}

pub async fn create_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let row = state
        .with_db(move |db| db.create_story(&user_id, &req.title))
        .await?;

    info!("{} started story '{}'", claims.username, row.title);
    let story = convert::story(&row)?;
    Ok((StatusCode::CREATED, Json(story)))
}

pub async fn delete_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(story_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let story_id = path_id(&story_id, "story")?;
    let user_id = claims.sub.to_string();
    state
        .with_db(move |db| db.delete_story(&story_id.to_string(), &user_id))
        .await?;

    info!("{} deleted story {}", claims.username, story_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_turn(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(story_id): Path<String>,
) -> Result<Json<TurnResponse>, ApiError> {
    let story_id = path_id(&story_id, "story")?;
    let user_id = claims.sub.to_string();
    let can_contribute = state
        .with_db(move |db| db.can_contribute(&story_id.to_string(), &user_id))
        .await?;

    Ok(Json(TurnResponse {
        story_id,
        can_contribute,
    }))
}

/// Append a part, then tell subscribers and the story's creator about it.
pub async fn add_story_part(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(story_id): Path<String>,
    Json(req): Json<AddStoryPartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let story_id = path_id(&story_id, "story")?;
    let user_id = claims.sub.to_string();
    let (row, story) = state
        .with_db(move |db| {
            let id = story_id.to_string();
            let row = db.append_story_part(&id, &user_id, &req.content)?;
            let story = db.get_story(&id)?;
            Ok::<_, ApiError>((row, story))
        })
        .await?;

    let part: StoryPart = convert::story_part(&row)?;
    info!(
        "{} added part {} to story {}",
        claims.username, part.part_order, story_id
    );

    state
        .notifier
        .dispatcher()
        .broadcast(GatewayEvent::StoryPartCreate {
            story_id,
            part_id: part.id,
            part_order: part.part_order,
            contributor_name: part.contributor_name.clone(),
            author_username: part.author_username.clone(),
            content: part.content.clone(),
            created_at: part.created_at,
        });

    if let Some(story) = story.filter(|s| s.creator_user_id != row.author_id) {
        state
            .notifier
            .notify_best_effort(OutgoingNotification {
                recipient_id: story.creator_user_id,
                sender_id: Some(row.author_id.clone()),
                kind: NotificationKind::Contribution,
                message: format!(
                    "{} continued your story \"{}\"",
                    part.contributor_name, story.title
                ),
                link: Some(format!("/stories/{}", story_id)),
            })
            .await;
    }

    Ok((StatusCode::CREATED, Json(part)))
}

/// One part with its vote score (positives minus negatives) and vote total.
pub async fn get_story_part(
    State(state): State<AppState>,
    Path(part_id): Path<String>,
) -> Result<Json<StoryPartDetailResponse>, ApiError> {
    let part_id = path_id(&part_id, "story part")?;
    let (row, (vote_score, total_votes)) = state
        .with_db(move |db| {
            let id = part_id.to_string();
            let row = db.get_story_part(&id)?.ok_or(Rejection::NotFound("story part"))?;
            let score = db.part_score(&id)?;
            Ok::<_, ApiError>((row, score))
        })
        .await?;

    Ok(Json(StoryPartDetailResponse {
        part: convert::story_part(&row)?,
        vote_score,
        total_votes,
    }))
}
