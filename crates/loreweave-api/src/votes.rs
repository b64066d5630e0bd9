use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use loreweave_db::Rejection;
use loreweave_db::models::NotificationKind;
use loreweave_gateway::OutgoingNotification;
use loreweave_types::api::{
    CastVoteRequest, CastVoteResponse, Claims, MyVotesResponse, VoteCountResponse,
};
use loreweave_types::models::VoteType;

use crate::convert;
use crate::error::{ApiError, path_id};
use crate::state::AppState;

/// Cast a vote. The vote and the ledger change commit together; the
/// contributor is notified afterwards and that notification may be lost
/// without affecting the vote.
pub async fn cast_vote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(part_id): Path<String>,
    Json(req): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let part_id = path_id(&part_id, "story part")?;
    let voter_id = claims.sub.to_string();
    let receipt = state
        .with_db(move |db| {
            db.cast_vote(&part_id.to_string(), &voter_id, req.vote_type_str())
        })
        .await?;

    info!(
        "{} voted {} on part {}",
        claims.username, receipt.vote_type, part_id
    );

    let wording = match receipt.vote_type {
        VoteType::Positive => "an upvote",
        VoteType::Negative => "a downvote",
    };
    state
        .notifier
        .notify_best_effort(OutgoingNotification {
            recipient_id: receipt.contributor_user_id.clone(),
            sender_id: Some(claims.sub.to_string()),
            kind: NotificationKind::Vote,
            message: format!(
                "{} gave {} to your part in \"{}\"",
                claims.username, wording, receipt.story_title
            ),
            link: Some(format!("/story-parts/{}", part_id)),
        })
        .await;

    let vote_id: Uuid = receipt
        .vote
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt vote id '{}': {}", receipt.vote.id, e))?;

    Ok((
        StatusCode::CREATED,
        Json(CastVoteResponse {
            vote_id,
            story_part_id: part_id,
            vote_type: receipt.vote_type,
            contributor_lore_points: receipt.contributor_lore_points,
        }),
    ))
}

pub async fn count_positive(
    State(state): State<AppState>,
    Path(part_id): Path<String>,
) -> Result<Json<VoteCountResponse>, ApiError> {
    let part_id = path_id(&part_id, "story part")?;
    let positive = state
        .with_db(move |db| {
            let id = part_id.to_string();
            if db.get_story_part(&id)?.is_none() {
                return Err(ApiError::from(Rejection::NotFound("story part")));
            }
            Ok(db.count_positive_votes(&id)?)
        })
        .await?;

    Ok(Json(VoteCountResponse {
        story_part_id: part_id,
        positive,
    }))
}

/// Votes the caller has cast, newest first.
pub async fn my_votes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MyVotesResponse>, ApiError> {
    let voter_id = claims.sub.to_string();
    let rows = state
        .with_db(move |db| db.votes_by_voter(&voter_id))
        .await?;

    Ok(Json(MyVotesResponse {
        votes: convert::collect_valid(rows, convert::lore_vote),
    }))
}
