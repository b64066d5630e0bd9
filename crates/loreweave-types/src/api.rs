use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Character, LoreVote, Story, StoryPart, User, VoteType};

// -- JWT Claims --

/// JWT claims shared across loreweave-api (REST middleware) and
/// loreweave-gateway (WebSocket Identify).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub verification_required: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResendCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Profile --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Left unchanged when absent or blank.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: User,
    pub character: Option<Character>,
    pub created_stories: Vec<Story>,
    pub contributed_stories: Vec<Story>,
}

// -- Characters --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCharacterRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CharacterListResponse {
    pub current_user_character: Option<Character>,
    pub other_characters: Vec<Character>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CharacterDetailResponse {
    pub character: Character,
    pub created_stories: Vec<Story>,
    pub contributed_stories: Vec<Story>,
}

// -- Stories --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStoryRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryDetailResponse {
    pub story: Story,
    pub parts: Vec<StoryPart>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddStoryPartRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub story_id: Uuid,
    pub can_contribute: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryPartDetailResponse {
    pub part: StoryPart,
    pub vote_score: i64,
    pub total_votes: i64,
}

// -- Votes --

/// `vote_type` stays raw JSON so a missing, non-string or unknown value is
/// reported as its own rejection rather than a body parse failure.
#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    #[serde(default)]
    pub vote_type: Option<serde_json::Value>,
}

impl CastVoteRequest {
    /// The vote type when it was sent as a string; anything else counts as
    /// missing.
    pub fn vote_type_str(&self) -> Option<&str> {
        self.vote_type.as_ref().and_then(|v| v.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CastVoteResponse {
    pub vote_id: Uuid,
    pub story_part_id: Uuid,
    pub vote_type: VoteType,
    pub contributor_lore_points: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteCountResponse {
    pub story_part_id: Uuid,
    pub positive: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyVotesResponse {
    pub votes: Vec<LoreVote>,
}

// -- Notifications & messages --

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub to: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub other_party_username: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: Uuid,
    pub from_username: String,
    pub to_username: String,
    pub text: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `NOT_YOUR_TURN`.
    pub error: String,
    pub message: String,
}
